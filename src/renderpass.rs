// Render pass and framebuffer cache
//
// Builds attachment and subpass descriptions from API-agnostic values, and
// caches one native framebuffer per distinct attachment-view combination so
// re-binding the same images reuses the cached object.

use std::collections::HashMap;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::PixelFormat;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
    DontCare,
}

impl LoadOp {
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

impl StoreOp {
    pub fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

/// Image layouts exposed at the attachment boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayoutKind {
    #[default]
    Undefined,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    PresentSource,
}

impl LayoutKind {
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            LayoutKind::Undefined => vk::ImageLayout::UNDEFINED,
            LayoutKind::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            LayoutKind::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            LayoutKind::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            LayoutKind::PresentSource => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AttachmentDesc {
    pub format: PixelFormat,
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_layout: LayoutKind,
    pub final_layout: LayoutKind,
}

#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    /// Indices into the attachment list.
    pub color: Vec<u32>,
    pub input: Vec<u32>,
    pub depth: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
}

pub struct RenderPass {
    raw: vk::RenderPass,
    attachment_count: usize,
    /// Framebuffers keyed by the identity of the bound attachment views.
    framebuffers: HashMap<Vec<vk::ImageView>, vk::Framebuffer>,
}

impl RenderPass {
    pub fn create(device: &Device, desc: &RenderPassDesc) -> RhiResult<Self> {
        if desc.subpasses.is_empty() {
            return Err(RhiError::Validation(
                "render pass needs at least one subpass".into(),
            ));
        }

        let attachments: Vec<_> = desc
            .attachments
            .iter()
            .map(|a| {
                vk::AttachmentDescription::builder()
                    .format(a.format.to_vk())
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(a.load.to_vk())
                    .store_op(a.store.to_vk())
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(a.initial_layout.to_vk())
                    .final_layout(a.final_layout.to_vk())
                    .build()
            })
            .collect();

        // Reference arrays must stay alive until create_render_pass.
        let mut color_refs = Vec::with_capacity(desc.subpasses.len());
        let mut input_refs = Vec::with_capacity(desc.subpasses.len());
        let mut depth_refs = Vec::with_capacity(desc.subpasses.len());
        for subpass in &desc.subpasses {
            for index in subpass.color.iter().chain(&subpass.input) {
                if *index as usize >= desc.attachments.len() {
                    return Err(RhiError::Validation(format!(
                        "subpass references attachment {} of {}",
                        index,
                        desc.attachments.len()
                    )));
                }
            }
            color_refs.push(attachment_refs(
                &subpass.color,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ));
            input_refs.push(attachment_refs(
                &subpass.input,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ));
            depth_refs.push(subpass.depth.map(|index| {
                vk::AttachmentReference {
                    attachment: index,
                    layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                }
            }));
        }

        let subpasses: Vec<_> = desc
            .subpasses
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&color_refs[i])
                    .input_attachments(&input_refs[i]);
                if let Some(depth) = depth_refs[i].as_ref() {
                    builder = builder.depth_stencil_attachment(depth);
                }
                builder.build()
            })
            .collect();

        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let raw = unsafe {
            device
                .handle()
                .create_render_pass(&create_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("render pass: {}", e)))?
        };

        Ok(Self {
            raw,
            attachment_count: desc.attachments.len(),
            framebuffers: HashMap::new(),
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.raw
    }

    /// Returns the framebuffer for the given attachment views, creating it
    /// on first use. Repeated calls with the same views hit the cache.
    pub fn set_attachments(
        &mut self,
        device: &Device,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        if views.len() != self.attachment_count {
            return Err(RhiError::Validation(format!(
                "render pass expects {} attachments, got {}",
                self.attachment_count,
                views.len()
            )));
        }

        if let Some(&framebuffer) = self.framebuffers.get(views) {
            return Ok(framebuffer);
        }

        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(self.raw)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .handle()
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("framebuffer: {}", e)))?
        };
        self.framebuffers.insert(views.to_vec(), framebuffer);
        Ok(framebuffer)
    }

    /// Drops cached framebuffers; required whenever the attachment images
    /// are replaced (e.g. swapchain recreation).
    pub fn invalidate_framebuffers(&mut self, device: &Device) {
        for (_, framebuffer) in self.framebuffers.drain() {
            unsafe { device.handle().destroy_framebuffer(framebuffer, None) };
        }
    }

    pub fn destroy(&mut self, device: &Device) {
        self.invalidate_framebuffers(device);
        unsafe { device.handle().destroy_render_pass(self.raw, None) };
        self.raw = vk::RenderPass::null();
    }
}

fn attachment_refs(indices: &[u32], layout: vk::ImageLayout) -> Vec<vk::AttachmentReference> {
    indices
        .iter()
        .map(|&attachment| vk::AttachmentReference { attachment, layout })
        .collect()
}
