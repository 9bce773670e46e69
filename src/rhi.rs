// RHI facade
//
// Single entry point over the backend. `Rhi` is a sealed union with one
// variant per backend, chosen once at initialization; call sites match, they
// never downcast. The Vulkan backend owns the instance, the adapter
// registry, the lazily-created device, every resource pool, and the present
// contexts, so teardown order is decided in exactly one place.

use ash::vk;

use crate::buffer::{Buffer, BufferDesc};
use crate::config::RhiConfig;
use crate::descriptor::{
    BindGroup, BindGroupEntry, BindLayout, BindLayoutDesc, BoundResource, DescriptorAllocator,
};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::{ColorSpace, PixelFormat};
use crate::handle::{Handle, Pool};
use crate::instance::Instance;
use crate::physical::AdapterRegistry;
use crate::pipeline::{
    CullMode, FrontFace, GraphicsPipeline, GraphicsPipelineState, VertexLayout,
};
use crate::present::{FrameStep, PresentContext};
use crate::renderpass::{RenderPass, RenderPassDesc};
use crate::sampler::{Sampler, SamplerDesc};
use crate::shader::{ShaderStage, ShaderStageDesc};
use crate::surface::{Surface, WindowSpec};
use crate::swapchain::SwapchainDesc;
use crate::texture::{Texture, TextureDesc};

/// Recording cursor for one in-flight frame. Returned by
/// `begin_window_render` and consumed by `end_window_render`; every `cmd_*`
/// call is parameterized by it.
pub struct CommandList {
    context: Handle<PresentContext>,
    image_index: u32,
    buffer: vk::CommandBuffer,
}

impl CommandList {
    pub fn image_index(&self) -> u32 {
        self.image_index
    }
}

/// Facade-level bind-group entry: resources named by handles rather than
/// native objects.
#[derive(Clone, Copy, Debug)]
pub enum BindingResource {
    Buffer {
        buffer: Handle<Buffer>,
        offset: u64,
        range: u64,
    },
    Texture {
        texture: Handle<Texture>,
        sampler: Handle<Sampler>,
    },
    StorageTexture {
        texture: Handle<Texture>,
    },
    Sampler {
        sampler: Handle<Sampler>,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct BindingEntry {
    pub slot: u32,
    pub resource: BindingResource,
}

#[derive(Clone, Debug)]
pub struct BindGroupDesc {
    pub layout: Handle<BindLayout>,
    pub entries: Vec<BindingEntry>,
}

#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc {
    pub stages: Vec<Handle<ShaderStage>>,
    pub vertex_layout: VertexLayout,
    pub state: GraphicsPipelineState,
    pub bind_layouts: Vec<Handle<BindLayout>>,
    pub render_pass: Handle<RenderPass>,
    pub subpass: u32,
}

#[derive(Clone, Copy, Debug)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    fn to_vk(self) -> vk::ClearValue {
        match self {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    U16,
    U32,
}

impl IndexKind {
    fn to_vk(self) -> vk::IndexType {
        match self {
            IndexKind::U16 => vk::IndexType::UINT16,
            IndexKind::U32 => vk::IndexType::UINT32,
        }
    }
}

/// Backend union. Sealed: adding a backend means adding a variant here and
/// nowhere else.
pub enum Rhi {
    Vulkan(VulkanRhi),
}

impl Rhi {
    pub fn initialize(config: RhiConfig) -> RhiResult<Self> {
        Ok(Rhi::Vulkan(VulkanRhi::initialize(config)?))
    }

    pub fn backend(&self) -> &VulkanRhi {
        match self {
            Rhi::Vulkan(backend) => backend,
        }
    }

    pub fn backend_mut(&mut self) -> &mut VulkanRhi {
        match self {
            Rhi::Vulkan(backend) => backend,
        }
    }
}

pub struct VulkanRhi {
    config: RhiConfig,
    instance: Instance,
    registry: AdapterRegistry,
    device: Option<Device>,
    adapter_index: usize,
    descriptors: DescriptorAllocator,
    buffers: Pool<Buffer>,
    textures: Pool<Texture>,
    samplers: Pool<Sampler>,
    shaders: Pool<ShaderStage>,
    bind_layouts: Pool<BindLayout>,
    bind_groups: Pool<BindGroup>,
    render_passes: Pool<RenderPass>,
    pipelines: Pool<GraphicsPipeline>,
    contexts: Pool<PresentContext>,
}

impl VulkanRhi {
    /// Creates the instance and enumerates adapters. The logical device is
    /// deferred until the first present context, when a surface exists to
    /// score adapters against.
    pub fn initialize(config: RhiConfig) -> RhiResult<Self> {
        let instance = Instance::new(&config.app.name, config.debug.validation_layers)?;
        let registry = AdapterRegistry::enumerate(instance.handle())?;

        Ok(Self {
            config,
            instance,
            registry,
            device: None,
            adapter_index: 0,
            descriptors: DescriptorAllocator::new(),
            buffers: Pool::new(),
            textures: Pool::new(),
            samplers: Pool::new(),
            shaders: Pool::new(),
            bind_layouts: Pool::new(),
            bind_groups: Pool::new(),
            render_passes: Pool::new(),
            pipelines: Pool::new(),
            contexts: Pool::new(),
        })
    }

    pub fn config(&self) -> &RhiConfig {
        &self.config
    }

    fn device(&self) -> RhiResult<&Device> {
        require_device(&self.device)
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        if let Some(device) = &self.device {
            device.wait_idle()?;
        }
        Ok(())
    }

    // ---- present contexts ------------------------------------------------

    /// Creates the per-window present context. The first call picks the
    /// adapter for this surface and creates the logical device; later
    /// windows share it.
    pub fn create_present_context(
        &mut self,
        spec: &WindowSpec,
    ) -> RhiResult<Handle<PresentContext>> {
        let mut surface = Surface::new(&self.instance, spec)?;

        if self.device.is_none() {
            let selected = self.registry.pick(surface.handle(), surface.loader())?;
            let device = Device::new(
                self.instance.handle(),
                self.registry.adapter(selected.index),
                selected.families,
            )?;
            self.adapter_index = selected.index;
            self.device = Some(device);
        } else {
            let support = self.registry.add_surface_support(
                self.adapter_index,
                surface.handle(),
                surface.loader(),
            )?;
            if !support.is_adequate() {
                self.registry.forget_surface(surface.handle());
                surface.destroy();
                return Err(RhiError::Validation(
                    "surface has no usable formats or present modes".into(),
                ));
            }
        }

        let device = require_device(&self.device)?;
        let support = self
            .registry
            .surface_support(surface.handle())
            .ok_or_else(|| RhiError::Validation("surface support not queried".into()))?;

        let (format, color_space) = match choose_surface_format(spec.hdr, &support.formats) {
            Some(pair) => pair,
            None => {
                let err = RhiError::UnsupportedSurfaceFormat {
                    format: PixelFormat::Unknown,
                    color_space: ColorSpace::Unknown,
                };
                self.registry.forget_surface(surface.handle());
                surface.destroy();
                return Err(err);
            }
        };
        if spec.hdr && color_space == ColorSpace::SrgbNonlinear {
            log::warn!("HDR requested but surface only supports SDR, falling back");
        }

        let desc = SwapchainDesc {
            width: spec.width,
            height: spec.height,
            format,
            color_space,
            image_count: self.config.present.buffer_count,
            present_mode: spec.present_mode,
        };

        let context = PresentContext::new(
            self.instance.handle(),
            device,
            &self.registry,
            self.adapter_index,
            surface,
            desc,
        )?;
        Ok(self.contexts.insert(context))
    }

    pub fn destroy_present_context(&mut self, handle: Handle<PresentContext>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut context = self
            .contexts
            .remove(handle)
            .ok_or(RhiError::StaleHandle("present context"))?;
        context.destroy(device, &mut self.registry);
        Ok(())
    }

    pub fn set_window_extent(
        &mut self,
        handle: Handle<PresentContext>,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let context = self
            .contexts
            .get_mut(handle)
            .ok_or(RhiError::StaleHandle("present context"))?;
        context.set_window_extent(width, height);
        Ok(())
    }

    /// Acquires the next backbuffer and opens its command buffer. `None`
    /// means the swapchain was stale: it has been recreated and this frame
    /// is skipped.
    pub fn begin_window_render(
        &mut self,
        handle: Handle<PresentContext>,
        timeout: u64,
    ) -> RhiResult<Option<CommandList>> {
        let device = require_device(&self.device)?;
        let context = self
            .contexts
            .get_mut(handle)
            .ok_or(RhiError::StaleHandle("present context"))?;

        let step = context.acquire_backbuffer(
            self.instance.handle(),
            device,
            &mut self.registry,
            timeout,
        )?;
        if context.take_recreated() {
            // Recreation replaced the backbuffer views; cached framebuffers
            // now reference dead images. This covers the deferred
            // (suboptimal) recreation too, where the frame still renders.
            for pass in self.render_passes.iter_mut() {
                pass.invalidate_framebuffers(device);
            }
        }

        match step {
            FrameStep::Render {
                image_index,
                command_buffer,
            } => {
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                unsafe {
                    device
                        .handle()
                        .begin_command_buffer(command_buffer, &begin_info)?;
                }
                Ok(Some(CommandList {
                    context: handle,
                    image_index,
                    buffer: command_buffer,
                }))
            }
            FrameStep::Skipped => Ok(None),
        }
    }

    /// Closes the command buffer, submits it, and presents the image.
    pub fn end_window_render(&mut self, list: CommandList) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let context = self
            .contexts
            .get_mut(list.context)
            .ok_or(RhiError::StaleHandle("present context"))?;

        unsafe { device.handle().end_command_buffer(list.buffer)? };
        context.submit_render(device, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)?;
        context.present(self.instance.handle(), device, &mut self.registry)?;
        if context.take_recreated() {
            // Same sweep as after acquire; a stale present also rebuilt the
            // backbuffer views.
            for pass in self.render_passes.iter_mut() {
                pass.invalidate_framebuffers(device);
            }
        }
        Ok(())
    }

    // ---- resource factory ------------------------------------------------

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> RhiResult<Handle<Buffer>> {
        let buffer = Buffer::create(self.device()?, desc)?;
        Ok(self.buffers.insert(buffer))
    }

    /// Synchronous upload into a write-mapped buffer. Unsafe to race with
    /// in-flight GPU reads of the same range; callers fence first.
    pub fn upload_buffer(
        &mut self,
        handle: Handle<Buffer>,
        offset: u64,
        data: &[u8],
    ) -> RhiResult<()> {
        let buffer = self
            .buffers
            .get_mut(handle)
            .ok_or(RhiError::StaleHandle("buffer"))?;
        buffer.upload(offset, data)
    }

    pub fn destroy_buffer(&mut self, handle: Handle<Buffer>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut buffer = self
            .buffers
            .remove(handle)
            .ok_or(RhiError::StaleHandle("buffer"))?;
        buffer.destroy(device);
        Ok(())
    }

    pub fn create_texture(&mut self, desc: &TextureDesc) -> RhiResult<Handle<Texture>> {
        let texture = Texture::create(self.device()?, desc)?;
        Ok(self.textures.insert(texture))
    }

    pub fn destroy_texture(&mut self, handle: Handle<Texture>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut texture = self
            .textures
            .remove(handle)
            .ok_or(RhiError::StaleHandle("texture"))?;
        texture.destroy(device);
        Ok(())
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> RhiResult<Handle<Sampler>> {
        let sampler = Sampler::create(self.device()?, desc)?;
        Ok(self.samplers.insert(sampler))
    }

    pub fn destroy_sampler(&mut self, handle: Handle<Sampler>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut sampler = self
            .samplers
            .remove(handle)
            .ok_or(RhiError::StaleHandle("sampler"))?;
        sampler.destroy(device);
        Ok(())
    }

    pub fn create_shader_stage(&mut self, desc: &ShaderStageDesc) -> RhiResult<Handle<ShaderStage>> {
        let stage = ShaderStage::create(self.device()?, desc)?;
        Ok(self.shaders.insert(stage))
    }

    pub fn destroy_shader_stage(&mut self, handle: Handle<ShaderStage>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut stage = self
            .shaders
            .remove(handle)
            .ok_or(RhiError::StaleHandle("shader stage"))?;
        stage.destroy(device);
        Ok(())
    }

    pub fn create_bind_layout(&mut self, desc: &BindLayoutDesc) -> RhiResult<Handle<BindLayout>> {
        let layout = BindLayout::create(self.device()?, desc)?;
        Ok(self.bind_layouts.insert(layout))
    }

    pub fn destroy_bind_layout(&mut self, handle: Handle<BindLayout>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut layout = self
            .bind_layouts
            .remove(handle)
            .ok_or(RhiError::StaleHandle("bind layout"))?;
        layout.destroy(device);
        Ok(())
    }

    pub fn create_bind_group(&mut self, desc: &BindGroupDesc) -> RhiResult<Handle<BindGroup>> {
        let device = require_device(&self.device)?;
        let layout = self
            .bind_layouts
            .get(desc.layout)
            .ok_or(RhiError::StaleHandle("bind layout"))?;

        let mut entries = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let resource = match entry.resource {
                BindingResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    let buffer = self
                        .buffers
                        .get(buffer)
                        .ok_or(RhiError::StaleHandle("buffer"))?;
                    BoundResource::Buffer {
                        buffer: buffer.handle(),
                        offset,
                        range,
                    }
                }
                BindingResource::Texture { texture, sampler } => {
                    let texture = self
                        .textures
                        .get(texture)
                        .ok_or(RhiError::StaleHandle("texture"))?;
                    let sampler = self
                        .samplers
                        .get(sampler)
                        .ok_or(RhiError::StaleHandle("sampler"))?;
                    BoundResource::Texture {
                        view: texture.view(),
                        sampler: sampler.handle(),
                    }
                }
                BindingResource::StorageTexture { texture } => {
                    let texture = self
                        .textures
                        .get(texture)
                        .ok_or(RhiError::StaleHandle("texture"))?;
                    BoundResource::StorageTexture {
                        view: texture.view(),
                    }
                }
                BindingResource::Sampler { sampler } => {
                    let sampler = self
                        .samplers
                        .get(sampler)
                        .ok_or(RhiError::StaleHandle("sampler"))?;
                    BoundResource::Sampler {
                        sampler: sampler.handle(),
                    }
                }
            };
            entries.push(BindGroupEntry {
                slot: entry.slot,
                resource,
            });
        }

        let group = BindGroup::create(device, &mut self.descriptors, layout, &entries)?;
        Ok(self.bind_groups.insert(group))
    }

    pub fn destroy_bind_group(&mut self, handle: Handle<BindGroup>) -> RhiResult<()> {
        // Sets are reclaimed when their pool is destroyed; dropping the
        // wrapper only invalidates the handle.
        self.bind_groups
            .remove(handle)
            .map(|_| ())
            .ok_or(RhiError::StaleHandle("bind group"))
    }

    pub fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RhiResult<Handle<RenderPass>> {
        let pass = RenderPass::create(self.device()?, desc)?;
        Ok(self.render_passes.insert(pass))
    }

    pub fn destroy_render_pass(&mut self, handle: Handle<RenderPass>) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut pass = self
            .render_passes
            .remove(handle)
            .ok_or(RhiError::StaleHandle("render pass"))?;
        pass.destroy(device);
        Ok(())
    }

    pub fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
    ) -> RhiResult<Handle<GraphicsPipeline>> {
        let device = self.device()?;

        let mut stages = Vec::with_capacity(desc.stages.len());
        for &stage in &desc.stages {
            stages.push(
                self.shaders
                    .get(stage)
                    .ok_or(RhiError::StaleHandle("shader stage"))?,
            );
        }
        let mut set_layouts = Vec::with_capacity(desc.bind_layouts.len());
        for &layout in &desc.bind_layouts {
            set_layouts.push(
                self.bind_layouts
                    .get(layout)
                    .ok_or(RhiError::StaleHandle("bind layout"))?
                    .handle(),
            );
        }
        let render_pass = self
            .render_passes
            .get(desc.render_pass)
            .ok_or(RhiError::StaleHandle("render pass"))?
            .handle();

        let pipeline = GraphicsPipeline::create(
            device,
            &stages,
            &desc.vertex_layout,
            &desc.state,
            &set_layouts,
            render_pass,
            desc.subpass,
        )?;
        Ok(self.pipelines.insert(pipeline))
    }

    pub fn destroy_graphics_pipeline(
        &mut self,
        handle: Handle<GraphicsPipeline>,
    ) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let mut pipeline = self
            .pipelines
            .remove(handle)
            .ok_or(RhiError::StaleHandle("pipeline"))?;
        pipeline.destroy(device);
        Ok(())
    }

    // ---- command recording -----------------------------------------------

    /// Begins a render pass on the list's backbuffer. The backbuffer view is
    /// attachment 0; `extra_attachments` (e.g. a depth texture) follow in
    /// order. One clear value per attachment.
    pub fn cmd_begin_render_pass(
        &mut self,
        list: &CommandList,
        pass: Handle<RenderPass>,
        extra_attachments: &[Handle<Texture>],
        clear_values: &[ClearValue],
    ) -> RhiResult<()> {
        let device = require_device(&self.device)?;
        let context = self
            .contexts
            .get(list.context)
            .ok_or(RhiError::StaleHandle("present context"))?;
        let pass = self
            .render_passes
            .get_mut(pass)
            .ok_or(RhiError::StaleHandle("render pass"))?;

        let swapchain = context.swapchain();
        let extent = swapchain.extent();
        let mut views = Vec::with_capacity(1 + extra_attachments.len());
        views.push(swapchain.wrapper(list.image_index).view());
        for &texture in extra_attachments {
            views.push(
                self.textures
                    .get(texture)
                    .ok_or(RhiError::StaleHandle("texture"))?
                    .view(),
            );
        }

        let framebuffer = pass.set_attachments(device, &views, extent)?;
        let clears: Vec<vk::ClearValue> = clear_values.iter().map(|c| c.to_vk()).collect();

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pass.handle())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clears);

        unsafe {
            device.handle().cmd_begin_render_pass(
                list.buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        Ok(())
    }

    pub fn cmd_end_render_pass(&self, list: &CommandList) -> RhiResult<()> {
        let device = self.device()?;
        unsafe { device.handle().cmd_end_render_pass(list.buffer) };
        Ok(())
    }

    pub fn cmd_bind_pipeline(
        &self,
        list: &CommandList,
        pipeline: Handle<GraphicsPipeline>,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let pipeline = self
            .pipelines
            .get(pipeline)
            .ok_or(RhiError::StaleHandle("pipeline"))?;
        unsafe {
            device.handle().cmd_bind_pipeline(
                list.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
        Ok(())
    }

    pub fn cmd_bind_bind_group(
        &self,
        list: &CommandList,
        pipeline: Handle<GraphicsPipeline>,
        set_index: u32,
        group: Handle<BindGroup>,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let pipeline = self
            .pipelines
            .get(pipeline)
            .ok_or(RhiError::StaleHandle("pipeline"))?;
        let group = self
            .bind_groups
            .get(group)
            .ok_or(RhiError::StaleHandle("bind group"))?;
        unsafe {
            device.handle().cmd_bind_descriptor_sets(
                list.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                set_index,
                &[group.set()],
                &[],
            );
        }
        Ok(())
    }

    pub fn cmd_bind_vertex_buffer(
        &self,
        list: &CommandList,
        slot: u32,
        buffer: Handle<Buffer>,
        offset: u64,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let buffer = self
            .buffers
            .get(buffer)
            .ok_or(RhiError::StaleHandle("buffer"))?;
        unsafe {
            device
                .handle()
                .cmd_bind_vertex_buffers(list.buffer, slot, &[buffer.handle()], &[offset]);
        }
        Ok(())
    }

    pub fn cmd_bind_index_buffer(
        &self,
        list: &CommandList,
        buffer: Handle<Buffer>,
        offset: u64,
        kind: IndexKind,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let buffer = self
            .buffers
            .get(buffer)
            .ok_or(RhiError::StaleHandle("buffer"))?;
        unsafe {
            device
                .handle()
                .cmd_bind_index_buffer(list.buffer, buffer.handle(), offset, kind.to_vk());
        }
        Ok(())
    }

    pub fn cmd_set_viewport(
        &self,
        list: &CommandList,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let viewport = vk::Viewport {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe { device.handle().cmd_set_viewport(list.buffer, 0, &[viewport]) };
        Ok(())
    }

    pub fn cmd_set_scissor(
        &self,
        list: &CommandList,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let device = self.device()?;
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x, y },
            extent: vk::Extent2D { width, height },
        };
        unsafe { device.handle().cmd_set_scissor(list.buffer, 0, &[scissor]) };
        Ok(())
    }

    pub fn cmd_set_cull_mode(&self, list: &CommandList, mode: CullMode) -> RhiResult<()> {
        let device = self.device()?;
        unsafe { device.handle().cmd_set_cull_mode(list.buffer, mode.to_vk()) };
        Ok(())
    }

    pub fn cmd_set_front_face(&self, list: &CommandList, face: FrontFace) -> RhiResult<()> {
        let device = self.device()?;
        unsafe { device.handle().cmd_set_front_face(list.buffer, face.to_vk()) };
        Ok(())
    }

    pub fn cmd_draw(
        &self,
        list: &CommandList,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        let device = self.device()?;
        unsafe {
            device.handle().cmd_draw(
                list.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cmd_draw_indexed(
        &self,
        list: &CommandList,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> RhiResult<()> {
        let device = self.device()?;
        unsafe {
            device.handle().cmd_draw_indexed(
                list.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    /// Dispatches compute work recorded outside a render pass.
    pub fn cmd_dispatch(
        &self,
        list: &CommandList,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) -> RhiResult<()> {
        let device = self.device()?;
        unsafe {
            device
                .handle()
                .cmd_dispatch(list.buffer, group_count_x, group_count_y, group_count_z);
        }
        Ok(())
    }
}

impl Drop for VulkanRhi {
    /// Shutdown order: idle the device, then resources, then present
    /// contexts, then the device itself; the instance goes last.
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        if let Err(e) = device.wait_idle() {
            log::warn!("Device idle during shutdown failed: {}", e);
        }

        for mut pipeline in self.pipelines.drain() {
            pipeline.destroy(&device);
        }
        for mut pass in self.render_passes.drain() {
            pass.destroy(&device);
        }
        self.bind_groups.drain();
        self.descriptors.destroy(&device);
        for mut layout in self.bind_layouts.drain() {
            layout.destroy(&device);
        }
        for mut stage in self.shaders.drain() {
            stage.destroy(&device);
        }
        for mut sampler in self.samplers.drain() {
            sampler.destroy(&device);
        }
        for mut texture in self.textures.drain() {
            texture.destroy(&device);
        }
        for mut buffer in self.buffers.drain() {
            buffer.destroy(&device);
        }
        for mut context in self.contexts.drain() {
            context.destroy(&device, &mut self.registry);
        }
        drop(device);
        log::info!("Shut down");
    }
}

// Borrows only the `device` field, so callers can hold `&mut` borrows of
// sibling fields at the same time.
fn require_device(device: &Option<Device>) -> RhiResult<&Device> {
    device.as_ref().ok_or_else(|| {
        RhiError::Validation("no logical device; create a present context first".into())
    })
}

/// Picks the surface format/colorspace pair for a window. HDR windows walk
/// the HDR preference list first, then fall back to SDR; a surface offering
/// only unknown pairs yields `None`.
fn choose_surface_format(
    hdr: bool,
    formats: &[vk::SurfaceFormatKHR],
) -> Option<(PixelFormat, ColorSpace)> {
    const HDR_PREFS: [(PixelFormat, ColorSpace); 3] = [
        (PixelFormat::Rgba16Float, ColorSpace::ExtendedSrgbLinear),
        (PixelFormat::Rgb10A2Unorm, ColorSpace::Hdr10St2084),
        (PixelFormat::Bgra8Srgb, ColorSpace::DisplayP3Nonlinear),
    ];
    const SDR_PREFS: [(PixelFormat, ColorSpace); 4] = [
        (PixelFormat::Bgra8Srgb, ColorSpace::SrgbNonlinear),
        (PixelFormat::Rgba8Srgb, ColorSpace::SrgbNonlinear),
        (PixelFormat::Bgra8Unorm, ColorSpace::SrgbNonlinear),
        (PixelFormat::Rgba8Unorm, ColorSpace::SrgbNonlinear),
    ];

    let supported = |pair: &(PixelFormat, ColorSpace)| {
        formats.iter().any(|f| {
            PixelFormat::from_vk(f.format) == pair.0 && ColorSpace::from_vk(f.color_space) == pair.1
        })
    };

    if hdr {
        if let Some(&pair) = HDR_PREFS.iter().find(|p| supported(p)) {
            return Some(pair);
        }
    }
    if let Some(&pair) = SDR_PREFS.iter().find(|p| supported(p)) {
        return Some(pair);
    }

    // Last resort: any pair that maps cleanly to our tables.
    formats
        .iter()
        .map(|f| (PixelFormat::from_vk(f.format), ColorSpace::from_vk(f.color_space)))
        .find(|&(format, space)| format != PixelFormat::Unknown && space != ColorSpace::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn hdr_window_prefers_extended_srgb() {
        let formats = [
            pair(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            pair(
                vk::Format::R16G16B16A16_SFLOAT,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];
        assert_eq!(
            choose_surface_format(true, &formats),
            Some((PixelFormat::Rgba16Float, ColorSpace::ExtendedSrgbLinear))
        );
    }

    #[test]
    fn hdr_window_falls_back_to_sdr() {
        let formats = [pair(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert_eq!(
            choose_surface_format(true, &formats),
            Some((PixelFormat::Bgra8Srgb, ColorSpace::SrgbNonlinear))
        );
    }

    #[test]
    fn sdr_window_ignores_hdr_pairs() {
        let formats = [
            pair(
                vk::Format::R16G16B16A16_SFLOAT,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
            pair(
                vk::Format::R8G8B8A8_UNORM,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            ),
        ];
        assert_eq!(
            choose_surface_format(false, &formats),
            Some((PixelFormat::Rgba8Unorm, ColorSpace::SrgbNonlinear))
        );
    }

    #[test]
    fn unmappable_surface_yields_none() {
        let formats = [pair(
            vk::Format::R4G4_UNORM_PACK8,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert_eq!(choose_surface_format(false, &formats), None);
    }

    #[test]
    fn sdr_fallback_accepts_any_known_pair() {
        let formats = [
            pair(
                vk::Format::R4G4_UNORM_PACK8,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            ),
            pair(
                vk::Format::A2B10G10R10_UNORM_PACK32,
                vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            ),
        ];
        assert_eq!(
            choose_surface_format(false, &formats),
            Some((PixelFormat::Rgb10A2Unorm, ColorSpace::Hdr10St2084))
        );
    }
}
