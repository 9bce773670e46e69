// Graphics pipeline assembly
//
// Shader stages, vertex input, fixed-function state and a layout built from
// bind layouts. Viewport, scissor, cull mode and front face are dynamic
// state, set per draw rather than baked in.

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::PixelFormat;
use crate::shader::ShaderStage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

impl StepMode {
    pub fn to_vk(self) -> vk::VertexInputRate {
        match self {
            StepMode::Vertex => vk::VertexInputRate::VERTEX,
            StepMode::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: PixelFormat,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step: StepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Debug, Default)]
pub struct VertexLayout {
    pub buffers: Vec<VertexBufferLayout>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

/// Per-attachment blend state.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

/// Fixed-function state for a graphics pipeline. Viewport/scissor/cull/
/// front-face are deliberately absent: they are dynamic.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineState {
    pub topology: PrimitiveTopology,
    pub depth: Option<DepthState>,
    /// One entry per color attachment of the target subpass.
    pub blend: Vec<BlendState>,
}

impl Default for GraphicsPipelineState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            depth: None,
            blend: vec![BlendState::default()],
        }
    }
}

pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    pub fn create(
        device: &Device,
        stages: &[&ShaderStage],
        vertex_layout: &VertexLayout,
        state: &GraphicsPipelineState,
        set_layouts: &[vk::DescriptorSetLayout],
        render_pass: vk::RenderPass,
        subpass: u32,
    ) -> RhiResult<Self> {
        if stages.is_empty() {
            return Err(RhiError::Validation(
                "pipeline needs at least one shader stage".into(),
            ));
        }

        let stage_infos: Vec<_> = stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage().to_vk())
                    .module(stage.module())
                    .name(stage.entry_point())
                    .build()
            })
            .collect();

        // Vertex input: one binding per buffer layout, attributes flattened.
        let mut bindings = Vec::with_capacity(vertex_layout.buffers.len());
        let mut attributes = Vec::new();
        for (binding, buffer) in vertex_layout.buffers.iter().enumerate() {
            bindings.push(
                vk::VertexInputBindingDescription::builder()
                    .binding(binding as u32)
                    .stride(buffer.stride)
                    .input_rate(buffer.step.to_vk())
                    .build(),
            );
            for attr in &buffer.attributes {
                attributes.push(
                    vk::VertexInputAttributeDescription::builder()
                        .binding(binding as u32)
                        .location(attr.location)
                        .format(attr.format.to_vk())
                        .offset(attr.offset)
                        .build(),
                );
            }
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.topology.to_vk())
            .primitive_restart_enable(false);

        // Counts only; the rects themselves are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth = state.depth.unwrap_or_default();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth.test)
            .depth_write_enable(depth.write)
            .depth_compare_op(depth.compare.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments: Vec<_> = state
            .blend
            .iter()
            .map(|blend| {
                vk::PipelineColorBlendAttachmentState::builder()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(blend.enable)
                    .src_color_blend_factor(blend.src_color.to_vk())
                    .dst_color_blend_factor(blend.dst_color.to_vk())
                    .color_blend_op(vk::BlendOp::ADD)
                    .src_alpha_blend_factor(blend.src_alpha.to_vk())
                    .dst_alpha_blend_factor(blend.dst_alpha.to_vk())
                    .alpha_blend_op(vk::BlendOp::ADD)
                    .build()
            })
            .collect();
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::CULL_MODE,
            vk::DynamicState::FRONT_FACE,
        ];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("pipeline layout: {}", e)))?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(subpass)
            .build();

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.handle().destroy_pipeline_layout(layout, None) };
                return Err(RhiError::ResourceCreation(format!(
                    "graphics pipeline: {}",
                    e
                )));
            }
        };

        Ok(Self { pipeline, layout })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe {
            device.handle().destroy_pipeline(self.pipeline, None);
            device.handle().destroy_pipeline_layout(self.layout, None);
        }
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_step_mode_maps_to_input_rate() {
        assert_eq!(StepMode::Vertex.to_vk(), vk::VertexInputRate::VERTEX);
        assert_eq!(StepMode::Instance.to_vk(), vk::VertexInputRate::INSTANCE);
    }

    #[test]
    fn default_state_is_opaque_triangles() {
        let state = GraphicsPipelineState::default();
        assert_eq!(state.topology, PrimitiveTopology::TriangleList);
        assert!(state.depth.is_none());
        assert_eq!(state.blend.len(), 1);
        assert!(!state.blend[0].enable);
    }
}
