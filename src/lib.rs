// vk-rhi - Vulkan render hardware interface
//
// Design: Thin wrapper around ash with safety and ergonomics
// Performance: Zero-cost abstractions, explicit control
//
// The facade (`Rhi`) is the single entry point: it owns the instance, the
// adapter registry, the lazily-created logical device, every resource pool,
// and the per-window present contexts. Window creation and input belong to
// the host application; this crate consumes raw window handles.

pub mod buffer;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod format;
pub mod handle;
pub mod instance;
pub mod physical;
pub mod pipeline;
pub mod present;
pub mod renderpass;
pub mod rhi;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::{Buffer, BufferDesc};
pub use config::RhiConfig;
pub use descriptor::{BindLayout, BindLayoutDesc, BindingDesc, BindingKind, Visibility};
pub use error::{RhiError, RhiResult};
pub use format::{BufferUsage, ColorSpace, PixelFormat, PresentMode, TextureUsage, TilingMode};
pub use handle::Handle;
pub use pipeline::{
    BlendFactor, BlendState, CompareOp, CullMode, DepthState, FrontFace, GraphicsPipelineState,
    PrimitiveTopology, StepMode, VertexAttribute, VertexBufferLayout, VertexLayout,
};
pub use renderpass::{AttachmentDesc, LayoutKind, LoadOp, RenderPassDesc, StoreOp, SubpassDesc};
pub use rhi::{
    BindGroupDesc, BindingEntry, BindingResource, ClearValue, CommandList, GraphicsPipelineDesc,
    IndexKind, Rhi, VulkanRhi,
};
pub use sampler::{AddressMode, FilterMode, SamplerDesc};
pub use shader::{ShaderStageDesc, ShaderStageKind};
pub use surface::WindowSpec;
pub use texture::{Texture, TextureDesc};
