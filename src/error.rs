// Error taxonomy for the RHI
//
// Startup failures (instance/device/allocator/pool) are fatal for the caller,
// staleness is recoverable via swapchain recreation, everything else surfaces
// as a typed result instead of being logged and swallowed.

use ash::vk;
use thiserror::Error;

use crate::format::{ColorSpace, PixelFormat};

#[derive(Debug, Error)]
pub enum RhiError {
    /// Raw Vulkan API failure.
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader/library could not be opened.
    #[error("failed to load vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU memory allocation failure.
    #[error("gpu allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    /// No adapter scored above zero during device selection.
    #[error("no suitable gpu adapter found")]
    NoSuitableGpu,

    /// The surface reported out-of-date during acquire or present.
    /// Recoverable: the owning present context recreates its swapchain.
    #[error("swapchain is stale and must be recreated")]
    SwapchainStale,

    /// A requested surface format/colorspace pair is not in the surface's
    /// supported list.
    #[error("surface does not support {format:?} with {color_space:?}")]
    UnsupportedSurfaceFormat {
        format: PixelFormat,
        color_space: ColorSpace,
    },

    /// Buffer/texture/pipeline/etc. creation failed.
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// A description value failed validation before any native call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A generation-checked handle no longer names a live resource.
    #[error("stale {0} handle")]
    StaleHandle(&'static str),
}

impl RhiError {
    /// True for failures that are recovered locally by swapchain recreation.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            RhiError::SwapchainStale | RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)
        )
    }
}

pub type RhiResult<T> = Result<T, RhiError>;
