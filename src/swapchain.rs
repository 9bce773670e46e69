// Swapchain - window presentation
//
// Owns the ring of presentable images for one window. Recreated in place by
// the present context whenever acquire or present reports staleness; cleanup
// never touches the surface.

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::{ColorSpace, PixelFormat, PresentMode};
use crate::physical::SurfaceSupport;
use crate::surface::Surface;
use crate::texture::Texture;

/// Parameters for swapchain creation. Extent and image count are desires;
/// both are clamped against the surface capabilities.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_space: ColorSpace,
    pub image_count: u32,
    pub present_mode: PresentMode,
}

/// Result of an acquire call. Staleness is not fatal; it tells the caller
/// to recreate and retry next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageAcquire {
    Acquired { index: u32, suboptimal: bool },
    Stale,
}

pub struct Swapchain {
    loader: ash::extensions::khr::Swapchain,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    /// Non-owning view wrappers, one per image. The swapchain owns the
    /// image memory.
    wrappers: Vec<Texture>,
    format: PixelFormat,
    color_space: ColorSpace,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn create(
        instance: &ash::Instance,
        device: &Device,
        surface: &Surface,
        support: &SurfaceSupport,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self> {
        // The desired format/colorspace pair must be in the supported list.
        if !support.formats.iter().any(|f| {
            PixelFormat::from_vk(f.format) == desc.format
                && ColorSpace::from_vk(f.color_space) == desc.color_space
        }) {
            log::warn!(
                "Surface rejects {:?}/{:?}; supported: {:?}",
                desc.format,
                desc.color_space,
                support.formats
            );
            return Err(RhiError::UnsupportedSurfaceFormat {
                format: desc.format,
                color_space: desc.color_space,
            });
        }

        let extent = clamp_extent(desc.width, desc.height, &support.capabilities);
        let image_count = clamp_image_count(desc.image_count, &support.capabilities);
        let present_mode = choose_present_mode(desc.present_mode, &support.present_modes);

        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {} images, {:?}",
            extent.width,
            extent.height,
            desc.format,
            desc.color_space,
            image_count,
            present_mode
        );

        let (sharing_mode, family_indices) = device.sharing();

        let loader = ash::extensions::khr::Swapchain::new(instance, device.handle());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(desc.format.to_vk())
            .image_color_space(desc.color_space.to_vk())
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode.to_vk())
            .clipped(true);

        let handle = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(handle)? };

        log::info!("Swapchain holds {} images", images.len());

        let mut wrappers = Vec::with_capacity(images.len());
        for &image in &images {
            wrappers.push(Texture::from_swapchain_image(
                device,
                image,
                desc.format,
                extent,
            )?);
        }

        Ok(Self {
            loader,
            handle,
            images,
            wrappers,
            format: desc.format,
            color_space: desc.color_space,
            extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    pub fn wrapper(&self, index: u32) -> &Texture {
        &self.wrappers[index as usize]
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire next image for rendering; signals `semaphore` when the image
    /// is actually available.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RhiResult<ImageAcquire> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(ImageAcquire::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ImageAcquire::Stale),
            Err(e) => Err(e.into()),
        }
    }

    /// Present `image_index` on `queue` after `wait_semaphores`. Returns
    /// true when the swapchain has gone stale and must be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> RhiResult<bool> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Destroys the per-image wrappers and the native handle. The surface is
    /// untouched; recreation reuses it.
    pub fn cleanup(&mut self, device: &Device) {
        for wrapper in &mut self.wrappers {
            wrapper.destroy(device);
        }
        self.wrappers.clear();
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

/// Clamps the desired extent into the surface's supported range. When the
/// surface pins `current_extent` (width != u32::MAX) that value wins.
pub(crate) fn clamp_extent(
    width: u32,
    height: u32,
    caps: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Clamps the requested image count into [min, max]. max == 0 means
/// unbounded above.
pub(crate) fn clamp_image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// The requested mode when the surface offers it, FIFO otherwise (FIFO is
/// always available).
pub(crate) fn choose_present_mode(
    requested: PresentMode,
    available: &[vk::PresentModeKHR],
) -> PresentMode {
    if available.contains(&requested.to_vk()) {
        requested
    } else {
        log::warn!("{:?} not supported by surface, falling back to FIFO", requested);
        PresentMode::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: (u32, u32), max: (u32, u32), counts: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            // u32::MAX means the surface lets the swapchain pick.
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_count: counts.0,
            max_image_count: counts.1,
            ..Default::default()
        }
    }

    #[test]
    fn zero_extent_clamps_to_minimum() {
        let caps = caps((1, 1), (4096, 4096), (2, 8));
        let extent = clamp_extent(0, 0, &caps);
        assert_eq!((extent.width, extent.height), (1, 1));
    }

    #[test]
    fn oversized_extent_clamps_to_maximum() {
        let caps = caps((1, 1), (4096, 2160), (2, 8));
        let extent = clamp_extent(100_000, 100_000, &caps);
        assert_eq!((extent.width, extent.height), (4096, 2160));
    }

    #[test]
    fn in_range_extent_is_preserved() {
        let caps = caps((1, 1), (4096, 4096), (2, 8));
        let extent = clamp_extent(800, 600, &caps);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn fixed_current_extent_wins() {
        let mut caps = caps((1, 1), (4096, 4096), (2, 8));
        caps.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let extent = clamp_extent(800, 600, &caps);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn image_count_clamps_both_ways() {
        let caps = caps((1, 1), (4096, 4096), (2, 4));
        assert_eq!(clamp_image_count(1, &caps), 2);
        assert_eq!(clamp_image_count(3, &caps), 3);
        assert_eq!(clamp_image_count(9, &caps), 4);
    }

    #[test]
    fn unbounded_max_image_count() {
        let caps = caps((1, 1), (4096, 4096), (2, 0));
        assert_eq!(clamp_image_count(16, &caps), 16);
    }

    #[test]
    fn unchanged_size_negotiates_identically() {
        // Recreate idempotence at the negotiation level: same inputs, same
        // clamped outputs.
        let caps = caps((1, 1), (4096, 4096), (2, 8));
        let a = (clamp_extent(800, 600, &caps), clamp_image_count(2, &caps));
        let b = (clamp_extent(800, 600, &caps), clamp_image_count(2, &caps));
        assert_eq!((a.0.width, a.0.height, a.1), (b.0.width, b.0.height, b.1));
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let _ = env_logger::builder().is_test(true).try_init();
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(PresentMode::Mailbox, &available),
            PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(PresentMode::Immediate, &available),
            PresentMode::Fifo
        );
    }
}
