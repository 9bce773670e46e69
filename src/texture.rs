// Texture creation
//
// Images plus their default views, allocated through the device allocator.
// Swapchain images get non-owning wrappers: the view belongs to the wrapper,
// the image memory belongs to the swapchain.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::{PixelFormat, TextureUsage, TilingMode};

#[derive(Clone, Copy, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
    pub tiling: TilingMode,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            mip_levels: 1,
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsage::default(),
            tiling: TilingMode::Optimal,
        }
    }
}

pub struct Texture {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<gpu_allocator::vulkan::Allocation>,
    format: PixelFormat,
    extent: vk::Extent2D,
    owns_image: bool,
}

impl Texture {
    pub fn create(device: &Device, desc: &TextureDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::Validation("texture extent must be non-zero".into()));
        }
        if desc.format == PixelFormat::Unknown {
            return Err(RhiError::Validation("texture format must be known".into()));
        }

        // Queue-sharing mode follows whether graphics and present differ.
        let (sharing_mode, family_indices) = device.sharing();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(1)
            .format(desc.format.to_vk())
            .tiling(desc.tiling.to_vk())
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage.to_vk())
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices);

        let image = unsafe {
            device
                .handle()
                .create_image(&image_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("image: {}", e)))?
        };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let allocation = device.allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: desc.tiling == TilingMode::Linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view = create_view(device, image, desc.format, desc.usage, desc.mip_levels.max(1))?;

        Ok(Self {
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            owns_image: true,
        })
    }

    /// Wraps a swapchain-owned image. The wrapper owns only the view.
    pub fn from_swapchain_image(
        device: &Device,
        image: vk::Image,
        format: PixelFormat,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let usage = TextureUsage {
            render_target: true,
            ..Default::default()
        };
        let view = create_view(device, image, format, usage, 1)?;
        Ok(Self {
            image,
            view,
            allocation: None,
            format,
            extent,
            owns_image: false,
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe { device.handle().destroy_image_view(self.view, None) };
        self.view = vk::ImageView::null();
        if self.owns_image {
            unsafe { device.handle().destroy_image(self.image, None) };
            self.image = vk::Image::null();
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.free(allocation) {
                log::warn!("Failed to free texture allocation: {}", e);
            }
        }
    }
}

fn create_view(
    device: &Device,
    image: vk::Image,
    format: PixelFormat,
    usage: TextureUsage,
    mip_levels: u32,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format.to_vk())
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: usage.aspect_mask(format),
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .handle()
            .create_image_view(&create_info, None)
            .map_err(|e| RhiError::ResourceCreation(format!("image view: {}", e)))
    }
}
