// Format and capability tables
//
// Maps the abstract pixel formats, color spaces, present modes and usage
// flags of the public API onto native Vulkan enums and back. Unknown native
// values round-trip to the Unknown sentinel instead of panicking.

use ash::vk;

/// Abstract pixel format. Covers the formats the RHI negotiates for surfaces
/// plus the common texture/vertex formats the resource factory accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Unknown,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgb10A2Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    D16Unorm,
    D24UnormS8,
    D32Float,
}

impl PixelFormat {
    pub fn to_vk(self) -> vk::Format {
        match self {
            PixelFormat::Unknown => vk::Format::UNDEFINED,
            PixelFormat::R8Unorm => vk::Format::R8_UNORM,
            PixelFormat::Rg8Unorm => vk::Format::R8G8_UNORM,
            PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            PixelFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            PixelFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            PixelFormat::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
            PixelFormat::R16Float => vk::Format::R16_SFLOAT,
            PixelFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
            PixelFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            PixelFormat::R32Float => vk::Format::R32_SFLOAT,
            PixelFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
            PixelFormat::Rgb32Float => vk::Format::R32G32B32_SFLOAT,
            PixelFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            PixelFormat::D16Unorm => vk::Format::D16_UNORM,
            PixelFormat::D24UnormS8 => vk::Format::D24_UNORM_S8_UINT,
            PixelFormat::D32Float => vk::Format::D32_SFLOAT,
        }
    }

    pub fn from_vk(format: vk::Format) -> Self {
        match format {
            vk::Format::R8_UNORM => PixelFormat::R8Unorm,
            vk::Format::R8G8_UNORM => PixelFormat::Rg8Unorm,
            vk::Format::R8G8B8A8_UNORM => PixelFormat::Rgba8Unorm,
            vk::Format::R8G8B8A8_SRGB => PixelFormat::Rgba8Srgb,
            vk::Format::B8G8R8A8_UNORM => PixelFormat::Bgra8Unorm,
            vk::Format::B8G8R8A8_SRGB => PixelFormat::Bgra8Srgb,
            vk::Format::A2B10G10R10_UNORM_PACK32 => PixelFormat::Rgb10A2Unorm,
            vk::Format::R16_SFLOAT => PixelFormat::R16Float,
            vk::Format::R16G16_SFLOAT => PixelFormat::Rg16Float,
            vk::Format::R16G16B16A16_SFLOAT => PixelFormat::Rgba16Float,
            vk::Format::R32_SFLOAT => PixelFormat::R32Float,
            vk::Format::R32G32_SFLOAT => PixelFormat::Rg32Float,
            vk::Format::R32G32B32_SFLOAT => PixelFormat::Rgb32Float,
            vk::Format::R32G32B32A32_SFLOAT => PixelFormat::Rgba32Float,
            vk::Format::D16_UNORM => PixelFormat::D16Unorm,
            vk::Format::D24_UNORM_S8_UINT => PixelFormat::D24UnormS8,
            vk::Format::D32_SFLOAT => PixelFormat::D32Float,
            _ => PixelFormat::Unknown,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::D16Unorm | PixelFormat::D24UnormS8 | PixelFormat::D32Float
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::D24UnormS8)
    }

    /// Image aspect implied by the format.
    pub fn aspect_mask(self) -> vk::ImageAspectFlags {
        if self.is_depth() {
            if self.has_stencil() {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    pub const ALL: [PixelFormat; 17] = [
        PixelFormat::R8Unorm,
        PixelFormat::Rg8Unorm,
        PixelFormat::Rgba8Unorm,
        PixelFormat::Rgba8Srgb,
        PixelFormat::Bgra8Unorm,
        PixelFormat::Bgra8Srgb,
        PixelFormat::Rgb10A2Unorm,
        PixelFormat::R16Float,
        PixelFormat::Rg16Float,
        PixelFormat::Rgba16Float,
        PixelFormat::R32Float,
        PixelFormat::Rg32Float,
        PixelFormat::Rgb32Float,
        PixelFormat::Rgba32Float,
        PixelFormat::D16Unorm,
        PixelFormat::D24UnormS8,
        PixelFormat::D32Float,
    ];
}

/// Abstract color space for surface formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Unknown,
    SrgbNonlinear,
    ExtendedSrgbLinear,
    Hdr10St2084,
    DisplayP3Nonlinear,
}

impl ColorSpace {
    pub fn to_vk(self) -> vk::ColorSpaceKHR {
        match self {
            // No UNDEFINED color space exists in Vulkan; Unknown maps to the
            // always-available default.
            ColorSpace::Unknown | ColorSpace::SrgbNonlinear => {
                vk::ColorSpaceKHR::SRGB_NONLINEAR
            }
            ColorSpace::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            ColorSpace::DisplayP3Nonlinear => vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        }
    }

    pub fn from_vk(space: vk::ColorSpaceKHR) -> Self {
        match space {
            vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => ColorSpace::ExtendedSrgbLinear,
            vk::ColorSpaceKHR::HDR10_ST2084_EXT => ColorSpace::Hdr10St2084,
            vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT => ColorSpace::DisplayP3Nonlinear,
            _ => ColorSpace::Unknown,
        }
    }

    pub const ALL: [ColorSpace; 4] = [
        ColorSpace::SrgbNonlinear,
        ColorSpace::ExtendedSrgbLinear,
        ColorSpace::Hdr10St2084,
        ColorSpace::DisplayP3Nonlinear,
    ];
}

/// Presentation mode requested by the windowing collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl PresentMode {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// How a texture will be used. A plain flag set instead of native bitflags so
/// descriptions stay API-agnostic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureUsage {
    pub render_target: bool,
    pub depth_stencil: bool,
    pub sampled: bool,
    pub storage: bool,
    pub transfer_src: bool,
    pub transfer_dst: bool,
}

impl TextureUsage {
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        let mut flags = vk::ImageUsageFlags::empty();
        if self.render_target {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.depth_stencil {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.sampled {
            flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.storage {
            flags |= vk::ImageUsageFlags::STORAGE;
        }
        if self.transfer_src {
            flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if self.transfer_dst {
            flags |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        flags
    }

    /// Aspect derived from usage: depth/stencil attachment usage wins over
    /// the color default.
    pub fn aspect_mask(self, format: PixelFormat) -> vk::ImageAspectFlags {
        if self.depth_stencil || format.is_depth() {
            format.aspect_mask()
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }
}

/// How a buffer will be used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferUsage {
    pub vertex: bool,
    pub index: bool,
    pub uniform: bool,
    pub storage: bool,
    pub transfer_src: bool,
    pub transfer_dst: bool,
    /// Buffer contents will be written from the CPU via `upload`.
    pub write_mapped: bool,
}

impl BufferUsage {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if self.vertex {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if self.index {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if self.uniform {
            flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if self.storage {
            flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if self.transfer_src {
            flags |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if self.transfer_dst {
            flags |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        flags
    }
}

/// Image tiling mode for texture creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TilingMode {
    #[default]
    Optimal,
    Linear,
}

impl TilingMode {
    pub fn to_vk(self) -> vk::ImageTiling {
        match self {
            TilingMode::Optimal => vk::ImageTiling::OPTIMAL,
            TilingMode::Linear => vk::ImageTiling::LINEAR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_vk(format.to_vk()), format);
        }
    }

    #[test]
    fn unknown_native_format_maps_to_sentinel() {
        assert_eq!(
            PixelFormat::from_vk(vk::Format::ASTC_10X10_SRGB_BLOCK),
            PixelFormat::Unknown
        );
        assert_eq!(PixelFormat::from_vk(vk::Format::UNDEFINED), PixelFormat::Unknown);
    }

    #[test]
    fn color_space_round_trip() {
        for space in ColorSpace::ALL {
            assert_eq!(ColorSpace::from_vk(space.to_vk()), space);
        }
    }

    #[test]
    fn unknown_native_color_space_maps_to_sentinel() {
        assert_eq!(
            ColorSpace::from_vk(vk::ColorSpaceKHR::DOLBYVISION_EXT),
            ColorSpace::Unknown
        );
    }

    #[test]
    fn depth_formats_report_depth_aspect() {
        assert_eq!(
            PixelFormat::D32Float.aspect_mask(),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            PixelFormat::D24UnormS8.aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            PixelFormat::Bgra8Srgb.aspect_mask(),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn usage_flags_map_to_native() {
        let usage = TextureUsage {
            render_target: true,
            transfer_dst: true,
            ..Default::default()
        };
        assert_eq!(
            usage.to_vk(),
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
        );

        let usage = BufferUsage {
            vertex: true,
            transfer_dst: true,
            ..Default::default()
        };
        assert_eq!(
            usage.to_vk(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
    }
}
