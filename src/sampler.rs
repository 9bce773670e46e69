// Sampler creation

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

impl FilterMode {
    pub fn to_vk(self) -> vk::Filter {
        match self {
            FilterMode::Linear => vk::Filter::LINEAR,
            FilterMode::Nearest => vk::Filter::NEAREST,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

impl AddressMode {
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    /// 0.0 disables anisotropic filtering.
    pub max_anisotropy: f32,
}

pub struct Sampler {
    raw: vk::Sampler,
}

impl Sampler {
    pub fn create(device: &Device, desc: &SamplerDesc) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .min_filter(desc.min_filter.to_vk())
            .mag_filter(desc.mag_filter.to_vk())
            .address_mode_u(desc.address_u.to_vk())
            .address_mode_v(desc.address_v.to_vk())
            .address_mode_w(desc.address_w.to_vk())
            .anisotropy_enable(desc.max_anisotropy > 0.0)
            .max_anisotropy(desc.max_anisotropy.max(1.0))
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let raw = unsafe {
            device
                .handle()
                .create_sampler(&create_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("sampler: {}", e)))?
        };
        Ok(Self { raw })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.raw
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe { device.handle().destroy_sampler(self.raw, None) };
        self.raw = vk::Sampler::null();
    }
}
