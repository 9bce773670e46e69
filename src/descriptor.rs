// Bind layouts and bind groups
//
// A bind layout describes a set of shader-visible resource bindings; a bind
// group is one populated descriptor set matching a layout. Sets come from a
// growable allocator that opens a new fixed-capacity pool when the current
// one runs out, instead of one single-shot pool per group.

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Sets each descriptor pool can serve before a new pool is opened.
const SETS_PER_POOL: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer,
    /// Combined image + sampler.
    SampledTexture,
    StorageTexture,
    Sampler,
}

impl BindingKind {
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            BindingKind::SampledTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            BindingKind::StorageTexture => vk::DescriptorType::STORAGE_IMAGE,
            BindingKind::Sampler => vk::DescriptorType::SAMPLER,
        }
    }
}

/// Which shader stages can see a binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Visibility {
    pub vertex: bool,
    pub fragment: bool,
    pub geometry: bool,
    pub compute: bool,
}

impl Visibility {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        if self.vertex {
            flags |= vk::ShaderStageFlags::VERTEX;
        }
        if self.fragment {
            flags |= vk::ShaderStageFlags::FRAGMENT;
        }
        if self.geometry {
            flags |= vk::ShaderStageFlags::GEOMETRY;
        }
        if self.compute {
            flags |= vk::ShaderStageFlags::COMPUTE;
        }
        flags
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BindingDesc {
    pub slot: u32,
    pub kind: BindingKind,
    pub visibility: Visibility,
}

#[derive(Clone, Debug, Default)]
pub struct BindLayoutDesc {
    pub bindings: Vec<BindingDesc>,
}

pub struct BindLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<BindingDesc>,
}

impl BindLayout {
    pub fn create(device: &Device, desc: &BindLayoutDesc) -> RhiResult<Self> {
        let vk_bindings: Vec<_> = desc
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.slot)
                    .descriptor_type(binding.kind.to_vk())
                    .descriptor_count(1)
                    .stage_flags(binding.visibility.to_vk())
                    .build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("bind layout: {}", e)))?
        };

        Ok(Self {
            layout,
            bindings: desc.bindings.clone(),
        })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn binding(&self, slot: u32) -> Option<&BindingDesc> {
        self.bindings.iter().find(|b| b.slot == slot)
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe {
            device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
        self.layout = vk::DescriptorSetLayout::null();
    }
}

/// Pool list serving descriptor-set allocations. A new pool is opened when
/// the current one is exhausted; all pools are released at teardown.
#[derive(Default)]
pub struct DescriptorAllocator {
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_pool(&mut self, device: &Device) -> RhiResult<vk::DescriptorPool> {
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: SETS_PER_POOL * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: SETS_PER_POOL * 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: SETS_PER_POOL * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: SETS_PER_POOL,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: SETS_PER_POOL,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&sizes);

        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("descriptor pool: {}", e)))?
        };
        log::debug!("Opened descriptor pool #{}", self.pools.len());
        self.pools.push(pool);
        Ok(pool)
    }

    pub fn allocate(
        &mut self,
        device: &Device,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let pool = match self.pools.last() {
            Some(&pool) => pool,
            None => self.open_pool(device)?,
        };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        match unsafe { device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                let pool = self.open_pool(device)?;
                let alloc_info = vk::DescriptorSetAllocateInfo::builder()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts);
                let sets = unsafe { device.handle().allocate_descriptor_sets(&alloc_info)? };
                Ok(sets[0])
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn destroy(&mut self, device: &Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.handle().destroy_descriptor_pool(pool, None) };
        }
    }
}

/// A resource bound into a bind group, already resolved to native handles.
#[derive(Clone, Copy, Debug)]
pub enum BoundResource {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Texture {
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
    StorageTexture {
        view: vk::ImageView,
    },
    Sampler {
        sampler: vk::Sampler,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupEntry {
    pub slot: u32,
    pub resource: BoundResource,
}

pub struct BindGroup {
    set: vk::DescriptorSet,
}

impl BindGroup {
    /// Allocates one descriptor set from `allocator` and writes every entry.
    /// Entry kinds must match the layout's binding kinds slot for slot.
    pub fn create(
        device: &Device,
        allocator: &mut DescriptorAllocator,
        layout: &BindLayout,
        entries: &[BindGroupEntry],
    ) -> RhiResult<Self> {
        let set = allocator.allocate(device, layout.handle())?;

        // The info structs referenced by the writes must outlive the vector.
        let mut buffer_infos = Vec::with_capacity(entries.len());
        let mut image_infos = Vec::with_capacity(entries.len());
        let mut writes = Vec::with_capacity(entries.len());

        for entry in entries {
            let binding = layout.binding(entry.slot).ok_or_else(|| {
                RhiError::Validation(format!("layout has no binding at slot {}", entry.slot))
            })?;

            let write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(entry.slot)
                .descriptor_type(binding.kind.to_vk());

            let write = match (binding.kind, entry.resource) {
                (
                    BindingKind::UniformBuffer | BindingKind::StorageBuffer,
                    BoundResource::Buffer {
                        buffer,
                        offset,
                        range,
                    },
                ) => {
                    buffer_infos.push([vk::DescriptorBufferInfo {
                        buffer,
                        offset,
                        range,
                    }]);
                    write.buffer_info(buffer_infos.last().unwrap())
                }
                (BindingKind::SampledTexture, BoundResource::Texture { view, sampler }) => {
                    image_infos.push([vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }]);
                    write.image_info(image_infos.last().unwrap())
                }
                (BindingKind::StorageTexture, BoundResource::StorageTexture { view }) => {
                    image_infos.push([vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: vk::ImageLayout::GENERAL,
                    }]);
                    write.image_info(image_infos.last().unwrap())
                }
                (BindingKind::Sampler, BoundResource::Sampler { sampler }) => {
                    image_infos.push([vk::DescriptorImageInfo {
                        sampler,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    }]);
                    write.image_info(image_infos.last().unwrap())
                }
                (kind, resource) => {
                    return Err(RhiError::Validation(format!(
                        "binding slot {} expects {:?}, got {:?}",
                        entry.slot, kind, resource
                    )));
                }
            };

            writes.push(write.build());
        }

        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };

        Ok(Self { set })
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_kind_maps_to_descriptor_type() {
        assert_eq!(
            BindingKind::UniformBuffer.to_vk(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            BindingKind::SampledTexture.to_vk(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn visibility_maps_to_stage_flags() {
        let vis = Visibility {
            vertex: true,
            fragment: true,
            ..Default::default()
        };
        assert_eq!(
            vis.to_vk(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(Visibility::default().to_vk(), vk::ShaderStageFlags::empty());
    }
}
