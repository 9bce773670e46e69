// Logical device and queues
//
// Owns the opened device handle, one queue per distinct family in use, the
// GPU memory allocator, and one command pool per family. Created exactly
// once by the facade on first surface creation.

use std::collections::HashMap;
use std::mem::ManuallyDrop;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

use crate::error::RhiResult;
use crate::physical::{Adapter, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Device features requested at creation. Selection already disqualified
/// adapters that cannot provide them.
fn required_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
        geometry_shader: vk::TRUE,
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    }
}

pub struct Device {
    // Allocator frees its blocks against the device, so it must go first.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    device: ash::Device,
    physical: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pools: HashMap<u32, vk::CommandPool>,
}

impl Device {
    pub fn new(
        instance: &ash::Instance,
        adapter: &Adapter,
        families: QueueFamilyIndices,
    ) -> RhiResult<Self> {
        debug_assert!(families.is_complete());
        let graphics_family = families.graphics.unwrap_or(0);
        let present_family = families.present.unwrap_or(graphics_family);

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();
        let features = required_features();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(adapter.handle, &create_info, None)? };

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: adapter.handle,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        // One pool per distinct family index in use
        let mut command_pools = HashMap::new();
        for family in families.unique() {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let pool = unsafe { device.create_command_pool(&pool_info, None)? };
            command_pools.insert(family, pool);
        }

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            graphics_family,
            present_family
        );

        Ok(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical: adapter.handle,
            graphics_family,
            present_family,
            graphics_queue,
            present_queue,
            command_pools,
        })
    }

    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics: Some(self.graphics_family),
            present: Some(self.present_family),
        }
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn queue(&self, family: u32) -> Option<vk::Queue> {
        if family == self.graphics_family {
            Some(self.graphics_queue)
        } else if family == self.present_family {
            Some(self.present_queue)
        } else {
            None
        }
    }

    pub fn command_pool(&self, family: u32) -> Option<vk::CommandPool> {
        self.command_pools.get(&family).copied()
    }

    /// EXCLUSIVE when graphics and present share a family, CONCURRENT
    /// (with both indices) otherwise. Used for swapchain images, buffers
    /// and textures visible to both queues.
    pub fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.graphics_family == self.present_family {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![self.graphics_family, self.present_family],
            )
        }
    }

    pub fn allocate(&self, desc: &AllocationCreateDesc) -> RhiResult<Allocation> {
        Ok(self.allocator.lock().allocate(desc)?)
    }

    pub fn free(&self, allocation: Allocation) -> RhiResult<()> {
        self.allocator.lock().free(allocation)?;
        Ok(())
    }

    /// Blocks until the GPU has drained all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying logical device");
        let _ = self.wait_idle();

        unsafe {
            // Allocator first: it frees device memory through the handle.
            ManuallyDrop::drop(&mut self.allocator);
            for pool in self.command_pools.values() {
                self.device.destroy_command_pool(*pool, None);
            }
            self.device.destroy_device(None);
        }
    }
}
