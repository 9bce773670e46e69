// Buffer creation and upload
//
// Buffers go through the device allocator. Write-mapped usage places the
// allocation in host-visible memory so `upload` can map and copy directly.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::BufferUsage;

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

pub struct Buffer {
    raw: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
}

impl Buffer {
    pub fn create(device: &Device, desc: &BufferDesc) -> RhiResult<Self> {
        if desc.size == 0 {
            return Err(RhiError::Validation("buffer size must be non-zero".into()));
        }

        let (sharing_mode, family_indices) = device.sharing();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage.to_vk())
            .sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices);

        let raw = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("buffer: {}", e)))?
        };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(raw) };
        let location = if desc.usage.write_mapped {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let allocation = device.allocate(&AllocationCreateDesc {
            name: "buffer",
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .handle()
                .bind_buffer_memory(raw, allocation.memory(), allocation.offset())?;
        }

        Ok(Self {
            raw,
            allocation: Some(allocation),
            size: desc.size,
            usage: desc.usage,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.raw
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Synchronous CPU write into a write-mapped buffer. Unsafe to call while
    /// the buffer is bound to in-flight GPU work without external
    /// synchronization; the caller owns that ordering.
    pub fn upload(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if !self.usage.write_mapped {
            return Err(RhiError::Validation(
                "upload requires write_mapped buffer usage".into(),
            ));
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| RhiError::Validation("upload range overflows".into()))?;
        if end > self.size {
            return Err(RhiError::Validation(format!(
                "upload of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::Validation("buffer already destroyed".into()))?;
        let mapped = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::Validation("buffer memory is not host-visible".into()))?;

        unsafe {
            let dst = (mapped.as_ptr() as *mut u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        if self.raw != vk::Buffer::null() {
            unsafe { device.handle().destroy_buffer(self.raw, None) };
            self.raw = vk::Buffer::null();
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.free(allocation) {
                log::warn!("Failed to free buffer allocation: {}", e);
            }
        }
    }
}
