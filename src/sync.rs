// Synchronization primitives
//
// Fences (CPU<->GPU) and semaphores (GPU<->GPU) pacing frame submission and
// presentation. Creation failure of either is fatal for the caller: they are
// required every frame and there is no fallback.

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// GPU-only ordering signal between queue operations. Never waited on by
/// the CPU.
pub struct Semaphore {
    raw: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Device) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let raw = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { raw })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.raw
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe { device.handle().destroy_semaphore(self.raw, None) };
        self.raw = vk::Semaphore::null();
    }
}

/// CPU-observable binary completion signal.
pub struct Fence {
    raw: vk::Fence,
}

impl Fence {
    pub fn new(device: &Device, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let raw = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { raw })
    }

    pub fn handle(&self) -> vk::Fence {
        self.raw
    }

    /// Blocks until signaled or the timeout (nanoseconds) expires.
    /// `u64::MAX` waits forever; used at startup and teardown.
    pub fn wait(&self, device: &Device, timeout: u64) -> RhiResult<()> {
        unsafe { device.handle().wait_for_fences(&[self.raw], true, timeout)? };
        Ok(())
    }

    pub fn reset(&self, device: &Device) -> RhiResult<()> {
        unsafe { device.handle().reset_fences(&[self.raw])? };
        Ok(())
    }

    /// Non-blocking poll of the signaled state.
    pub fn is_signaled(&self, device: &Device) -> RhiResult<bool> {
        Ok(unsafe { device.handle().get_fence_status(self.raw)? })
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe { device.handle().destroy_fence(self.raw, None) };
        self.raw = vk::Fence::null();
    }
}

/// The minimal synchronization set for one swapchain image: the
/// image-available semaphore orders acquire before the first command
/// touching the image, the render-finished semaphore orders rendering
/// before present, and the fence lets the CPU reuse the image's command
/// buffer only after the GPU is done with it.
pub struct FrameSync {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &Device) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            // Signaled so the first wait on each frame slot passes.
            in_flight: Fence::new(device, true)?,
        })
    }

    pub fn destroy(&mut self, device: &Device) {
        self.image_available.destroy(device);
        self.render_finished.destroy(device);
        self.in_flight.destroy(device);
    }
}
