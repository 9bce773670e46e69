// Present context - per-window frame orchestrator
//
// Aggregates one surface, one swapchain, and per-image command buffers and
// sync objects, and drives the acquire -> submit -> present cycle including
// in-place swapchain recreation when the surface goes stale.

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical::{AdapterRegistry, QueueFamilyIndices};
use crate::surface::Surface;
use crate::swapchain::{ImageAcquire, Swapchain, SwapchainDesc};
use crate::sync::FrameSync;

/// Outcome of `acquire_backbuffer`. A skipped frame means the swapchain was
/// stale and has been recreated; the caller records and submits nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    Render {
        image_index: u32,
        command_buffer: vk::CommandBuffer,
    },
    Skipped,
}

/// Pure frame-pacing state: which sync slot the cycle is on and which image
/// is currently acquired. Kept free of Vulkan calls so the ordering
/// invariants are testable without a GPU.
#[derive(Debug)]
pub(crate) struct FramePacer {
    current: usize,
    image_count: usize,
    acquired: Option<u32>,
}

impl FramePacer {
    pub fn new(image_count: usize) -> Self {
        debug_assert!(image_count > 0);
        Self {
            current: 0,
            image_count,
            acquired: None,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn image_count(&self) -> usize {
        self.image_count
    }

    pub fn note_acquired(&mut self, index: u32) {
        self.acquired = Some(index);
    }

    pub fn acquired(&self) -> Option<u32> {
        self.acquired
    }

    /// Advances to the next sync slot after a successful present. The index
    /// always stays in range.
    pub fn advance(&mut self) {
        self.acquired = None;
        self.current = (self.current + 1) % self.image_count;
    }

    /// Drops any acquired image without advancing; used when a frame is
    /// skipped for recreation.
    pub fn abort_frame(&mut self) {
        self.acquired = None;
    }

    /// Rebinds the pacer to a rebuilt ring.
    pub fn reset(&mut self, image_count: usize) {
        debug_assert!(image_count > 0);
        self.current = 0;
        self.image_count = image_count;
        self.acquired = None;
    }
}

pub struct PresentContext {
    surface: Surface,
    swapchain: Swapchain,
    command_buffers: Vec<vk::CommandBuffer>,
    frames: Vec<FrameSync>,
    pacer: FramePacer,
    desc: SwapchainDesc,
    adapter_index: usize,
    /// Family whose pool the command buffers were allocated from.
    command_family: u32,
    /// Set when present reports suboptimal; recreation happens before the
    /// next acquire instead of mid-frame.
    pending_recreate: bool,
    /// Set by every `recreate_swapchain`; drained by the facade so caches
    /// keyed by the old backbuffer views can be flushed.
    recreated: bool,
}

impl PresentContext {
    /// Builds the full per-window aggregate. Surface support for the surface
    /// must already be cached in the registry.
    pub fn new(
        instance: &ash::Instance,
        device: &Device,
        registry: &AdapterRegistry,
        adapter_index: usize,
        surface: Surface,
        desc: SwapchainDesc,
    ) -> RhiResult<Self> {
        let support = registry
            .surface_support(surface.handle())
            .ok_or_else(|| RhiError::Validation("surface support not queried".into()))?;

        let swapchain = Swapchain::create(instance, device, &surface, support, &desc)?;
        let image_count = swapchain.image_count();

        let command_family = command_family_for(&device.family_indices())?;
        let command_buffers = allocate_command_buffers(device, command_family, image_count)?;
        let frames = create_frame_syncs(device, image_count)?;

        Ok(Self {
            surface,
            swapchain,
            command_buffers,
            frames,
            pacer: FramePacer::new(image_count),
            desc,
            adapter_index,
            command_family,
            pending_recreate: false,
            recreated: false,
        })
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn current_frame(&self) -> usize {
        self.pacer.current_frame()
    }

    pub fn acquired_image(&self) -> Option<u32> {
        self.pacer.acquired()
    }

    /// Reports and clears whether the swapchain was recreated since the last
    /// call, whichever path triggered it. The old image views are gone.
    pub fn take_recreated(&mut self) -> bool {
        std::mem::take(&mut self.recreated)
    }

    /// Poll-based resize input: the windowing layer reports the latest size,
    /// used by the next recreation.
    pub fn set_window_extent(&mut self, width: u32, height: u32) {
        self.desc.width = width;
        self.desc.height = height;
    }

    /// Step 1 of the frame cycle. Waits on the current slot's render fence,
    /// acquires the next image signaling that slot's image-available
    /// semaphore, and recreates + skips the frame on staleness.
    pub fn acquire_backbuffer(
        &mut self,
        instance: &ash::Instance,
        device: &Device,
        registry: &mut AdapterRegistry,
        timeout: u64,
    ) -> RhiResult<FrameStep> {
        if self.pending_recreate {
            self.recreate_swapchain(instance, device, registry)?;
            self.pending_recreate = false;
        }

        let frame = self.pacer.current_frame();
        self.frames[frame].in_flight.wait(device, timeout)?;

        let acquire = self
            .swapchain
            .acquire_next_image(timeout, self.frames[frame].image_available.handle())?;

        match acquire {
            ImageAcquire::Acquired { index, suboptimal } => {
                // Reset only after a successful acquire: a skipped frame
                // must leave the fence signaled for the next wait.
                self.frames[frame].in_flight.reset(device)?;
                if suboptimal {
                    self.pending_recreate = true;
                }
                self.pacer.note_acquired(index);
                Ok(FrameStep::Render {
                    image_index: index,
                    command_buffer: self.command_buffers[index as usize],
                })
            }
            ImageAcquire::Stale => {
                log::debug!("Acquire reported stale swapchain, recreating");
                self.recreate_swapchain(instance, device, registry)?;
                self.pacer.abort_frame();
                Ok(FrameStep::Skipped)
            }
        }
    }

    /// Step 3: submits the acquired image's command buffer, waiting on the
    /// image-available semaphore at `wait_stage` and signaling the
    /// render-finished semaphore plus the render fence.
    pub fn submit_render(
        &mut self,
        device: &Device,
        wait_stage: vk::PipelineStageFlags,
    ) -> RhiResult<()> {
        let image_index = self
            .pacer
            .acquired()
            .ok_or_else(|| RhiError::Validation("submit without an acquired image".into()))?;
        let frame = self.pacer.current_frame();
        let sync = &self.frames[frame];

        let wait_semaphores = [sync.image_available.handle()];
        let signal_semaphores = [sync.render_finished.handle()];
        let wait_stages = [wait_stage];
        let command_buffers = [self.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.handle().queue_submit(
                device.graphics_queue(),
                &[submit_info.build()],
                sync.in_flight.handle(),
            )?;
        }
        Ok(())
    }

    /// Step 4: presents the acquired image, recreating on staleness,
    /// otherwise advancing the frame index modulo the image count.
    pub fn present(
        &mut self,
        instance: &ash::Instance,
        device: &Device,
        registry: &mut AdapterRegistry,
    ) -> RhiResult<()> {
        let image_index = self
            .pacer
            .acquired()
            .ok_or_else(|| RhiError::Validation("present without an acquired image".into()))?;
        let frame = self.pacer.current_frame();
        let wait = [self.frames[frame].render_finished.handle()];

        let stale = self
            .swapchain
            .present(device.present_queue(), image_index, &wait)?;

        if stale {
            log::debug!("Present reported stale swapchain, recreating");
            self.recreate_swapchain(instance, device, registry)?;
            self.pacer.abort_frame();
        } else {
            self.pacer.advance();
        }
        Ok(())
    }

    /// Recreates the swapchain in place: waits until no GPU work references
    /// the old images, destroys them, refreshes the cached surface
    /// capabilities, and creates a new swapchain with the current window
    /// parameters. Sync objects survive; the command ring is rebuilt only
    /// if the negotiated image count changed.
    pub fn recreate_swapchain(
        &mut self,
        instance: &ash::Instance,
        device: &Device,
        registry: &mut AdapterRegistry,
    ) -> RhiResult<()> {
        self.wait_all_frames(device)?;
        self.swapchain.cleanup(device);

        let support = registry.update_surface_support(
            self.adapter_index,
            self.surface.handle(),
            self.surface.loader(),
        )?;

        self.swapchain = Swapchain::create(instance, device, &self.surface, support, &self.desc)?;

        let new_count = self.swapchain.image_count();
        if new_count != self.pacer.image_count() {
            log::warn!(
                "Swapchain image count changed {} -> {}, rebuilding frame ring",
                self.pacer.image_count(),
                new_count
            );
            self.rebuild_frame_ring(device, new_count)?;
        }
        self.recreated = true;
        Ok(())
    }

    fn rebuild_frame_ring(&mut self, device: &Device, image_count: usize) -> RhiResult<()> {
        if let Some(pool) = device.command_pool(self.command_family) {
            unsafe {
                device
                    .handle()
                    .free_command_buffers(pool, &self.command_buffers)
            };
        }
        for frame in &mut self.frames {
            frame.destroy(device);
        }
        self.command_buffers = allocate_command_buffers(device, self.command_family, image_count)?;
        self.frames = create_frame_syncs(device, image_count)?;
        self.pacer.reset(image_count);
        Ok(())
    }

    /// Waits on every per-image render fence. No GPU work may still read the
    /// old images once this returns.
    fn wait_all_frames(&self, device: &Device) -> RhiResult<()> {
        let fences: Vec<_> = self.frames.iter().map(|f| f.in_flight.handle()).collect();
        if !fences.is_empty() {
            unsafe {
                device.handle().wait_for_fences(&fences, true, u64::MAX)?;
            }
        }
        Ok(())
    }

    /// Full teardown: idle the per-image work, release the command ring and
    /// sync objects, destroy the swapchain, then the surface.
    pub fn destroy(&mut self, device: &Device, registry: &mut AdapterRegistry) {
        if let Err(e) = self.wait_all_frames(device) {
            log::warn!("Fence wait during teardown failed: {}", e);
        }
        if let Some(pool) = device.command_pool(self.command_family) {
            unsafe {
                device
                    .handle()
                    .free_command_buffers(pool, &self.command_buffers)
            };
        }
        self.command_buffers.clear();
        for frame in &mut self.frames {
            frame.destroy(device);
        }
        self.frames.clear();
        self.swapchain.cleanup(device);
        registry.forget_surface(self.surface.handle());
        self.surface.destroy();
    }
}

/// Command buffers record render passes and go to the graphics queue in
/// `submit_render`, so the ring must come from the graphics family's pool
/// even when presentation lives on another family.
fn command_family_for(families: &QueueFamilyIndices) -> RhiResult<u32> {
    families
        .graphics
        .ok_or_else(|| RhiError::Validation("device has no graphics family".into()))
}

fn allocate_command_buffers(
    device: &Device,
    family: u32,
    count: usize,
) -> RhiResult<Vec<vk::CommandBuffer>> {
    let pool = device
        .command_pool(family)
        .ok_or_else(|| RhiError::Validation(format!("no command pool for family {}", family)))?;

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    let buffers = unsafe { device.handle().allocate_command_buffers(&alloc_info)? };
    log::debug!("Allocated {} command buffers (family {})", count, family);
    Ok(buffers)
}

fn create_frame_syncs(device: &Device, count: usize) -> RhiResult<Vec<FrameSync>> {
    (0..count).map(|_| FrameSync::new(device)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swapchain::ImageAcquire;

    /// Mirror of the acquire/present decision logic, driven by synthetic
    /// swapchain outcomes so the cycle is testable without a device.
    struct CycleSim {
        pacer: FramePacer,
        pending_recreate: bool,
        recreations: u32,
        submissions: u32,
        presents: u32,
        cache_flushes: u32,
    }

    impl CycleSim {
        fn new(image_count: usize) -> Self {
            Self {
                pacer: FramePacer::new(image_count),
                pending_recreate: false,
                recreations: 0,
                submissions: 0,
                presents: 0,
                cache_flushes: 0,
            }
        }

        fn frame(&mut self, acquire: ImageAcquire, present_stale: bool) {
            let mut recreated = false;
            if self.pending_recreate {
                self.pending_recreate = false;
                self.recreations += 1;
                recreated = true;
            }
            match acquire {
                ImageAcquire::Acquired { index, suboptimal } => {
                    if suboptimal {
                        self.pending_recreate = true;
                    }
                    self.pacer.note_acquired(index);
                    self.submissions += 1;
                    self.presents += 1;
                    if present_stale {
                        self.recreations += 1;
                        recreated = true;
                        self.pacer.abort_frame();
                    } else {
                        self.pacer.advance();
                    }
                }
                ImageAcquire::Stale => {
                    self.recreations += 1;
                    recreated = true;
                    self.pacer.abort_frame();
                }
            }
            // Any recreation in the frame invalidates framebuffers cached
            // over the old backbuffer views.
            if recreated {
                self.cache_flushes += 1;
            }
        }
    }

    fn acquired(index: u32) -> ImageAcquire {
        ImageAcquire::Acquired {
            index,
            suboptimal: false,
        }
    }

    fn suboptimal(index: u32) -> ImageAcquire {
        ImageAcquire::Acquired {
            index,
            suboptimal: true,
        }
    }

    #[test]
    fn frame_index_advances_modulo_image_count() {
        let mut pacer = FramePacer::new(3);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(pacer.current_frame());
            pacer.note_acquired(0);
            pacer.advance();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(pacer.current_frame() < pacer.image_count());
    }

    #[test]
    fn double_buffered_presents_alternate() {
        // 800x600, bufferCount=2 scenario: after each present the frame
        // index alternates 1, 0, 1, ...
        let mut sim = CycleSim::new(2);
        sim.frame(acquired(0), false);
        assert_eq!(sim.pacer.current_frame(), 1);
        sim.frame(acquired(1), false);
        assert_eq!(sim.pacer.current_frame(), 0);
        sim.frame(acquired(0), false);
        assert_eq!(sim.pacer.current_frame(), 1);
        assert_eq!(sim.presents, 3);
        assert_eq!(sim.recreations, 0);
    }

    #[test]
    fn stale_acquire_recreates_once_and_skips_submission() {
        let mut sim = CycleSim::new(2);
        sim.frame(ImageAcquire::Stale, false);
        assert_eq!(sim.recreations, 1);
        assert_eq!(sim.submissions, 0);
        assert_eq!(sim.presents, 0);
        // Frame index is untouched by a skipped frame.
        assert_eq!(sim.pacer.current_frame(), 0);
        assert_eq!(sim.pacer.acquired(), None);

        // The next frame proceeds normally.
        sim.frame(acquired(0), false);
        assert_eq!(sim.recreations, 1);
        assert_eq!(sim.submissions, 1);
    }

    #[test]
    fn stale_present_recreates_without_advancing() {
        let mut sim = CycleSim::new(2);
        sim.frame(acquired(0), true);
        assert_eq!(sim.recreations, 1);
        assert_eq!(sim.pacer.current_frame(), 0);
        assert_eq!(sim.pacer.acquired(), None);
    }

    #[test]
    fn every_recreation_path_flushes_caches() {
        let mut sim = CycleSim::new(2);

        // Stale acquire.
        sim.frame(ImageAcquire::Stale, false);
        assert_eq!(sim.cache_flushes, 1);

        // Stale present.
        sim.frame(acquired(0), true);
        assert_eq!(sim.cache_flushes, 2);

        // Suboptimal acquire defers recreation to the next frame; the flush
        // lands there even though that frame goes on to render.
        sim.frame(suboptimal(0), false);
        assert_eq!(sim.cache_flushes, 2);
        sim.frame(acquired(1), false);
        assert_eq!(sim.cache_flushes, 3);
        assert_eq!(sim.recreations, 3);
    }

    #[test]
    fn command_ring_comes_from_the_graphics_family() {
        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert_eq!(command_family_for(&split).unwrap(), 0);
        assert!(command_family_for(&QueueFamilyIndices::default()).is_err());
    }

    #[test]
    fn reset_rebinds_to_new_ring() {
        let mut pacer = FramePacer::new(2);
        pacer.note_acquired(1);
        pacer.advance();
        assert_eq!(pacer.current_frame(), 1);

        pacer.reset(3);
        assert_eq!(pacer.current_frame(), 0);
        assert_eq!(pacer.image_count(), 3);
        assert_eq!(pacer.acquired(), None);
    }
}
