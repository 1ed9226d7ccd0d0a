// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// One set per frame in flight

use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::{EngineError, EngineResult};

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> EngineResult<Self> {
        // Null handles are skipped by the destroy calls, so a partial set drops cleanly
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device,
        };

        sync.image_available = sync.create_semaphore()?;
        sync.render_finished = sync.create_semaphore()?;

        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        sync.in_flight_fence = unsafe { sync.device.device.create_fence(&fence_info, None) }
            .map_err(EngineError::creation("in-flight fence"))?;

        Ok(sync)
    }

    fn create_semaphore(&self) -> EngineResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.device.create_semaphore(&semaphore_info, None) }
            .map_err(EngineError::creation("semaphore"))
    }

    /// Block until the last submission using this fence has completed.
    pub fn wait(&self, timeout: u64) -> EngineResult<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, timeout)
        }?;
        Ok(())
    }

    pub fn reset(&self) -> EngineResult<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight_fence]) }?;
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
