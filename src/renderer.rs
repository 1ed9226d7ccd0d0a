//! The assembled engine.
//!
//! [`Renderer::new`] builds every Vulkan object in dependency order and is
//! all-or-nothing: on any failure the pieces built so far are dropped in
//! reverse order and the error is returned.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

use crate::backend::commands::{record_frame, CommandPool, VulkanEncoder};
use crate::backend::capabilities::present_mode_name;
use crate::backend::frame_slot::FrameSlots;
use crate::backend::pipeline::PipelineState;
use crate::backend::sync::FrameSync;
use crate::backend::{AcquiredImage, Surface, Swapchain, VulkanDevice, VulkanInstance};
use crate::config::Config;
use crate::error::{EngineError, EngineResult, FrameStage};
use crate::frame::{FrameBackend, FrameOutcome, FrameStats, FrameSynchronizer};

/// GPU side of the frame loop.
///
/// Field order is drop order: sync objects, framebuffers and command buffers,
/// pipeline, then the swapchain (which keeps the surface alive).
struct GpuFrames {
    frame_sync: Vec<FrameSync>,
    frame_slots: FrameSlots,
    _command_pool: CommandPool,
    pipeline: PipelineState,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
    clear_color: [f32; 4],
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl GpuFrames {
    fn sync(&self, frame: usize) -> EngineResult<&FrameSync> {
        self.frame_sync
            .get(frame)
            .ok_or(EngineError::Frame {
                stage: FrameStage::Wait,
                result: vk::Result::ERROR_UNKNOWN,
            })
    }
}

impl FrameBackend for GpuFrames {
    fn wait_for_fence(&mut self, frame: usize) -> EngineResult<()> {
        self.sync(frame)?
            .wait(u64::MAX)
            .map_err(|e| match e {
                EngineError::Vulkan(result) => EngineError::Frame {
                    stage: FrameStage::Wait,
                    result,
                },
                other => other,
            })
    }

    fn reset_fence(&mut self, frame: usize) -> EngineResult<()> {
        self.sync(frame)?.reset()
    }

    fn acquire_image(&mut self, frame: usize) -> EngineResult<AcquiredImage> {
        let semaphore = self.sync(frame)?.image_available;
        self.swapchain.acquire_next_image(u64::MAX, semaphore)
    }

    fn record(&mut self, image_index: u32) -> EngineResult<()> {
        let slot = self
            .frame_slots
            .get(image_index)
            .ok_or(EngineError::Frame {
                stage: FrameStage::Record,
                result: vk::Result::ERROR_UNKNOWN,
            })?;
        let pass = self
            .frame_slots
            .pass_for(
                image_index,
                self.pipeline.render_pass,
                self.pipeline.pipeline,
                self.swapchain.extent,
                self.clear_color,
            )
            .ok_or(EngineError::Frame {
                stage: FrameStage::Record,
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let mut encoder = VulkanEncoder::new(&self.device.device, slot.command_buffer);
        record_frame(&mut encoder, &pass)
    }

    fn submit(&mut self, frame: usize, image_index: u32) -> EngineResult<()> {
        let sync = self.sync(frame)?;
        let slot = self
            .frame_slots
            .get(image_index)
            .ok_or(EngineError::Frame {
                stage: FrameStage::Submit,
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [slot.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )
        }
        .map_err(EngineError::frame(FrameStage::Submit))
    }

    fn present(&mut self, frame: usize, image_index: u32) -> EngineResult<bool> {
        let render_finished = self.sync(frame)?.render_finished;
        self.swapchain
            .present(self.device.present_queue, image_index, &[render_finished])
    }

    fn recover_frame(&mut self, frame: usize) -> EngineResult<()> {
        self.device.wait_idle()?;
        let fresh = FrameSync::new(self.device.clone())?;
        if let Some(slot) = self.frame_sync.get_mut(frame) {
            // The old set is destroyed here, after the device went idle
            *slot = fresh;
        }
        log::debug!("Recreated synchronization objects for frame {}", frame);
        Ok(())
    }
}

pub struct Renderer {
    synchronizer: FrameSynchronizer,
    frames: GpuFrames,
    _surface: Arc<Surface>,
    _instance: Arc<VulkanInstance>,
}

impl Renderer {
    /// Build the full engine for a window.
    ///
    /// `width`/`height` are only a request; the surface decides the final
    /// extent.
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        width: u32,
        height: u32,
        config: &Config,
    ) -> EngineResult<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = config.validation_enabled();
        let instance = Arc::new(VulkanInstance::new(
            &config.window.title,
            display_handle,
            enable_validation,
        )?);
        let surface = Arc::new(Surface::new(
            instance.clone(),
            display_handle,
            window_handle,
        )?);
        let device = VulkanDevice::new(instance.clone(), &surface)?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface.clone(),
            width,
            height,
            config.present_mode(),
        )?;

        let pipeline = PipelineState::new(
            device.clone(),
            swapchain.format,
            swapchain.extent,
            &config.shaders.vertex,
            &config.shaders.fragment,
        )?;

        let command_pool = CommandPool::new(device.clone())?;
        let frame_slots =
            FrameSlots::new(device.clone(), &swapchain, pipeline.render_pass, &command_pool)?;

        let frames_in_flight = config.frames_in_flight();
        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<EngineResult<Vec<_>>>()?;

        let synchronizer = FrameSynchronizer::new(frames_in_flight, swapchain.image_count());

        log::info!(
            "Vulkan initialized: {} images, {} present mode, {} frame(s) in flight",
            swapchain.image_count(),
            present_mode_name(swapchain.present_mode),
            frames_in_flight
        );

        Ok(Self {
            synchronizer,
            frames: GpuFrames {
                frame_sync,
                frame_slots,
                _command_pool: command_pool,
                pipeline,
                swapchain,
                device,
                clear_color: config.graphics.clear_color,
                wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            },
            _surface: surface,
            _instance: instance,
        })
    }

    /// Run one synchronized frame cycle
    pub fn draw_frame(&mut self) -> FrameOutcome {
        self.synchronizer.draw_frame(&mut self.frames)
    }

    pub fn wait_idle(&self) -> EngineResult<()> {
        self.frames.device.wait_idle()
    }

    pub fn stats(&self) -> FrameStats {
        self.synchronizer.stats()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.frames.swapchain.extent
    }

    pub fn adapter_name(&self) -> &str {
        &self.frames.device.adapter_name
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.wait_idle() {
            log::error!("Device wait idle failed during shutdown: {}", e);
        }
        let stats = self.stats();
        log::info!(
            "Frames presented: {}, dropped: {}",
            stats.presented,
            stats.dropped
        );
    }
}
