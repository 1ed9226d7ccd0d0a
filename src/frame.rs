//! Frame synchronization.
//!
//! [`FrameSynchronizer`] runs the per-frame protocol that keeps CPU
//! recording, GPU execution and presentation from overlapping on the same
//! resources:
//!
//! ```text
//! wait(fence f) -> acquire(image i, signals image_available[f])
//!   -> reset(fence f) -> record(slot i)
//!   -> submit(wait image_available[f], signal render_finished[f], fence f)
//!   -> present(i, wait render_finished[f]) -> f = (f + 1) % frames_in_flight
//! ```
//!
//! The GPU side is reached only through [`FrameBackend`], which the
//! renderer implements with Vulkan calls. Tests drive the same protocol with
//! an instrumented backend.

use crate::backend::AcquiredImage;
use crate::error::{EngineError, EngineResult, FrameStage};

/// GPU operations one frame cycle needs. `frame` indexes the per-frame
/// synchronization primitives, `image_index` the swapchain image and its slot.
pub trait FrameBackend {
    /// Block until fence `frame` is signaled. Timeout is unbounded.
    fn wait_for_fence(&mut self, frame: usize) -> EngineResult<()>;

    fn reset_fence(&mut self, frame: usize) -> EngineResult<()>;

    /// Request the next image; `image_available[frame]` signals when it is writable.
    fn acquire_image(&mut self, frame: usize) -> EngineResult<AcquiredImage>;

    /// Reset and re-record the command buffer of slot `image_index`.
    fn record(&mut self, image_index: u32) -> EngineResult<()>;

    /// Submit slot `image_index` on the graphics queue, guarded by fence `frame`.
    fn submit(&mut self, frame: usize, image_index: u32) -> EngineResult<()>;

    /// Queue presentation of `image_index`. Returns whether the chain is suboptimal.
    fn present(&mut self, frame: usize, image_index: u32) -> EngineResult<bool>;

    /// Put frame `frame` back to a usable state (signaled fence, unsignaled
    /// semaphores) after a cycle failed between acquisition and submission.
    fn recover_frame(&mut self, frame: usize) -> EngineResult<()>;
}

/// Where a frame's synchronization slot is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32, suboptimal: bool },
    Dropped(FrameStage),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped: u64,
    pub suboptimal: u64,
}

pub struct FrameSynchronizer {
    frames_in_flight: usize,
    current_frame: usize,
    states: Vec<SlotState>,
    /// For each swapchain image, the frame whose fence guards its last submission
    images_in_flight: Vec<Option<usize>>,
    stats: FrameStats,
}

impl FrameSynchronizer {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            frames_in_flight,
            current_frame: 0,
            states: vec![SlotState::Idle; frames_in_flight],
            images_in_flight: vec![None; image_count],
            stats: FrameStats::default(),
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn state(&self, frame: usize) -> Option<SlotState> {
        self.states.get(frame).copied()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run one full cycle. Failures are logged and the frame is dropped;
    /// nothing is retried.
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> FrameOutcome {
        let frame = self.current_frame;

        if let Err(err) = backend.wait_for_fence(frame) {
            return self.drop_frame(frame, FrameStage::Wait, &err);
        }

        self.states[frame] = SlotState::Acquiring;
        let acquired = match backend.acquire_image(frame) {
            Ok(acquired) => acquired,
            // The fence is still signaled, so the next wait returns at once
            Err(err) => return self.drop_frame(frame, FrameStage::Acquire, &err),
        };

        if let Err((stage, err)) = self.prepare_and_submit(backend, frame, acquired.index) {
            self.release_image(acquired.index);
            if let Err(recover_err) = backend.recover_frame(frame) {
                log::error!("Could not recover frame {}: {}", frame, recover_err);
            }
            return self.drop_frame(frame, stage, &err);
        }

        self.states[frame] = SlotState::Presenting;
        let presented = backend.present(frame, acquired.index);

        self.states[frame] = SlotState::Idle;
        self.current_frame = (frame + 1) % self.frames_in_flight;

        match presented {
            Ok(suboptimal_present) => {
                let suboptimal = acquired.suboptimal || suboptimal_present;
                if suboptimal {
                    self.stats.suboptimal += 1;
                    log::debug!("Swapchain is suboptimal for the surface");
                }
                self.stats.presented += 1;
                FrameOutcome::Presented {
                    image_index: acquired.index,
                    suboptimal,
                }
            }
            Err(err) => {
                // Submitted work still signals the fence; only the present is lost
                self.stats.dropped += 1;
                log::warn!("Dropped frame: {}", err);
                FrameOutcome::Dropped(FrameStage::Present)
            }
        }
    }

    fn prepare_and_submit<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: usize,
        image_index: u32,
    ) -> Result<(), (FrameStage, EngineError)> {
        let image = image_index as usize;
        if image >= self.images_in_flight.len() {
            self.images_in_flight.resize(image + 1, None);
        }

        // With several frames in flight the acquired image may still be in
        // use by another frame's submission
        if let Some(owner) = self.images_in_flight[image] {
            if owner != frame {
                backend
                    .wait_for_fence(owner)
                    .map_err(|e| (FrameStage::Wait, e))?;
            }
        }
        self.images_in_flight[image] = Some(frame);

        backend
            .reset_fence(frame)
            .map_err(|e| (FrameStage::Wait, e))?;

        self.states[frame] = SlotState::Recording;
        backend
            .record(image_index)
            .map_err(|e| (FrameStage::Record, e))?;

        backend
            .submit(frame, image_index)
            .map_err(|e| (FrameStage::Submit, e))?;
        self.states[frame] = SlotState::Submitted;

        Ok(())
    }

    fn release_image(&mut self, image_index: u32) {
        if let Some(owner) = self.images_in_flight.get_mut(image_index as usize) {
            *owner = None;
        }
    }

    fn drop_frame(&mut self, frame: usize, stage: FrameStage, err: &EngineError) -> FrameOutcome {
        self.states[frame] = SlotState::Idle;
        self.stats.dropped += 1;
        log::warn!("Dropped frame during {}: {}", stage, err);
        FrameOutcome::Dropped(stage)
    }
}
