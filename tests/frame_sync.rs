//! Frame synchronizer against a simulated GPU.
//!
//! `MockGpu` tracks fences, semaphores and command buffer usage the way the
//! driver would and panics on any protocol violation: waiting on a fence that
//! can never signal, re-recording a buffer the GPU may still read, submitting
//! without a pending image-available signal, presenting without a
//! render-finished signal.

use std::collections::{HashSet, VecDeque};

use ash::vk;
use triangle_engine::backend::capabilities::{SurfaceConfig, SwapchainSupport};
use triangle_engine::backend::AcquiredImage;
use triangle_engine::error::{EngineError, EngineResult, FrameStage};
use triangle_engine::frame::{FrameBackend, FrameOutcome, FrameSynchronizer};

#[derive(Debug, Clone, Copy)]
struct Fence {
    signaled: bool,
    /// Image whose submission will signal this fence
    pending: Option<u32>,
}

struct MockGpu {
    fences: Vec<Fence>,
    image_available: Vec<bool>,
    render_finished: Vec<bool>,
    /// Frame whose unfinished submission still reads each image's command buffer
    busy: Vec<Option<usize>>,
    presentable: VecDeque<u32>,
    /// Presented images go back to the front of the queue
    lifo: bool,
    recorded: Vec<u32>,
    presented: Vec<u32>,
    recoveries: usize,
    fail_acquire_at: HashSet<usize>,
    fail_record_at: HashSet<usize>,
    fail_submit_at: HashSet<usize>,
    fail_present_at: HashSet<usize>,
    acquires: usize,
}

impl MockGpu {
    fn new(frames_in_flight: usize, image_count: u32) -> Self {
        Self {
            fences: vec![
                Fence {
                    signaled: true,
                    pending: None,
                };
                frames_in_flight
            ],
            image_available: vec![false; frames_in_flight],
            render_finished: vec![false; frames_in_flight],
            busy: vec![None; image_count as usize],
            presentable: (0..image_count).collect(),
            lifo: false,
            recorded: vec![0; image_count as usize],
            presented: Vec::new(),
            recoveries: 0,
            fail_acquire_at: HashSet::new(),
            fail_record_at: HashSet::new(),
            fail_submit_at: HashSet::new(),
            fail_present_at: HashSet::new(),
            acquires: 0,
        }
    }

    /// Let the GPU finish whatever fence `frame` guards.
    fn complete(&mut self, frame: usize) {
        let fence = &mut self.fences[frame];
        if let Some(image) = fence.pending.take() {
            fence.signaled = true;
            self.busy[image as usize] = None;
        }
    }

    fn failure(stage: FrameStage) -> EngineError {
        EngineError::frame(stage)(vk::Result::ERROR_DEVICE_LOST)
    }

    /// Index of the current cycle, counted by acquires.
    fn cycle(&self) -> usize {
        self.acquires - 1
    }
}

impl FrameBackend for MockGpu {
    fn wait_for_fence(&mut self, frame: usize) -> EngineResult<()> {
        let fence = self.fences[frame];
        if fence.signaled {
            return Ok(());
        }
        assert!(
            fence.pending.is_some(),
            "deadlock: waiting on unsignaled fence {frame} with nothing submitted"
        );
        self.complete(frame);
        Ok(())
    }

    fn reset_fence(&mut self, frame: usize) -> EngineResult<()> {
        assert!(
            self.fences[frame].signaled,
            "fence {frame} reset while its submission is pending"
        );
        self.fences[frame].signaled = false;
        Ok(())
    }

    fn acquire_image(&mut self, frame: usize) -> EngineResult<AcquiredImage> {
        self.acquires += 1;
        if self.fail_acquire_at.contains(&self.cycle()) {
            return Err(Self::failure(FrameStage::Acquire));
        }
        assert!(
            !self.image_available[frame],
            "image-available semaphore {frame} already has a pending signal"
        );
        let index = self
            .presentable
            .pop_front()
            .expect("presentation engine ran out of images");
        self.image_available[frame] = true;
        Ok(AcquiredImage {
            index,
            suboptimal: false,
        })
    }

    fn record(&mut self, image_index: u32) -> EngineResult<()> {
        if self.fail_record_at.contains(&self.cycle()) {
            return Err(Self::failure(FrameStage::Record));
        }
        assert_eq!(
            self.busy[image_index as usize],
            None,
            "command buffer {image_index} re-recorded while the GPU may still read it"
        );
        self.recorded[image_index as usize] += 1;
        Ok(())
    }

    fn submit(&mut self, frame: usize, image_index: u32) -> EngineResult<()> {
        if self.fail_submit_at.contains(&self.cycle()) {
            return Err(Self::failure(FrameStage::Submit));
        }
        let fence = self.fences[frame];
        assert!(!fence.signaled, "submitted with fence {frame} not reset");
        assert!(fence.pending.is_none(), "fence {frame} used twice");
        assert!(
            self.image_available[frame],
            "submission waits on an image-available semaphore nobody will signal"
        );

        self.image_available[frame] = false;
        self.render_finished[frame] = true;
        self.fences[frame].pending = Some(image_index);
        self.busy[image_index as usize] = Some(frame);
        Ok(())
    }

    fn present(&mut self, frame: usize, image_index: u32) -> EngineResult<bool> {
        assert!(
            self.render_finished[frame],
            "present waits on a render-finished semaphore nobody will signal"
        );
        self.render_finished[frame] = false;

        if self.lifo {
            self.presentable.push_front(image_index);
        } else {
            self.presentable.push_back(image_index);
        }

        if self.fail_present_at.contains(&self.cycle()) {
            return Err(Self::failure(FrameStage::Present));
        }
        self.presented.push(image_index);
        Ok(false)
    }

    fn recover_frame(&mut self, frame: usize) -> EngineResult<()> {
        // Device idle: every submission finishes
        for f in 0..self.fences.len() {
            self.complete(f);
        }
        self.fences[frame] = Fence {
            signaled: true,
            pending: None,
        };
        self.image_available[frame] = false;
        self.render_finished[frame] = false;
        self.recoveries += 1;
        Ok(())
    }
}

fn run(sync: &mut FrameSynchronizer, gpu: &mut MockGpu, frames: usize) -> Vec<FrameOutcome> {
    (0..frames).map(|_| sync.draw_frame(&mut *gpu)).collect()
}

#[test]
fn test_single_frame_in_flight_holds_protocol() {
    let mut gpu = MockGpu::new(1, 3);
    let mut sync = FrameSynchronizer::new(1, 3);

    let outcomes = run(&mut sync, &mut gpu, 200);

    assert!(outcomes
        .iter()
        .all(|o| matches!(o, FrameOutcome::Presented { .. })));
    assert_eq!(sync.stats().presented, 200);
    assert_eq!(sync.stats().dropped, 0);
}

#[test]
fn test_every_image_presented_within_k_cycles() {
    for image_count in 2..=4 {
        let mut gpu = MockGpu::new(1, image_count);
        let mut sync = FrameSynchronizer::new(1, image_count as usize);

        run(&mut sync, &mut gpu, image_count as usize);

        let mut seen = gpu.presented.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..image_count).collect::<Vec<_>>());
        assert!(gpu.recorded.iter().all(|&n| n == 1));
    }
}

#[test]
fn test_multiple_frames_in_flight_never_rerecord_busy_buffer() {
    for frames_in_flight in 2..=3 {
        let mut gpu = MockGpu::new(frames_in_flight, 3);
        // Most recently presented image comes back first
        gpu.lifo = true;
        let mut sync = FrameSynchronizer::new(frames_in_flight, 3);

        let outcomes = run(&mut sync, &mut gpu, 100);

        assert_eq!(sync.stats().presented, 100, "{outcomes:?}");
        assert_eq!(gpu.recoveries, 0);
    }
}

#[test]
fn test_acquire_failure_does_not_deadlock() {
    let mut gpu = MockGpu::new(1, 3);
    gpu.fail_acquire_at = [2, 3, 7].into_iter().collect();
    let mut sync = FrameSynchronizer::new(1, 3);

    let outcomes = run(&mut sync, &mut gpu, 20);

    assert_eq!(outcomes[2], FrameOutcome::Dropped(FrameStage::Acquire));
    assert_eq!(outcomes[3], FrameOutcome::Dropped(FrameStage::Acquire));
    assert!(matches!(outcomes[4], FrameOutcome::Presented { .. }));
    assert_eq!(sync.stats().dropped, 3);
    assert_eq!(sync.stats().presented, 17);
    assert_eq!(gpu.recoveries, 0);
}

#[test]
fn test_submit_failure_recovers_the_frame() {
    let mut gpu = MockGpu::new(2, 4);
    gpu.fail_submit_at = [5].into_iter().collect();
    let mut sync = FrameSynchronizer::new(2, 4);

    let outcomes = run(&mut sync, &mut gpu, 30);

    assert_eq!(outcomes[5], FrameOutcome::Dropped(FrameStage::Submit));
    assert_eq!(gpu.recoveries, 1);
    assert_eq!(sync.stats().presented, 29);
}

#[test]
fn test_record_failure_recovers_the_frame() {
    let mut gpu = MockGpu::new(1, 3);
    gpu.fail_record_at = [0].into_iter().collect();
    let mut sync = FrameSynchronizer::new(1, 3);

    let outcomes = run(&mut sync, &mut gpu, 10);

    assert_eq!(outcomes[0], FrameOutcome::Dropped(FrameStage::Record));
    assert!(outcomes[1..]
        .iter()
        .all(|o| matches!(o, FrameOutcome::Presented { .. })));
    assert_eq!(gpu.recoveries, 1);
}

#[test]
fn test_present_failure_still_advances() {
    let mut gpu = MockGpu::new(2, 3);
    gpu.fail_present_at = [1].into_iter().collect();
    let mut sync = FrameSynchronizer::new(2, 3);

    let outcomes = run(&mut sync, &mut gpu, 6);

    assert_eq!(outcomes[1], FrameOutcome::Dropped(FrameStage::Present));
    assert_eq!(sync.stats().presented, 5);
    assert_eq!(sync.stats().dropped, 1);
    // The submission was made, so the next use of frame 1 waits normally
    assert_eq!(gpu.recoveries, 0);
}

#[test]
fn test_1600x900_window_scenario() {
    let support = SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 1600,
                height: 900,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    };
    assert!(support.is_adequate());

    let config = SurfaceConfig::negotiate(&support, 1600, 900, None).unwrap();
    assert_eq!((config.extent.width, config.extent.height), (1600, 900));
    assert_eq!(config.format.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
    assert_eq!(config.image_count, 3);

    let mut gpu = MockGpu::new(1, config.image_count);
    let mut sync = FrameSynchronizer::new(1, config.image_count as usize);

    let outcomes = run(&mut sync, &mut gpu, config.image_count as usize);
    let images: Vec<u32> = outcomes
        .iter()
        .map(|o| match o {
            FrameOutcome::Presented { image_index, .. } => *image_index,
            other => panic!("frame not presented: {other:?}"),
        })
        .collect();
    assert_eq!(images, vec![0, 1, 2]);
}
