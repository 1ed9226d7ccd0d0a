// =============================================================================
// APPLICATION - window + frame loop driver
// =============================================================================
//
// One window, one renderer. The loop redraws continuously; every redraw runs a
// single synchronized frame cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::Config;
use crate::frame::FrameOutcome;
use crate::renderer::Renderer;

const FPS_INTERVAL: Duration = Duration::from_secs(1);

/// Frames-per-second over roughly one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    last_update: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            last_update: now,
        }
    }

    /// Count one frame. Returns the rate once at least a second has passed
    /// since the last report, then starts a new window.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed < FPS_INTERVAL {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.last_update = now;
        Some(fps)
    }
}

/// Whole frames per second, never below 1
pub fn fps_title(title: &str, fps: f64) -> String {
    format!("{} - Running at {} FPS", title, (fps as u32).max(1))
}

pub struct App {
    config: Config,
    // Dropped before the window so the surface never outlives it
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    fps: FpsCounter,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fps: FpsCounter::new(Instant::now()),
        }
    }

    fn init_renderer(&self, window: &Window) -> anyhow::Result<Renderer> {
        let size = window.inner_size();
        let renderer = Renderer::new(
            window.raw_display_handle(),
            window.raw_window_handle(),
            size.width,
            size.height,
            &self.config,
        )?;
        Ok(renderer)
    }

    fn render(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let outcome = renderer.draw_frame();
        if let Some(fps) = self.frame_finished(outcome, Instant::now()) {
            log::debug!("{:.1} FPS ({:.2}ms)", fps, 1000.0 / fps.max(1.0));
            if self.config.debug.show_fps {
                if let Some(window) = &self.window {
                    window.set_title(&fps_title(&self.config.window.title, fps));
                }
            }
        }
    }

    /// Every loop iteration counts toward the rate, dropped frames included.
    fn frame_finished(&mut self, outcome: FrameOutcome, now: Instant) -> Option<f64> {
        if let FrameOutcome::Dropped(stage) = outcome {
            log::trace!("Frame dropped at {}", stage);
        }
        self.fps.tick(now)
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            if let Err(e) = renderer.wait_idle() {
                log::error!("Device wait idle failed: {}", e);
            }
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            // The swapchain is never rebuilt, so the size must not change
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };
        log::info!(
            "Created window \"{}\", resolution {}x{}",
            self.config.window.title,
            self.config.window.width,
            self.config.window.height
        );

        match self.init_renderer(&window) {
            Ok(renderer) => {
                let extent = renderer.extent();
                log::info!(
                    "Rendering on {} at {}x{}",
                    renderer.adapter_name(),
                    extent.width,
                    extent.height
                );
                self.renderer = Some(renderer);
                self.window = Some(window);
                self.fps = FpsCounter::new(Instant::now());
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::RedrawRequested => self.render(),
            _ => {}
        }
    }

    /// Keep redrawing as fast as presentation allows
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Explicit so the renderer is gone before the window handle
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameStage;

    #[test]
    fn test_fps_counter_waits_a_full_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);

        for i in 1..60 {
            assert_eq!(counter.tick(start + Duration::from_millis(i * 16)), None);
        }
    }

    #[test]
    fn test_fps_counter_reports_and_resets() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);

        for i in 1..=119 {
            assert!(counter.tick(start + Duration::from_millis(i * 8)).is_none());
        }
        let fps = counter.tick(start + Duration::from_secs(2)).unwrap();
        assert!((fps - 60.0).abs() < 1e-9, "{fps}");

        // New window starts from zero frames
        let next = counter.tick(start + Duration::from_secs(3)).unwrap();
        assert!((next - 1.0).abs() < 1e-9, "{next}");
    }

    #[test]
    fn test_dropped_frames_count_toward_fps() {
        let mut app = App::new(Config::default());
        let start = Instant::now();
        app.fps = FpsCounter::new(start);

        for i in 1..30u64 {
            let outcome = if i % 2 == 0 {
                FrameOutcome::Dropped(FrameStage::Acquire)
            } else {
                FrameOutcome::Presented {
                    image_index: (i % 3) as u32,
                    suboptimal: false,
                }
            };
            assert!(app
                .frame_finished(outcome, start + Duration::from_millis(i * 10))
                .is_none());
        }

        let fps = app
            .frame_finished(
                FrameOutcome::Dropped(FrameStage::Submit),
                start + Duration::from_secs(1),
            )
            .unwrap();
        assert!((fps - 30.0).abs() < 1e-9, "{fps}");
    }

    #[test]
    fn test_fps_title_format() {
        assert_eq!(fps_title("Vulkan App", 143.7), "Vulkan App - Running at 143 FPS");
        assert_eq!(fps_title("Vulkan App", 0.4), "Vulkan App - Running at 1 FPS");
    }
}
