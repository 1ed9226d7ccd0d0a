// =============================================================================
// TRIANGLE ENGINE - one window, one triangle, synchronized frame loop
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for this frame's fence
// 2. Acquire swapchain image
// 3. Reset fence, re-record the image's command buffer
// 4. Submit (waits image-available, signals render-finished + fence)
// 5. Present (waits render-finished)
//
// =============================================================================

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use triangle_engine::app::App;
use triangle_engine::config::Config;
use winit::event_loop::EventLoop;

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config)?;
    log::info!("Starting triangle engine");
    log::info!(
        "Window: {}x{}, debug {}",
        config.window.width,
        config.window.height,
        if config.debug.enabled { "on" } else { "off" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, optionally into a file instead of stderr
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let level = if config.debug.enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    // RUST_LOG still wins over the configured level
    builder.parse_default_env();

    if config.debug.log_to_file {
        let mut file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        writeln!(file, "=== Triangle Engine Log ===")?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
