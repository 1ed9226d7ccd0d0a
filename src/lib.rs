//! Minimal Vulkan rendering engine: one window, one hardcoded triangle,
//! fence/semaphore synchronized frame loop.

pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod renderer;

pub use error::{EngineError, EngineResult};
