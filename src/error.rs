//! Engine error types.

use std::fmt;
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Step of the per-frame protocol that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Wait,
    Acquire,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Wait => "fence wait",
            FrameStage::Acquire => "image acquisition",
            FrameStage::Record => "command recording",
            FrameStage::Submit => "queue submission",
            FrameStage::Present => "presentation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// The Vulkan loader could not be found
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// Untagged Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A Vulkan object could not be created
    #[error("Failed to create {what}: {result}")]
    Creation {
        what: &'static str,
        result: vk::Result,
    },

    /// Requested instance extensions or layers are unavailable
    #[error("Instance does not support: {}", .0.join(", "))]
    MissingInstanceSupport(Vec<String>),

    #[error("No suitable GPU found (checked {checked} adapters)")]
    NoSuitableAdapter { checked: usize },

    #[error("Queue families incomplete: graphics={graphics:?}, present={present:?}")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("Surface reports no pixel formats")]
    NoSurfaceFormat,

    #[error("Shader {path:?}: {reason}")]
    Shader { path: PathBuf, reason: String },

    /// Transient failure inside the frame loop
    #[error("Frame {stage} failed: {result}")]
    Frame { stage: FrameStage, result: vk::Result },
}

impl EngineError {
    /// Adapter for `map_err` on object creation calls.
    pub fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> EngineError {
        move |result| EngineError::Creation { what, result }
    }

    pub fn frame(stage: FrameStage) -> impl FnOnce(vk::Result) -> EngineError {
        move |result| EngineError::Frame { stage, result }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
