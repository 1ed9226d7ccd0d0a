// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Each wrapper holds an Arc to what it was
// created from, so destruction runs in reverse creation order.

pub mod adapter;
pub mod capabilities;
pub mod commands;
pub mod device;
pub mod frame_slot;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::Surface;
pub use swapchain::{AcquiredImage, Swapchain};
