// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Logical device creation for the selected adapter
// - Graphics + present queue retrieval (may be the same queue)
// - Idle wait before teardown

use ash::vk;
use std::ffi::c_char;
use std::sync::Arc;

use super::adapter::{self, AdapterInfo, QueueFamilyIndices};
use super::{Surface, VulkanInstance};
use crate::error::{EngineError, EngineResult};

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue_family: u32,

    pub adapter_name: String,

    // Destroyed after the device
    instance: Arc<VulkanInstance>,
}

impl VulkanDevice {
    /// Pick an adapter for `surface` and open a logical device on it.
    ///
    /// # Arguments
    /// * `instance` - Instance the surface was created from
    /// * `surface` - Surface the device must be able to present to
    pub fn new(instance: Arc<VulkanInstance>, surface: &Surface) -> EngineResult<Arc<Self>> {
        let adapter = adapter::pick_adapter(&instance, surface)?;
        let queue_families = adapter.queue_family_indices();
        let (graphics_queue_family, present_queue_family) = queue_families.complete()?;

        let device = Self::create_logical_device(&instance.instance, &adapter, &queue_families)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(adapter.physical_device)
        };

        log::info!("Selected GPU: {} ({:?})", adapter.name, adapter.kind);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!(
            "Queue families: graphics={}, present={}",
            graphics_queue_family,
            present_queue_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device: adapter.physical_device,
            graphics_queue,
            present_queue,
            queue_families,
            graphics_queue_family,
            adapter_name: adapter.name,
            instance,
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        adapter: &AdapterInfo,
        queue_families: &QueueFamilyIndices,
    ) -> EngineResult<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        // Required device extensions
        let extensions: Vec<*const c_char> = adapter::required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(adapter.physical_device, &create_info, None) }
            .map_err(EngineError::creation("logical device"))?;

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> EngineResult<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }

    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}
