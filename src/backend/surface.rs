// Surface - the window's presentable target as seen by Vulkan

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

use super::VulkanInstance;
use crate::error::{EngineError, EngineResult};

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
    // Keeps the instance alive until the surface is destroyed
    _instance: Arc<VulkanInstance>,
}

impl Surface {
    pub fn new(
        instance: Arc<VulkanInstance>,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> EngineResult<Self> {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .map_err(EngineError::creation("window surface"))?;

        let loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.instance);
        log::debug!("Created window surface");

        Ok(Self {
            surface,
            loader,
            _instance: instance,
        })
    }

    /// Whether queue family `family` of `physical_device` can present here.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
    ) -> EngineResult<bool> {
        let supported = unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
        }?;
        Ok(supported)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
