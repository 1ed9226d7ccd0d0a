// Adapter selection - which physical GPU drives the window
//
// A GPU is eligible when it has the swapchain extension, a graphics queue
// family, a queue family that can present to the surface, and at least one
// surface format and present mode. Eligible GPUs are ranked by kind.

use ash::vk;
use std::ffi::CStr;

use super::capabilities::SwapchainSupport;
use super::{Surface, VulkanInstance};
use crate::error::{EngineError, EngineResult};

/// Device extensions every adapter must offer.
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [ash::extensions::khr::Swapchain::name()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl AdapterKind {
    pub fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
            vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
            _ => AdapterKind::Other,
        }
    }

    /// Prefer discrete GPU
    pub fn score(self) -> u32 {
        match self {
            AdapterKind::Discrete => 1000,
            AdapterKind::Integrated => 100,
            AdapterKind::Virtual => 10,
            AdapterKind::Cpu => 2,
            AdapterKind::Other => 1,
        }
    }
}

/// Per-family capabilities relevant to this engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Pick indices from per-family capabilities.
    ///
    /// A family serving both roles beats the first graphics family paired
    /// with the first present family.
    pub fn resolve(families: &[QueueFamilyCaps]) -> Self {
        let index = |i: usize| i as u32;

        if let Some(both) = families.iter().position(|f| f.graphics && f.present) {
            return Self {
                graphics: Some(index(both)),
                present: Some(index(both)),
            };
        }

        Self {
            graphics: families.iter().position(|f| f.graphics).map(index),
            present: families.iter().position(|f| f.present).map(index),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Both indices, or the fatal error naming what is missing.
    pub fn complete(&self) -> EngineResult<(u32, u32)> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            (graphics, present) => Err(EngineError::IncompleteQueueFamilies { graphics, present }),
        }
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.into_iter().chain(self.present).collect();
        families.dedup();
        families
    }
}

/// What we learned about one physical device.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub kind: AdapterKind,
    pub queue_families: Vec<QueueFamilyCaps>,
    pub extensions: Vec<String>,
    pub surface_adequate: bool,
}

impl AdapterInfo {
    fn query(
        instance: &ash::Instance,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
    ) -> EngineResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let family_properties =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let mut queue_families = Vec::with_capacity(family_properties.len());
        for (i, family) in family_properties.iter().enumerate() {
            queue_families.push(QueueFamilyCaps {
                graphics: family.queue_count > 0
                    && family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: surface.supports_present(physical_device, i as u32)?,
            });
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }?
            .iter()
            .map(|p| {
                unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let surface_adequate = SwapchainSupport::query(surface, physical_device)?.is_adequate();

        Ok(Self {
            physical_device,
            name,
            kind: AdapterKind::from_vk(properties.device_type),
            queue_families,
            extensions,
            surface_adequate,
        })
    }

    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::resolve(&self.queue_families)
    }

    pub fn missing_extensions(&self) -> Vec<&'static CStr> {
        required_device_extensions()
            .into_iter()
            .filter(|required| {
                let required = required.to_string_lossy();
                !self.extensions.iter().any(|ext| *ext == required)
            })
            .collect()
    }

    /// Eligibility never depends on whether diagnostics are enabled.
    pub fn is_suitable(&self) -> bool {
        let missing = self.missing_extensions();
        if !missing.is_empty() {
            log::debug!("{}: missing device extensions {:?}", self.name, missing);
            return false;
        }
        if !self.queue_family_indices().is_complete() {
            log::debug!("{}: no graphics/present queue family pair", self.name);
            return false;
        }
        if !self.surface_adequate {
            log::debug!("{}: surface reports no formats or present modes", self.name);
            return false;
        }
        true
    }
}

/// Highest-scoring suitable adapter; earlier adapters win ties.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Option<&AdapterInfo> {
    adapters
        .iter()
        .filter(|adapter| adapter.is_suitable())
        .fold(None, |best: Option<&AdapterInfo>, candidate| match best {
            Some(best) if best.kind.score() >= candidate.kind.score() => Some(best),
            _ => Some(candidate),
        })
}

/// Enumerate every physical device and pick one for `surface`.
pub fn pick_adapter(instance: &VulkanInstance, surface: &Surface) -> EngineResult<AdapterInfo> {
    let devices = unsafe { instance.instance.enumerate_physical_devices() }?;
    log::info!("{} physical device(s) available", devices.len());

    let checked = devices.len();
    let adapters = queried_adapters(
        devices
            .into_iter()
            .map(|device| AdapterInfo::query(&instance.instance, surface, device)),
    );

    for adapter in &adapters {
        log::info!("Found GPU: {} ({:?})", adapter.name, adapter.kind);
        for ext in &adapter.extensions {
            log::trace!("  {}", ext);
        }
    }

    select_adapter(&adapters)
        .cloned()
        .ok_or(EngineError::NoSuitableAdapter { checked })
}

/// Adapters whose query succeeded. A failed query only rules out that adapter.
fn queried_adapters(
    results: impl IntoIterator<Item = EngineResult<AdapterInfo>>,
) -> Vec<AdapterInfo> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                log::warn!("Skipping adapter that could not be queried: {}", e);
                None
            }
        })
        .collect()
}
