// Vulkan Instance - loader, instance and validation messenger
//
// Responsibilities:
// - Load the Vulkan library
// - Verify surface extensions; enable validation only where the loader has it
// - Route validation layer output into the `log` facade

use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

use crate::error::{EngineError, EngineResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance with the surface extensions the display needs.
    ///
    /// With `enable_validation` the Khronos validation layer and the debug
    /// messenger are added when the loader offers them. Without them the
    /// instance is created anyway; only missing surface extensions are fatal.
    pub fn new(
        app_name: &str,
        display_handle: RawDisplayHandle,
        enable_validation: bool,
    ) -> EngineResult<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        if let Ok(Some(version)) = entry.try_enumerate_instance_version() {
            log::debug!(
                "Vulkan loader version: {}.{}.{} (variant {})",
                vk::api_version_major(version),
                vk::api_version_minor(version),
                vk::api_version_patch(version),
                vk::api_version_variant(version)
            );
        }

        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Triangle Engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_properties = entry
            .enumerate_instance_extension_properties(None)
            .map_err(EngineError::creation("instance extension list"))?;
        let layer_properties = entry
            .enumerate_instance_layer_properties()
            .map_err(EngineError::creation("instance layer list"))?;

        let available_extensions: Vec<&CStr> = extension_properties
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) })
            .collect();
        let available_layers: Vec<&CStr> = layer_properties
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.layer_name.as_ptr()) })
            .collect();

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .map_err(EngineError::creation("surface extension list"))?
                .to_vec();

        let required: Vec<&CStr> = extensions
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        let missing = missing_names(&required, &available_extensions);
        if !missing.is_empty() {
            return Err(EngineError::MissingInstanceSupport(missing));
        }

        let validation = enable_validation && {
            let missing = missing_validation_support(&available_layers, &available_extensions);
            if !missing.is_empty() {
                log::warn!(
                    "Validation requested but unavailable (missing {}), continuing without it",
                    missing.join(", ")
                );
            }
            missing.is_empty()
        };

        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        for &ext in &extensions {
            log::debug!("Requesting instance extension {:?}", unsafe { CStr::from_ptr(ext) });
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(EngineError::creation("instance"))?;

        let debug_utils = if validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    log::warn!("{}, validation output will not be logged", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> EngineResult<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(EngineError::creation("debug messenger"))?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Names from `requested` that are not in `available`, as owned strings.
pub(crate) fn missing_names(requested: &[&CStr], available: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Names validation needs that the loader does not offer. Empty means
/// validation can be enabled.
pub(crate) fn missing_validation_support(
    available_layers: &[&CStr],
    available_extensions: &[&CStr],
) -> Vec<String> {
    let mut missing = missing_names(&[VALIDATION_LAYER], available_layers);
    missing.extend(missing_names(
        &[ash::extensions::ext::DebugUtils::name()],
        available_extensions,
    ));
    missing
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names_reports_only_absent() {
        let requested = [c"VK_KHR_surface", c"VK_EXT_debug_utils"];
        let available = [c"VK_KHR_surface", c"VK_KHR_xcb_surface"];

        assert_eq!(
            missing_names(&requested, &available),
            vec!["VK_EXT_debug_utils".to_string()]
        );
    }

    #[test]
    fn test_missing_names_empty_when_all_present() {
        let requested = [VALIDATION_LAYER];
        let available = [c"VK_LAYER_MESA_overlay", VALIDATION_LAYER];

        assert!(missing_names(&requested, &available).is_empty());
    }

    #[test]
    fn test_validation_support_needs_layer_and_extension() {
        let layers = [c"VK_LAYER_MESA_overlay", VALIDATION_LAYER];
        let extensions = [c"VK_KHR_surface", c"VK_EXT_debug_utils"];

        assert!(missing_validation_support(&layers, &extensions).is_empty());
        assert_eq!(
            missing_validation_support(&layers, &[c"VK_KHR_surface"]),
            vec!["VK_EXT_debug_utils".to_string()]
        );
    }

    #[test]
    fn test_validation_support_without_sdk() {
        let missing = missing_validation_support(&[], &[c"VK_KHR_surface"]);

        assert_eq!(
            missing,
            vec![
                "VK_LAYER_KHRONOS_validation".to_string(),
                "VK_EXT_debug_utils".to_string()
            ]
        );
    }
}
