//! Surface capability negotiation.
//!
//! Everything here except [`SwapchainSupport::query`] is a pure function of
//! the values the surface reports, so the selection policy can be tested
//! without a GPU.

use ash::vk;

use super::Surface;
use crate::error::{EngineError, EngineResult};

/// Preferred swapchain pixel format.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a surface reports for one physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> EngineResult<Self> {
        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(physical_device, surface.surface)
        }?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(physical_device, surface.surface)
        }?;
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(physical_device, surface.surface)
        }?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A swapchain needs at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Dump the full report at debug level.
    pub fn log_report(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }

        let caps = &self.capabilities;
        log::debug!("Surface capabilities:");
        log::debug!("  image count: {}..={}", caps.min_image_count, caps.max_image_count);
        log::debug!(
            "  current extent: {}x{}",
            caps.current_extent.width,
            caps.current_extent.height
        );
        log::debug!(
            "  extent bounds: {}x{} ..= {}x{}",
            caps.min_image_extent.width,
            caps.min_image_extent.height,
            caps.max_image_extent.width,
            caps.max_image_extent.height
        );
        log::debug!("  max array layers: {}", caps.max_image_array_layers);
        log::debug!("  supported transforms: {:?}", caps.supported_transforms);
        log::debug!("  current transform: {:?}", caps.current_transform);
        log::debug!("  composite alpha: {:?}", caps.supported_composite_alpha);
        log::debug!("  usage flags: {:?}", caps.supported_usage_flags);

        for format in &self.formats {
            log::debug!("  format {:?} / {:?}", format.format, format.color_space);
        }
        for mode in &self.present_modes {
            log::debug!("  present mode {}", present_mode_name(*mode));
        }
    }
}

/// The negotiated parameters a swapchain is created with.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceConfig {
    pub fn negotiate(
        support: &SwapchainSupport,
        width: u32,
        height: u32,
        preferred_mode: Option<vk::PresentModeKHR>,
    ) -> EngineResult<Self> {
        let format = choose_surface_format(&support.formats).ok_or(EngineError::NoSurfaceFormat)?;

        Ok(Self {
            format,
            present_mode: choose_present_mode(&support.present_modes, preferred_mode),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// BGRA8 UNORM with sRGB non-linear colour space, else the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Present mode policy.
///
/// An available `preferred` mode wins. Otherwise MAILBOX, then IMMEDIATE,
/// then FIFO, which every presentation engine must support.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: Option<vk::PresentModeKHR>,
) -> vk::PresentModeKHR {
    if let Some(mode) = preferred.filter(|mode| modes.contains(mode)) {
        return mode;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `u32::MAX` in `current_extent` means the window lets the swapchain decide.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

pub fn present_mode_name(mode: vk::PresentModeKHR) -> &'static str {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => "Immediate",
        vk::PresentModeKHR::MAILBOX => "Mailbox",
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO Relaxed",
        vk::PresentModeKHR::SHARED_DEMAND_REFRESH => "Shared Demand Refresh",
        vk::PresentModeKHR::SHARED_CONTINUOUS_REFRESH => "Shared Continuous Refresh",
        _ => "Unknown",
    }
}
