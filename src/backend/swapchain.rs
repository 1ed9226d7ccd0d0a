// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Extent and format are fixed for the lifetime of the chain.

use ash::vk;
use std::sync::Arc;

use super::adapter::QueueFamilyIndices;
use super::capabilities::{present_mode_name, SurfaceConfig, SwapchainSupport};
use super::{Surface, VulkanDevice};
use crate::error::{EngineError, EngineResult, FrameStage};

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
    // The surface must outlive the swapchain built on it
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: Arc<Surface>,
        width: u32,
        height: u32,
        preferred_mode: Option<vk::PresentModeKHR>,
    ) -> EngineResult<Self> {
        log::info!("Creating swapchain: {}x{} requested", width, height);

        let support = SwapchainSupport::query(&surface, device.physical_device)?;
        support.log_report();

        let config = SurfaceConfig::negotiate(&support, width, height, preferred_mode)?;
        log::info!(
            "Present mode: {}, format: {:?}, extent: {}x{}",
            present_mode_name(config.present_mode),
            config.format.format,
            config.extent.width,
            config.extent.height
        );

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance().instance, &device.device);

        let (sharing_mode, family_indices) = sharing_mode(&device.queue_families);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(EngineError::creation("swapchain"))?;

        // From here on a failure must release the swapchain and any views made so far
        let mut chain = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: config.format.format,
            extent: config.extent,
            present_mode: config.present_mode,
            device,
            _surface: surface,
        };

        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(chain.swapchain) }
            .map_err(EngineError::creation("swapchain image list"))?;

        log::info!("Created swapchain with {} images", chain.images.len());

        for i in 0..chain.images.len() {
            let view = chain.create_image_view(chain.images[i])?;
            chain.image_views.push(view);
        }

        Ok(chain)
    }

    fn create_image_view(&self, image: vk::Image) -> EngineResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.device.create_image_view(&create_info, None) }
            .map_err(EngineError::creation("image view"))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering
    ///
    /// `semaphore` is signaled once the image is actually writable; the
    /// returned index alone does not guarantee that.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> EngineResult<AcquiredImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
        .map_err(EngineError::frame(FrameStage::Acquire))?;

        Ok(AcquiredImage { index, suboptimal })
    }

    /// Present rendered image to screen
    ///
    /// Returns whether the chain is suboptimal for the surface.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> EngineResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .map_err(EngineError::frame(FrameStage::Present))
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Concurrent sharing across both families when they differ, exclusive otherwise.
pub fn sharing_mode(indices: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match (indices.graphics, indices.present) {
        (Some(graphics), Some(present)) if graphics != present => {
            (vk::SharingMode::CONCURRENT, vec![graphics, present])
        }
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharing_mode_exclusive_for_shared_family() {
        let indices = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };

        let (mode, families) = sharing_mode(&indices);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());
    }

    #[test]
    fn test_sharing_mode_concurrent_lists_both_families() {
        let indices = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };

        let (mode, families) = sharing_mode(&indices);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }
}
