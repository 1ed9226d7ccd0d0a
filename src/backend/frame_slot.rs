// Frame slots - per swapchain image framebuffer + command buffer
//
// Created as a batch once the swapchain and render pass exist, destroyed as a
// batch after the device is idle. Image views stay with the swapchain.

use ash::vk;
use std::sync::Arc;

use super::commands::{CommandPool, FramePass};
use super::{Swapchain, VulkanDevice};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub framebuffer: vk::Framebuffer,
    pub command_buffer: vk::CommandBuffer,
}

pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    device: Arc<VulkanDevice>,
}

impl FrameSlots {
    pub fn new(
        device: Arc<VulkanDevice>,
        swapchain: &Swapchain,
        render_pass: vk::RenderPass,
        pool: &CommandPool,
    ) -> EngineResult<Self> {
        let command_buffers = pool.allocate(swapchain.image_count() as u32)?;

        let mut frame_slots = Self {
            slots: Vec::with_capacity(swapchain.image_count()),
            device,
        };

        for (i, &image_view) in swapchain.image_views.iter().enumerate() {
            let framebuffer =
                create_framebuffer(&frame_slots.device, render_pass, image_view, swapchain.extent)?;
            log::debug!("Framebuffer created for frame {}", i);

            frame_slots.slots.push(FrameSlot {
                framebuffer,
                command_buffer: command_buffers[i],
            });
        }

        Ok(frame_slots)
    }

    pub fn get(&self, image_index: u32) -> Option<&FrameSlot> {
        self.slots.get(image_index as usize)
    }

    /// Render pass description for the slot of `image_index`.
    pub fn pass_for(
        &self,
        image_index: u32,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> Option<FramePass> {
        self.get(image_index).map(|slot| FramePass {
            render_pass,
            framebuffer: slot.framebuffer,
            pipeline,
            extent,
            clear_color,
        })
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for slot in &self.slots {
                self.device.device.destroy_framebuffer(slot.framebuffer, None);
            }
        }
    }
}

/// Framebuffer over one swapchain image view
pub fn create_framebuffer(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    image_view: vk::ImageView,
    extent: vk::Extent2D,
) -> EngineResult<vk::Framebuffer> {
    let attachments = &[image_view];
    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
        .map_err(EngineError::creation("framebuffer"))
}
