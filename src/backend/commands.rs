//! Command pool and per-frame command recording.
//!
//! [`record_frame`] owns the order of commands for one frame. It drives a
//! [`CommandEncoder`], implemented by [`VulkanEncoder`] for real command
//! buffers.

use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::{EngineError, EngineResult, FrameStage};

/// Everything one frame's render pass needs.
#[derive(Debug, Clone, Copy)]
pub struct FramePass {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// Minimal command vocabulary of a frame.
pub trait CommandEncoder {
    fn reset(&mut self) -> EngineResult<()>;
    fn begin(&mut self) -> EngineResult<()>;
    fn begin_render_pass(&mut self, pass: &FramePass);
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn end_render_pass(&mut self);
    fn end(&mut self) -> EngineResult<()>;
}

/// Reset and re-record a frame's command buffer from scratch.
///
/// The caller guarantees the fence of the buffer's previous submission has
/// signaled.
pub fn record_frame<E: CommandEncoder + ?Sized>(encoder: &mut E, pass: &FramePass) -> EngineResult<()> {
    encoder.reset()?;
    encoder.begin()?;
    encoder.begin_render_pass(pass);
    encoder.bind_pipeline(pass.pipeline);
    encoder.draw(3, 1, 0, 0);
    encoder.end_render_pass();
    encoder.end()
}

/// Records into a primary command buffer.
pub struct VulkanEncoder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> VulkanEncoder<'a> {
    pub fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
        }
    }
}

impl CommandEncoder for VulkanEncoder<'_> {
    fn reset(&mut self) -> EngineResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(EngineError::frame(FrameStage::Record))
    }

    fn begin(&mut self) -> EngineResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }
            .map_err(EngineError::frame(FrameStage::Record))
    }

    fn begin_render_pass(&mut self, pass: &FramePass) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: pass.clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pass.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.cmd_end_render_pass(self.command_buffer) };
    }

    fn end(&mut self) -> EngineResult<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .map_err(EngineError::frame(FrameStage::Record))
    }
}

/// Command pool on the graphics family; buffers are individually resettable.
pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    pub fn new(device: Arc<VulkanDevice>) -> EngineResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(EngineError::creation("command pool"))?;

        Ok(Self { pool, device })
    }

    pub fn allocate(&self, count: u32) -> EngineResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .map_err(EngineError::creation("command buffers"))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Also frees every buffer allocated from it
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
