//! Render driver facade
//!
//! [`RenderDriver`] owns the device, swapchain, frame ring and resources for
//! one presentation surface and exposes the recording primitives a frame
//! loop needs:
//!
//! ```text
//! acquire_next_frame -> begin_command_buffer -> cmd_begin_rendering
//!     -> cmd_bind_pipeline / cmd_push_constants / cmd_draw
//!     -> cmd_end_rendering -> end_command_buffer -> submit_and_present_frame
//! ```
//!
//! The driver is single-threaded: every call is expected from the thread
//! that created it.

use ash::vk;
use std::mem::ManuallyDrop;

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::resources::{BufferHandle, MemoryLocality, PipelineHandle, ResourceFactory, Texture2DHandle};
use crate::vulkan::barrier::{self, TextureLayout};
use crate::vulkan::commands::CommandPool;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::instance::InstanceContext;
use crate::vulkan::pipeline::{validate_push_constant_range, PUSH_CONSTANT_STAGES};
use crate::vulkan::swapchain::{AcquireOutcome, SwapchainManager};
use crate::vulkan::sync::{FrameSyncRing, SlotSubmission, INFINITE_TIMEOUT};

/// Width over height, or 1.0 for a degenerate extent
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        return 1.0;
    }
    extent.width as f32 / extent.height as f32
}

/// Full-extent viewport with the standard depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor rectangle
pub const fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Rendering and resource driver for one presentation surface
///
/// Teardown is explicit rather than left to field order: the device is
/// drained, then frame sync objects, the command pool, the swapchain,
/// resources and allocator, the device, the surface and finally the
/// instance are destroyed.
pub struct RenderDriver {
    config: DriverConfig,
    frames: ManuallyDrop<FrameSyncRing>,
    command_pool: ManuallyDrop<CommandPool>,
    swapchain: ManuallyDrop<SwapchainManager>,
    resources: ManuallyDrop<ResourceFactory>,
    device: ManuallyDrop<DeviceContext>,
    instance: ManuallyDrop<InstanceContext>,
    surface: vk::SurfaceKHR,
    acquired_image: Option<u32>,
}

struct Parts {
    device: DeviceContext,
    swapchain: SwapchainManager,
    command_pool: CommandPool,
    resources: ResourceFactory,
    frames: FrameSyncRing,
}

impl RenderDriver {
    /// Bring the driver up on a host-created surface
    ///
    /// Takes ownership of `instance` and `surface`. On failure everything
    /// created so far, the surface included, is destroyed again.
    pub fn initialize(
        instance: InstanceContext,
        surface: vk::SurfaceKHR,
        config: DriverConfig,
    ) -> DriverResult<Self> {
        let parts = match Self::build_parts(&instance, surface, &config) {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("Render driver initialization failed: {}", e);
                unsafe { instance.destroy_surface(surface) };
                return Err(e);
            }
        };

        log::info!(
            "Render driver ready on {} ({} frames in flight)",
            parts.device.physical_info().name(),
            crate::vulkan::sync::FRAMES_IN_FLIGHT
        );

        Ok(Self {
            config,
            frames: ManuallyDrop::new(parts.frames),
            command_pool: ManuallyDrop::new(parts.command_pool),
            swapchain: ManuallyDrop::new(parts.swapchain),
            resources: ManuallyDrop::new(parts.resources),
            device: ManuallyDrop::new(parts.device),
            instance: ManuallyDrop::new(instance),
            surface,
            acquired_image: None,
        })
    }

    fn build_parts(
        instance: &InstanceContext,
        surface: vk::SurfaceKHR,
        config: &DriverConfig,
    ) -> DriverResult<Parts> {
        let (width, height) = config.fallback_extent;

        let device = DeviceContext::new(instance, surface)?;
        let swapchain = SwapchainManager::new(
            &device,
            surface,
            instance.surface_loader(),
            vk::Extent2D { width, height },
        )?;
        let command_pool = CommandPool::new(device.device().clone(), device.queue_family())?;
        let resources = ResourceFactory::new(instance, &device, config.shader_dir())?;
        let frames = FrameSyncRing::new(device.device(), &command_pool)?;

        Ok(Parts {
            device,
            swapchain,
            command_pool,
            resources,
            frames,
        })
    }

    // ---------------------------------------------------------------------
    // Frame pacing and swapchain
    // ---------------------------------------------------------------------

    /// Wait for the next frame slot to finish its previous work and return
    /// its command buffer
    ///
    /// Once the slot's fence has been waited on and reset, the surface is
    /// polled and the swapchain rebuilt if its extent no longer matches.
    pub fn acquire_next_frame(&mut self) -> DriverResult<vk::CommandBuffer> {
        self.acquired_image = None;
        let command_buffer = self.frames.acquire_next()?.command_buffer();

        if self.swapchain.needs_rebuild()? {
            self.rebuild_swapchain()?;
        }
        Ok(command_buffer)
    }

    /// Rebuild the swapchain against the current surface
    ///
    /// Returns `false` when the surface has zero area and the rebuild was
    /// deferred.
    pub fn rebuild_swapchain(&mut self) -> DriverResult<bool> {
        self.swapchain.rebuild(&self.device)
    }

    /// Extent to use when the surface leaves the choice to the swapchain
    ///
    /// Hosts call this on resize; the chain is rebuilt at the next frame.
    pub fn set_surface_extent(&mut self, width: u32, height: u32) {
        self.swapchain.set_fallback_extent(vk::Extent2D { width, height });
    }

    /// Block until the device has finished all submitted work
    pub fn device_wait_idle(&self) -> DriverResult<()> {
        self.device.wait_idle()
    }

    // ---------------------------------------------------------------------
    // Command buffers
    // ---------------------------------------------------------------------

    /// Allocate a primary command buffer from the driver's pool
    pub fn create_command_buffer(&self) -> DriverResult<vk::CommandBuffer> {
        self.create_command_buffers(1)?
            .pop()
            .ok_or(DriverError::Allocation {
                what: "command buffer",
                result: vk::Result::ERROR_UNKNOWN,
            })
    }

    /// Allocate `count` primary command buffers from the driver's pool
    pub fn create_command_buffers(&self, count: u32) -> DriverResult<Vec<vk::CommandBuffer>> {
        self.command_pool.allocate_command_buffers(count)
    }

    /// Return a command buffer to the pool
    ///
    /// The buffer must not be pending execution.
    pub fn destroy_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.destroy_command_buffers(&[command_buffer]);
    }

    /// Return command buffers to the pool
    ///
    /// None of the buffers may be pending execution.
    pub fn destroy_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.command_pool.free_command_buffers(command_buffers) };
    }

    /// Start recording; any previous contents are discarded
    pub fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> DriverResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .device()
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(DriverError::Api)
        }
    }

    /// Finish recording
    pub fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> DriverResult<()> {
        unsafe {
            self.device
                .device()
                .end_command_buffer(command_buffer)
                .map_err(DriverError::Api)
        }
    }

    // ---------------------------------------------------------------------
    // Recording
    // ---------------------------------------------------------------------

    /// Record a layout transition for a texture and track its new layout
    ///
    /// Unsupported pairs record nothing, keep the tracked layout and return
    /// [`DriverError::UnsupportedTransition`].
    pub fn cmd_texture_memory_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        texture: Texture2DHandle,
        new_layout: TextureLayout,
    ) -> DriverResult<()> {
        self.resources.cmd_texture_barrier(command_buffer, texture, new_layout)
    }

    /// Acquire the next swapchain image and open a rendering scope on it
    ///
    /// The image is cleared to the configured clear color. An out-of-date
    /// chain is rebuilt and acquisition retried once.
    pub fn cmd_begin_rendering(&mut self, command_buffer: vk::CommandBuffer) -> DriverResult<()> {
        let image_available = self.frames.current().image_available();

        let image_index = match self.swapchain.acquire_next_image(image_available, INFINITE_TIMEOUT)? {
            AcquireOutcome::Image(index) => index,
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date at acquire, rebuilding");
                self.rebuild_swapchain()?;
                match self.swapchain.acquire_next_image(image_available, INFINITE_TIMEOUT)? {
                    AcquireOutcome::Image(index) => index,
                    AcquireOutcome::OutOfDate => {
                        return Err(DriverError::Submission(vk::Result::ERROR_OUT_OF_DATE_KHR))
                    }
                }
            }
        };

        let chain = self.swapchain.swapchain()?;
        let (image, view) = chain
            .image(image_index)
            .zip(chain.image_view(image_index))
            .ok_or_else(|| DriverError::InvalidOperation {
                reason: format!("Swapchain returned image index {image_index} out of range"),
            })?;
        let extent = chain.extent();

        let device = self.device.device();
        barrier::record_swapchain_begin(device, command_buffer, image);

        let color_attachments = [vk::RenderingAttachmentInfo::builder()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.clear_color,
                },
            })
            .build()];

        let rendering_info = vk::RenderingInfo::builder()
            .render_area(full_scissor(extent))
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe {
            self.device
                .dynamic_rendering()
                .cmd_begin_rendering(command_buffer, &rendering_info);
        }

        self.acquired_image = Some(image_index);
        Ok(())
    }

    /// Close the rendering scope and move the image to present layout
    pub fn cmd_end_rendering(&self, command_buffer: vk::CommandBuffer) -> DriverResult<()> {
        let image_index = self.acquired_index()?;
        let image = self
            .swapchain
            .swapchain()?
            .image(image_index)
            .ok_or_else(|| DriverError::InvalidOperation {
                reason: format!("Acquired image {image_index} no longer exists"),
            })?;

        unsafe {
            self.device.dynamic_rendering().cmd_end_rendering(command_buffer);
        }
        barrier::record_swapchain_present(self.device.device(), command_buffer, image);
        Ok(())
    }

    /// Bind a graphics pipeline and cover the swapchain with viewport and scissor
    pub fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: PipelineHandle,
    ) -> DriverResult<()> {
        let pipeline = self.resources.pipeline(pipeline)?;
        let extent = self.swapchain.swapchain()?.extent();
        let device = self.device.device();

        unsafe {
            device.cmd_bind_pipeline(command_buffer, pipeline.bind_point(), pipeline.handle());
            device.cmd_set_viewport(command_buffer, 0, &[full_viewport(extent)]);
            device.cmd_set_scissor(command_buffer, 0, &[full_scissor(extent)]);
        }
        Ok(())
    }

    /// Bind one vertex buffer at binding 0
    pub fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: BufferHandle,
        offset: vk::DeviceSize,
    ) -> DriverResult<()> {
        self.cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[offset])
    }

    /// Bind vertex buffers to consecutive bindings starting at `first_binding`
    pub fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[BufferHandle],
        offsets: &[vk::DeviceSize],
    ) -> DriverResult<()> {
        if buffers.len() != offsets.len() {
            return Err(DriverError::InvalidOperation {
                reason: format!("{} vertex buffers given with {} offsets", buffers.len(), offsets.len()),
            });
        }

        let raw = buffers
            .iter()
            .map(|&handle| self.resources.buffer(handle).map(|buffer| buffer.handle()))
            .collect::<DriverResult<Vec<_>>>()?;

        unsafe {
            self.device
                .device()
                .cmd_bind_vertex_buffers(command_buffer, first_binding, &raw, offsets);
        }
        Ok(())
    }

    /// Update push constants of `pipeline`'s layout
    pub fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: PipelineHandle,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> DriverResult<()> {
        if stages.is_empty() || !PUSH_CONSTANT_STAGES.contains(stages) {
            return Err(DriverError::InvalidOperation {
                reason: format!("Push constants are not declared for stages {stages:?}"),
            });
        }
        validate_push_constant_range(offset, data.len())?;

        let layout = self.resources.pipeline(pipeline)?.layout();
        unsafe {
            self.device
                .device()
                .cmd_push_constants(command_buffer, layout, stages, offset, data);
        }
        Ok(())
    }

    /// Draw non-indexed vertices from the bound vertex buffers
    pub fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.device().cmd_draw(
                command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    /// Submit one command buffer to the queue
    ///
    /// `wait` gates the color-attachment-output stage. `fence` is reset
    /// before submission and signaled on completion. Submitting the current
    /// frame slot's command buffer on any other fence also signals the slot
    /// fence, so the slot is not reused while that work is in flight.
    pub fn submit_queue(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> DriverResult<()> {
        let device = self.device.device();
        if let Some(fence) = fence {
            unsafe { device.reset_fences(&[fence]).map_err(DriverError::Submission)? };
        }

        let command_buffers = [command_buffer];
        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait
            .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .into_iter()
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(
                    self.device.queue(),
                    &[submit_info.build()],
                    fence.unwrap_or_else(vk::Fence::null),
                )
                .map_err(DriverError::Submission)?;
        }

        let slot = self.frames.current();
        let (slot_command_buffer, slot_fence) = (slot.command_buffer(), slot.in_flight().handle());
        let submission = self
            .frames
            .pacer()
            .classify_submission(command_buffer == slot_command_buffer, fence == Some(slot_fence));

        match submission {
            SlotSubmission::SlotFence => self.frames.pacer_mut().mark_submitted(),
            SlotSubmission::ForeignFence => {
                // An empty batch signals once everything queued before it completes.
                unsafe {
                    device
                        .queue_submit(self.device.queue(), &[], slot_fence)
                        .map_err(DriverError::Submission)?;
                }
                self.frames.pacer_mut().mark_submitted();
            }
            SlotSubmission::Unrelated => {}
        }
        Ok(())
    }

    /// Submit the frame's command buffer and present the acquired image
    pub fn submit_and_present_frame(&mut self, command_buffer: vk::CommandBuffer) -> DriverResult<()> {
        let image_index = self.acquired_index()?;
        let render_finished = self
            .swapchain
            .swapchain()?
            .render_finished(image_index)
            .ok_or_else(|| DriverError::InvalidOperation {
                reason: format!("No render-finished semaphore for image {image_index}"),
            })?;

        let slot = self.frames.current();
        let (image_available, in_flight) = (slot.image_available(), slot.in_flight().handle());

        self.submit_queue(
            command_buffer,
            Some(image_available),
            Some(render_finished),
            Some(in_flight),
        )?;

        self.acquired_image = None;
        self.swapchain
            .present(self.device.queue(), image_index, render_finished)?;
        self.frames.pacer_mut().mark_presented();
        Ok(())
    }

    fn acquired_index(&self) -> DriverResult<u32> {
        self.acquired_image.ok_or_else(|| DriverError::InvalidOperation {
            reason: "No swapchain image acquired for this frame".to_string(),
        })
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    /// Create a buffer; see [`MemoryLocality::classify`] for placement
    pub fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> DriverResult<BufferHandle> {
        self.resources.create_buffer(size, usage)
    }

    /// Destroy a buffer
    pub fn destroy_buffer(&mut self, buffer: BufferHandle) -> DriverResult<()> {
        self.resources.destroy_buffer(buffer)
    }

    /// Write bytes to the start of a buffer, staging if it is device-local
    pub fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> DriverResult<()> {
        self.resources.write_buffer(buffer, data)
    }

    /// Read the start of a host-visible buffer
    pub fn read_buffer(&mut self, buffer: BufferHandle, out: &mut [u8]) -> DriverResult<()> {
        self.resources.read_buffer(buffer, out)
    }

    /// Copy between buffers, blocking until the copy completes
    pub fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: vk::DeviceSize,
        dst: BufferHandle,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> DriverResult<()> {
        self.resources.copy_buffer(src, src_offset, dst, dst_offset, size)
    }

    /// Size of a buffer in bytes
    pub fn buffer_size(&self, buffer: BufferHandle) -> DriverResult<vk::DeviceSize> {
        self.resources.buffer(buffer).map(|b| b.size())
    }

    /// Memory locality of a buffer
    pub fn buffer_locality(&self, buffer: BufferHandle) -> DriverResult<MemoryLocality> {
        self.resources.buffer_locality(buffer)
    }

    /// Create a 2D texture in undefined layout
    pub fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> DriverResult<Texture2DHandle> {
        self.resources.create_texture_2d(width, height, format, usage)
    }

    /// Destroy a texture
    pub fn destroy_texture_2d(&mut self, texture: Texture2DHandle) -> DriverResult<()> {
        self.resources.destroy_texture_2d(texture)
    }

    /// Upload pixels; the texture ends in [`TextureLayout::TransferDst`]
    pub fn write_texture_2d(&mut self, texture: Texture2DHandle, pixels: &[u8]) -> DriverResult<()> {
        self.resources.write_texture_2d(texture, pixels)
    }

    /// Tracked layout of a texture
    pub fn texture_layout(&self, texture: Texture2DHandle) -> DriverResult<TextureLayout> {
        self.resources.texture_layout(texture)
    }

    /// Extent of a texture
    pub fn texture_extent(&self, texture: Texture2DHandle) -> DriverResult<vk::Extent2D> {
        self.resources.texture(texture).map(|t| t.extent())
    }

    /// Image view of a texture, for descriptor writes by the host
    pub fn texture_view(&self, texture: Texture2DHandle) -> DriverResult<vk::ImageView> {
        self.resources.texture(texture).map(|t| t.view())
    }

    /// Build the fixed pipeline from `{name}.vert.spv` and `{name}.frag.spv`
    /// targeting the swapchain's color format
    pub fn create_pipeline(&mut self, name: &str) -> DriverResult<PipelineHandle> {
        let format = self.swapchain.swapchain()?.format().format;
        self.resources.create_pipeline(name, format)
    }

    /// Destroy a pipeline
    pub fn destroy_pipeline(&mut self, pipeline: PipelineHandle) -> DriverResult<()> {
        self.resources.destroy_pipeline(pipeline)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Instance the driver runs on
    pub fn instance(&self) -> &ash::Instance {
        self.instance.instance()
    }

    /// Selected physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.device.physical_device()
    }

    /// Logical device
    pub fn device(&self) -> &ash::Device {
        self.device.device()
    }

    /// Family of the combined graphics and present queue
    pub fn queue_family_index(&self) -> u32 {
        self.device.queue_family()
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.queue()
    }

    /// Present queue; the same queue as [`Self::graphics_queue`]
    pub fn present_queue(&self) -> vk::Queue {
        self.device.queue()
    }

    /// Color format and space of the swapchain
    pub fn surface_format(&self) -> DriverResult<vk::SurfaceFormatKHR> {
        self.swapchain.swapchain().map(|chain| chain.format())
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> DriverResult<vk::Extent2D> {
        self.swapchain.swapchain().map(|chain| chain.extent())
    }

    /// Width over height of the swapchain
    pub fn swapchain_aspect_ratio(&self) -> DriverResult<f32> {
        self.swapchain_extent().map(aspect_ratio)
    }

    /// Image count requested from the surface
    pub fn min_image_count(&self) -> DriverResult<u32> {
        self.swapchain.swapchain().map(|chain| chain.min_image_count())
    }

    /// Image count the swapchain actually has
    pub fn image_count(&self) -> DriverResult<u32> {
        self.swapchain.swapchain().map(|chain| chain.image_count())
    }

    /// API version the instance was created with
    pub fn api_version(&self) -> u32 {
        self.instance.api_version()
    }

    /// Configuration the driver was initialized with
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        log::debug!("Shutting down render driver");
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait before shutdown failed: {}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.command_pool);
            self.swapchain.release();
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.resources);
            ManuallyDrop::drop(&mut self.device);
            self.instance.destroy_surface(self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_is_fractional() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        assert!((aspect_ratio(extent) - 16.0 / 9.0).abs() < 1e-6);

        // 800 / 600 would truncate to 1 with integer division.
        let extent = vk::Extent2D { width: 800, height: 600 };
        assert!((aspect_ratio(extent) - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_ratio_degenerate_extent() {
        assert_eq!(aspect_ratio(vk::Extent2D { width: 640, height: 0 }), 1.0);
    }

    #[test]
    fn test_viewport_covers_extent() {
        let extent = vk::Extent2D { width: 1024, height: 768 };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.width, viewport.height), (1024.0, 768.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!(scissor.extent, extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
    }
}
