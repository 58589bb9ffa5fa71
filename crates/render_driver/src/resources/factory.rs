//! Creation, upload and destruction of buffers, 2D textures and pipelines

use ash::{vk, Device};
use slotmap::SlotMap;
use std::path::PathBuf;

use super::{texel_size, Buffer, BufferHandle, PipelineHandle, Texture2D, Texture2DHandle};
use crate::error::{DriverError, DriverResult};
use crate::vulkan::allocator::{MemoryAllocator, MemoryLocality};
use crate::vulkan::barrier::{self, TextureLayout};
use crate::vulkan::commands::TransferContext;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::instance::InstanceContext;
use crate::vulkan::pipeline::GraphicsPipeline;

/// Owns every buffer, texture and pipeline handed out to the caller
///
/// Handles are caller-owned: each is destroyed through the matching
/// `destroy_*` call. Whatever is still alive when the factory drops is
/// released with a warning.
pub struct ResourceFactory {
    device: Device,
    transfer: TransferContext,
    buffers: SlotMap<BufferHandle, Buffer>,
    textures: SlotMap<Texture2DHandle, Texture2D>,
    pipelines: SlotMap<PipelineHandle, GraphicsPipeline>,
    shader_dir: PathBuf,
    allocator: MemoryAllocator,
}

impl ResourceFactory {
    /// Create the allocator and transfer context for `device`
    pub fn new(
        instance: &InstanceContext,
        device: &DeviceContext,
        shader_dir: impl Into<PathBuf>,
    ) -> DriverResult<Self> {
        let allocator = MemoryAllocator::new(instance, device)?;
        let transfer = TransferContext::new(
            device.device().clone(),
            device.queue(),
            device.queue_family(),
        )?;

        Ok(Self {
            device: device.device().clone(),
            transfer,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            shader_dir: shader_dir.into(),
            allocator,
        })
    }

    // ---------------------------------------------------------------------
    // Buffers
    // ---------------------------------------------------------------------

    /// Create a buffer; its memory locality is classified from `usage`
    pub fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> DriverResult<BufferHandle> {
        if size == 0 {
            return Err(DriverError::InvalidOperation {
                reason: "Buffer size must be non-zero".to_string(),
            });
        }

        let locality = MemoryLocality::classify(usage);
        let (buffer, allocation) = self.allocator.create_buffer(size, usage, locality)?;
        log::trace!("Created {:?} buffer of {} bytes", locality, size);

        Ok(self.buffers.insert(Buffer {
            buffer,
            allocation,
            size,
            usage,
            locality,
        }))
    }

    /// Destroy a buffer; the handle is invalid afterwards
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> DriverResult<()> {
        let mut record = self
            .buffers
            .remove(handle)
            .ok_or(DriverError::InvalidHandle { kind: "buffer" })?;
        unsafe { self.allocator.destroy_buffer(record.buffer, &mut record.allocation) };
        Ok(())
    }

    /// Buffer record
    pub fn buffer(&self, handle: BufferHandle) -> DriverResult<&Buffer> {
        self.buffers
            .get(handle)
            .ok_or(DriverError::InvalidHandle { kind: "buffer" })
    }

    /// Memory locality of a buffer
    pub fn buffer_locality(&self, handle: BufferHandle) -> DriverResult<MemoryLocality> {
        self.buffer(handle).map(Buffer::locality)
    }

    /// Write `data` to the start of a buffer
    ///
    /// Host-visible buffers are mapped and written directly. Device-local
    /// buffers are filled through a temporary staging buffer and a blocking
    /// copy.
    pub fn write_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> DriverResult<()> {
        let record = self.buffer(handle)?;
        let (size, usage, locality) = (record.size(), record.usage(), record.locality());
        let len = data.len() as vk::DeviceSize;
        if !record.contains_range(0, len) {
            return Err(DriverError::InvalidOperation {
                reason: format!("Write of {len} bytes exceeds buffer of {size} bytes"),
            });
        }

        if locality.is_host_visible() {
            let record = self
                .buffers
                .get_mut(handle)
                .ok_or(DriverError::InvalidHandle { kind: "buffer" })?;
            return unsafe { self.allocator.write(&mut record.allocation, 0, data) };
        }

        if !usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
            return Err(DriverError::InvalidOperation {
                reason: "Device-local buffer needs TRANSFER_DST usage to be written".to_string(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let staging = self.create_buffer(len, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let result = self
            .write_buffer(staging, data)
            .and_then(|()| self.copy_buffer(staging, 0, handle, 0, len));
        self.destroy_buffer(staging)?;
        result
    }

    /// Read the start of a host-visible buffer into `out`
    pub fn read_buffer(&mut self, handle: BufferHandle, out: &mut [u8]) -> DriverResult<()> {
        let record = self
            .buffers
            .get_mut(handle)
            .ok_or(DriverError::InvalidHandle { kind: "buffer" })?;

        if !record.locality().is_host_visible() {
            return Err(DriverError::HostAccess { size: record.size() });
        }
        let len = out.len() as vk::DeviceSize;
        if !record.contains_range(0, len) {
            return Err(DriverError::InvalidOperation {
                reason: format!("Read of {len} bytes exceeds buffer of {} bytes", record.size()),
            });
        }

        unsafe { self.allocator.read(&mut record.allocation, 0, out) }
    }

    /// Copy `size` bytes between buffers and wait for completion
    pub fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: vk::DeviceSize,
        dst: BufferHandle,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> DriverResult<()> {
        let src_record = self.buffer(src)?;
        let dst_record = self.buffer(dst)?;
        if !src_record.contains_range(src_offset, size) || !dst_record.contains_range(dst_offset, size) {
            return Err(DriverError::InvalidOperation {
                reason: format!("Copy of {size} bytes is out of bounds"),
            });
        }

        let (src_buffer, dst_buffer) = (src_record.handle(), dst_record.handle());
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };

        self.transfer.submit_and_wait(|device, command_buffer| {
            unsafe { device.cmd_copy_buffer(command_buffer, src_buffer, dst_buffer, &[region]) };
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Textures
    // ---------------------------------------------------------------------

    /// Create a 2D texture with one mip level, one layer and one sample
    ///
    /// `TRANSFER_DST` is always added to `usage` so the texture can be
    /// uploaded to. The texture starts in [`TextureLayout::Undefined`].
    pub fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> DriverResult<Texture2DHandle> {
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidOperation {
                reason: format!("Texture extent {width}x{height} must be non-zero"),
            });
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, mut allocation) = self.allocator.create_image(&image_info, MemoryLocality::Unknown)?;

        let aspect = barrier::aspect_for_format(format);
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(DriverError::Allocation {
                    what: "texture view",
                    result: e,
                });
            }
        };

        log::trace!("Created {}x{} {:?} texture", width, height, format);
        Ok(self.textures.insert(Texture2D {
            image,
            view,
            allocation,
            width,
            height,
            format,
            aspect,
            layout: TextureLayout::Undefined,
        }))
    }

    /// Destroy a texture and its view; the handle is invalid afterwards
    pub fn destroy_texture_2d(&mut self, handle: Texture2DHandle) -> DriverResult<()> {
        let mut record = self
            .textures
            .remove(handle)
            .ok_or(DriverError::InvalidHandle { kind: "texture" })?;
        unsafe {
            self.device.destroy_image_view(record.view, None);
            self.allocator.destroy_image(record.image, &mut record.allocation);
        }
        Ok(())
    }

    /// Texture record
    pub fn texture(&self, handle: Texture2DHandle) -> DriverResult<&Texture2D> {
        self.textures
            .get(handle)
            .ok_or(DriverError::InvalidHandle { kind: "texture" })
    }

    /// Layout a texture is currently tracked in
    pub fn texture_layout(&self, handle: Texture2DHandle) -> DriverResult<TextureLayout> {
        self.texture(handle).map(Texture2D::layout)
    }

    /// Upload pixels covering the whole texture and wait for completion
    ///
    /// The texture is left in [`TextureLayout::TransferDst`]; moving it to a
    /// shader-readable layout is a separate barrier call.
    pub fn write_texture_2d(&mut self, handle: Texture2DHandle, pixels: &[u8]) -> DriverResult<()> {
        let record = self.texture(handle)?;
        let (image, aspect, extent, layout) =
            (record.image(), record.aspect(), record.extent(), record.layout());

        let len = pixels.len() as vk::DeviceSize;
        let expected = texel_size(record.format())
            .map(|texel| u64::from(extent.width) * u64::from(extent.height) * texel);
        if pixels.is_empty() || expected.map_or(false, |expected| len < expected) {
            return Err(DriverError::InvalidOperation {
                reason: format!(
                    "{len} bytes of pixels do not cover a {}x{} {:?} texture",
                    extent.width,
                    extent.height,
                    record.format()
                ),
            });
        }

        // Re-uploads into an already transfer-ready texture need no barrier.
        let needs_barrier = layout != TextureLayout::TransferDst;
        if needs_barrier {
            barrier::lookup_transition(layout, TextureLayout::TransferDst)
                .map_err(|(from, to)| DriverError::UnsupportedTransition { from, to })?;
        }

        let staging = self.create_buffer(len, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let staging_buffer = self.buffer(staging)?.handle();

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };

        let result = self.write_buffer(staging, pixels).and_then(|()| {
            self.transfer.submit_and_wait(|device, command_buffer| {
                if needs_barrier {
                    barrier::record_texture_transition(
                        device,
                        command_buffer,
                        image,
                        aspect,
                        layout,
                        TextureLayout::TransferDst,
                    )?;
                }
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        command_buffer,
                        staging_buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Ok(())
            })
        });
        self.destroy_buffer(staging)?;
        result?;

        if let Some(record) = self.textures.get_mut(handle) {
            record.layout = TextureLayout::TransferDst;
        }
        Ok(())
    }

    /// Record a layout transition for a texture into `command_buffer`
    ///
    /// The tracked layout changes only when a barrier was recorded. An
    /// unsupported pair records nothing and leaves the layout as it was.
    pub fn cmd_texture_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        handle: Texture2DHandle,
        new_layout: TextureLayout,
    ) -> DriverResult<()> {
        let record = self
            .textures
            .get_mut(handle)
            .ok_or(DriverError::InvalidHandle { kind: "texture" })?;

        record.layout = barrier::record_texture_transition(
            &self.device,
            command_buffer,
            record.image,
            record.aspect,
            record.layout,
            new_layout,
        )?;
        Ok(())
    }

    /// Record a layout transition and submit it on its own, waiting for completion
    pub fn transition_texture_now(
        &mut self,
        handle: Texture2DHandle,
        new_layout: TextureLayout,
    ) -> DriverResult<()> {
        let record = self.texture(handle)?;
        let (image, aspect, layout) = (record.image(), record.aspect(), record.layout());

        self.transfer.submit_and_wait(|device, command_buffer| {
            barrier::record_texture_transition(device, command_buffer, image, aspect, layout, new_layout)
                .map(|_| ())
        })?;

        if let Some(record) = self.textures.get_mut(handle) {
            record.layout = new_layout;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pipelines
    // ---------------------------------------------------------------------

    /// Build the fixed graphics pipeline from the shader pair `name`
    pub fn create_pipeline(
        &mut self,
        name: &str,
        color_format: vk::Format,
    ) -> DriverResult<PipelineHandle> {
        let pipeline =
            GraphicsPipeline::from_shader_name(self.device.clone(), &self.shader_dir, name, color_format)?;
        Ok(self.pipelines.insert(pipeline))
    }

    /// Destroy a pipeline; the handle is invalid afterwards
    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) -> DriverResult<()> {
        self.pipelines
            .remove(handle)
            .map(drop)
            .ok_or(DriverError::InvalidHandle { kind: "pipeline" })
    }

    /// Pipeline record
    pub fn pipeline(&self, handle: PipelineHandle) -> DriverResult<&GraphicsPipeline> {
        self.pipelines
            .get(handle)
            .ok_or(DriverError::InvalidHandle { kind: "pipeline" })
    }

    /// Number of live buffers, textures and pipelines
    pub fn live_counts(&self) -> (usize, usize, usize) {
        (self.buffers.len(), self.textures.len(), self.pipelines.len())
    }

    fn release_all(&mut self) {
        let (buffers, textures, pipelines) = self.live_counts();
        if buffers + textures + pipelines > 0 {
            log::warn!(
                "Releasing leaked resources: {} buffers, {} textures, {} pipelines",
                buffers,
                textures,
                pipelines
            );
        }

        for (_, mut record) in self.buffers.drain() {
            unsafe { self.allocator.destroy_buffer(record.buffer, &mut record.allocation) };
        }
        for (_, mut record) in self.textures.drain() {
            unsafe {
                self.device.destroy_image_view(record.view, None);
                self.allocator.destroy_image(record.image, &mut record.allocation);
            }
        }
        self.pipelines.clear();
    }
}

impl Drop for ResourceFactory {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.release_all();
    }
}
