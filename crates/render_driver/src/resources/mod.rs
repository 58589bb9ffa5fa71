//! GPU resource handles and their records
//!
//! Handles are generation-checked arena keys. Destroying a resource removes
//! its record, so a stale handle is reported as [`crate::DriverError::InvalidHandle`]
//! instead of reaching freed memory.

use ash::vk;

mod factory;

#[cfg(test)]
mod gpu_tests;

pub use crate::vulkan::allocator::MemoryLocality;
pub use factory::ResourceFactory;

use crate::vulkan::barrier::TextureLayout;

slotmap::new_key_type! {
    /// Handle to a buffer created by [`ResourceFactory::create_buffer`]
    pub struct BufferHandle;

    /// Handle to a 2D texture created by [`ResourceFactory::create_texture_2d`]
    pub struct Texture2DHandle;

    /// Handle to a pipeline created by [`ResourceFactory::create_pipeline`]
    pub struct PipelineHandle;
}

/// Buffer record
pub struct Buffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    locality: MemoryLocality,
}

impl Buffer {
    /// Raw buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags given at creation
    pub const fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory locality decided at creation
    pub const fn locality(&self) -> MemoryLocality {
        self.locality
    }

    /// Whether `len` bytes at `offset` lie inside the buffer
    pub fn contains_range(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> bool {
        offset.checked_add(len).map_or(false, |end| end <= self.size)
    }
}

/// 2D texture record
pub struct Texture2D {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) allocation: vk_mem::Allocation,
    width: u32,
    height: u32,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    layout: TextureLayout,
}

impl Texture2D {
    /// Raw image handle
    pub const fn image(&self) -> vk::Image {
        self.image
    }

    /// Full-extent image view
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Extent in texels
    pub const fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Texel format
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Aspect covered by barriers and copies
    pub const fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Layout the texture is currently tracked in
    pub const fn layout(&self) -> TextureLayout {
        self.layout
    }
}

/// Bytes per texel for common uncompressed formats
pub const fn texel_size(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::S8_UINT => Some(1),
        vk::Format::R8G8_UNORM | vk::Format::R16_SFLOAT | vk::Format::D16_UNORM => Some(2),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT
        | vk::Format::D32_SFLOAT => Some(4),
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => Some(8),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_destroyed_handle_is_invalidated() {
        let mut arena: SlotMap<BufferHandle, u32> = SlotMap::with_key();
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);

        // The slot is reused but the generation differs.
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&2));
    }

    #[test]
    fn test_default_handle_is_never_live() {
        let mut arena: SlotMap<Texture2DHandle, u32> = SlotMap::with_key();
        arena.insert(7);
        assert!(arena.get(Texture2DHandle::default()).is_none());
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }
}
