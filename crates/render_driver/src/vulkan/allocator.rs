//! GPU memory allocation through the VMA sub-allocator
//!
//! Every buffer and image the driver creates is allocated here. Callers pick
//! a coarse [`MemoryLocality`] and never see raw memory types.

use ash::vk;
use vk_mem::Alloc;

use super::device::DeviceContext;
use super::instance::InstanceContext;
use crate::error::{DriverError, DriverResult};

/// Where a resource's memory lives, decided once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocality {
    /// Device-local memory with no host access
    DeviceLocal,
    /// Host-visible memory used as an upload path to the device
    HostVisible,
    /// Left to the allocator
    Unknown,
}

impl MemoryLocality {
    /// Classify buffer memory from its usage flags
    ///
    /// Transfer source and destination together means a device-side copy
    /// target. Transfer source alone is an upload buffer. Any vertex, index,
    /// uniform or storage usage lives on the device. Everything else stays
    /// host visible.
    pub fn classify(usage: vk::BufferUsageFlags) -> Self {
        let src = usage.contains(vk::BufferUsageFlags::TRANSFER_SRC);
        let dst = usage.contains(vk::BufferUsageFlags::TRANSFER_DST);

        if src && dst {
            return Self::DeviceLocal;
        }
        if src {
            return Self::HostVisible;
        }

        let device_usage = vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::UNIFORM_BUFFER
            | vk::BufferUsageFlags::STORAGE_BUFFER;
        if usage.intersects(device_usage) {
            Self::DeviceLocal
        } else {
            Self::HostVisible
        }
    }

    /// Whether the host may map this memory
    pub const fn is_host_visible(self) -> bool {
        matches!(self, Self::HostVisible)
    }

    /// Allocator usage hint for this locality
    pub const fn memory_usage(self) -> vk_mem::MemoryUsage {
        match self {
            Self::DeviceLocal => vk_mem::MemoryUsage::GpuOnly,
            Self::HostVisible => vk_mem::MemoryUsage::CpuToGpu,
            Self::Unknown => vk_mem::MemoryUsage::Auto,
        }
    }
}

/// Wrapper around `vk_mem::Allocator` bound to one device
pub struct MemoryAllocator {
    allocator: vk_mem::Allocator,
}

impl MemoryAllocator {
    /// Create an allocator for the device
    pub fn new(instance: &InstanceContext, device: &DeviceContext) -> DriverResult<Self> {
        let allocator = vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(
            instance.instance(),
            device.device(),
            device.physical_device(),
        ))
        .map_err(|e| DriverError::Initialization(format!("Allocator creation failed: {e:?}")))?;

        Ok(Self { allocator })
    }

    /// Create a buffer with memory of the given locality
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        locality: MemoryLocality,
    ) -> DriverResult<(vk::Buffer, vk_mem::Allocation)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: locality.memory_usage(),
            ..Default::default()
        };

        unsafe {
            self.allocator
                .create_buffer(&buffer_info, &allocation_info)
                .map_err(DriverError::allocation("buffer"))
        }
    }

    /// Create an image with memory of the given locality
    pub fn create_image(
        &self,
        image_info: &vk::ImageCreateInfo,
        locality: MemoryLocality,
    ) -> DriverResult<(vk::Image, vk_mem::Allocation)> {
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: locality.memory_usage(),
            ..Default::default()
        };

        unsafe {
            self.allocator
                .create_image(image_info, &allocation_info)
                .map_err(DriverError::allocation("image"))
        }
    }

    /// Copy `data` into host-visible memory at `offset`
    ///
    /// # Safety
    /// The allocation must be host visible and at least `offset + data.len()` bytes.
    pub unsafe fn write(
        &self,
        allocation: &mut vk_mem::Allocation,
        offset: usize,
        data: &[u8],
    ) -> DriverResult<()> {
        let mapped = self
            .allocator
            .map_memory(allocation)
            .map_err(DriverError::Api)?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset), data.len());
        self.allocator.unmap_memory(allocation);
        Ok(())
    }

    /// Copy host-visible memory starting at `offset` into `out`
    ///
    /// # Safety
    /// The allocation must be host visible and at least `offset + out.len()` bytes.
    pub unsafe fn read(
        &self,
        allocation: &mut vk_mem::Allocation,
        offset: usize,
        out: &mut [u8],
    ) -> DriverResult<()> {
        let mapped = self
            .allocator
            .map_memory(allocation)
            .map_err(DriverError::Api)?;
        std::ptr::copy_nonoverlapping(mapped.add(offset), out.as_mut_ptr(), out.len());
        self.allocator.unmap_memory(allocation);
        Ok(())
    }

    /// Destroy a buffer and free its memory
    ///
    /// # Safety
    /// No pending GPU work may reference the buffer.
    pub unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation) {
        self.allocator.destroy_buffer(buffer, allocation);
    }

    /// Destroy an image and free its memory
    ///
    /// # Safety
    /// No pending GPU work may reference the image.
    pub unsafe fn destroy_image(&self, image: vk::Image, allocation: &mut vk_mem::Allocation) {
        self.allocator.destroy_image(image, allocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type U = vk::BufferUsageFlags;

    #[test]
    fn test_transfer_src_and_dst_is_device_local() {
        assert_eq!(
            MemoryLocality::classify(U::TRANSFER_SRC | U::TRANSFER_DST),
            MemoryLocality::DeviceLocal
        );
    }

    #[test]
    fn test_transfer_src_alone_is_host_visible() {
        assert_eq!(MemoryLocality::classify(U::TRANSFER_SRC), MemoryLocality::HostVisible);
        // Transfer source wins over device usages when it stands alone.
        assert_eq!(
            MemoryLocality::classify(U::TRANSFER_SRC | U::VERTEX_BUFFER),
            MemoryLocality::HostVisible
        );
    }

    #[test]
    fn test_device_usages_are_device_local() {
        for usage in [U::VERTEX_BUFFER, U::INDEX_BUFFER, U::UNIFORM_BUFFER, U::STORAGE_BUFFER] {
            assert_eq!(MemoryLocality::classify(usage), MemoryLocality::DeviceLocal);
            assert_eq!(
                MemoryLocality::classify(usage | U::TRANSFER_DST),
                MemoryLocality::DeviceLocal
            );
        }
    }

    #[test]
    fn test_default_is_host_visible() {
        assert_eq!(MemoryLocality::classify(U::empty()), MemoryLocality::HostVisible);
        assert_eq!(MemoryLocality::classify(U::TRANSFER_DST), MemoryLocality::HostVisible);
    }

    #[test]
    fn test_usage_hint_mapping() {
        assert!(matches!(
            MemoryLocality::DeviceLocal.memory_usage(),
            vk_mem::MemoryUsage::GpuOnly
        ));
        assert!(matches!(
            MemoryLocality::HostVisible.memory_usage(),
            vk_mem::MemoryUsage::CpuToGpu
        ));
        assert!(matches!(MemoryLocality::Unknown.memory_usage(), vk_mem::MemoryUsage::Auto));
        assert!(MemoryLocality::HostVisible.is_host_visible());
        assert!(!MemoryLocality::DeviceLocal.is_host_visible());
    }
}
