//! Physical device selection and logical device creation
//!
//! The driver runs everything on one queue family that supports both graphics
//! and presentation. Devices without such a family are rejected outright.

use ash::extensions::khr::{DynamicRendering, Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::ffi::{c_char, CStr};

use super::instance::InstanceContext;
use crate::error::{DriverError, DriverResult};

/// Extensions every candidate device must expose
pub fn required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
    let mut extensions = Vec::with_capacity(3);
    if presenting {
        extensions.push(SwapchainLoader::name());
    }
    extensions.push(DynamicRendering::name());
    extensions.push(vk::ExtDescriptorIndexingFn::name());
    extensions
}

/// Extensions enabled when the device advertises them
pub fn optional_device_extensions() -> [&'static CStr; 2] {
    [
        vk::KhrMaintenance3Fn::name(),
        vk::KhrPortabilitySubsetFn::name(),
    ]
}

/// First queue family with graphics support that also passes `supports_present`
pub fn find_combined_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .zip(0u32..)
        .filter(|(family, _)| family.queue_count > 0)
        .filter(|(family, _)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(_, index)| index)
        .find(|&index| supports_present(index))
}

/// Required extensions that are absent from `available`
pub fn missing_extensions<'a>(available: &[&CStr], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .filter(|required| !available.contains(required))
        .copied()
        .collect()
}

/// Preference rank of a device type; higher wins
pub const fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Index of the combined graphics+present queue family
    pub queue_family: u32,
    /// Optional extensions this device advertises
    pub optional_extensions: Vec<&'static CStr>,
}

impl PhysicalDeviceInfo {
    /// Select the best suitable physical device
    ///
    /// With `surface` set, the queue family must be able to present to it and
    /// the swapchain extension is required.
    pub fn select_suitable_device(
        instance: &InstanceContext,
        surface: Option<vk::SurfaceKHR>,
    ) -> DriverResult<Self> {
        let devices = unsafe {
            instance
                .instance()
                .enumerate_physical_devices()
                .map_err(|e| DriverError::Initialization(format!("Device enumeration failed: {e:?}")))?
        };

        let mut best: Option<Self> = None;
        for device in devices {
            match Self::evaluate_device(instance, device, surface) {
                Ok(candidate) => {
                    let better = best.as_ref().map_or(true, |current| {
                        device_type_score(candidate.properties.device_type)
                            > device_type_score(current.properties.device_type)
                    });
                    if better {
                        best = Some(candidate);
                    }
                }
                Err(reason) => log::debug!("Skipping GPU: {}", reason),
            }
        }

        let selected = best.ok_or_else(|| {
            DriverError::Initialization("No suitable GPU found".to_string())
        })?;
        log::info!("Selected GPU: {}", selected.name());
        Ok(selected)
    }

    fn evaluate_device(
        context: &InstanceContext,
        device: vk::PhysicalDevice,
        surface: Option<vk::SurfaceKHR>,
    ) -> Result<Self, String> {
        let instance = context.instance();
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_family = find_combined_queue_family(&queue_families, |index| {
            surface.map_or(true, |surface| {
                Self::supports_present(context.surface_loader(), device, index, surface)
            })
        })
        .ok_or_else(|| format!("{name}: no combined graphics+present queue family"))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(|e| format!("{name}: extension query failed: {e:?}"))?;
        let available: Vec<&CStr> = extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();

        let required = required_device_extensions(surface.is_some());
        let missing = missing_extensions(&available, &required);
        if !missing.is_empty() {
            return Err(format!("{name}: missing extensions {missing:?}"));
        }

        if context.api_version() >= vk::API_VERSION_1_1 && !Self::supports_dynamic_rendering(instance, device) {
            return Err(format!("{name}: dynamic rendering feature not supported"));
        }

        let optional_extensions = optional_device_extensions()
            .into_iter()
            .filter(|ext| available.contains(ext))
            .collect();

        Ok(Self {
            device,
            properties,
            queue_family,
            optional_extensions,
        })
    }

    fn supports_present(
        surface_loader: &Surface,
        device: vk::PhysicalDevice,
        index: u32,
        surface: vk::SurfaceKHR,
    ) -> bool {
        unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
            .unwrap_or(false)
    }

    fn supports_dynamic_rendering(instance: &Instance, device: vk::PhysicalDevice) -> bool {
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut dynamic_rendering);
        unsafe { instance.get_physical_device_features2(device, &mut features) };
        dynamic_rendering.dynamic_rendering == vk::TRUE
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Logical device wrapper with RAII cleanup
pub struct DeviceContext {
    device: Device,
    physical: PhysicalDeviceInfo,
    queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    dynamic_rendering: DynamicRendering,
}

impl DeviceContext {
    /// Pick a device able to present to `surface` and create the logical device
    pub fn new(instance: &InstanceContext, surface: vk::SurfaceKHR) -> DriverResult<Self> {
        let physical = PhysicalDeviceInfo::select_suitable_device(instance, Some(surface))?;
        Self::create(instance, physical, true)
    }

    /// Create a device without presentation support
    pub fn headless(instance: &InstanceContext) -> DriverResult<Self> {
        let physical = PhysicalDeviceInfo::select_suitable_device(instance, None)?;
        Self::create(instance, physical, false)
    }

    fn create(
        context: &InstanceContext,
        physical: PhysicalDeviceInfo,
        presenting: bool,
    ) -> DriverResult<Self> {
        let instance = context.instance();
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical.queue_family)
            .queue_priorities(&priorities)
            .build()];

        let extension_names: Vec<*const c_char> = required_device_extensions(presenting)
            .into_iter()
            .chain(physical.optional_extensions.iter().copied())
            .map(CStr::as_ptr)
            .collect();

        let mut dynamic_rendering_features =
            vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut dynamic_rendering_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Logical device creation failed: {e:?}")))?
        };

        let queue = unsafe { device.get_device_queue(physical.queue_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);
        let dynamic_rendering = DynamicRendering::new(instance, &device);

        log::debug!(
            "Logical device created on queue family {} with {} extensions",
            physical.queue_family,
            extension_names.len()
        );

        Ok(Self {
            device,
            physical,
            queue,
            swapchain_loader,
            dynamic_rendering,
        })
    }

    /// Get the logical device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Get the physical device handle
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical.device
    }

    /// Get the physical device info
    pub const fn physical_info(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Get the combined graphics+present queue
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the queue family index
    pub const fn queue_family(&self) -> u32 {
        self.physical.queue_family
    }

    /// Get the swapchain extension loader
    pub const fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Get the dynamic rendering extension loader
    pub const fn dynamic_rendering(&self) -> &DynamicRendering {
        &self.dynamic_rendering
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> DriverResult<()> {
        unsafe { self.device.device_wait_idle().map_err(DriverError::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_combined_family_requires_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];

        assert_eq!(find_combined_queue_family(&families, |_| true), Some(1));
        assert_eq!(find_combined_queue_family(&families, |i| i == 2), Some(2));
        assert_eq!(find_combined_queue_family(&families, |i| i == 0), None);
    }

    #[test]
    fn test_no_separate_present_fallback() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        // Family 1 can present but has no graphics, family 0 cannot present.
        assert_eq!(find_combined_queue_family(&families, |i| i == 1), None);
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        assert_eq!(find_combined_queue_family(&[empty], |_| true), None);
    }

    #[test]
    fn test_missing_extensions() {
        let required = required_device_extensions(true);
        let available = [SwapchainLoader::name(), DynamicRendering::name()];

        let missing = missing_extensions(&available, &required);
        assert_eq!(missing, vec![vk::ExtDescriptorIndexingFn::name()]);

        let mut all = available.to_vec();
        all.push(vk::ExtDescriptorIndexingFn::name());
        assert!(missing_extensions(&all, &required).is_empty());
    }

    #[test]
    fn test_headless_does_not_require_swapchain() {
        let required = required_device_extensions(false);
        assert!(!required.contains(&SwapchainLoader::name()));
        assert!(required.contains(&DynamicRendering::name()));
        assert!(required.contains(&vk::ExtDescriptorIndexingFn::name()));
    }

    #[test]
    fn test_discrete_preferred() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_score(vk::PhysicalDeviceType::CPU)
        );
        assert_eq!(device_type_score(vk::PhysicalDeviceType::OTHER), 0);
    }
}
