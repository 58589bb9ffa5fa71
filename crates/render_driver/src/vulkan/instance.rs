//! Vulkan instance bring-up
//!
//! Creates the API instance with optional validation and debug messaging,
//! and reports the API version the loader supports.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};

use super::loader;
use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};

/// Highest API version the driver asks for
pub const TARGET_API_VERSION: u32 = vk::API_VERSION_1_3;

const VALIDATION_LAYER: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

const ENGINE_NAME: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"RenderDriver\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct InstanceContext {
    entry: &'static Entry,
    instance: Instance,
    surface_loader: Surface,
    api_version: u32,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl InstanceContext {
    /// Create an instance enabling the host's surface extensions
    ///
    /// `surface_extensions` are the instance extensions the windowing layer
    /// needs to create its presentation surface; pass an empty slice for a
    /// headless instance.
    pub fn new(config: &DriverConfig, surface_extensions: &[String]) -> DriverResult<Self> {
        config
            .validate()
            .map_err(|e| DriverError::Initialization(e.to_string()))?;

        let entry = loader::entry()?;

        let loader_version = match entry.try_enumerate_instance_version() {
            Ok(Some(version)) => version,
            Ok(None) => vk::API_VERSION_1_0,
            Err(e) => return Err(DriverError::Initialization(format!(
                "Failed to query instance version: {e:?}"
            ))),
        };
        log::info!(
            "Vulkan instance version supported: {}.{}.{}",
            vk::api_version_major(loader_version),
            vk::api_version_minor(loader_version),
            vk::api_version_patch(loader_version)
        );
        let api_version = loader_version.min(TARGET_API_VERSION);

        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(DriverError::Api)?;
        let available_extension_names: Vec<&CStr> = available_extensions
            .iter()
            // SAFETY: the loader NUL-terminates extension names
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();

        let host_extensions = surface_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Initialization(format!("Invalid extension name: {e}")))?;

        let mut extensions: Vec<*const c_char> =
            host_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let mut flags = vk::InstanceCreateFlags::empty();
        if available_extension_names.contains(&vk::KhrPortabilityEnumerationFn::name()) {
            extensions.push(vk::KhrPortabilityEnumerationFn::name().as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }
        if available_extension_names.contains(&vk::KhrGetPhysicalDeviceProperties2Fn::name()) {
            extensions.push(vk::KhrGetPhysicalDeviceProperties2Fn::name().as_ptr());
        }

        let want_validation = config.validation_enabled();
        let debug_available = available_extension_names.contains(&DebugUtils::name());
        let enable_debug = want_validation && debug_available;
        if enable_debug {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let enable_layer = want_validation && Self::has_validation_layer(entry)?;
        if want_validation && !enable_layer {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        let layer_names: Vec<*const c_char> = if enable_layer {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| DriverError::Initialization(format!("Invalid application name: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(config.packed_version())
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(api_version);

        let create_info = vk::InstanceCreateInfo::builder()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(|e| DriverError::Initialization(format!("Instance creation failed: {e:?}")))?
        };

        let (debug_utils, debug_messenger) = if enable_debug {
            let debug_utils = DebugUtils::new(entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    log::warn!("Debug messenger unavailable: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let surface_loader = Surface::new(entry, &instance);

        log::debug!(
            "Instance created (api {}.{}, validation layer: {}, debug utils: {})",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            enable_layer,
            debug_messenger.is_some()
        );

        Ok(Self {
            entry,
            instance,
            surface_loader,
            api_version,
            debug_utils,
            debug_messenger,
        })
    }

    fn has_validation_layer(entry: &Entry) -> DriverResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(DriverError::Api)?;
        Ok(layers.iter().any(|layer| {
            // SAFETY: the loader NUL-terminates layer names
            unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) == VALIDATION_LAYER }
        }))
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> DriverResult<vk::DebugUtilsMessengerEXT> {
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

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(DriverError::Api)
        }
    }

    /// Get a reference to the Vulkan entry
    pub const fn entry(&self) -> &Entry {
        self.entry
    }

    /// Get a reference to the Vulkan instance
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Raw instance handle, for hosts that create their own surface
    pub fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    /// Get the surface extension loader
    pub const fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// API version the instance was created with
    pub const fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Destroy a surface created against this instance
    ///
    /// # Safety
    /// The surface must not be in use by any swapchain.
    pub unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        if surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(surface, None);
        }
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
