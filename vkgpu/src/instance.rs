//! Vulkan instance creation and physical device queries.
//!
//! [`Instance`] wraps an `ash::Instance` and owns the entry-point loader,
//! the optional debug messenger, and the instance-level extension loaders
//! (surface and `VK_KHR_get_physical_device_properties2`). All entry
//! points are scoped to the instance; nothing is stored process-wide.
//!
//! [`VkVersion`] is a thin newtype over the packed Vulkan version word.

use std::ffi::{CStr, CString};
use std::fmt::Debug;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{Advisory, CreateDeviceError};
use crate::extensions;
use crate::log::{self, VulkanLogLevel};

const ENGINE_NAME: &CStr = c"vkgpu";

/// A packed Vulkan API version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkVersion(u32);

impl VkVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(variant: u32, major: u32, minor: u32, patch: u32) -> Self {
        Self(vk::make_api_version(variant, major, minor, patch))
    }

    pub fn variant(&self) -> u32 {
        vk::api_version_variant(self.0)
    }

    pub fn major(&self) -> u32 {
        vk::api_version_major(self.0)
    }
    pub fn minor(&self) -> u32 {
        vk::api_version_minor(self.0)
    }
    pub fn patch(&self) -> u32 {
        vk::api_version_patch(self.0)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for VkVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Settings for [`Instance::new`].
///
/// `debug` doubles as the debug-mode switch: `Some` asks for the debug
/// messenger and the validation layer, and the level filters which
/// messages the layer delivers.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub app_name: String,
    pub debug: Option<VulkanLogLevel>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "vkgpu".to_owned(),
            debug: None,
        }
    }
}

/// Identity strings reported through `VK_KHR_driver_properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity {
    pub name: String,
    pub info: String,
    pub conformance: (u8, u8, u8),
}

/// The root Vulkan object.
///
/// Everything derived from an instance holds an `Arc<Instance>` so the
/// instance is destroyed last.
pub struct Instance {
    entry: ash::Entry,
    handle: ash::Instance,
    debug_messenger:
        Option<(vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance)>,
    surface_instance: ash::khr::surface::Instance,
    properties2_instance: ash::khr::get_physical_device_properties2::Instance,
    debug_mode: bool,
}

impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.handle.handle())
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        tracing::debug!("Dropping instance {:?}", self.handle.handle());
        if let Some((debug_messenger, debug_utils_instance)) =
            self.debug_messenger.take()
        {
            //SAFETY: last use of this debug messenger. We made this debug
            //messenger from this instance. debug_utils_instance is derived from
            //this instance
            unsafe {
                debug_utils_instance
                    .destroy_debug_utils_messenger(debug_messenger, None)
            };
        }
        //SAFETY: We are in drop so this is the last use of instance. Every
        //derived object holds an Arc to us and is therefore already gone
        unsafe { self.handle.destroy_instance(None) };
    }
}

impl Instance {
    /// Load Vulkan and create an instance able to present to windows of
    /// the same kind as `display`.
    ///
    /// Required instance extensions are the window system's list plus
    /// `VK_KHR_get_physical_device_properties2`. Debug support is added on
    /// top when `config.debug` is set, degrading to advisories when the
    /// loader lacks it.
    ///
    /// # Safety
    /// This loads the Vulkan loader library, which runs arbitrary code
    /// from the system.
    pub unsafe fn new(
        config: &InstanceConfig,
        display: &impl HasDisplayHandle,
    ) -> Result<Self, CreateDeviceError> {
        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| CreateDeviceError::InvalidAppName)?;

        //SAFETY: We pass on the burden of the safety from loading dlls to the
        //caller. Entry is dropped after the instance (field order in Instance)
        let entry = unsafe { ash::Entry::load() }?;

        let window_exts = ash_window::enumerate_required_extensions(
            display.display_handle()?.as_raw(),
        )
        .map_err(CreateDeviceError::at(
            "ash_window::enumerate_required_extensions",
        ))?;

        let mut required: Vec<&CStr> = window_exts
            .iter()
            //SAFETY: ash_window hands out pointers to static null
            //terminated extension names
            .map(|ext_ptr| unsafe { CStr::from_ptr(*ext_ptr) })
            .collect();
        required.push(ash::khr::get_physical_device_properties2::NAME);

        //SAFETY: entry is a live Vulkan entry. Passing None queries global
        //extensions and dereferences no layer name
        let ext_props =
            unsafe { entry.enumerate_instance_extension_properties(None) }
                .map_err(CreateDeviceError::at(
                    "vkEnumerateInstanceExtensionProperties",
                ))?;
        //SAFETY: entry is a live Vulkan entry, and this call has no other
        //preconditions
        let layer_props = unsafe { entry.enumerate_instance_layer_properties() }
            .unwrap_or_default();

        let available_exts: Vec<&CStr> = ext_props
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();
        let available_layers: Vec<&CStr> = layer_props
            .iter()
            .filter_map(|layer| layer.layer_name_as_c_str().ok())
            .collect();

        let negotiation = extensions::negotiate_instance(
            &required,
            &available_exts,
            &available_layers,
            config.debug.is_some(),
        )?;
        for advisory in &negotiation.advisories {
            advisory.report();
        }

        let ext_ptrs: Vec<_> =
            negotiation.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<_> =
            negotiation.layers.iter().map(|layer| layer.as_ptr()).collect();

        let mut debug_messenger_create_info = negotiation.debug_utils.then(|| {
            vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    config.debug.unwrap_or_default().message_severity(),
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(log::vulkan_debug_callback))
        });

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(0)
            .engine_name(ENGINE_NAME)
            .engine_version(0)
            .api_version(vk::API_VERSION_1_0);

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs);

        if let Some(ref mut debug_info) = debug_messenger_create_info {
            instance_create_info = instance_create_info.push_next(debug_info);
        }

        //SAFETY: instance_create_info and everything it points at lives
        //until the end of this function
        let instance =
            unsafe { entry.create_instance(&instance_create_info, None) }
            .map_err(CreateDeviceError::at("vkCreateInstance"))?;

        let debug_messenger = if let Some(mut debug_messenger_create_info) =
            debug_messenger_create_info
        {
            debug_messenger_create_info.p_next = std::ptr::null();
            let debug_utils_instance =
                ash::ext::debug_utils::Instance::new(&entry, &instance);
            //SAFETY: Valid CI, debug utils was enabled on this instance
            match unsafe {
                debug_utils_instance.create_debug_utils_messenger(
                    &debug_messenger_create_info,
                    None,
                )
            } {
                Ok(debug_messenger) => {
                    Some((debug_messenger, debug_utils_instance))
                }
                Err(e) => {
                    Advisory::MessengerCreationFailed(e).report();
                    None
                }
            }
        } else {
            None
        };

        let surface_instance =
            ash::khr::surface::Instance::new(&entry, &instance);
        let properties2_instance =
            ash::khr::get_physical_device_properties2::Instance::new(
                &entry, &instance,
            );

        Ok(Instance {
            entry,
            handle: instance,
            debug_messenger,
            surface_instance,
            properties2_instance,
            debug_mode: config.debug.is_some(),
        })
    }

    /// Whether debug mode was requested, regardless of whether the
    /// messenger could actually be created.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn has_debug_messenger(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Get handles to the available physical devices. These handles are
    /// ONLY valid in the context of this instance.
    pub fn fetch_raw_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, vk::Result> {
        //SAFETY: The instance handle is live for the lifetime of self
        unsafe { self.handle.enumerate_physical_devices() }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        //SAFETY: physical_device was derived from this instance
        unsafe { self.handle.get_physical_device_properties(physical_device) }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        //SAFETY: physical_device was derived from this instance
        unsafe { self.handle.get_physical_device_features(physical_device) }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        //SAFETY: physical_device was derived from this instance
        unsafe {
            self.handle
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_memory_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        //SAFETY: physical_device was derived from this instance
        unsafe {
            self.handle
                .get_physical_device_memory_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn enumerate_raw_device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::ExtensionProperties>, vk::Result> {
        //SAFETY: physical_device was derived from this instance
        unsafe {
            self.handle
                .enumerate_device_extension_properties(physical_device)
        }
    }

    /// Query `VK_KHR_driver_properties` through
    /// `vkGetPhysicalDeviceProperties2KHR`.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance
    /// and must support `VK_KHR_driver_properties`.
    pub unsafe fn get_driver_identity(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> DriverIdentity {
        let mut driver = vk::PhysicalDeviceDriverProperties::default();
        let mut props2 =
            vk::PhysicalDeviceProperties2::default().push_next(&mut driver);
        //SAFETY: physical_device was derived from this instance and
        //supports the chained structure (caller guarantees)
        unsafe {
            self.properties2_instance
                .get_physical_device_properties2(physical_device, &mut props2)
        };

        let conformance = driver.conformance_version;
        DriverIdentity {
            name: driver
                .driver_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            info: driver
                .driver_info_as_c_str()
                .map(|info| info.to_string_lossy().into_owned())
                .unwrap_or_default(),
            conformance: (
                conformance.major,
                conformance.minor,
                conformance.patch,
            ),
        }
    }

    /// Create a logical device from a physical device.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    /// `create_info` must be a valid DeviceCreateInfo whose pointers stay
    /// valid for the duration of the call.
    pub unsafe fn create_ash_device(
        &self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<ash::Device, vk::Result> {
        //SAFETY: physical_device was derived from this instance,
        //create_info is valid
        unsafe {
            self.handle
                .create_device(physical_device, create_info, None)
        }
    }

    pub fn raw_instance(&self) -> vk::Instance {
        self.handle.handle()
    }

    pub fn ash_instance(&self) -> &ash::Instance {
        &self.handle
    }
}

// Surface functionality
impl Instance {
    /// Create a raw VkSurfaceKHR for `source`.
    ///
    /// # Safety
    /// The returned surface must be destroyed with
    /// [`destroy_raw_surface`](Self::destroy_raw_surface) before `source`
    /// is dropped, and only used with this instance.
    pub unsafe fn create_raw_surface(
        &self,
        source: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> Result<vk::SurfaceKHR, CreateDeviceError> {
        //SAFETY: the surface extensions for this window system were enabled
        //at instance creation, the handles come straight from source
        unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.handle,
                source.display_handle()?.as_raw(),
                source.window_handle()?.as_raw(),
                None,
            )
        }
        .map_err(CreateDeviceError::at("vkCreateSurfaceKHR"))
    }

    /// # Safety
    /// `surface` must be derived from this instance and have no live
    /// children. It cannot be used after this call.
    pub unsafe fn destroy_raw_surface(&self, surface: vk::SurfaceKHR) {
        //SAFETY: surface is derived from this instance (passed on to caller)
        unsafe { self.surface_instance.destroy_surface(surface, None) };
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_raw_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, vk::Result> {
        //SAFETY: physical_device and surface were derived from this instance
        unsafe {
            self.surface_instance.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        //SAFETY: Caller guarantees physical_device and surface provenance
        unsafe {
            self.surface_instance.get_physical_device_surface_capabilities(
                physical_device,
                surface,
            )
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        //SAFETY: Caller guarantees physical_device and surface provenance
        unsafe {
            self.surface_instance
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        //SAFETY: Caller guarantees physical_device and surface provenance
        unsafe {
            self.surface_instance.get_physical_device_surface_present_modes(
                physical_device,
                surface,
            )
        }
    }
}
