//! Logical device wrapper ([`Device`]) and the thread-affine
//! [`CommandBuffer`] guard.
//!
//! [`Device::create`] runs the whole bring-up: a transient surface for the
//! target window, physical device selection, driver identity reporting,
//! then a logical device with one queue from the chosen family. Any failure
//! unwinds whatever was already created and no `Device` is returned.
//!
//! Command buffers come from a per-thread pool registry owned by the
//! device; see [`crate::command`].

use std::ffi::CStr;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::{
    ActiveRecord, CommandBackend, CommandBufferError, CommandRegistry,
    PoolStats,
};
use crate::error::{Advisory, CreateDeviceError, result_name};
use crate::extensions::DeviceExtensions;
use crate::instance::{DriverIdentity, Instance, VkVersion};
use crate::selection::{self, DeviceClass, VulkanProbe};
use crate::surface::Surface;

const QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Features enabled on every device. Both are hard requirements.
pub fn required_features(
    supported: &vk::PhysicalDeviceFeatures,
) -> Result<vk::PhysicalDeviceFeatures, CreateDeviceError> {
    if supported.fill_mode_non_solid != vk::TRUE {
        return Err(CreateDeviceError::UnsupportedFeature("fillModeNonSolid"));
    }
    if supported.sampler_anisotropy != vk::TRUE {
        return Err(CreateDeviceError::UnsupportedFeature("samplerAnisotropy"));
    }
    Ok(vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(true)
        .sampler_anisotropy(true))
}

/// Overrides chained into device creation on portability-subset
/// implementations. Everything non-conformant stays off except
/// image-view format swizzling.
pub fn portability_features()
-> vk::PhysicalDevicePortabilitySubsetFeaturesKHR<'static> {
    vk::PhysicalDevicePortabilitySubsetFeaturesKHR::default()
        .image_view_format_swizzle(true)
}

/// A logical Vulkan device and its per-device state.
///
/// Owns the device-level entry points (`ash::Device`), the single queue
/// and the command pool registry. Holds its instance through an `Arc`, so
/// dropping the device tears down in the reverse of creation order.
pub struct Device {
    parent: Arc<Instance>,
    handle: ash::Device,
    physical_device: vk::PhysicalDevice,
    class: DeviceClass,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    extensions: DeviceExtensions,
    driver: Option<DriverIdentity>,
    debug_mode: bool,
    queue: Mutex<vk::Queue>,
    queue_family_index: u32,
    registry: CommandRegistry,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle.handle())
            .field("name", &self.name())
            .field("queue_family_index", &self.queue_family_index)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.handle.handle());
        //SAFETY: The device handle is live until the end of this function
        if let Err(e) = unsafe { self.handle.device_wait_idle() } {
            tracing::error!(
                "vkDeviceWaitIdle failed during teardown: {}",
                result_name(e)
            );
        }
        let this: &Device = self;
        this.registry.destroy_all(this);
        //SAFETY: Every pool and fence made from this device was destroyed
        //above, and no CommandBuffer guard can outlive a borrow of self
        unsafe { self.handle.destroy_device(None) };
    }
}

impl Device {
    /// Select a physical device able to present to `window` and open it.
    pub fn create(
        instance: &Arc<Instance>,
        window: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> Result<Self, CreateDeviceError> {
        //SAFETY: window is borrowed for this whole call and the surface is
        //dropped before we return
        let surface = unsafe { Surface::new(instance, window) }?;
        let candidate =
            selection::select_physical_device(&VulkanProbe::new(&surface))?;
        drop(surface);

        for name in candidate.extensions.missing_optional() {
            Advisory::OptionalExtensionMissing(name).report();
        }

        let physical_device = candidate.handle;
        let driver = if candidate.extensions.khr_driver_properties {
            //SAFETY: physical_device came from instance and advertises
            //VK_KHR_driver_properties
            Some(unsafe { instance.get_driver_identity(physical_device) })
        } else {
            None
        };

        tracing::info!("Vulkan Device: {}", candidate.name().to_string_lossy());
        match &driver {
            Some(driver) => {
                tracing::info!(
                    "Vulkan Driver: {} {}",
                    driver.name,
                    driver.info
                );
                tracing::info!(
                    "Vulkan Conformance: {}.{}.{}",
                    driver.conformance.0,
                    driver.conformance.1,
                    driver.conformance.2
                );
            }
            None => Advisory::DriverPropertiesUnavailable.report(),
        }

        //SAFETY: physical_device came from instance
        let supported = unsafe {
            instance.get_raw_physical_device_features(physical_device)
        };
        let features = required_features(&supported)?;

        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(candidate.queue_family_index)
            .queue_priorities(&QUEUE_PRIORITIES);

        let ext_ptrs: Vec<_> = candidate
            .extensions
            .enabled_names()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let mut portability = portability_features();
        let mut device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&ext_ptrs)
            .enabled_features(&features);
        if candidate.extensions.khr_portability_subset {
            device_create_info = device_create_info.push_next(&mut portability);
        }

        //SAFETY: physical_device was derived from instance, and
        //device_create_info and everything it points at outlive the call
        let device = unsafe {
            instance.create_ash_device(physical_device, &device_create_info)
        }
        .map_err(CreateDeviceError::at("vkCreateDevice"))?;

        //SAFETY: device was just created with one queue in this family
        let queue =
            unsafe { device.get_device_queue(candidate.queue_family_index, 0) };

        Ok(Self {
            parent: Arc::clone(instance),
            handle: device,
            physical_device,
            class: candidate.class,
            properties: candidate.properties,
            memory_properties: candidate.memory_properties,
            extensions: candidate.extensions,
            driver,
            debug_mode: instance.debug_mode(),
            queue: Mutex::new(queue),
            queue_family_index: candidate.queue_family_index,
            registry: CommandRegistry::new(),
        })
    }

    /// Get a command buffer in the recording state from the calling
    /// thread's pool.
    pub fn acquire_command_buffer(
        &self,
    ) -> Result<CommandBuffer<'_>, CommandBufferError> {
        let record = self
            .registry
            .acquire_for(std::thread::current().id(), self)?;
        Ok(CommandBuffer {
            device: self,
            record,
            finished: false,
            _not_send: PhantomData,
        })
    }

    pub fn pool_count(&self) -> usize {
        self.registry.pool_count()
    }

    pub fn pool_stats(&self, thread: ThreadId) -> Option<PoolStats> {
        self.registry.pool_stats(thread)
    }

    pub fn parent(&self) -> &Arc<Instance> {
        &self.parent
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn name(&self) -> &CStr {
        self.properties.device_name_as_c_str().unwrap_or(c"unknown")
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn api_version(&self) -> VkVersion {
        VkVersion::from_raw(self.properties.api_version)
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn extensions(&self) -> &DeviceExtensions {
        &self.extensions
    }

    pub fn driver(&self) -> Option<&DriverIdentity> {
        self.driver.as_ref()
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Wait until all submitted work on this device has completed.
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        //SAFETY: handle is a valid device for the lifetime of self
        unsafe { self.handle.device_wait_idle() }
    }

    pub fn raw_device(&self) -> vk::Device {
        self.handle.handle()
    }

    pub fn ash_device(&self) -> &ash::Device {
        &self.handle
    }
}

// The registry only passes back handles it got from these methods, and only
// touches a pool under its lock or from the pool's own thread.
impl CommandBackend for Device {
    fn create_command_pool(&self) -> Result<vk::CommandPool, vk::Result> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        //SAFETY: create_info names the queue family this device was made with
        unsafe { self.handle.create_command_pool(&create_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        //SAFETY: pool was created from this device and the device is idle
        //whenever the registry destroys a pool
        unsafe { self.handle.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, vk::Result> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        //SAFETY: pool was created from this device, registry lock is held
        unsafe { self.handle.allocate_command_buffers(&allocate_info) }
    }

    fn free_command_buffers(
        &self,
        pool: vk::CommandPool,
        buffers: &[vk::CommandBuffer],
    ) {
        //SAFETY: buffers were just allocated from pool and never recorded
        unsafe { self.handle.free_command_buffers(pool, buffers) };
    }

    fn create_fence(&self) -> Result<vk::Fence, vk::Result> {
        //SAFETY: Default create info holds no pointers
        unsafe {
            self.handle
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        //SAFETY: fence was created from this device and is not in use
        unsafe { self.handle.destroy_fence(fence, None) };
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool, vk::Result> {
        //SAFETY: fence was created from this device
        unsafe { self.handle.get_fence_status(fence) }
    }

    fn reset_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        //SAFETY: buffer is inactive so no pending work references it, and
        //only the owning thread records into it
        unsafe {
            self.handle.reset_command_buffer(
                buffer,
                vk::CommandBufferResetFlags::RELEASE_RESOURCES,
            )
        }
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        //SAFETY: buffer was just reset on the owning thread
        unsafe {
            self.handle.begin_command_buffer(
                buffer,
                &vk::CommandBufferBeginInfo::default(),
            )
        }
    }
}

/// A command buffer in the recording state.
///
/// Bound to the thread that acquired it, since its pool is. Finish it with
/// [`submit`](Self::submit); dropping it (or calling
/// [`abandon`](Self::abandon)) hands it back to the pool unsubmitted.
pub struct CommandBuffer<'a> {
    device: &'a Device,
    record: ActiveRecord,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for CommandBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("handle", &self.record.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for CommandBuffer<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.device.registry.abandon(&self.record);
        }
    }
}

impl CommandBuffer<'_> {
    pub fn raw_command_buffer(&self) -> vk::CommandBuffer {
        self.record.handle
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    /// End recording and submit to the device's queue.
    ///
    /// The buffer becomes reusable once the GPU is done with it. On error
    /// it goes straight back to the pool.
    pub fn submit(mut self) -> Result<(), CommandBufferError> {
        let device = self.device;
        let handle = self.record.handle;
        let fence = self.record.fence;

        //SAFETY: handle is in the recording state, begun on this thread
        unsafe { device.handle.end_command_buffer(handle) }
            .map_err(|e| CommandBufferError::from_vk("vkEndCommandBuffer", e))?;
        //SAFETY: The record was inactive before acquisition, so any earlier
        //submission using this fence has completed
        unsafe { device.handle.reset_fences(&[fence]) }
            .map_err(|e| CommandBufferError::from_vk("vkResetFences", e))?;

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(std::slice::from_ref(&handle));
        {
            let queue =
                device.queue.lock().unwrap_or_else(PoisonError::into_inner);
            //SAFETY: Queue access is serialized by the mutex, handle is
            //executable and fence is unsignaled
            unsafe {
                device.handle.queue_submit(
                    *queue,
                    std::slice::from_ref(&submit_info),
                    fence,
                )
            }
            .map_err(|e| CommandBufferError::from_vk("vkQueueSubmit", e))?;
        }

        device.registry.mark_submitted(&self.record);
        self.finished = true;
        Ok(())
    }

    /// Give the buffer back without submitting it.
    pub fn abandon(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portability_overrides_only_allow_swizzle() {
        let features = portability_features();
        assert_eq!(features.image_view_format_swizzle, vk::TRUE);
        assert_eq!(features.events, vk::FALSE);
        assert_eq!(features.triangle_fans, vk::FALSE);
        assert_eq!(features.multisample_array_image, vk::FALSE);
        assert_eq!(features.mutable_comparison_samplers, vk::FALSE);
        assert_eq!(features.tessellation_isolines, vk::FALSE);
        assert_eq!(features.vertex_attribute_access_beyond_stride, vk::FALSE);
        assert_eq!(features.constant_alpha_color_blend_factors, vk::FALSE);
    }

    #[test]
    fn required_features_are_enabled_when_supported() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(true)
            .sampler_anisotropy(true)
            .geometry_shader(true);
        let enabled = required_features(&supported).expect("both supported");
        assert_eq!(enabled.fill_mode_non_solid, vk::TRUE);
        assert_eq!(enabled.sampler_anisotropy, vk::TRUE);
        assert_eq!(enabled.geometry_shader, vk::FALSE);
    }

    #[test]
    fn missing_feature_is_unsupported() {
        let supported =
            vk::PhysicalDeviceFeatures::default().fill_mode_non_solid(true);
        assert!(matches!(
            required_features(&supported),
            Err(CreateDeviceError::UnsupportedFeature("samplerAnisotropy"))
        ));
        assert!(matches!(
            required_features(&vk::PhysicalDeviceFeatures::default()),
            Err(CreateDeviceError::UnsupportedFeature("fillModeNonSolid"))
        ));
    }
}
