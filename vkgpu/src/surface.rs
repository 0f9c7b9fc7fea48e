use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::CreateDeviceError;
use crate::instance::Instance;

/// A `VkSurfaceKHR` tied to a window, used while choosing a physical
/// device that can present to it.
///
/// Presentation itself lives outside this crate, so a `Surface` is only
/// held for the duration of device selection.
pub struct Surface {
    parent_instance: Arc<Instance>,
    handle: vk::SurfaceKHR,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("parent", &self.parent_instance)
            .finish_non_exhaustive()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        tracing::debug!("Dropping surface {:?}", self.handle);
        //SAFETY: handle was created from parent_instance and nothing derived
        //from it outlives this wrapper
        unsafe { self.parent_instance.destroy_raw_surface(self.handle) };
    }
}

impl Surface {
    /// # Safety
    /// `source` must stay alive, and its window must not be destroyed,
    /// while the returned surface exists.
    pub unsafe fn new(
        instance: &Arc<Instance>,
        source: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> Result<Self, CreateDeviceError> {
        //SAFETY: The caller keeps source alive for our lifetime, and we hold
        //an Arc to the instance
        let handle = unsafe { instance.create_raw_surface(source) }?;
        Ok(Self {
            parent_instance: Arc::clone(instance),
            handle,
        })
    }

    pub fn parent(&self) -> &Arc<Instance> {
        &self.parent_instance
    }

    pub fn raw_handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from the same
    /// instance as this surface.
    pub unsafe fn supports_queue_family(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, vk::Result> {
        //SAFETY: physical_device was derived from the same instance as this
        //surface (caller guarantees), self.handle is valid
        unsafe {
            self.parent_instance.get_raw_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.handle,
            )
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from the same
    /// instance as this surface.
    pub unsafe fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        //SAFETY: Caller guarantees physical_device provenance
        unsafe {
            self.parent_instance
                .get_surface_capabilities(physical_device, self.handle)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from the same
    /// instance as this surface.
    pub unsafe fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        //SAFETY: Caller guarantees physical_device provenance
        unsafe {
            self.parent_instance
                .get_surface_formats(physical_device, self.handle)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from the same
    /// instance as this surface.
    pub unsafe fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        //SAFETY: Caller guarantees physical_device provenance
        unsafe {
            self.parent_instance
                .get_surface_present_modes(physical_device, self.handle)
        }
    }
}
