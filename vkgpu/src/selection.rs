//! Physical device ranking.
//!
//! Selection runs in two phases per candidate. Phase one compares the
//! candidate's class priority against a threshold carried across the whole
//! enumeration: a stronger class raises the threshold and forgets any
//! weaker winner, a weaker class is skipped outright, and an equal class
//! goes on to phase two. Phase two checks required extensions, a queue
//! family that can both draw and present, and basic swapchain support.
//!
//! A strong device that fails phase two still raises the threshold, so the
//! selector never falls back to a software rasterizer just because the
//! real GPU was missing something.
//!
//! The algorithm only sees devices through [`DeviceProbe`].

use std::ffi::CStr;

use ash::vk;
use thiserror::Error;

use crate::error::{Advisory, CreateDeviceError};
use crate::extensions::DeviceExtensions;
use crate::surface::Surface;

/// Coarse class a physical device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Other,
    Cpu,
    Virtual,
    Integrated,
    Discrete,
}

impl DeviceClass {
    pub fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => DeviceClass::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceClass::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceClass::Virtual,
            vk::PhysicalDeviceType::CPU => DeviceClass::Cpu,
            _ => DeviceClass::Other,
        }
    }

    pub fn priority(self) -> u32 {
        match self {
            DeviceClass::Other => 0,
            DeviceClass::Cpu => 1,
            DeviceClass::Virtual => 2,
            DeviceClass::Integrated => 3,
            DeviceClass::Discrete => 4,
        }
    }
}

/// Rank a queue family by its reported flags.
///
/// Families without graphics score 0 and are never chosen. Transfer is
/// implied by graphics or compute even when the bit is missing, so its
/// absence only lowers the score.
pub fn score_queue_family(flags: vk::QueueFlags) -> u32 {
    if !flags.contains(vk::QueueFlags::GRAPHICS) {
        0
    } else if flags.contains(vk::QueueFlags::COMPUTE) {
        if flags.contains(vk::QueueFlags::TRANSFER) { 3 } else { 2 }
    } else {
        1
    }
}

/// Pick the highest scoring graphics family that can present, lowest
/// index first among equals.
///
/// `supports_present` is only asked about graphics families. An error
/// from it aborts the search.
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, vk::Result>,
) -> Result<Option<u32>, vk::Result> {
    let mut best: Option<(u32, u32)> = None;
    for (idx, family) in families.iter().enumerate() {
        let score = score_queue_family(family.queue_flags);
        if score == 0 {
            continue;
        }
        let idx = idx as u32;
        if !supports_present(idx)? {
            continue;
        }
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }
    Ok(best.map(|(idx, _)| idx))
}

/// What a device/surface pair offers for presentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        self.format_count > 0 && self.present_mode_count > 0
    }

    pub fn supports_opaque(&self) -> bool {
        self.capabilities
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
    }
}

/// Read-only view of the physical devices available for selection.
///
/// Every `vk::PhysicalDevice` passed back in comes from
/// [`devices`](Self::devices) on the same probe.
pub trait DeviceProbe {
    fn devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result>;

    fn properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties;

    fn extensions(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceExtensions, vk::Result>;

    fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, vk::Result>;

    fn swapchain_support(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<SwapchainSupport, vk::Result>;

    fn memory_properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties;
}

/// The device that won selection, with everything the logical device
/// factory needs.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub handle: vk::PhysicalDevice,
    pub class: DeviceClass,
    /// Position in enumeration order.
    pub ordinal: usize,
    pub queue_family_index: u32,
    pub extensions: DeviceExtensions,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl Candidate {
    pub fn name(&self) -> &CStr {
        self.properties.device_name_as_c_str().unwrap_or(c"unknown")
    }
}

#[derive(Debug, Error)]
enum Disqualified {
    #[error("missing required extensions {:?}", .0.missing_required())]
    MissingExtensions(DeviceExtensions),
    #[error("failed to enumerate extensions: {0}")]
    ExtensionQuery(vk::Result),
    #[error("failed to query presentation support: {0}")]
    PresentQuery(vk::Result),
    #[error("no queue family supports both graphics and present")]
    NoGraphicsPresentFamily,
    #[error("failed to query surface support: {0}")]
    SurfaceQuery(vk::Result),
    #[error("no surface formats or present modes")]
    NoSwapchainSupport,
}

fn check_capabilities<P: DeviceProbe + ?Sized>(
    probe: &P,
    device: vk::PhysicalDevice,
) -> Result<(u32, DeviceExtensions), Disqualified> {
    let extensions = probe
        .extensions(device)
        .map_err(Disqualified::ExtensionQuery)?;
    if !extensions.has_required() {
        return Err(Disqualified::MissingExtensions(extensions));
    }

    let families = probe.queue_families(device);
    let queue_family_index = select_queue_family(&families, |idx| {
        probe.supports_present(device, idx)
    })
    .map_err(Disqualified::PresentQuery)?
    .ok_or(Disqualified::NoGraphicsPresentFamily)?;

    let swapchain = probe
        .swapchain_support(device)
        .map_err(Disqualified::SurfaceQuery)?;
    if !swapchain.supports_opaque() {
        Advisory::OpaqueCompositeUnsupported.report();
    }
    if !swapchain.is_adequate() {
        return Err(Disqualified::NoSwapchainSupport);
    }

    Ok((queue_family_index, extensions))
}

/// Choose the physical device to open.
///
/// Fails with `NoSuitableDevice` when nothing passes, except when a device
/// in the winning class lacked required extensions. That is reported as
/// `MissingRequiredCapability` naming what the first such device was
/// missing, whatever else failed in the class. Among equally ranked
/// passing devices the first enumerated wins.
pub fn select_physical_device<P: DeviceProbe + ?Sized>(
    probe: &P,
) -> Result<Candidate, CreateDeviceError> {
    let devices = probe
        .devices()
        .map_err(CreateDeviceError::at("vkEnumeratePhysicalDevices"))?;

    if devices.is_empty() {
        tracing::warn!("Failed to find any GPUs with Vulkan support!");
        return Err(CreateDeviceError::NoSuitableDevice);
    }

    let mut threshold = 0;
    let mut best: Option<Candidate> = None;
    // First device in the current class that lacked required extensions.
    let mut missing_in_tier: Option<DeviceExtensions> = None;

    for (ordinal, &device) in devices.iter().enumerate() {
        let properties = probe.properties(device);
        let class = DeviceClass::from_vk(properties.device_type);
        let name = properties.device_name_as_c_str().unwrap_or(c"unknown");
        let priority = class.priority();

        if priority < threshold {
            tracing::debug!(
                "Skipping {:?}: {:?} is outranked by an earlier device",
                name,
                class
            );
            continue;
        }

        if priority > threshold {
            threshold = priority;
            missing_in_tier = None;
            if let Some(previous) = best.take() {
                tracing::debug!(
                    "Dropping {:?}: {:?} {:?} outranks it",
                    previous.name(),
                    class,
                    name
                );
            }
        }

        match check_capabilities(probe, device) {
            Ok((queue_family_index, extensions)) => {
                if best.is_some() {
                    tracing::debug!(
                        "Skipping {:?}: an earlier {:?} device was chosen",
                        name,
                        class
                    );
                    continue;
                }
                best = Some(Candidate {
                    handle: device,
                    class,
                    ordinal,
                    queue_family_index,
                    extensions,
                    properties,
                    memory_properties: probe.memory_properties(device),
                });
            }
            Err(reason) => {
                tracing::debug!("Skipping {:?}: {reason}", name);
                if let Disqualified::MissingExtensions(extensions) = reason {
                    missing_in_tier.get_or_insert(extensions);
                }
            }
        }
    }

    match (best, missing_in_tier) {
        (Some(best), _) => {
            tracing::info!(
                "Selected physical device: {:?} (type: {:?}, queue family: {})",
                best.name(),
                best.class,
                best.queue_family_index
            );
            Ok(best)
        }
        (None, Some(extensions)) => match extensions.require() {
            Err(missing) => Err(missing),
            Ok(()) => Err(CreateDeviceError::NoSuitableDevice),
        },
        (None, None) => Err(CreateDeviceError::NoSuitableDevice),
    }
}

/// [`DeviceProbe`] over a live instance and a surface created from it.
pub(crate) struct VulkanProbe<'a> {
    surface: &'a Surface,
}

impl<'a> VulkanProbe<'a> {
    pub(crate) fn new(surface: &'a Surface) -> Self {
        Self { surface }
    }
}

impl DeviceProbe for VulkanProbe<'_> {
    fn devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result> {
        self.surface.parent().fetch_raw_physical_devices()
    }

    fn properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        //SAFETY: device came from devices(), i.e. from the surface's parent
        //instance
        unsafe {
            self.surface
                .parent()
                .get_raw_physical_device_properties(device)
        }
    }

    fn extensions(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceExtensions, vk::Result> {
        //SAFETY: device came from devices(), i.e. from the surface's parent
        //instance
        let props = unsafe {
            self.surface
                .parent()
                .enumerate_raw_device_extension_properties(device)
        }?;
        Ok(DeviceExtensions::from_properties(&props))
    }

    fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        //SAFETY: device came from devices(), i.e. from the surface's parent
        //instance
        unsafe {
            self.surface
                .parent()
                .get_raw_physical_device_queue_family_properties(device)
        }
    }

    fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, vk::Result> {
        //SAFETY: device and surface share the same parent instance
        unsafe {
            self.surface.supports_queue_family(device, queue_family_index)
        }
    }

    fn swapchain_support(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<SwapchainSupport, vk::Result> {
        //SAFETY: device and surface share the same parent instance
        let capabilities = unsafe { self.surface.capabilities(device) }?;
        //SAFETY: Same as above
        let formats = unsafe { self.surface.formats(device) }?;
        //SAFETY: Same as above
        let present_modes = unsafe { self.surface.present_modes(device) }?;
        Ok(SwapchainSupport {
            capabilities,
            format_count: formats.len(),
            present_mode_count: present_modes.len(),
        })
    }

    fn memory_properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        //SAFETY: device came from devices(), i.e. from the surface's parent
        //instance
        unsafe {
            self.surface
                .parent()
                .get_raw_physical_device_memory_properties(device)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use ash::vk::Handle;

    use super::*;

    const GCT: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );
    const GC: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw(),
    );

    #[derive(Clone)]
    struct FakeDevice {
        device_type: vk::PhysicalDeviceType,
        extensions: Result<DeviceExtensions, vk::Result>,
        families: Vec<(vk::QueueFlags, bool)>,
        present_error: Option<vk::Result>,
        surface_error: Option<vk::Result>,
        composite_alpha: vk::CompositeAlphaFlagsKHR,
        formats: usize,
        present_modes: usize,
    }

    impl FakeDevice {
        fn passing(device_type: vk::PhysicalDeviceType) -> Self {
            Self {
                device_type,
                extensions: Ok(DeviceExtensions::from_available(
                    DeviceExtensions::REQUIRED,
                )),
                families: vec![(GCT, true)],
                present_error: None,
                surface_error: None,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                formats: 2,
                present_modes: 1,
            }
        }

        fn failing(device_type: vk::PhysicalDeviceType) -> Self {
            Self {
                formats: 0,
                ..Self::passing(device_type)
            }
        }
    }

    struct FakeProbe {
        devices: Vec<FakeDevice>,
        extension_queries: RefCell<Vec<u64>>,
    }

    impl FakeProbe {
        fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                extension_queries: RefCell::new(Vec::new()),
            }
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[device.as_raw() as usize - 1]
        }
    }

    impl DeviceProbe for FakeProbe {
        fn devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result> {
            Ok((1..=self.devices.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        fn properties(
            &self,
            device: vk::PhysicalDevice,
        ) -> vk::PhysicalDeviceProperties {
            vk::PhysicalDeviceProperties {
                device_type: self.get(device).device_type,
                ..Default::default()
            }
        }

        fn extensions(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<DeviceExtensions, vk::Result> {
            self.extension_queries.borrow_mut().push(device.as_raw());
            self.get(device).extensions
        }

        fn queue_families(
            &self,
            device: vk::PhysicalDevice,
        ) -> Vec<vk::QueueFamilyProperties> {
            self.get(device)
                .families
                .iter()
                .map(|(flags, _)| vk::QueueFamilyProperties {
                    queue_flags: *flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(
            &self,
            device: vk::PhysicalDevice,
            queue_family_index: u32,
        ) -> Result<bool, vk::Result> {
            let fake = self.get(device);
            match fake.present_error {
                Some(e) => Err(e),
                None => Ok(fake.families[queue_family_index as usize].1),
            }
        }

        fn swapchain_support(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<SwapchainSupport, vk::Result> {
            let fake = self.get(device);
            if let Some(e) = fake.surface_error {
                return Err(e);
            }
            Ok(SwapchainSupport {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    supported_composite_alpha: fake.composite_alpha,
                    ..Default::default()
                },
                format_count: fake.formats,
                present_mode_count: fake.present_modes,
            })
        }

        fn memory_properties(
            &self,
            _device: vk::PhysicalDevice,
        ) -> vk::PhysicalDeviceMemoryProperties {
            vk::PhysicalDeviceMemoryProperties::default()
        }
    }

    fn without_memory_requirements2(
        device_type: vk::PhysicalDeviceType,
    ) -> FakeDevice {
        FakeDevice {
            extensions: Ok(DeviceExtensions::from_available([
                ash::khr::swapchain::NAME,
                ash::khr::maintenance1::NAME,
                ash::khr::dedicated_allocation::NAME,
            ])),
            ..FakeDevice::passing(device_type)
        }
    }

    fn families(
        flags: &[(vk::QueueFlags, bool)],
    ) -> Vec<vk::QueueFamilyProperties> {
        flags
            .iter()
            .map(|(queue_flags, _)| vk::QueueFamilyProperties {
                queue_flags: *queue_flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn class_priorities_are_ordered() {
        use vk::PhysicalDeviceType as T;
        let order: Vec<u32> = [
            T::OTHER,
            T::CPU,
            T::VIRTUAL_GPU,
            T::INTEGRATED_GPU,
            T::DISCRETE_GPU,
        ]
        .into_iter()
        .map(|ty| DeviceClass::from_vk(ty).priority())
        .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn queue_family_scores() {
        assert_eq!(score_queue_family(GCT), 3);
        assert_eq!(score_queue_family(GC), 2);
        assert_eq!(score_queue_family(vk::QueueFlags::GRAPHICS), 1);
        assert_eq!(
            score_queue_family(
                vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
            ),
            0
        );
    }

    #[test]
    fn best_presentable_graphics_family_wins() {
        let layout = [
            (vk::QueueFlags::GRAPHICS, true),
            (GC, true),
            (GCT, false),
            (vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, true),
        ];
        let chosen = select_queue_family(&families(&layout), |idx| {
            Ok(layout[idx as usize].1)
        });
        assert_eq!(chosen, Ok(Some(1)));
    }

    #[test]
    fn queue_family_ties_keep_lowest_index() {
        let layout = [(GC, false), (GCT, true), (GCT, true)];
        let chosen = select_queue_family(&families(&layout), |idx| {
            Ok(layout[idx as usize].1)
        });
        assert_eq!(chosen, Ok(Some(1)));
    }

    #[test]
    fn non_graphics_families_are_never_asked_about_present() {
        let layout = [
            (vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::COMPUTE, true),
        ];
        let asked = RefCell::new(Vec::new());
        let chosen = select_queue_family(&families(&layout), |idx| {
            asked.borrow_mut().push(idx);
            Ok(true)
        });
        assert_eq!(chosen, Ok(None));
        assert!(asked.borrow().is_empty());
    }

    #[test]
    fn failing_discrete_disqualifies_passing_integrated() {
        let probe = FakeProbe::new(vec![
            FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        assert!(matches!(
            select_physical_device(&probe),
            Err(CreateDeviceError::NoSuitableDevice)
        ));
        // The integrated device never reached phase two.
        assert_eq!(*probe.extension_queries.borrow(), vec![1]);
    }

    #[test]
    fn discrete_wins_regardless_of_order() {
        let probe = FakeProbe::new(vec![
            FakeDevice::passing(vk::PhysicalDeviceType::INTEGRATED_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        let chosen = select_physical_device(&probe).expect("discrete passes");
        assert_eq!(chosen.class, DeviceClass::Discrete);
        assert_eq!(chosen.ordinal, 1);

        let probe = FakeProbe::new(vec![
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        let chosen = select_physical_device(&probe).expect("discrete passes");
        assert_eq!(chosen.class, DeviceClass::Discrete);
        assert_eq!(chosen.ordinal, 0);
    }

    #[test]
    fn never_falls_back_to_cpu_emulation() {
        let probe = FakeProbe::new(vec![
            FakeDevice::passing(vk::PhysicalDeviceType::CPU),
            FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::CPU),
        ]);
        assert!(matches!(
            select_physical_device(&probe),
            Err(CreateDeviceError::NoSuitableDevice)
        ));
    }

    #[test]
    fn equal_class_ties_keep_the_earliest() {
        let probe = FakeProbe::new(vec![
            FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        let chosen =
            select_physical_device(&probe).expect("second device passes");
        assert_eq!(chosen.ordinal, 1);
        assert_eq!(chosen.handle, vk::PhysicalDevice::from_raw(2));
    }

    #[test]
    fn selected_family_is_graphics_and_present() {
        let mut device =
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU);
        device.families = vec![
            (vk::QueueFlags::TRANSFER, true),
            (GCT, false),
            (vk::QueueFlags::GRAPHICS, true),
        ];
        let probe = FakeProbe::new(vec![device]);
        let chosen =
            select_physical_device(&probe).expect("family 2 qualifies");
        assert_eq!(chosen.queue_family_index, 2);
    }

    #[test]
    fn extension_query_failure_only_skips_that_device() {
        let mut broken =
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU);
        broken.extensions = Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        let probe = FakeProbe::new(vec![
            broken,
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        let chosen =
            select_physical_device(&probe).expect("second device passes");
        assert_eq!(chosen.ordinal, 1);
    }

    #[test]
    fn present_query_failure_only_skips_that_device() {
        let mut broken =
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU);
        broken.present_error = Some(vk::Result::ERROR_SURFACE_LOST_KHR);
        let probe = FakeProbe::new(vec![
            broken,
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        let chosen =
            select_physical_device(&probe).expect("second device passes");
        assert_eq!(chosen.ordinal, 1);
    }

    #[test]
    fn surface_query_failure_only_skips_that_device() {
        let mut broken =
            FakeDevice::passing(vk::PhysicalDeviceType::INTEGRATED_GPU);
        broken.surface_error = Some(vk::Result::ERROR_SURFACE_LOST_KHR);
        let probe = FakeProbe::new(vec![
            broken,
            FakeDevice::passing(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        let chosen =
            select_physical_device(&probe).expect("second device passes");
        assert_eq!(chosen.ordinal, 1);
        assert_eq!(chosen.class, DeviceClass::Integrated);
    }

    #[test]
    fn missing_opaque_composite_alpha_does_not_disqualify() {
        let mut device =
            FakeDevice::passing(vk::PhysicalDeviceType::DISCRETE_GPU);
        device.composite_alpha = vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED;
        let probe = FakeProbe::new(vec![device]);
        let chosen =
            select_physical_device(&probe).expect("opaque is advisory only");
        assert_eq!(chosen.ordinal, 0);
    }

    #[test]
    fn missing_required_extension_is_reported_by_name() {
        let probe = FakeProbe::new(vec![without_memory_requirements2(
            vk::PhysicalDeviceType::DISCRETE_GPU,
        )]);
        match select_physical_device(&probe) {
            Err(CreateDeviceError::MissingRequiredCapability(missing)) => {
                assert_eq!(
                    missing,
                    vec!["VK_KHR_get_memory_requirements2".to_owned()]
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_extension_is_reported_alongside_other_failures() {
        for devices in [
            vec![
                without_memory_requirements2(
                    vk::PhysicalDeviceType::DISCRETE_GPU,
                ),
                FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
            ],
            vec![
                FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
                without_memory_requirements2(
                    vk::PhysicalDeviceType::DISCRETE_GPU,
                ),
            ],
        ] {
            let probe = FakeProbe::new(devices);
            match select_physical_device(&probe) {
                Err(CreateDeviceError::MissingRequiredCapability(missing)) => {
                    assert_eq!(
                        missing,
                        vec!["VK_KHR_get_memory_requirements2".to_owned()]
                    );
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn outranked_missing_extension_is_forgotten() {
        let probe = FakeProbe::new(vec![
            without_memory_requirements2(
                vk::PhysicalDeviceType::INTEGRATED_GPU,
            ),
            FakeDevice::failing(vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        assert!(matches!(
            select_physical_device(&probe),
            Err(CreateDeviceError::NoSuitableDevice)
        ));
    }

    #[test]
    fn no_devices_is_no_suitable_device() {
        let probe = FakeProbe::new(Vec::new());
        assert!(matches!(
            select_physical_device(&probe),
            Err(CreateDeviceError::NoSuitableDevice)
        ));
    }
}
