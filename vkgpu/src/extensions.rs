//! Instance- and device-level capability negotiation.
//!
//! [`negotiate_instance`] decides which instance extensions and layers to
//! enable given what the loader reports, and [`DeviceExtensions`] is the
//! fixed capability set a physical device is checked against. Both work on
//! plain extension names so they can be exercised without a driver.

use std::ffi::CStr;

use ash::vk;

use crate::error::{Advisory, CreateDeviceError};

pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

pub(crate) const PORTABILITY_SUBSET_NAME: &CStr = c"VK_KHR_portability_subset";
pub(crate) const GGP_FRAME_TOKEN_NAME: &CStr = c"VK_GGP_frame_token";

/// Device extensions the driver knows about.
///
/// The first four are required; a device missing any of them is never
/// eligible. The rest are enabled when present and otherwise ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceExtensions {
    pub khr_swapchain: bool,
    pub khr_maintenance1: bool,
    pub khr_dedicated_allocation: bool,
    pub khr_get_memory_requirements2: bool,

    pub khr_driver_properties: bool,
    pub khr_portability_subset: bool,
    pub ggp_frame_token: bool,
}

impl DeviceExtensions {
    pub const REQUIRED: [&'static CStr; 4] = [
        ash::khr::swapchain::NAME,
        ash::khr::maintenance1::NAME,
        ash::khr::dedicated_allocation::NAME,
        ash::khr::get_memory_requirements2::NAME,
    ];

    pub const OPTIONAL: [&'static CStr; 3] = [
        ash::khr::driver_properties::NAME,
        PORTABILITY_SUBSET_NAME,
        GGP_FRAME_TOKEN_NAME,
    ];

    pub fn from_available<'a>(
        names: impl IntoIterator<Item = &'a CStr>,
    ) -> Self {
        let mut supports = Self::default();
        for name in names {
            if let Some(flag) = supports.flag_mut(name) {
                *flag = true;
            }
        }
        supports
    }

    pub(crate) fn from_properties(props: &[vk::ExtensionProperties]) -> Self {
        Self::from_available(
            props.iter().filter_map(|ext| ext.extension_name_as_c_str().ok()),
        )
    }

    fn flag_mut(&mut self, name: &CStr) -> Option<&mut bool> {
        let flag = if name == ash::khr::swapchain::NAME {
            &mut self.khr_swapchain
        } else if name == ash::khr::maintenance1::NAME {
            &mut self.khr_maintenance1
        } else if name == ash::khr::dedicated_allocation::NAME {
            &mut self.khr_dedicated_allocation
        } else if name == ash::khr::get_memory_requirements2::NAME {
            &mut self.khr_get_memory_requirements2
        } else if name == ash::khr::driver_properties::NAME {
            &mut self.khr_driver_properties
        } else if name == PORTABILITY_SUBSET_NAME {
            &mut self.khr_portability_subset
        } else if name == GGP_FRAME_TOKEN_NAME {
            &mut self.ggp_frame_token
        } else {
            return None;
        };
        Some(flag)
    }

    fn flags(&self) -> [(&'static CStr, bool); 7] {
        [
            (ash::khr::swapchain::NAME, self.khr_swapchain),
            (ash::khr::maintenance1::NAME, self.khr_maintenance1),
            (
                ash::khr::dedicated_allocation::NAME,
                self.khr_dedicated_allocation,
            ),
            (
                ash::khr::get_memory_requirements2::NAME,
                self.khr_get_memory_requirements2,
            ),
            (ash::khr::driver_properties::NAME, self.khr_driver_properties),
            (PORTABILITY_SUBSET_NAME, self.khr_portability_subset),
            (GGP_FRAME_TOKEN_NAME, self.ggp_frame_token),
        ]
    }

    pub fn has_required(&self) -> bool {
        self.khr_swapchain
            && self.khr_maintenance1
            && self.khr_dedicated_allocation
            && self.khr_get_memory_requirements2
    }

    pub fn missing_required(&self) -> Vec<&'static CStr> {
        self.flags()[..Self::REQUIRED.len()]
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn missing_optional(&self) -> Vec<&'static CStr> {
        self.flags()[Self::REQUIRED.len()..]
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Names to enable on the logical device, in a fixed order.
    pub fn enabled_names(&self) -> Vec<&'static CStr> {
        self.flags()
            .iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Fails with `MissingRequiredCapability` naming every absent
    /// required extension.
    pub fn require(&self) -> Result<(), CreateDeviceError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CreateDeviceError::MissingRequiredCapability(
                missing
                    .iter()
                    .map(|name| name.to_string_lossy().into_owned())
                    .collect(),
            ))
        }
    }
}

/// Outcome of instance-level negotiation.
#[derive(Debug)]
pub struct InstanceNegotiation<'a> {
    pub extensions: Vec<&'a CStr>,
    pub layers: Vec<&'static CStr>,
    pub debug_utils: bool,
    pub advisories: Vec<Advisory>,
}

impl InstanceNegotiation<'_> {
    pub fn validation(&self) -> bool {
        self.layers.contains(&VALIDATION_LAYER_NAME)
    }
}

/// Decide what to enable on a new instance.
///
/// Every name in `required` must be available or this fails with
/// `MissingRequiredCapability`. With `debug_mode` set, the debug-utils
/// extension is appended when the loader has it, and the validation layer
/// is enabled only if both the extension and the layer are present. Any
/// piece of debug support that is missing degrades to an advisory.
pub fn negotiate_instance<'a>(
    required: &[&'a CStr],
    available_extensions: &[&CStr],
    available_layers: &[&CStr],
    debug_mode: bool,
) -> Result<InstanceNegotiation<'a>, CreateDeviceError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !available_extensions.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    if !missing.is_empty() {
        return Err(CreateDeviceError::MissingRequiredCapability(missing));
    }

    let mut extensions = required.to_vec();
    let mut layers = Vec::new();
    let mut advisories = Vec::new();
    let mut debug_utils = false;

    if debug_mode {
        if available_extensions.contains(&ash::ext::debug_utils::NAME) {
            extensions.push(ash::ext::debug_utils::NAME);
            debug_utils = true;

            if available_layers.contains(&VALIDATION_LAYER_NAME) {
                layers.push(VALIDATION_LAYER_NAME);
                advisories.push(Advisory::ValidationEnabled);
            } else {
                advisories.push(Advisory::ValidationLayerMissing);
            }
        } else {
            advisories.push(Advisory::DebugUtilsUnavailable);
            advisories.push(Advisory::ValidationLayerMissing);
        }
    }

    Ok(InstanceNegotiation {
        extensions,
        layers,
        debug_utils,
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: &CStr = c"VK_KHR_surface";
    const XLIB: &CStr = c"VK_KHR_xlib_surface";

    #[test]
    fn all_required_device_extensions_make_a_device_eligible() {
        let exts = DeviceExtensions::from_available(DeviceExtensions::REQUIRED);
        assert!(exts.has_required());
        assert!(exts.require().is_ok());
        assert_eq!(exts.enabled_names(), DeviceExtensions::REQUIRED.to_vec());
        assert_eq!(exts.missing_optional().len(), 3);
    }

    #[test]
    fn optional_extensions_never_block_eligibility() {
        let exts = DeviceExtensions::from_available([
            ash::khr::driver_properties::NAME,
            PORTABILITY_SUBSET_NAME,
            GGP_FRAME_TOKEN_NAME,
        ]);
        assert!(!exts.has_required());
        assert!(exts.khr_portability_subset);
        assert_eq!(exts.missing_required().len(), 4);
    }

    #[test]
    fn missing_required_extension_is_named() {
        let exts = DeviceExtensions::from_available([
            ash::khr::swapchain::NAME,
            ash::khr::maintenance1::NAME,
            ash::khr::get_memory_requirements2::NAME,
            c"VK_EXT_unrelated",
        ]);
        match exts.require() {
            Err(CreateDeviceError::MissingRequiredCapability(missing)) => {
                assert_eq!(
                    missing,
                    vec!["VK_KHR_dedicated_allocation".to_owned()]
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn enabled_names_keep_declaration_order() {
        let exts = DeviceExtensions::from_available([
            GGP_FRAME_TOKEN_NAME,
            ash::khr::get_memory_requirements2::NAME,
            ash::khr::dedicated_allocation::NAME,
            ash::khr::maintenance1::NAME,
            ash::khr::swapchain::NAME,
        ]);
        assert_eq!(
            exts.enabled_names(),
            vec![
                ash::khr::swapchain::NAME,
                ash::khr::maintenance1::NAME,
                ash::khr::dedicated_allocation::NAME,
                ash::khr::get_memory_requirements2::NAME,
                GGP_FRAME_TOKEN_NAME,
            ]
        );
    }

    #[test]
    fn instance_negotiation_fails_on_missing_required() {
        let result =
            negotiate_instance(&[SURFACE, XLIB], &[SURFACE], &[], false);
        match result {
            Err(CreateDeviceError::MissingRequiredCapability(missing)) => {
                assert_eq!(missing, vec!["VK_KHR_xlib_surface".to_owned()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn debug_mode_off_enables_nothing_extra() {
        let negotiation = negotiate_instance(
            &[SURFACE],
            &[SURFACE, ash::ext::debug_utils::NAME],
            &[VALIDATION_LAYER_NAME],
            false,
        )
        .expect("negotiation should succeed");
        assert_eq!(negotiation.extensions, vec![SURFACE]);
        assert!(negotiation.layers.is_empty());
        assert!(!negotiation.debug_utils);
        assert!(negotiation.advisories.is_empty());
    }

    #[test]
    fn debug_mode_enables_messenger_and_validation() {
        let negotiation = negotiate_instance(
            &[SURFACE],
            &[SURFACE, ash::ext::debug_utils::NAME],
            &[VALIDATION_LAYER_NAME],
            true,
        )
        .expect("negotiation should succeed");
        assert_eq!(
            negotiation.extensions,
            vec![SURFACE, ash::ext::debug_utils::NAME]
        );
        assert!(negotiation.debug_utils);
        assert!(negotiation.validation());
        assert_eq!(negotiation.advisories, vec![Advisory::ValidationEnabled]);
    }

    #[test]
    fn debug_mode_without_support_degrades_to_advisories() {
        let negotiation = negotiate_instance(
            &[SURFACE],
            &[SURFACE],
            &[VALIDATION_LAYER_NAME],
            true,
        )
        .expect("missing debug support is not fatal");
        assert!(!negotiation.debug_utils);
        assert!(!negotiation.validation());
        assert!(
            negotiation
                .advisories
                .contains(&Advisory::DebugUtilsUnavailable)
        );

        let no_layer = negotiate_instance(
            &[SURFACE],
            &[SURFACE, ash::ext::debug_utils::NAME],
            &[],
            true,
        )
        .expect("missing layer is not fatal");
        assert!(no_layer.debug_utils);
        assert!(!no_layer.validation());
        assert_eq!(no_layer.advisories, vec![Advisory::ValidationLayerMissing]);
    }
}
