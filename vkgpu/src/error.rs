//! Status code translation and the device-creation error taxonomy.
//!
//! Every native status code is classified at its call site: either it is
//! fatal to the operation ([`CreateDeviceError`], [`classify`]) or it is an
//! [`Advisory`] that gets logged while execution continues with the
//! affected feature disabled. Nothing here retries.

use std::ffi::CStr;

use ash::vk;
use thiserror::Error;

use crate::log::{self, LogLevel, LogSource};

/// Fatal failures while creating a [`Device`](crate::device::Device).
///
/// No partially-initialised device is ever handed out alongside one of
/// these; whatever was created before the failure is destroyed on unwind.
#[derive(Debug, Error)]
pub enum CreateDeviceError {
    #[error("{stage} failed: {}", result_name(*.result))]
    InitializationFailure {
        stage: &'static str,
        result: vk::Result,
    },

    #[error("Missing required capabilities: {0:?}")]
    MissingRequiredCapability(Vec<String>),

    #[error("No suitable physical device found")]
    NoSuitableDevice,

    #[error("Required device feature is not supported: {0}")]
    UnsupportedFeature(&'static str),

    #[error("Out of memory during {stage}")]
    ResourceExhaustion { stage: &'static str },

    #[error("Invalid window or display handle: {0}")]
    InvalidHandle(#[from] raw_window_handle::HandleError),

    #[error("Could not load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Invalid app name was passed in the instance config")]
    InvalidAppName,
}

/// Coarse category of a non-success status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    ResourceExhaustion,
    InitializationFailure,
}

pub fn classify(result: vk::Result) -> Fatality {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY => Fatality::ResourceExhaustion,
        _ => Fatality::InitializationFailure,
    }
}

impl CreateDeviceError {
    /// Translate a failed native call made during `stage`.
    pub fn from_vk(stage: &'static str, result: vk::Result) -> Self {
        match classify(result) {
            Fatality::ResourceExhaustion => Self::ResourceExhaustion { stage },
            Fatality::InitializationFailure => {
                Self::InitializationFailure { stage, result }
            }
        }
    }

    /// Returns a closure suitable for `map_err` at a native call site.
    pub(crate) fn at(stage: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::from_vk(stage, result)
    }
}

pub fn result_name(result: vk::Result) -> &'static str {
    use vk::Result as R;
    match result {
        R::ERROR_OUT_OF_HOST_MEMORY => "VK_ERROR_OUT_OF_HOST_MEMORY",
        R::ERROR_OUT_OF_DEVICE_MEMORY => "VK_ERROR_OUT_OF_DEVICE_MEMORY",
        R::ERROR_FRAGMENTED_POOL => "VK_ERROR_FRAGMENTED_POOL",
        R::ERROR_OUT_OF_POOL_MEMORY => "VK_ERROR_OUT_OF_POOL_MEMORY",
        R::ERROR_INITIALIZATION_FAILED => "VK_ERROR_INITIALIZATION_FAILED",
        R::ERROR_LAYER_NOT_PRESENT => "VK_ERROR_LAYER_NOT_PRESENT",
        R::ERROR_EXTENSION_NOT_PRESENT => "VK_ERROR_EXTENSION_NOT_PRESENT",
        R::ERROR_FEATURE_NOT_PRESENT => "VK_ERROR_FEATURE_NOT_PRESENT",
        R::ERROR_TOO_MANY_OBJECTS => "VK_ERROR_TOO_MANY_OBJECTS",
        R::ERROR_DEVICE_LOST => "VK_ERROR_DEVICE_LOST",
        R::ERROR_INCOMPATIBLE_DRIVER => "VK_ERROR_INCOMPATIBLE_DRIVER",
        R::ERROR_OUT_OF_DATE_KHR => "VK_ERROR_OUT_OF_DATE_KHR",
        R::ERROR_SURFACE_LOST_KHR => "VK_ERROR_SURFACE_LOST_KHR",
        R::ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT => {
            "VK_ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT"
        }
        R::SUBOPTIMAL_KHR => "VK_SUBOPTIMAL_KHR",
        _ => "Unhandled VkResult",
    }
}

/// A degraded-capability condition. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    DebugUtilsUnavailable,
    ValidationLayerMissing,
    ValidationEnabled,
    MessengerCreationFailed(vk::Result),
    OptionalExtensionMissing(&'static CStr),
    OpaqueCompositeUnsupported,
    DriverPropertiesUnavailable,
}

impl Advisory {
    pub fn level(&self) -> LogLevel {
        match self {
            Advisory::ValidationEnabled
            | Advisory::OptionalExtensionMissing(_)
            | Advisory::DriverPropertiesUnavailable => LogLevel::Info,
            Advisory::MessengerCreationFailed(_) => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Advisory::DebugUtilsUnavailable => format!(
                "{} is not supported, continuing without a debug messenger",
                ash::ext::debug_utils::NAME.to_string_lossy()
            ),
            Advisory::ValidationLayerMissing => {
                "Validation layers not found, continuing without validation"
                    .into()
            }
            Advisory::ValidationEnabled => {
                "Vulkan validation enabled! Expect debug-level performance!"
                    .into()
            }
            Advisory::MessengerCreationFailed(result) => format!(
                "Could not create the debug messenger ({}), \
                 continuing without one",
                result_name(*result)
            ),
            Advisory::OptionalExtensionMissing(name) => format!(
                "Optional extension {} unavailable",
                name.to_string_lossy()
            ),
            Advisory::OpaqueCompositeUnsupported => {
                "Opaque presentation unsupported! \
                 Expect weird transparency bugs!"
                    .into()
            }
            Advisory::DriverPropertiesUnavailable => {
                "KHR_driver_properties unsupported! \
                 Bother your vendor about this!"
                    .into()
            }
        }
    }

    /// Advisories come from device bring-up, never from the layer.
    pub fn log_source(&self) -> LogSource {
        LogSource::Driver
    }

    pub fn report(&self) {
        log::emit(self.log_source(), self.level(), &self.message());
    }
}
