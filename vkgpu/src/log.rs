//! Severity mapping between the Vulkan debug layer and [`tracing`].
//!
//! The driver only distinguishes three host-side levels. Every message
//! from the validation layer, and every advisory raised during device
//! creation, goes through [`emit`]. Layer messages are mapped with
//! [`severity_level`] first and keep their own target.

use std::ffi::CStr;

use ash::vk;

pub(crate) const DEBUG_TARGET: &str = "vkgpu-debug-messenger";
pub(crate) const DRIVER_TARGET: &str = "vkgpu";

/// Minimum severity the debug messenger subscribes to.
///
/// Passed through [`InstanceConfig::debug`](crate::instance::InstanceConfig).
/// Messages below the chosen level are never delivered by the layer.
/// Variants are ordered least-to-most severe.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub enum VulkanLogLevel {
    #[default]
    Verbose,
    Info,
    Warning,
    Error,
}

impl VulkanLogLevel {
    pub fn message_severity(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
        match self {
            VulkanLogLevel::Verbose => {
                Sev::VERBOSE | Sev::INFO | Sev::WARNING | Sev::ERROR
            }
            VulkanLogLevel::Info => Sev::INFO | Sev::WARNING | Sev::ERROR,
            VulkanLogLevel::Warning => Sev::WARNING | Sev::ERROR,
            VulkanLogLevel::Error => Sev::ERROR,
        }
    }
}

/// Host-side log level.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Map a native message severity onto a host log level.
///
/// Anything at or above the error bit is an error, anything at or above
/// the warning bit is a warning, everything else (verbose, info) is info.
pub fn severity_level(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
) -> LogLevel {
    let raw = severity.as_raw();
    if raw >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw() {
        LogLevel::Error
    } else if raw >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    }
}

/// Where a message came from. Each source logs under its own target.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogSource {
    /// The validation layer, through the debug messenger.
    DebugMessenger,
    /// Advisories raised by this crate during device bring-up.
    Driver,
}

impl LogSource {
    pub fn target(self) -> &'static str {
        match self {
            LogSource::DebugMessenger => DEBUG_TARGET,
            LogSource::Driver => DRIVER_TARGET,
        }
    }
}

pub fn emit(source: LogSource, level: LogLevel, message: &str) {
    use LogSource::{DebugMessenger, Driver};
    match (source, level) {
        (DebugMessenger, LogLevel::Info) => {
            tracing::info!(target: DEBUG_TARGET, "{message}")
        }
        (DebugMessenger, LogLevel::Warn) => {
            tracing::warn!(target: DEBUG_TARGET, "{message}")
        }
        (DebugMessenger, LogLevel::Error) => {
            tracing::error!(target: DEBUG_TARGET, "{message}")
        }
        (Driver, LogLevel::Info) => {
            tracing::info!(target: DRIVER_TARGET, "{message}")
        }
        (Driver, LogLevel::Warn) => {
            tracing::warn!(target: DRIVER_TARGET, "{message}")
        }
        (Driver, LogLevel::Error) => {
            tracing::error!(target: DRIVER_TARGET, "{message}")
        }
    }
}

fn message_type_name(
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    }
}

pub(crate) fn format_debug_message(
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message: &str,
) -> String {
    format!(
        "VULKAN DEBUG: [{}] {}",
        message_type_name(message_type),
        message
    )
}

pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    //SAFETY: Vulkan guarantees p_callback_data is valid for the duration of
    //the callback, and we checked it is non-null
    let p_message = unsafe { (*p_callback_data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    //SAFETY: p_message is a non-null, null-terminated string owned by the
    //layer for the duration of the callback
    let message = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();

    emit(
        LogSource::DebugMessenger,
        severity_level(message_severity),
        &format_debug_message(message_type, &message),
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;

    #[test]
    fn severity_maps_to_three_levels() {
        assert_eq!(severity_level(Sev::VERBOSE), LogLevel::Info);
        assert_eq!(severity_level(Sev::INFO), LogLevel::Info);
        assert_eq!(severity_level(Sev::WARNING), LogLevel::Warn);
        assert_eq!(severity_level(Sev::ERROR), LogLevel::Error);
    }

    #[test]
    fn combined_bits_take_the_highest_severity() {
        assert_eq!(severity_level(Sev::INFO | Sev::WARNING), LogLevel::Warn);
        assert_eq!(severity_level(Sev::WARNING | Sev::ERROR), LogLevel::Error);
    }

    #[test]
    fn log_level_filters_are_cumulative() {
        let warning = VulkanLogLevel::Warning.message_severity();
        assert!(warning.contains(Sev::WARNING | Sev::ERROR));
        assert!(!warning.contains(Sev::INFO));

        let verbose = VulkanLogLevel::Verbose.message_severity();
        assert!(verbose.contains(
            Sev::VERBOSE | Sev::INFO | Sev::WARNING | Sev::ERROR
        ));
    }

    #[test]
    fn debug_messages_are_prefixed_with_their_type() {
        let formatted = format_debug_message(
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            "bad layout",
        );
        assert_eq!(formatted, "VULKAN DEBUG: [VALIDATION] bad layout");
    }

    #[test]
    fn driver_messages_are_not_tagged_as_layer_output() {
        assert_eq!(LogSource::DebugMessenger.target(), "vkgpu-debug-messenger");
        assert_eq!(LogSource::Driver.target(), "vkgpu");
        assert_ne!(
            LogSource::Driver.target(),
            LogSource::DebugMessenger.target()
        );
    }
}
