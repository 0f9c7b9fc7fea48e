//! Vulkan device bring-up and command buffer management, built on [`ash`].
//!
//! The crate covers the part of a GPU driver that runs before and around
//! any rendering: negotiating instance capabilities, picking the physical
//! device that best fits a window, creating the logical device, and handing
//! out per-thread command buffers. Everything else in the portable
//! [`backend::GpuBackend`] table is accepted and ignored.
//!
//! # Object hierarchy
//!
//! ```text
//! Instance
//! ├── Surface (transient, selection only)
//! └── Device
//!     └── CommandRegistry
//!         └── CommandPool (one per thread) → CommandBuffer
//! ```
//!
//! Each wrapper holds its parent via `Arc` (or a borrow, for command
//! buffers) so parents cannot be destroyed while children are alive.
//!
//! # Naming conventions
//!
//! | prefix  | meaning                                   |
//! |---------|-------------------------------------------|
//! | `raw_*` | accepts or returns a raw `ash::vk` handle |
//! | `ash_*` | returns the `ash` wrapper object          |

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod backend;
pub mod command;
pub mod cpu_buffer;
pub mod device;
pub mod error;
pub mod extensions;
pub mod instance;
pub mod log;
pub mod selection;
pub mod surface;

pub use ash;
pub use raw_window_handle::HandleError as RwhHandleError;

pub use backend::GpuBackend;
pub use command::{CommandBufferError, PoolStats};
pub use device::{CommandBuffer, Device};
pub use error::{Advisory, CreateDeviceError};
pub use instance::{Instance, InstanceConfig};
pub use log::VulkanLogLevel;
