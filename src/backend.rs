//! Device selection module.
//!
//! This module tracks the device that kernels are currently launched on and
//! maps device ids to the computation backend that serves them.
//!
//! # Device Ids
//!
//! - Negative ids (conventionally [`HOST_DEVICE`]) run on the CPU backend.
//! - Non-negative ids name accelerator adapters, in the order `wgpu`
//!   enumerates them.
//!
//! The current device is stored globally in an `AtomicI32`. Dispatch code never
//! sets it directly; it acquires a [`DeviceGuard`], which restores the previous
//! device when it goes out of scope, on success and error paths alike.
//!
//! Context switches are not synchronized across host threads. Callers that
//! dispatch to different devices from several threads must serialize the
//! switches themselves.

use core::sync::atomic::{AtomicI32, Ordering};

/// Device id of the host (CPU).
pub const HOST_DEVICE: i32 = -1;

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Pure CPU-based backend (default).
    #[default]
    Cpu,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu,
}

impl Backend {
    /// Backend responsible for a device id.
    #[must_use]
    pub const fn for_device(dev_id: i32) -> Self {
        if dev_id < 0 { Self::Cpu } else { Self::Wgpu }
    }
}

/// Internal global state for the active device.
static CURRENT_DEVICE: AtomicI32 = AtomicI32::new(HOST_DEVICE);

/// Returns the device kernels are currently launched on.
///
/// # Example
///
/// ```
/// use subdim::backend::{get_device, HOST_DEVICE};
/// assert_eq!(get_device(), HOST_DEVICE);
/// ```
pub fn get_device() -> i32 {
    CURRENT_DEVICE.load(Ordering::Acquire)
}

/// Makes `dev_id` the current device and returns the previous one.
pub fn set_device(dev_id: i32) -> i32 {
    CURRENT_DEVICE.swap(dev_id, Ordering::AcqRel)
}

/// Scoped selection of the current device.
///
/// The previous device is captured on construction and restored on drop.
#[derive(Debug)]
#[must_use = "the previous device is restored as soon as the guard is dropped"]
pub struct DeviceGuard {
    previous: i32,
    selected: i32,
}

impl DeviceGuard {
    /// Switches to `dev_id` until the guard is dropped.
    pub fn select(dev_id: i32) -> Self {
        let previous = set_device(dev_id);
        if previous != dev_id {
            log::trace!("switched device {previous} -> {dev_id}");
        }
        Self {
            previous,
            selected: dev_id,
        }
    }

    /// Device this guard switched to.
    #[must_use]
    pub const fn selected(&self) -> i32 {
        self.selected
    }

    /// Device that will be restored on drop.
    #[must_use]
    pub const fn previous(&self) -> i32 {
        self.previous
    }

    /// Backend serving the selected device.
    #[must_use]
    pub const fn backend(&self) -> Backend {
        Backend::for_device(self.selected)
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        set_device(self.previous);
        if self.previous != self.selected {
            log::trace!("restored device {} -> {}", self.selected, self.previous);
        }
    }
}
