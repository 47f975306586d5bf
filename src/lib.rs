//! Hearth component framework.
//!
//! The structural core of a networked home-automation firmware: a
//! component lifecycle state machine, a per-component cooperative
//! scheduler (intervals, timeouts, deferrals), an orchestrator that
//! drives registered components through setup and a priority-ordered
//! main loop, and name/slug plumbing for network-facing identifiers.
//!
//! All device-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! inside [`platform`]; host builds run against `std` so every module
//! can be exercised in tests with a simulated clock.

#![deny(unused_must_use)]

pub mod app;
pub mod component;
pub mod config;
pub mod nameable;
pub mod platform;

pub use app::{App, Controller, Handle, handle};
pub use component::{
    Component, ComponentCore, ComponentState, Lifecycle, TaskFn, TaskKind, UPDATE_TASK, priority,
};
pub use config::{ConfigError, DeviceConfig};
pub use nameable::{MachineId, Nameable, slugify};
pub use platform::{Platform, PlatformHandle, SimPlatform, SystemPlatform};
