//! High level bindings to the Linux one-wire temperature sensor interface
//!
//! # Implementation details
//!
//! The kernel `w1` bus driver, together with `w1_therm`, exposes bus masters
//! and DS18xx temperature sensors through files in `/sys/bus/w1/devices`, so
//! this library requires them to exist.
//!
//! Much of this interface is sparsely documented, and some of it has changed
//! between kernel versions.
//!
//! This crate attempts to correctly document the interface, and provide
//! kernel documentation sources where possible.
//! This is done on a best effort basis.
//!
//! Everything is synchronous and blocking. Logging goes through [`tracing`],
//! installing a subscriber is left to the application.
#![doc(html_root_url = "https://docs.rs/w1therm/0.1.0")]

pub mod error;
pub mod sysfs;

pub mod system;
mod util;
