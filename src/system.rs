//! This module provides ways to get information about a running Linux system
//!
//! Currently that means the kernel `w1` one-wire bus, see [`w1`].

pub mod w1;
