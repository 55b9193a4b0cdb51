// SPDX-License-Identifier: MIT

//! The `bootsel-rs` library crate.
//!
//! This holds the volume scanner, the boot sector and partition table
//! inspection code, the configuration parser, and the menu state machine.
//! Frontends such as [bootsel-rs-text](https://github.com/bootsel-rs/bootsel-rs/tree/main/bootsel-rs-text)
//! only have to provide rendering and dispatch on top of this crate.
//!
//! ## MSRV
//!
//! The minimum supported rust version is 1.88.0.

#![cfg_attr(not(any(test, doctest)), no_std)]

/// The primary result type that wraps around [`crate::error::BootError`].
pub type BootResult<T> = Result<T, crate::error::BootError>;

pub mod boot;
pub mod config;
pub mod error;
pub mod menu;
pub mod scan;
pub mod system;
pub mod vol;

extern crate alloc;
