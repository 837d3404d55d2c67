// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for depth camera capture
//!
//! The core only sees the capability traits in [`depth`]; SDK adapters for
//! physical cameras implement them outside this crate. The in-process
//! virtual adapter is the one shipped here.

pub mod depth;
