// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for keyed capture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Aligned pair │ ──▶ │  Keying           │ ──▶ │ Keyed buffer │
//! │ depth+color  │     │  - clip range     │     │ RGB / RGBA   │
//! │              │     │  - depth history  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`keying`]: per-pixel background removal
//! - [`capture`]: engine, capture thread and frame sinks

pub mod capture;
pub mod keying;
