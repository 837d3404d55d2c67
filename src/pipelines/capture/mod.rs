// SPDX-License-Identifier: GPL-3.0-only

//! Capture orchestration
//!
//! ```text
//! ┌───────────────┐  get_frame   ┌───────────────┐  OutputFrame  ┌───────────┐
//! │ capture thread│ ───────────▶ │ CaptureEngine │ ────────────▶ │ FrameSink │
//! └───────────────┘              └───────┬───────┘               └───────────┘
//!        ▲                               │ owns one
//!        │ set_config / setters          ▼
//!   other threads                 DeviceSession
//! ```

mod driver;
mod engine;
mod sink;

pub use driver::{CaptureHandle, start_capture, start_capture_with_interval};
pub use engine::{CaptureEngine, FrameGeometry, SessionInfo};
pub use sink::{ChannelSink, FrameSink, KeyedFrame, OutputFrame};
