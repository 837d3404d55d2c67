// SPDX-License-Identifier: GPL-3.0-only

//! Depth Greenscreen - depth-keyed background removal for depth cameras
//!
//! Pixels whose depth lies inside a configurable clip range keep their
//! color; everything else is replaced by a key color, producing a
//! greenscreen effect without a physical screen.
//!
//! # Architecture
//!
//! - [`backends`]: hardware capability interface, enumeration, sessions
//! - [`pipelines`]: background removal and the capture engine
//! - [`config`]: persistent settings
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use depth_greenscreen::{CaptureEngine, VideoFormat, VirtualBackend};
//!
//! let engine = CaptureEngine::new(Arc::new(VirtualBackend::demo()), VideoFormat::Rgba)?;
//! let mut buffer = vec![0u8; engine.frame_size()];
//! if engine.get_frame(&mut buffer)? {
//!     // buffer holds one keyed frame
//! }
//! # Ok::<(), depth_greenscreen::DeviceError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;

// Re-export commonly used types
pub use backends::depth::{
    CameraDescriptor, Catalog, DepthBackend, DepthPipeline, DeviceEnumerator, DeviceSession,
    VideoFormat, VirtualBackend, VirtualControl, VirtualDeviceSpec,
};
pub use config::{JsonSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use errors::{ConfigError, DeviceError, DeviceResult, EngineError};
pub use pipelines::capture::{
    CaptureEngine, CaptureHandle, ChannelSink, FrameSink, KeyedFrame, OutputFrame, start_capture,
};
pub use pipelines::keying::{BackgroundRemover, KeyingSettings};
