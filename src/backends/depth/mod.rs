// SPDX-License-Identifier: GPL-3.0-only

//! Depth camera backend abstraction
//!
//! The core never talks to a vendor SDK directly. Each supported SDK provides
//! an adapter implementing [`DepthBackend`] (device discovery, pipeline
//! start) and [`DepthPipeline`] (one running stream connection).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │    CaptureEngine    │  ← catalog, hot-swap, exclusive guard
//! └──────────┬──────────┘
//!            │ owns exactly one
//!            ▼
//! ┌─────────────────────┐
//! │    DeviceSession    │  ← alignment target, depth scale, keying
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DepthPipeline Trait │  ← wait / align / depth scale
//! └──────────┬──────────┘
//!            │
//!            ▼
//!       ┌─────────┐
//!       │ Virtual │  ← in-process adapter (demo + tests)
//!       └─────────┘
//! ```

pub mod enumeration;
pub mod frame_loop;
pub mod session;
pub mod types;
pub mod virtual_device;

pub use enumeration::{Catalog, DeviceEnumerator};
pub use frame_loop::{CaptureLoopController, LoopAction};
pub use session::{DeviceSession, SessionState};
pub use types::*;
pub use virtual_device::{VirtualBackend, VirtualControl, VirtualDeviceSpec};

use crate::errors::DeviceResult;

/// Entry point of a depth camera SDK adapter
pub trait DepthBackend: Send + Sync {
    /// List attached devices and the resolutions of their color sensors
    fn query_devices(&self) -> DeviceResult<Vec<DeviceInfo>>;

    /// Start streaming with the requested device and resolution
    ///
    /// The returned pipeline is already running; it must be stopped with
    /// [`DepthPipeline::stop`] before it is dropped.
    fn open_pipeline(&self, config: &PipelineConfig) -> DeviceResult<Box<dyn DepthPipeline>>;
}

/// A running hardware stream connection
pub trait DepthPipeline: Send {
    /// Device and streams the pipeline is running with right now
    ///
    /// The hardware may replace the stream set between two waits (e.g. after
    /// a reconnect), so callers compare profiles across waits.
    fn active_profile(&self) -> PipelineProfile;

    /// Block until the next frame set is available
    fn wait_for_frames(&mut self) -> DeviceResult<FrameSet>;

    /// Remap the depth frame of `frames` onto the grid of the `align_to` stream
    fn align(&self, frames: &FrameSet, align_to: StreamKind) -> AlignedFrames;

    /// Meters per depth unit of the active device's depth sensor
    fn depth_scale(&self) -> DeviceResult<f32>;

    /// Stop streaming and release the device
    fn stop(&mut self);
}
