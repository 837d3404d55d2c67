// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Near clipping plane in meters; anything closer is background
pub const MIN_DISTANCE_METERS: f32 = 0.10;

/// Default far clipping plane in meters
pub const DEFAULT_MAX_DISTANCE_METERS: f32 = 1.00;

/// Default key color as 0xRRGGBB
pub const DEFAULT_KEY_COLOR: u32 = 0xdd44ff;

/// Default key color bytes (RGBA, fully opaque)
pub const DEFAULT_KEY_COLOR_BYTES: [u8; 4] = [0xdd, 0x44, 0xff, 0xff];

/// Default number of depth frames a pixel is remembered for
pub const DEFAULT_DEPTH_HISTORY: usize = 4;

/// Cutoff distance slider range (meters)
pub mod max_distance {
    pub const MIN: f32 = 0.25;
    pub const MAX: f32 = 3.0;
    pub const STEP: f32 = 0.0625;
}

/// Depth filter (history length) slider range
pub mod depth_filter {
    pub const MIN: usize = 1;
    pub const MAX: usize = 16;
}

/// Capture cadence in frames per second
pub const CAPTURE_FPS: u64 = 30;

/// Delay between two capture ticks
pub const CAPTURE_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / CAPTURE_FPS);

/// Format a resolution the way it is shown in device catalogs ("640 × 480")
pub fn resolution_label(width: u32, height: u32) -> String {
    format!("{} × {}", width, height)
}
