// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for depth camera backends

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_KEY_COLOR_BYTES, resolution_label};

/// Output pixel layout produced by the keyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoFormat {
    /// 24-bit RGB (3 bytes per pixel)
    #[default]
    Rgb,
    /// 32-bit RGBA (4 bytes per pixel)
    Rgba,
}

impl VideoFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            VideoFormat::Rgb => 3,
            VideoFormat::Rgba => 4,
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoFormat::Rgb => write!(f, "RGB"),
            VideoFormat::Rgba => write!(f, "RGBA"),
        }
    }
}

/// Color written for background pixels
///
/// Stored as RGBA; RGB outputs use the first three bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColor([u8; 4]);

impl KeyColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Replace the color channels, keeping the current alpha
    pub fn set_rgb24(&mut self, rgb: u32) {
        self.0[0] = ((rgb >> 16) & 0xff) as u8;
        self.0[1] = ((rgb >> 8) & 0xff) as u8;
        self.0[2] = (rgb & 0xff) as u8;
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.0[3] = alpha;
    }

    pub fn rgb24(&self) -> u32 {
        (u32::from(self.0[0]) << 16) | (u32::from(self.0[1]) << 8) | u32::from(self.0[2])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// The first `bytes_per_pixel` bytes of the color
    pub fn bytes(&self, bytes_per_pixel: usize) -> &[u8] {
        &self.0[..bytes_per_pixel.min(4)]
    }
}

impl Default for KeyColor {
    fn default() -> Self {
        Self(DEFAULT_KEY_COLOR_BYTES)
    }
}

/// Foreground volume in device depth units
///
/// A sample `d` is foreground when `lower < d <= upper`. A raw value of 0
/// means "no reading" and is never foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipRange {
    pub lower: u16,
    pub upper: u16,
}

impl ClipRange {
    /// Convert a meter interval to device units using the sensor's depth scale
    pub fn from_meters(min_meters: f32, max_meters: f32, depth_scale: f32) -> Self {
        if !(depth_scale > 0.0) {
            return Self::default();
        }
        // Truncates toward zero: 1.0 / 0.001 is 999.99994 in f32, so a
        // sample at exactly 1000 mm lies past the far plane. `as` saturates,
        // so out-of-range distances clamp to the u16 bounds.
        Self {
            lower: (min_meters / depth_scale) as u16,
            upper: (max_meters / depth_scale) as u16,
        }
    }

    #[inline]
    pub fn contains(&self, depth: u16) -> bool {
        depth > self.lower && depth <= self.upper
    }
}

/// Kind of stream a device can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
    Fisheye,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Depth => write!(f, "depth"),
            StreamKind::Color => write!(f, "color"),
            StreamKind::Infrared => write!(f, "infrared"),
            StreamKind::Fisheye => write!(f, "fisheye"),
        }
    }
}

/// One stream of an active pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Identity assigned by the hardware; changes when the stream is recreated
    pub unique_id: u32,
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
}

/// Device and stream set a pipeline is currently running with
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineProfile {
    pub device_name: String,
    pub serial: String,
    pub streams: Vec<StreamInfo>,
}

impl PipelineProfile {
    pub fn stream(&self, kind: StreamKind) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == kind)
    }
}

/// An attached device as reported by the hardware query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: String,
    /// Resolutions offered by the color sensor, in any order
    pub color_resolutions: Vec<(u32, u32)>,
}

/// Request passed to [`super::DepthBackend::open_pipeline`]
///
/// The default configuration starts the first device with its default streams.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    pub serial: Option<String>,
    pub color_resolution: Option<(u32, u32)>,
}

impl PipelineConfig {
    pub fn for_device(serial: &str, width: u32, height: u32) -> Self {
        Self {
            serial: Some(serial.to_string()),
            color_resolution: Some((width, height)),
        }
    }
}

/// One selectable (device, resolution) combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Display label, "<device name> [<serial>]"
    pub label: String,
    pub serial: String,
    pub width: u32,
    pub height: u32,
    /// Resolution label, "<width> × <height>"
    pub resolution: String,
}

impl CameraDescriptor {
    pub fn new(device_name: &str, serial: &str, width: u32, height: u32) -> Self {
        Self {
            label: format!("{} [{}]", device_name, serial),
            serial: serial.to_string(),
            width,
            height,
            resolution: resolution_label(width, height),
        }
    }

    /// Identity check on (serial, resolution label)
    pub fn matches(&self, serial: &str, resolution: &str) -> bool {
        self.serial == serial && self.resolution == resolution
    }

    pub fn same_mode(&self, serial: &str, width: u32, height: u32) -> bool {
        self.serial == serial && self.width == width && self.height == height
    }
}

impl std::fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.label, self.resolution)
    }
}

/// Depth samples in device units, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl DepthFrame {
    pub fn filled(width: u32, height: u32, value: u16) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }
}

/// Packed 8-bit video frame (RGB or RGBA), row-major without padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFrame {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
    pub data: Vec<u8>,
}

impl ColorFrame {
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * pixel.len());
        for _ in 0..count {
            data.extend_from_slice(pixel);
        }
        Self {
            width,
            height,
            bytes_per_pixel: pixel.len(),
            data,
        }
    }
}

/// A raw frame as delivered by the hardware before alignment
#[derive(Debug, Clone)]
pub enum RawFrame {
    Depth(DepthFrame),
    Video { kind: StreamKind, frame: ColorFrame },
}

/// Frames delivered together by one wait
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    pub frames: Vec<RawFrame>,
    /// Hardware frame counter
    pub sequence: u64,
}

impl FrameSet {
    pub fn depth(&self) -> Option<&DepthFrame> {
        self.frames.iter().find_map(|f| match f {
            RawFrame::Depth(depth) => Some(depth),
            _ => None,
        })
    }

    pub fn video(&self, kind: StreamKind) -> Option<&ColorFrame> {
        self.frames.iter().find_map(|f| match f {
            RawFrame::Video { kind: k, frame } if *k == kind => Some(frame),
            _ => None,
        })
    }
}

/// Depth remapped onto the pixel grid of another stream
///
/// Either side may be missing for a cycle; callers treat that as a
/// transient miss.
#[derive(Debug, Clone, Default)]
pub struct AlignedFrames {
    pub depth: Option<DepthFrame>,
    pub other: Option<ColorFrame>,
}

/// Resample a depth frame onto a `width` x `height` grid (nearest neighbour)
pub fn resample_depth_nearest(depth: &DepthFrame, width: u32, height: u32) -> DepthFrame {
    if depth.width == width && depth.height == height {
        return depth.clone();
    }

    let (w, h) = (width as usize, height as usize);
    let (sw, sh) = (depth.width as usize, depth.height as usize);
    let mut data = Vec::with_capacity(w * h);
    if sw == 0 || sh == 0 {
        data.resize(w * h, 0);
    } else {
        for y in 0..h {
            let sy = y * sh / h;
            for x in 0..w {
                let sx = x * sw / w;
                data.push(depth.data[sy * sw + sx]);
            }
        }
    }

    DepthFrame {
        width,
        height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_color_alpha_is_independent() {
        let mut color = KeyColor::default();
        color.set_alpha(0);
        color.set_rgb24(0x00ff00);
        assert_eq!(color.bytes(4), &[0x00, 0xff, 0x00, 0x00]);
        assert_eq!(color.rgb24(), 0x00ff00);

        color.set_alpha(0x80);
        assert_eq!(color.bytes(3), &[0x00, 0xff, 0x00]);
        assert_eq!(color.alpha(), 0x80);
    }

    #[test]
    fn test_clip_range_is_half_open() {
        // 1mm units: 0.1m -> 100, 1.0m -> 999 (truncated)
        let clip = ClipRange::from_meters(0.1, 1.0, 0.001);
        assert_eq!(clip.lower, 100);
        assert_eq!(clip.upper, 999);

        assert!(!clip.contains(0));
        assert!(!clip.contains(100));
        assert!(clip.contains(101));
        assert!(clip.contains(999));
        assert!(!clip.contains(1000));
    }

    #[test]
    fn test_clip_range_rejects_bad_scale() {
        let clip = ClipRange::from_meters(0.1, 1.0, 0.0);
        assert!(!clip.contains(0));
        assert!(!clip.contains(500));
    }

    #[test]
    fn test_descriptor_labels() {
        let desc = CameraDescriptor::new("Intel RealSense D435", "8273", 1280, 720);
        assert_eq!(desc.label, "Intel RealSense D435 [8273]");
        assert_eq!(desc.resolution, "1280 × 720");
        assert!(desc.matches("8273", "1280 × 720"));
        assert!(!desc.matches("8273", "640 × 480"));
    }

    #[test]
    fn test_resample_depth_nearest() {
        let depth = DepthFrame {
            width: 2,
            height: 2,
            data: vec![1, 2, 3, 4],
        };
        let up = resample_depth_nearest(&depth, 4, 2);
        assert_eq!(up.data, vec![1, 1, 2, 2, 3, 3, 4, 4]);

        let down = resample_depth_nearest(&up, 2, 1);
        assert_eq!(down.data, vec![1, 2]);
    }
}
