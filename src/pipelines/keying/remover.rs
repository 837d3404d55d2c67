// SPDX-License-Identifier: GPL-3.0-only

//! Depth-threshold background removal
//!
//! For every pixel of an aligned color/depth pair the keyer decides whether
//! the sample lies inside the clip range. Foreground pixels keep their source
//! color; everything else is replaced by the key color.

use tracing::trace;

use super::history::DepthHistory;
use crate::backends::depth::{ClipRange, ColorFrame, DepthFrame, KeyColor, VideoFormat};
use crate::constants::{DEFAULT_DEPTH_HISTORY, DEFAULT_MAX_DISTANCE_METERS, MIN_DISTANCE_METERS};

/// User-facing keying parameters, independent of any device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyingSettings {
    pub key_color: KeyColor,
    /// Near clipping plane in meters
    pub min_distance: f32,
    /// Far clipping plane in meters
    pub max_distance: f32,
    /// Depth frames remembered per pixel (1 = current frame only)
    pub history_length: usize,
}

impl Default for KeyingSettings {
    fn default() -> Self {
        Self {
            key_color: KeyColor::default(),
            min_distance: MIN_DISTANCE_METERS,
            max_distance: DEFAULT_MAX_DISTANCE_METERS,
            history_length: DEFAULT_DEPTH_HISTORY,
        }
    }
}

/// Per-pixel keyer bound to one device's depth scale
#[derive(Debug, Clone)]
pub struct BackgroundRemover {
    format: VideoFormat,
    settings: KeyingSettings,
    depth_scale: f32,
    clip: ClipRange,
    history: DepthHistory,
}

impl BackgroundRemover {
    pub fn new(format: VideoFormat, settings: KeyingSettings, depth_scale: f32) -> Self {
        Self {
            format,
            settings,
            depth_scale,
            clip: ClipRange::from_meters(settings.min_distance, settings.max_distance, depth_scale),
            history: DepthHistory::new(settings.history_length),
        }
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn clip_range(&self) -> ClipRange {
        self.clip
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    pub fn history(&self) -> &DepthHistory {
        &self.history
    }

    /// Adopt a new device depth scale (after recalibration)
    pub fn set_depth_scale(&mut self, depth_scale: f32) {
        self.depth_scale = depth_scale;
        self.update_clip();
        // Samples in the old unit are meaningless under the new scale
        self.history.clear();
    }

    pub fn set_key_color(&mut self, rgb: u32) {
        self.settings.key_color.set_rgb24(rgb);
    }

    pub fn set_transparency(&mut self, alpha: u8) {
        self.settings.key_color.set_alpha(alpha);
    }

    pub fn set_max_distance(&mut self, meters: f32) {
        self.settings.max_distance = meters;
        self.update_clip();
    }

    pub fn set_history_length(&mut self, length: usize) {
        self.settings.history_length = length.max(1);
        self.history.set_capacity(length);
    }

    fn update_clip(&mut self) {
        self.clip = ClipRange::from_meters(
            self.settings.min_distance,
            self.settings.max_distance,
            self.depth_scale,
        );
    }

    /// Key one aligned frame pair into `dest`
    ///
    /// Only whole rows that fit into `dest` are written; the remainder of
    /// `dest` is left untouched. Returns the number of rows written. A pair
    /// whose geometry does not match writes nothing.
    pub fn process(&mut self, dest: &mut [u8], color: &ColorFrame, depth: &DepthFrame) -> usize {
        let width = color.width as usize;
        let height = color.height as usize;
        let src_bpp = color.bytes_per_pixel;
        let dst_bpp = self.format.bytes_per_pixel();

        if depth.width != color.width
            || depth.height != color.height
            || src_bpp == 0
            || color.data.len() < width * height * src_bpp
            || depth.data.len() < width * height
        {
            trace!(
                color = ?(color.width, color.height),
                depth = ?(depth.width, depth.height),
                "Frame pair geometry mismatch"
            );
            return 0;
        }

        let use_history = self.history.is_enabled();
        if use_history {
            self.history.push(depth);
        }

        let row_bytes = width * dst_bpp;
        if row_bytes == 0 {
            return 0;
        }
        let rows = if row_bytes * height <= dest.len() {
            height
        } else {
            dest.len() / row_bytes
        };

        let clip = self.clip;
        let key = self.settings.key_color;
        let key_bytes = key.bytes(dst_bpp);
        let copy_bytes = src_bpp.min(dst_bpp);
        let force_opaque = dst_bpp == 4 && src_bpp < 4;

        let src_rows = color.data.chunks_exact(width * src_bpp);
        let depth_rows = depth.data.chunks_exact(width);
        let dst_rows = dest.chunks_exact_mut(row_bytes).take(rows);

        for (y, ((dst_row, src_row), depth_row)) in dst_rows.zip(src_rows).zip(depth_rows).enumerate()
        {
            let row_start = y * width;
            let pixels = dst_row
                .chunks_exact_mut(dst_bpp)
                .zip(src_row.chunks_exact(src_bpp))
                .zip(depth_row.iter());

            for (x, ((out, src), &raw)) in pixels.enumerate() {
                let foreground = if use_history {
                    self.history.any_in_range(row_start + x, &clip)
                } else {
                    clip.contains(raw)
                };

                if foreground {
                    out[..copy_bytes].copy_from_slice(&src[..copy_bytes]);
                    if force_opaque {
                        out[3] = 0xff;
                    }
                } else {
                    out.copy_from_slice(key_bytes);
                }
            }
        }

        rows
    }
}
