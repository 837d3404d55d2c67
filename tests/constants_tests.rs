// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use depth_greenscreen::backends::depth::ClipRange;
use depth_greenscreen::constants::{
    CAPTURE_INTERVAL, DEFAULT_KEY_COLOR, DEFAULT_KEY_COLOR_BYTES, DEFAULT_MAX_DISTANCE_METERS,
    MIN_DISTANCE_METERS, depth_filter, max_distance, resolution_label,
};
use std::time::Duration;

#[test]
fn test_default_key_color_bytes_match_rgb() {
    let [r, g, b, a] = DEFAULT_KEY_COLOR_BYTES;
    assert_eq!(u32::from_be_bytes([0, r, g, b]), DEFAULT_KEY_COLOR);
    assert_eq!(a, 0xff, "Default key color should be opaque");
}

#[test]
fn test_default_max_distance_within_slider_range() {
    assert!(DEFAULT_MAX_DISTANCE_METERS >= max_distance::MIN);
    assert!(DEFAULT_MAX_DISTANCE_METERS <= max_distance::MAX);
    assert!(MIN_DISTANCE_METERS < max_distance::MIN);
}

#[test]
fn test_slider_steps_land_on_range_ends() {
    let steps = (max_distance::MAX - max_distance::MIN) / max_distance::STEP;
    assert_eq!(steps.fract(), 0.0);
    assert!(depth_filter::MIN >= 1);
    assert!(depth_filter::MIN < depth_filter::MAX);
}

#[test]
fn test_default_clip_range_in_millimeters() {
    let clip = ClipRange::from_meters(MIN_DISTANCE_METERS, DEFAULT_MAX_DISTANCE_METERS, 0.001);
    assert_eq!((clip.lower, clip.upper), (100, 999));
    assert!(!clip.contains(1000), "Exactly the far plane is background");
}

#[test]
fn test_capture_interval_is_thirty_hertz() {
    assert_eq!(CAPTURE_INTERVAL, Duration::from_nanos(33_333_333));
}

#[test]
fn test_resolution_label() {
    assert_eq!(resolution_label(1280, 720), "1280 × 720");
}
