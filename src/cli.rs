// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the depth greenscreen
//!
//! This module provides command-line functionality for:
//! - Listing every device and resolution combination
//! - Running the keyed capture loop and saving the last frame

use chrono::Local;
use crossbeam_channel::RecvTimeoutError;
use depth_greenscreen::constants::{depth_filter, max_distance};
use depth_greenscreen::{
    CameraDescriptor, CaptureEngine, ChannelSink, JsonSettingsStore, KeyedFrame,
    MemorySettingsStore, SettingsStore, VideoFormat, VirtualBackend, start_capture,
};
use image::{RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Options for the `run` command
#[derive(Debug, Default)]
pub struct RunOptions {
    pub serial: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth_filter: Option<usize>,
    pub max_distance: Option<f32>,
    pub color: Option<u32>,
    pub rgba: bool,
    pub frames: Option<u64>,
    pub output: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub save: bool,
}

/// Parse a key color given as `0xRRGGBB`, `#RRGGBB` or `RRGGBB`
pub fn parse_color(value: &str) -> Result<u32, String> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('#'))
        .unwrap_or(value);

    let rgb = u32::from_str_radix(hex, 16).map_err(|e| format!("invalid color {value}: {e}"))?;
    if rgb > 0xff_ffff {
        return Err(format!("color {value} does not fit in 24 bits"));
    }
    Ok(rgb)
}

/// List all device and resolution combinations
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let engine = CaptureEngine::new(Arc::new(VirtualBackend::demo()), VideoFormat::Rgb)?;

    println!("Available devices:");
    println!();
    for (index, entry) in engine.enumerate().iter().enumerate() {
        let marker = if index == 0 { "*" } else { " " };
        println!(
            " {} serial={}  width={}  height={}  {}",
            marker, entry.serial, entry.width, entry.height, entry.label
        );
    }

    Ok(())
}

/// First catalog entry matching every given filter
fn select_entry<'a>(
    entries: &'a [CameraDescriptor],
    serial: Option<&str>,
    width: Option<u32>,
    height: Option<u32>,
) -> Option<&'a CameraDescriptor> {
    entries.iter().find(|entry| {
        serial.is_none_or(|s| entry.serial == s)
            && width.is_none_or(|w| entry.width == w)
            && height.is_none_or(|h| entry.height == h)
    })
}

fn open_store(path: Option<&Path>) -> Box<dyn SettingsStore> {
    if let Some(path) = path {
        return Box::new(JsonSettingsStore::new(path));
    }
    match JsonSettingsStore::default_location() {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, "Settings will not persist");
            Box::new(MemorySettingsStore::default())
        }
    }
}

/// Run the keyed capture loop
pub fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let format = if options.rgba {
        VideoFormat::Rgba
    } else {
        VideoFormat::Rgb
    };

    let store = open_store(options.settings.as_deref());
    let engine = CaptureEngine::with_settings(Arc::new(VirtualBackend::demo()), format, store)?;

    if options.serial.is_some() || options.width.is_some() || options.height.is_some() {
        let entries = engine.enumerate();
        let entry = select_entry(
            &entries,
            options.serial.as_deref(),
            options.width,
            options.height,
        )
        .ok_or("did not find matching device")?;
        engine.set_config(&entry.serial, &entry.resolution)?;
    }

    if let Some(length) = options.depth_filter {
        engine.set_depth_history_length(length.clamp(depth_filter::MIN, depth_filter::MAX));
    }
    if let Some(meters) = options.max_distance {
        engine.set_max_distance(meters.clamp(max_distance::MIN, max_distance::MAX));
    }
    if let Some(rgb) = options.color {
        engine.set_key_color(rgb);
    }

    if let Some(active) = engine.active_descriptor() {
        println!("Using device: {}", active);
    }
    println!(
        "Keying: max distance {:.2} m, depth filter {}, key color #{:06x}",
        engine.max_distance(),
        engine.depth_history_length(),
        engine.key_color()
    );

    if options.save {
        engine.save_settings()?;
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let engine = Arc::new(engine);
    let (sink, receiver) = ChannelSink::channel(4);

    println!();
    println!("Capturing... (press Ctrl+C to stop)");
    let mut handle = start_capture(Arc::clone(&engine), sink);

    let start = Instant::now();
    let mut received = 0u64;
    let mut last: Option<KeyedFrame> = None;

    while !stop_flag.load(Ordering::SeqCst) {
        if options.frames.is_some_and(|limit| received >= limit) {
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                received += 1;
                last = Some(frame);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !handle.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.stop();
    engine.shutdown();

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "Received {} frames in {:.2}s ({:.1} fps, {} misses)",
        received,
        elapsed,
        received as f64 / elapsed.max(f64::EPSILON),
        handle.transient_misses()
    );

    if let Some(error) = handle.take_error() {
        return Err(error.into());
    }

    if let Some(output) = options.output {
        let frame = last.ok_or("No frame captured")?;
        let path = output_path(&output);
        save_png(&frame, &path)?;
        println!("Frame saved: {}", path.display());
    }

    Ok(())
}

/// Resolve a directory to a timestamped file inside it
fn output_path(output: &Path) -> PathBuf {
    if output.is_dir() {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        output.join(format!("greenscreen_{}.png", timestamp))
    } else {
        output.to_path_buf()
    }
}

fn save_png(frame: &KeyedFrame, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match frame.format {
        VideoFormat::Rgb => RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or("Frame buffer does not match its geometry")?
            .save(path)?,
        VideoFormat::Rgba => RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or("Frame buffer does not match its geometry")?
            .save(path)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("0xdd44ff"), Ok(0xdd44ff));
        assert_eq!(parse_color("#00FF00"), Ok(0x00ff00));
        assert_eq!(parse_color("102030"), Ok(0x102030));
        assert!(parse_color("1000000").is_err());
        assert!(parse_color("green").is_err());
    }

    #[test]
    fn test_select_first_match() {
        let entries = [
            CameraDescriptor::new("A", "a", 640, 480),
            CameraDescriptor::new("B", "b", 1280, 720),
            CameraDescriptor::new("B", "b", 640, 480),
        ];

        assert_eq!(select_entry(&entries, None, None, None), Some(&entries[0]));
        assert_eq!(select_entry(&entries, Some("b"), None, None), Some(&entries[1]));
        assert_eq!(
            select_entry(&entries, Some("b"), Some(640), None),
            Some(&entries[2])
        );
        assert_eq!(select_entry(&entries, None, None, Some(720)), Some(&entries[1]));
        assert_eq!(select_entry(&entries, Some("c"), None, None), None);
    }

    #[test]
    fn test_output_path_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(dir.path());
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        let file = dir.path().join("frame.png");
        assert_eq!(output_path(&file), file);
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("frame.png");
        let frame = KeyedFrame {
            data: vec![0xdd, 0x44, 0xff, 0xff, 0, 0, 0, 0xff],
            width: 2,
            height: 1,
            stride: 8,
            format: VideoFormat::Rgba,
            timestamp_ns: 0,
        };

        save_png(&frame, &path).unwrap();
        assert!(path.exists());
    }
}
