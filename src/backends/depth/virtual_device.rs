// SPDX-License-Identifier: GPL-3.0-only

//! Virtual depth camera
//!
//! An in-process [`DepthBackend`] that renders a synthetic scene: a disc-shaped
//! subject sweeping left and right in front of a far wall, with a sprinkle of
//! "no reading" pixels like a real stereo sensor produces at edges.
//!
//! The [`VirtualControl`] handle scripts hardware behaviour that is otherwise
//! hard to reproduce: dropped frames, wait timeouts, the device silently
//! replacing its stream set, failing opens, and devices plugged in after the
//! backend was created. It also counts pipelines so
//! callers can check that two sessions never stream at the same time.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::types::*;
use super::{DepthBackend, DepthPipeline};
use crate::errors::{DeviceError, DeviceResult};

/// Distance of the synthetic subject
const SUBJECT_DISTANCE_METERS: f32 = 0.6;
/// Distance of the synthetic back wall
const WALL_DISTANCE_METERS: f32 = 2.5;
/// One pixel in this many reports no depth
const DROPOUT_PERIOD: usize = 97;

/// Description of one simulated device
#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    pub name: String,
    pub serial: String,
    /// Color resolutions; the first one is the default
    pub color_resolutions: Vec<(u32, u32)>,
    pub depth_resolution: (u32, u32),
    pub depth_scale: f32,
    pub has_depth: bool,
    pub has_color: bool,
    pub has_infrared: bool,
}

impl VirtualDeviceSpec {
    pub fn new(name: &str, serial: &str, color_resolutions: &[(u32, u32)]) -> Self {
        Self {
            name: name.to_string(),
            serial: serial.to_string(),
            color_resolutions: color_resolutions.to_vec(),
            depth_resolution: (640, 480),
            depth_scale: 0.001,
            has_depth: true,
            has_color: true,
            has_infrared: false,
        }
    }

    pub fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.depth_scale = depth_scale;
        self
    }

    pub fn with_depth_resolution(mut self, width: u32, height: u32) -> Self {
        self.depth_resolution = (width, height);
        self
    }

    /// Device with an infrared stream and no color sensor
    pub fn infrared_only(mut self) -> Self {
        self.has_color = false;
        self.has_infrared = true;
        self
    }

    pub fn without_depth(mut self) -> Self {
        self.has_depth = false;
        self
    }

    pub fn depth_only(mut self) -> Self {
        self.has_color = false;
        self.has_infrared = false;
        self
    }

    fn default_resolution(&self) -> (u32, u32) {
        self.color_resolutions
            .first()
            .copied()
            .unwrap_or(self.depth_resolution)
    }
}

#[derive(Debug, Default)]
struct ControlState {
    pending_misses: u32,
    pending_timeouts: u32,
    pending_stream_change: Option<f32>,
    fixed_depth_meters: Option<f32>,
    open_failure: Option<DeviceError>,
    hotplugged: Vec<VirtualDeviceSpec>,
}

#[derive(Debug, Default)]
struct ControlInner {
    state: Mutex<ControlState>,
    open_now: AtomicUsize,
    opened_total: AtomicUsize,
    max_concurrent: AtomicUsize,
    next_stream_id: AtomicU32,
}

/// Scripting and bookkeeping handle shared by a backend and its pipelines
#[derive(Debug, Clone, Default)]
pub struct VirtualControl {
    inner: Arc<ControlInner>,
}

impl VirtualControl {
    /// The next `count` frame sets arrive without their video frame
    pub fn drop_video_frames(&self, count: u32) {
        self.lock().pending_misses += count;
    }

    /// The next `count` waits time out
    pub fn time_out_waits(&self, count: u32) {
        self.lock().pending_timeouts += count;
    }

    /// On the next wait the device recreates its streams with a new depth scale
    pub fn change_streams(&self, depth_scale: f32) {
        self.lock().pending_stream_change = Some(depth_scale);
    }

    /// Render every depth pixel at `meters` (or the regular scene with `None`)
    pub fn set_fixed_depth(&self, meters: Option<f32>) {
        self.lock().fixed_depth_meters = meters;
    }

    /// The next `open_pipeline` call fails with `error`
    pub fn fail_next_open(&self, error: DeviceError) {
        self.lock().open_failure = Some(error);
    }

    /// Plug in another device; it shows up on the next device query
    pub fn connect_device(&self, spec: VirtualDeviceSpec) {
        info!(device = %spec.name, serial = %spec.serial, "Virtual device connected");
        self.lock().hotplugged.push(spec);
    }

    /// Pipelines currently streaming
    pub fn open_pipelines(&self) -> usize {
        self.inner.open_now.load(Ordering::SeqCst)
    }

    /// Pipelines opened over the lifetime of the backend
    pub fn opened_total(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }

    /// Highest number of pipelines that were streaming at the same time
    pub fn max_concurrent_pipelines(&self) -> usize {
        self.inner.max_concurrent.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControlState> {
        // A panicking test thread must not wedge every other user of the control
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_open_failure(&self) -> Option<DeviceError> {
        self.lock().open_failure.take()
    }

    fn take_timeout(&self) -> bool {
        let mut state = self.lock();
        if state.pending_timeouts > 0 {
            state.pending_timeouts -= 1;
            true
        } else {
            false
        }
    }

    fn take_miss(&self) -> bool {
        let mut state = self.lock();
        if state.pending_misses > 0 {
            state.pending_misses -= 1;
            true
        } else {
            false
        }
    }

    fn hotplugged(&self) -> Vec<VirtualDeviceSpec> {
        self.lock().hotplugged.clone()
    }

    fn take_stream_change(&self) -> Option<f32> {
        self.lock().pending_stream_change.take()
    }

    fn fixed_depth(&self) -> Option<f32> {
        self.lock().fixed_depth_meters
    }

    fn next_stream_id(&self) -> u32 {
        self.inner.next_stream_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn pipeline_opened(&self) {
        let now = self.inner.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.opened_total.fetch_add(1, Ordering::SeqCst);
        self.inner.max_concurrent.fetch_max(now, Ordering::SeqCst);
    }

    fn pipeline_closed(&self) {
        self.inner.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process depth camera backend
#[derive(Debug, Clone)]
pub struct VirtualBackend {
    devices: Vec<VirtualDeviceSpec>,
    control: VirtualControl,
}

impl VirtualBackend {
    pub fn new(devices: Vec<VirtualDeviceSpec>) -> Self {
        Self {
            devices,
            control: VirtualControl::default(),
        }
    }

    /// Two simulated cameras with typical stereo-depth resolutions
    pub fn demo() -> Self {
        Self::new(vec![
            VirtualDeviceSpec::new(
                "Virtual Depth Camera D435",
                "000000000435",
                &[(640, 480), (1280, 720), (848, 480), (424, 240)],
            ),
            VirtualDeviceSpec::new(
                "Virtual Depth Camera D415",
                "000000000415",
                &[(640, 480), (1920, 1080)],
            )
            .with_depth_scale(0.0001)
            .with_depth_resolution(1280, 720),
        ])
    }

    pub fn control(&self) -> VirtualControl {
        self.control.clone()
    }

    /// Devices given at construction followed by hotplugged ones
    fn connected(&self) -> Vec<VirtualDeviceSpec> {
        let mut devices = self.devices.clone();
        devices.extend(self.control.hotplugged());
        devices
    }

    fn find_device(&self, serial: Option<&str>) -> DeviceResult<VirtualDeviceSpec> {
        let mut devices = self.connected().into_iter();
        match serial {
            Some(serial) => devices
                .find(|d| d.serial == serial)
                .ok_or_else(|| DeviceError::DeviceNotFound(serial.to_string())),
            None => devices
                .next()
                .ok_or_else(|| DeviceError::OpenFailed("no device connected".to_string())),
        }
    }
}

impl DepthBackend for VirtualBackend {
    fn query_devices(&self) -> DeviceResult<Vec<DeviceInfo>> {
        Ok(self
            .connected()
            .iter()
            .map(|d| DeviceInfo {
                name: d.name.clone(),
                serial: d.serial.clone(),
                color_resolutions: if d.has_color {
                    d.color_resolutions.clone()
                } else {
                    Vec::new()
                },
            })
            .collect())
    }

    fn open_pipeline(&self, config: &PipelineConfig) -> DeviceResult<Box<dyn DepthPipeline>> {
        if let Some(err) = self.control.take_open_failure() {
            return Err(err);
        }

        let spec = self.find_device(config.serial.as_deref())?;
        let resolution = config
            .color_resolution
            .unwrap_or_else(|| spec.default_resolution());
        if spec.has_color && !spec.color_resolutions.contains(&resolution) {
            return Err(DeviceError::UnsupportedResolution {
                serial: spec.serial.clone(),
                width: resolution.0,
                height: resolution.1,
            });
        }

        let mut pipeline = VirtualPipeline {
            spec: spec.clone(),
            resolution,
            streams: Vec::new(),
            depth_scale: spec.depth_scale,
            sequence: 0,
            control: self.control.clone(),
            running: true,
        };
        pipeline.create_streams();
        self.control.pipeline_opened();

        info!(
            device = %spec.name,
            serial = %spec.serial,
            width = resolution.0,
            height = resolution.1,
            "Virtual pipeline started"
        );

        Ok(Box::new(pipeline))
    }
}

/// One running virtual stream connection
#[derive(Debug)]
struct VirtualPipeline {
    spec: VirtualDeviceSpec,
    resolution: (u32, u32),
    streams: Vec<StreamInfo>,
    depth_scale: f32,
    sequence: u64,
    control: VirtualControl,
    running: bool,
}

impl VirtualPipeline {
    fn create_streams(&mut self) {
        let (dw, dh) = self.spec.depth_resolution;
        let (cw, ch) = self.resolution;
        let mut streams = Vec::new();
        if self.spec.has_depth {
            streams.push(self.stream(StreamKind::Depth, dw, dh));
        }
        if self.spec.has_color {
            streams.push(self.stream(StreamKind::Color, cw, ch));
        }
        if self.spec.has_infrared {
            streams.push(self.stream(StreamKind::Infrared, dw, dh));
        }
        self.streams = streams;
    }

    fn stream(&self, kind: StreamKind, width: u32, height: u32) -> StreamInfo {
        StreamInfo {
            unique_id: self.control.next_stream_id(),
            kind,
            width,
            height,
        }
    }

    fn render_depth(&self, width: u32, height: u32) -> DepthFrame {
        let to_units = |meters: f32| (meters / self.depth_scale) as u16;

        if let Some(meters) = self.control.fixed_depth() {
            return DepthFrame::filled(width, height, to_units(meters));
        }

        let (w, h) = (width as usize, height as usize);
        let subject = to_units(SUBJECT_DISTANCE_METERS);
        let wall = to_units(WALL_DISTANCE_METERS);

        // Subject sweeps across the middle third of the frame
        let span = (w / 3).max(1);
        let phase = (self.sequence as usize * 4) % (span * 2);
        let offset = if phase < span { phase } else { span * 2 - phase };
        let cx = w / 3 + offset;
        let cy = h / 2;
        let radius = h / 4;
        let radius_sq = radius * radius;

        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let idx = y * w + x;
                if (idx + self.sequence as usize) % DROPOUT_PERIOD == 0 {
                    data.push(0);
                    continue;
                }
                let dx = x.abs_diff(cx);
                let dy = y.abs_diff(cy);
                data.push(if dx * dx + dy * dy <= radius_sq {
                    subject
                } else {
                    wall
                });
            }
        }

        DepthFrame {
            width,
            height,
            data,
        }
    }

    fn render_color(&self, width: u32, height: u32) -> ColorFrame {
        let (w, h) = (width as usize, height as usize);
        let tint = (self.sequence % 256) as u8;
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            let g = (y * 255 / h.max(1)) as u8;
            for x in 0..w {
                let r = (x * 255 / w.max(1)) as u8;
                data.extend_from_slice(&[r, g, tint]);
            }
        }
        ColorFrame {
            width,
            height,
            bytes_per_pixel: 3,
            data,
        }
    }

    /// Infrared intensity replicated into RGB
    fn render_infrared(&self, width: u32, height: u32) -> ColorFrame {
        let (w, h) = (width as usize, height as usize);
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let v = (((x + y) * 255) / (w + h).max(1)) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        ColorFrame {
            width,
            height,
            bytes_per_pixel: 3,
            data,
        }
    }
}

impl DepthPipeline for VirtualPipeline {
    fn active_profile(&self) -> PipelineProfile {
        PipelineProfile {
            device_name: self.spec.name.clone(),
            serial: self.spec.serial.clone(),
            streams: self.streams.clone(),
        }
    }

    fn wait_for_frames(&mut self) -> DeviceResult<FrameSet> {
        if !self.running {
            return Err(DeviceError::Disconnected(
                "pipeline is not streaming".to_string(),
            ));
        }
        if self.control.take_timeout() {
            return Err(DeviceError::Timeout);
        }
        if let Some(depth_scale) = self.control.take_stream_change() {
            debug!(serial = %self.spec.serial, depth_scale, "Virtual device replaced its streams");
            self.depth_scale = depth_scale;
            self.create_streams();
        }

        self.sequence += 1;
        let drop_video = self.control.take_miss();
        let mut frames = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            match stream.kind {
                StreamKind::Depth => {
                    frames.push(RawFrame::Depth(
                        self.render_depth(stream.width, stream.height),
                    ));
                }
                StreamKind::Color if !drop_video => frames.push(RawFrame::Video {
                    kind: StreamKind::Color,
                    frame: self.render_color(stream.width, stream.height),
                }),
                StreamKind::Infrared if !drop_video => frames.push(RawFrame::Video {
                    kind: StreamKind::Infrared,
                    frame: self.render_infrared(stream.width, stream.height),
                }),
                _ => {}
            }
        }

        Ok(FrameSet {
            frames,
            sequence: self.sequence,
        })
    }

    fn align(&self, frames: &FrameSet, align_to: StreamKind) -> AlignedFrames {
        let other = frames.video(align_to).cloned();
        let depth = frames.depth().map(|depth| match &other {
            Some(target) => resample_depth_nearest(depth, target.width, target.height),
            None => depth.clone(),
        });
        AlignedFrames { depth, other }
    }

    fn depth_scale(&self) -> DeviceResult<f32> {
        if self.spec.has_depth {
            Ok(self.depth_scale)
        } else {
            Err(DeviceError::NoDepthSensor)
        }
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.control.pipeline_closed();
            info!(serial = %self.spec.serial, "Virtual pipeline stopped");
        }
    }
}

impl Drop for VirtualPipeline {
    fn drop(&mut self) {
        if self.running {
            warn!(serial = %self.spec.serial, "Virtual pipeline dropped while streaming");
            self.stop();
        }
    }
}
