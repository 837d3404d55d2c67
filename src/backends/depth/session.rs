// SPDX-License-Identifier: GPL-3.0-only

//! One live depth camera stream connection
//!
//! A [`DeviceSession`] owns a running [`DepthPipeline`], decides which stream
//! depth gets aligned to, tracks the device depth scale, and keys one
//! synchronized frame pair per [`DeviceSession::get_frame`] call.
//!
//! State machine:
//!
//! ```text
//! Opening ──first frame──▶ Streaming ──close()──▶ Stopped
//!                            │    ▲
//!             stream set     │    │ new alignment target
//!             changed        ▼    │ + depth scale
//!                         (recalibrating)
//! ```

use tracing::{debug, info, trace};

use super::types::*;
use super::{DepthBackend, DepthPipeline};
use crate::errors::{DeviceError, DeviceResult};
use crate::pipelines::keying::{BackgroundRemover, KeyingSettings};

/// Waits allowed while opening before the device is declared unusable
const OPEN_FRAME_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Pipeline started, output geometry not known yet
    Opening,
    /// Delivering frames
    Streaming,
    /// Pipeline stopped; the session can be dropped
    Stopped,
}

/// Pick the stream depth gets aligned to
///
/// Color is preferred. Without color the last other non-depth stream wins.
pub fn find_stream_to_align(streams: &[StreamInfo]) -> DeviceResult<StreamKind> {
    let mut align_to = None;
    let mut depth_found = false;
    let mut color_found = false;

    for stream in streams {
        if stream.kind == StreamKind::Depth {
            depth_found = true;
            continue;
        }
        if !color_found {
            align_to = Some(stream.kind);
        }
        if stream.kind == StreamKind::Color {
            color_found = true;
        }
    }

    if !depth_found {
        return Err(DeviceError::NoDepthStream);
    }
    align_to.ok_or(DeviceError::NoAlignableStream)
}

/// Whether any stream of `previous` is missing from `current`
pub fn profile_changed(current: &[StreamInfo], previous: &[StreamInfo]) -> bool {
    previous
        .iter()
        .any(|prev| !current.iter().any(|cur| cur.unique_id == prev.unique_id))
}

pub struct DeviceSession {
    id: u64,
    pipeline: Box<dyn DepthPipeline>,
    profile: PipelineProfile,
    align_to: StreamKind,
    remover: BackgroundRemover,
    width: u32,
    height: u32,
    state: SessionState,
    recalibrations: u64,
}

impl DeviceSession {
    /// Start streaming and block for the first frame to learn the geometry
    ///
    /// Any failure is fatal for this session: the pipeline is stopped before
    /// the error is returned.
    pub fn open(
        backend: &dyn DepthBackend,
        config: &PipelineConfig,
        format: VideoFormat,
        settings: KeyingSettings,
        id: u64,
    ) -> DeviceResult<Self> {
        let mut pipeline = backend.open_pipeline(config)?;
        let profile = pipeline.active_profile();

        let calibration = find_stream_to_align(&profile.streams)
            .and_then(|align_to| Ok((align_to, pipeline.depth_scale()?)));
        let (align_to, depth_scale) = match calibration {
            Ok(calibration) => calibration,
            Err(err) => {
                pipeline.stop();
                return Err(err);
            }
        };

        let mut session = Self {
            id,
            pipeline,
            profile,
            align_to,
            remover: BackgroundRemover::new(format, settings, depth_scale),
            width: 0,
            height: 0,
            state: SessionState::Opening,
            recalibrations: 0,
        };

        // On error the session drops here and Drop stops the pipeline
        let (width, height) = session.first_frame_geometry()?;
        session.width = width;
        session.height = height;
        session.state = SessionState::Streaming;

        info!(
            id,
            device = %session.profile.device_name,
            serial = %session.profile.serial,
            width,
            height,
            align_to = %align_to,
            depth_scale,
            "Device session streaming"
        );

        Ok(session)
    }

    fn first_frame_geometry(&mut self) -> DeviceResult<(u32, u32)> {
        for attempt in 1..=OPEN_FRAME_ATTEMPTS {
            let frames = match self.wait() {
                Ok(frames) => frames,
                Err(err) if err.is_transient() => {
                    debug!(attempt, "No frame yet while opening");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Some(other) = self.pipeline.align(&frames, self.align_to).other {
                return Ok((other.width, other.height));
            }
        }

        // Fall back to the negotiated stream geometry
        self.profile
            .stream(self.align_to)
            .map(|s| (s.width, s.height))
            .ok_or_else(|| {
                DeviceError::OpenFailed(format!("no {} frame received", self.align_to))
            })
    }

    /// Block for the next frame set, recalibrating if the stream set changed
    fn wait(&mut self) -> DeviceResult<FrameSet> {
        let frames = self.pipeline.wait_for_frames()?;

        let current = self.pipeline.active_profile();
        if profile_changed(&current.streams, &self.profile.streams) {
            self.recalibrate(current)?;
        }

        Ok(frames)
    }

    fn recalibrate(&mut self, profile: PipelineProfile) -> DeviceResult<()> {
        let align_to = find_stream_to_align(&profile.streams)?;
        let depth_scale = self.pipeline.depth_scale()?;

        info!(
            id = self.id,
            serial = %profile.serial,
            align_to = %align_to,
            depth_scale,
            "Stream set changed, recalibrated"
        );

        self.align_to = align_to;
        self.remover.set_depth_scale(depth_scale);
        self.profile = profile;
        self.recalibrations += 1;
        Ok(())
    }

    /// Key the next synchronized frame pair into `dest`
    ///
    /// Returns `Ok(false)` when this cycle's pair is incomplete; `dest` is
    /// left untouched and the caller retries on its next tick.
    pub fn get_frame(&mut self, dest: &mut [u8]) -> DeviceResult<bool> {
        if self.state != SessionState::Streaming {
            return Err(DeviceError::Disconnected(format!(
                "session {} is not streaming",
                self.id
            )));
        }

        let frames = match self.wait() {
            Ok(frames) => frames,
            Err(err) if err.is_transient() => {
                debug!(id = self.id, error = %err, "Transient frame miss");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let aligned = self.pipeline.align(&frames, self.align_to);
        let (Some(depth), Some(other)) = (aligned.depth, aligned.other) else {
            trace!(id = self.id, sequence = frames.sequence, "Incomplete frame pair");
            return Ok(false);
        };
        if depth.width != other.width || depth.height != other.height {
            trace!(id = self.id, sequence = frames.sequence, "Unaligned frame pair");
            return Ok(false);
        }

        if other.width != self.width || other.height != self.height {
            info!(
                id = self.id,
                width = other.width,
                height = other.height,
                "Output geometry changed"
            );
            self.width = other.width;
            self.height = other.height;
        }

        self.remover.process(dest, &other, &depth);
        Ok(true)
    }

    /// Stop the hardware pipeline
    pub fn close(&mut self) {
        if self.state != SessionState::Stopped {
            self.pipeline.stop();
            self.state = SessionState::Stopped;
            info!(id = self.id, serial = %self.profile.serial, "Device session closed");
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn serial(&self) -> &str {
        &self.profile.serial
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.remover.format().bytes_per_pixel()
    }

    /// Bytes of one frame at the current geometry
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    pub fn descriptor(&self) -> CameraDescriptor {
        CameraDescriptor::new(
            &self.profile.device_name,
            &self.profile.serial,
            self.width,
            self.height,
        )
    }

    pub fn align_to(&self) -> StreamKind {
        self.align_to
    }

    pub fn depth_scale(&self) -> f32 {
        self.remover.depth_scale()
    }

    pub fn clip_range(&self) -> ClipRange {
        self.remover.clip_range()
    }

    /// Number of times the stream set changed underneath this session
    pub fn recalibrations(&self) -> u64 {
        self.recalibrations
    }

    pub fn history_len(&self) -> usize {
        self.remover.history().len()
    }

    pub fn set_key_color(&mut self, rgb: u32) {
        self.remover.set_key_color(rgb);
    }

    pub fn set_transparency(&mut self, alpha: u8) {
        self.remover.set_transparency(alpha);
    }

    pub fn set_max_distance(&mut self, meters: f32) {
        self.remover.set_max_distance(meters);
    }

    pub fn set_history_length(&mut self, length: usize) {
        self.remover.set_history_length(length);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("serial", &self.profile.serial)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("align_to", &self.align_to)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::depth::{VirtualBackend, VirtualDeviceSpec};

    fn stream(unique_id: u32, kind: StreamKind) -> StreamInfo {
        StreamInfo {
            unique_id,
            kind,
            width: 640,
            height: 480,
        }
    }

    fn open(backend: &VirtualBackend) -> DeviceResult<DeviceSession> {
        DeviceSession::open(
            backend,
            &PipelineConfig::default(),
            VideoFormat::Rgba,
            KeyingSettings::default(),
            1,
        )
    }

    fn single(spec: VirtualDeviceSpec) -> VirtualBackend {
        VirtualBackend::new(vec![spec])
    }

    #[test]
    fn test_color_is_preferred() {
        let streams = [
            stream(1, StreamKind::Depth),
            stream(2, StreamKind::Infrared),
            stream(3, StreamKind::Color),
            stream(4, StreamKind::Fisheye),
        ];
        assert_eq!(find_stream_to_align(&streams), Ok(StreamKind::Color));
    }

    #[test]
    fn test_last_other_stream_without_color() {
        let streams = [
            stream(1, StreamKind::Infrared),
            stream(2, StreamKind::Depth),
            stream(3, StreamKind::Fisheye),
        ];
        assert_eq!(find_stream_to_align(&streams), Ok(StreamKind::Fisheye));
    }

    #[test]
    fn test_alignment_errors() {
        assert_eq!(
            find_stream_to_align(&[stream(1, StreamKind::Color)]),
            Err(DeviceError::NoDepthStream)
        );
        assert_eq!(
            find_stream_to_align(&[stream(1, StreamKind::Depth)]),
            Err(DeviceError::NoAlignableStream)
        );
    }

    #[test]
    fn test_profile_changed() {
        let prev = [stream(1, StreamKind::Depth), stream(2, StreamKind::Color)];
        let same = [stream(2, StreamKind::Color), stream(1, StreamKind::Depth)];
        let grown = [
            stream(1, StreamKind::Depth),
            stream(2, StreamKind::Color),
            stream(3, StreamKind::Infrared),
        ];
        let replaced = [stream(1, StreamKind::Depth), stream(5, StreamKind::Color)];

        assert!(!profile_changed(&same, &prev));
        assert!(!profile_changed(&grown, &prev));
        assert!(profile_changed(&replaced, &prev));
    }

    #[test]
    fn test_open_learns_geometry() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(424, 240)]));
        let session = open(&backend).unwrap();

        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!((session.width(), session.height()), (424, 240));
        assert_eq!(session.frame_size(), 424 * 240 * 4);
        assert_eq!(session.descriptor(), CameraDescriptor::new("Cam", "42", 424, 240));
        assert_eq!(session.align_to(), StreamKind::Color);
    }

    #[test]
    fn test_open_without_depth_fails_and_releases_device() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]).without_depth());
        let control = backend.control();

        assert_eq!(open(&backend).err(), Some(DeviceError::NoDepthStream));
        assert_eq!(control.open_pipelines(), 0);
    }

    #[test]
    fn test_open_depth_only_fails() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[]).depth_only());
        assert_eq!(open(&backend).err(), Some(DeviceError::NoAlignableStream));
        assert_eq!(backend.control().open_pipelines(), 0);
    }

    #[test]
    fn test_open_aligns_to_infrared_without_color() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[]).infrared_only());
        let session = open(&backend).unwrap();
        assert_eq!(session.align_to(), StreamKind::Infrared);
        assert_eq!((session.width(), session.height()), (640, 480));
    }

    #[test]
    fn test_open_survives_initial_timeouts() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]));
        backend.control().time_out_waits(3);
        assert!(open(&backend).is_ok());
    }

    #[test]
    fn test_transient_miss_leaves_dest_untouched() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]));
        let control = backend.control();
        let mut session = open(&backend).unwrap();
        let mut dest = vec![0x5au8; session.frame_size()];

        control.drop_video_frames(1);
        assert_eq!(session.get_frame(&mut dest), Ok(false));
        assert!(dest.iter().all(|&b| b == 0x5a));

        control.time_out_waits(1);
        assert_eq!(session.get_frame(&mut dest), Ok(false));
        assert!(dest.iter().all(|&b| b == 0x5a));

        assert_eq!(session.get_frame(&mut dest), Ok(true));
        assert!(dest.iter().any(|&b| b != 0x5a));
    }

    #[test]
    fn test_stream_change_recalibrates_silently() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]));
        let control = backend.control();
        let mut session = open(&backend).unwrap();
        let mut dest = vec![0u8; session.frame_size()];
        assert_eq!(session.clip_range().upper, 999);

        control.change_streams(0.0001);
        assert_eq!(session.get_frame(&mut dest), Ok(true));

        assert_eq!(session.recalibrations(), 1);
        assert_eq!(session.depth_scale(), 0.0001);
        assert_eq!(session.clip_range().upper, 10000);

        assert_eq!(session.get_frame(&mut dest), Ok(true));
        assert_eq!(session.recalibrations(), 1);
    }

    #[test]
    fn test_keyed_output_follows_fixed_depth() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]));
        let control = backend.control();
        let mut session = open(&backend).unwrap();
        session.set_history_length(1);
        session.set_key_color(0x102030);
        let mut dest = vec![0u8; session.frame_size()];

        control.set_fixed_depth(Some(3.0));
        session.get_frame(&mut dest).unwrap();
        assert!(dest.chunks_exact(4).all(|p| p == [0x10, 0x20, 0x30, 0xff]));

        control.set_fixed_depth(Some(0.5));
        session.get_frame(&mut dest).unwrap();
        assert!(dest.chunks_exact(4).all(|p| p[3] == 0xff));
        assert!(dest.chunks_exact(4).any(|p| p[..3] != [0x10, 0x20, 0x30]));
    }

    #[test]
    fn test_close_stops_pipeline() {
        let backend = single(VirtualDeviceSpec::new("Cam", "42", &[(640, 480)]));
        let control = backend.control();
        let mut session = open(&backend).unwrap();
        assert_eq!(control.open_pipelines(), 1);

        session.close();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(control.open_pipelines(), 0);

        let mut dest = vec![0u8; 16];
        assert!(matches!(
            session.get_frame(&mut dest),
            Err(DeviceError::Disconnected(_))
        ));

        drop(session);
        assert_eq!(control.open_pipelines(), 0);
    }
}
