// SPDX-License-Identifier: GPL-3.0-only

//! Capture thread driving a [`CaptureEngine`] into a [`FrameSink`]
//!
//! The output buffer is allocated at the engine's maximum frame size and
//! reused across every device swap. It only grows again when
//! [`CaptureEngine::refresh_catalog`] finds a larger mode while the thread
//! runs. Teardown order: [`CaptureHandle::stop`] signals and joins the
//! thread; only then may the engine close the hardware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::engine::CaptureEngine;
use super::sink::{FrameSink, OutputFrame};
use crate::backends::depth::{CaptureLoopController, LoopAction};
use crate::constants::CAPTURE_INTERVAL;
use crate::errors::DeviceError;

/// Per-thread capture state, created on the capture thread
struct CaptureState<S> {
    buffer: Vec<u8>,
    sink: S,
    started: Instant,
}

impl<S> CaptureState<S> {
    /// Grow the buffer to the engine's current maximum frame size
    ///
    /// Returns whether the buffer changed.
    fn fit_buffer(&mut self, engine: &CaptureEngine) -> bool {
        let size = engine.frame_size();
        if size <= self.buffer.len() {
            return false;
        }
        info!(
            previous = self.buffer.len(),
            buffer_size = size,
            "Grew capture buffer"
        );
        self.buffer.resize(size, 0);
        true
    }
}

/// Handle to a running capture thread
pub struct CaptureHandle {
    controller: CaptureLoopController,
    error: Arc<Mutex<Option<DeviceError>>>,
    frames: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CaptureHandle {
    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Signal the thread to stop and wait for it to exit
    pub fn stop(&mut self) {
        self.controller.stop();
    }

    /// Frames handed to the sink so far
    pub fn frames_emitted(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Ticks that produced no frame
    pub fn transient_misses(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }

    /// The fatal error that ended the loop, if any
    pub fn take_error(&self) -> Option<DeviceError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("running", &self.is_running())
            .field("frames", &self.frames_emitted())
            .finish_non_exhaustive()
    }
}

/// Start capturing at the default 30 Hz cadence
pub fn start_capture<S>(engine: Arc<CaptureEngine>, sink: S) -> CaptureHandle
where
    S: FrameSink + 'static,
{
    start_capture_with_interval(engine, sink, CAPTURE_INTERVAL)
}

/// Start capturing, one engine frame per `interval`
///
/// A transient miss emits nothing for that tick. A fatal device error is
/// logged, kept for [`CaptureHandle::take_error`], and ends the loop.
pub fn start_capture_with_interval<S>(
    engine: Arc<CaptureEngine>,
    sink: S,
    interval: Duration,
) -> CaptureHandle
where
    S: FrameSink + 'static,
{
    let error = Arc::new(Mutex::new(None));
    let frames = Arc::new(AtomicU64::new(0));
    let misses = Arc::new(AtomicU64::new(0));

    let init_engine = Arc::clone(&engine);
    let loop_error = Arc::clone(&error);
    let loop_frames = Arc::clone(&frames);
    let loop_misses = Arc::clone(&misses);

    let controller = CaptureLoopController::start_with_init(
        "depth-greenscreen",
        interval,
        move || {
            let size = init_engine.frame_size();
            info!(buffer_size = size, "Allocated capture buffer");
            Ok(CaptureState {
                buffer: vec![0u8; size],
                sink,
                started: Instant::now(),
            })
        },
        move |state: &mut CaptureState<S>| {
            state.fit_buffer(&engine);
            let geometry = match engine.capture_frame(&mut state.buffer) {
                Ok(Some(geometry)) => geometry,
                Ok(None) => {
                    loop_misses.fetch_add(1, Ordering::SeqCst);
                    return LoopAction::Continue;
                }
                Err(err) => {
                    error!(error = %err, "Capture stopped by device error");
                    *loop_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                    return LoopAction::Stop;
                }
            };

            // The catalog grew between the size check and the capture
            if geometry.frame_size() > state.buffer.len() && state.fit_buffer(&engine) {
                debug!("Skipping frame captured into an outgrown buffer");
                loop_misses.fetch_add(1, Ordering::SeqCst);
                return LoopAction::Continue;
            }

            let stride = geometry.stride();
            let rows = if stride == 0 {
                0
            } else {
                (geometry.height as usize).min(state.buffer.len() / stride)
            };

            state.sink.output(OutputFrame {
                data: &state.buffer[..rows * stride],
                width: geometry.width,
                height: rows as u32,
                stride,
                format: engine.format(),
                timestamp_ns: state.started.elapsed().as_nanos() as u64,
            });
            loop_frames.fetch_add(1, Ordering::SeqCst);
            LoopAction::Continue
        },
    );

    CaptureHandle {
        controller,
        error,
        frames,
        misses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::depth::{VideoFormat, VirtualBackend, VirtualDeviceSpec};
    use crate::pipelines::capture::ChannelSink;
    use std::thread;

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_frames_reach_sink() {
        let backend = VirtualBackend::new(vec![VirtualDeviceSpec::new("Cam", "7", &[(64, 48)])]);
        let engine = Arc::new(CaptureEngine::new(Arc::new(backend), VideoFormat::Rgb).unwrap());
        let (sink, receiver) = ChannelSink::channel(8);

        let mut handle = start_capture_with_interval(engine, sink, Duration::from_millis(1));
        let frame = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.stop();

        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.stride, 64 * 3);
        assert_eq!(frame.data.len(), 64 * 48 * 3);
        assert!(handle.frames_emitted() >= 1);
        assert!(handle.take_error().is_none());
    }

    #[test]
    fn test_buffer_grows_with_refreshed_catalog() {
        let backend = VirtualBackend::new(vec![VirtualDeviceSpec::new("Cam", "7", &[(64, 48)])]);
        let control = backend.control();
        let engine = Arc::new(CaptureEngine::new(Arc::new(backend), VideoFormat::Rgb).unwrap());
        let (sink, receiver) = ChannelSink::channel(64);
        let mut handle =
            start_capture_with_interval(Arc::clone(&engine), sink, Duration::from_millis(1));
        receiver.recv_timeout(Duration::from_secs(5)).unwrap();

        control.connect_device(VirtualDeviceSpec::new("Wide", "9", &[(160, 120)]));
        engine.refresh_catalog().unwrap();
        assert_eq!(engine.frame_size(), 160 * 120 * 3);
        assert_eq!(engine.set_config("9", "160 × 120"), Ok(true));

        let mut wide = None;
        let deadline = Instant::now() + Duration::from_secs(5);
        while wide.is_none() && Instant::now() < deadline {
            if let Ok(frame) = receiver.recv_timeout(Duration::from_millis(100)) {
                if frame.width == 160 {
                    wide = Some(frame);
                }
            }
        }
        handle.stop();

        let frame = wide.expect("no frame from the new mode");
        assert_eq!(frame.height, 120);
        assert_eq!(frame.data.len(), 160 * 120 * 3);
        assert!(handle.take_error().is_none());
    }

    #[test]
    fn test_fatal_error_stops_loop() {
        let backend = VirtualBackend::new(vec![VirtualDeviceSpec::new("Cam", "7", &[(64, 48)])]);
        let engine = Arc::new(CaptureEngine::new(Arc::new(backend), VideoFormat::Rgb).unwrap());
        engine.shutdown();

        let (sink, _receiver) = ChannelSink::channel(1);
        let handle = start_capture_with_interval(engine, sink, Duration::from_millis(1));
        wait_until(|| !handle.is_running());

        assert!(!handle.is_running());
        assert_eq!(handle.take_error(), Some(DeviceError::NoActiveSession));
        assert_eq!(handle.frames_emitted(), 0);
    }
}
