// SPDX-License-Identifier: GPL-3.0-only

//! Capture engine: catalog, single active session, hot-swap
//!
//! The engine provides:
//! - The device catalog and the catalog-wide maximum frame size
//! - Exactly one active [`DeviceSession`], replaced under the same guard
//!   that frame capture takes
//! - Keying parameters that survive device swaps
//!
//! Ownership is one-directional: the engine owns the session; a session
//! knows nothing about the engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::backends::depth::{
    CameraDescriptor, Catalog, DepthBackend, DeviceEnumerator, DeviceSession, PipelineConfig,
    SessionState, VideoFormat,
};
use crate::config::{Settings, SettingsStore};
use crate::errors::{ConfigError, DeviceError, DeviceResult, EngineError};
use crate::pipelines::keying::KeyingSettings;

/// Geometry of a frame written by [`CaptureEngine::capture_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
}

impl FrameGeometry {
    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    pub fn frame_size(&self) -> usize {
        self.stride() * self.height as usize
    }
}

/// Snapshot of the active session, taken under the guard
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: u64,
    pub descriptor: CameraDescriptor,
    pub state: SessionState,
    pub depth_scale: f32,
    /// Depth frames currently remembered
    pub history_len: usize,
}

/// Internal engine state, guarded by one mutex
struct EngineState {
    /// The active session; `None` only after a failed reconfiguration
    session: Option<DeviceSession>,
    catalog: Catalog,
    /// Applied to every new session
    keying: KeyingSettings,
    /// Session ids handed out so far
    sessions_opened: u64,
}

pub struct CaptureEngine {
    backend: Arc<dyn DepthBackend>,
    enumerator: DeviceEnumerator,
    format: VideoFormat,
    state: Mutex<EngineState>,
    /// Catalog-wide maximum; only ever grows
    frame_size: AtomicUsize,
    store: Option<Box<dyn SettingsStore>>,
}

impl CaptureEngine {
    /// Open the default device and enumerate the catalog around it
    pub fn new(backend: Arc<dyn DepthBackend>, format: VideoFormat) -> DeviceResult<Self> {
        info!(format = %format, "Creating capture engine");

        let keying = KeyingSettings::default();
        let session = DeviceSession::open(
            backend.as_ref(),
            &PipelineConfig::default(),
            format,
            keying,
            1,
        )?;

        let enumerator = DeviceEnumerator::new(Arc::clone(&backend));
        let catalog = enumerator.enumerate(session.descriptor())?;
        let frame_size = catalog.max_frame_size(format.bytes_per_pixel());

        Ok(Self {
            backend,
            enumerator,
            format,
            state: Mutex::new(EngineState {
                session: Some(session),
                catalog,
                keying,
                sessions_opened: 1,
            }),
            frame_size: AtomicUsize::new(frame_size),
            store: None,
        })
    }

    /// Create an engine and apply the settings held by `store`
    ///
    /// A stored device that is no longer attached is ignored and the default
    /// device stays active.
    pub fn with_settings(
        backend: Arc<dyn DepthBackend>,
        format: VideoFormat,
        store: Box<dyn SettingsStore>,
    ) -> Result<Self, EngineError> {
        let settings = store.load()?;
        let mut engine = Self::new(backend, format)?;
        engine.apply_settings(&settings)?;
        engine.store = Some(store);
        Ok(engine)
    }

    fn apply_settings(&self, settings: &Settings) -> DeviceResult<()> {
        if settings.has_device() && !self.set_config(&settings.serial, &settings.resolution)? {
            debug!(
                serial = %settings.serial,
                resolution = %settings.resolution,
                "Stored device not selected"
            );
        }

        self.set_key_color(settings.background_color);
        self.set_max_distance(settings.max_distance as f32);
        self.set_depth_history_length(settings.depth_filter as usize);
        Ok(())
    }

    /// Current state in the shape the settings store persists
    pub fn current_settings(&self) -> Settings {
        let state = self.lock();
        let (serial, resolution) = match &state.session {
            Some(session) => {
                let descriptor = session.descriptor();
                (descriptor.serial, descriptor.resolution)
            }
            None => (String::new(), String::new()),
        };

        Settings {
            serial,
            resolution,
            background_color: state.keying.key_color.rgb24(),
            max_distance: f64::from(state.keying.max_distance),
            depth_filter: state.keying.history_length as u32,
        }
    }

    /// Write the current state to the settings store given at construction
    pub fn save_settings(&self) -> Result<(), ConfigError> {
        let Some(store) = &self.store else {
            debug!("No settings store attached, nothing saved");
            return Ok(());
        };
        store.save(&self.current_settings())
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    /// Catalog entries, active descriptor first
    pub fn enumerate(&self) -> Vec<CameraDescriptor> {
        self.lock().catalog.entries().to_vec()
    }

    pub fn catalog(&self) -> Catalog {
        self.lock().catalog.clone()
    }

    /// Re-probe attached hardware
    ///
    /// The reported frame size grows if a larger resolution appeared and
    /// never shrinks.
    pub fn refresh_catalog(&self) -> DeviceResult<()> {
        let mut state = self.lock();
        let active = match &state.session {
            Some(session) => session.descriptor(),
            None => state.catalog.active().clone(),
        };

        let catalog = self.enumerator.enumerate(active)?;
        let size = catalog.max_frame_size(self.format.bytes_per_pixel());
        let previous = self.frame_size.fetch_max(size, Ordering::SeqCst);
        if size > previous {
            info!(previous, size, "Output frame size grew");
        }
        state.catalog = catalog;
        Ok(())
    }

    /// Switch to another catalog entry
    ///
    /// Returns `Ok(false)` without touching anything when the pair is unknown
    /// or already active. The old session is closed before the new one opens;
    /// if opening fails the engine is left without a session and the error is
    /// returned.
    pub fn set_config(&self, serial: &str, resolution: &str) -> DeviceResult<bool> {
        let mut state = self.lock();

        let Some(entry) = state.catalog.find(serial, resolution).cloned() else {
            debug!(serial, resolution, "Rejected unknown configuration");
            return Ok(false);
        };

        let already_active = state.session.as_ref().is_some_and(|session| {
            session.serial() == entry.serial
                && session.width() == entry.width
                && session.height() == entry.height
        });
        if already_active {
            debug!(serial, resolution, "Configuration already active");
            return Ok(false);
        }

        if let Some(mut old) = state.session.take() {
            old.close();
        }

        state.sessions_opened += 1;
        let id = state.sessions_opened;
        let config = PipelineConfig::for_device(&entry.serial, entry.width, entry.height);

        match DeviceSession::open(
            self.backend.as_ref(),
            &config,
            self.format,
            state.keying,
            id,
        ) {
            Ok(session) => {
                info!(id, device = %entry, "Switched device");
                state.session = Some(session);
                Ok(true)
            }
            Err(err) => {
                error!(id, device = %entry, error = %err, "Failed to open device");
                Err(err)
            }
        }
    }

    /// Key the next frame into `dest`
    ///
    /// Returns `Ok(false)` on a transient miss. Size `dest` with
    /// [`frame_size`](Self::frame_size); a shorter buffer only receives the
    /// whole rows that fit.
    pub fn get_frame(&self, dest: &mut [u8]) -> DeviceResult<bool> {
        Ok(self.capture_frame(dest)?.is_some())
    }

    /// Like [`get_frame`](Self::get_frame), also reporting the geometry of
    /// the written frame
    ///
    /// Geometry is read under the same guard as the capture, so it always
    /// describes the bytes just written even if a swap follows immediately.
    pub fn capture_frame(&self, dest: &mut [u8]) -> DeviceResult<Option<FrameGeometry>> {
        let mut state = self.lock();
        let session = state.session.as_mut().ok_or(DeviceError::NoActiveSession)?;

        if !session.get_frame(dest)? {
            return Ok(None);
        }
        Ok(Some(FrameGeometry {
            width: session.width(),
            height: session.height(),
            bytes_per_pixel: session.bytes_per_pixel(),
        }))
    }

    /// Bytes needed for any frame of any catalog entry
    pub fn frame_size(&self) -> usize {
        self.frame_size.load(Ordering::SeqCst)
    }

    pub fn active_width(&self) -> Option<u32> {
        self.lock().session.as_ref().map(DeviceSession::width)
    }

    pub fn active_height(&self) -> Option<u32> {
        self.lock().session.as_ref().map(DeviceSession::height)
    }

    pub fn active_bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn active_descriptor(&self) -> Option<CameraDescriptor> {
        self.lock().session.as_ref().map(DeviceSession::descriptor)
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.lock().session.as_ref().map(|session| SessionInfo {
            id: session.id(),
            descriptor: session.descriptor(),
            state: session.state(),
            depth_scale: session.depth_scale(),
            history_len: session.history_len(),
        })
    }

    /// Id of the active session
    pub fn session_id(&self) -> Option<u64> {
        self.lock().session.as_ref().map(DeviceSession::id)
    }

    /// Sessions constructed over the engine's lifetime, including failed ones
    pub fn sessions_opened(&self) -> u64 {
        self.lock().sessions_opened
    }

    pub fn keying(&self) -> KeyingSettings {
        self.lock().keying
    }

    pub fn key_color(&self) -> u32 {
        self.lock().keying.key_color.rgb24()
    }

    pub fn transparency(&self) -> u8 {
        self.lock().keying.key_color.alpha()
    }

    pub fn max_distance(&self) -> f32 {
        self.lock().keying.max_distance
    }

    pub fn depth_history_length(&self) -> usize {
        self.lock().keying.history_length
    }

    pub fn set_key_color(&self, rgb: u32) {
        let mut state = self.lock();
        state.keying.key_color.set_rgb24(rgb);
        if let Some(session) = state.session.as_mut() {
            session.set_key_color(rgb);
        }
    }

    pub fn set_transparency(&self, alpha: u8) {
        let mut state = self.lock();
        state.keying.key_color.set_alpha(alpha);
        if let Some(session) = state.session.as_mut() {
            session.set_transparency(alpha);
        }
    }

    pub fn set_max_distance(&self, meters: f32) {
        if !meters.is_finite() || meters <= 0.0 {
            warn!(meters, "Ignoring invalid max distance");
            return;
        }

        let mut state = self.lock();
        state.keying.max_distance = meters;
        if let Some(session) = state.session.as_mut() {
            session.set_max_distance(meters);
        }
    }

    /// Set the depth history length; 1 disables history
    pub fn set_depth_history_length(&self, length: usize) {
        let length = length.max(1);
        let mut state = self.lock();
        state.keying.history_length = length;
        if let Some(session) = state.session.as_mut() {
            session.set_history_length(length);
        }
    }

    /// Close the active session
    ///
    /// Stop any capture loop driving this engine first.
    pub fn shutdown(&self) {
        if let Some(mut session) = self.lock().session.take() {
            info!(id = session.id(), "Shutting down capture engine");
            session.close();
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("format", &self.format)
            .field("frame_size", &self.frame_size())
            .field("session", &self.session_id())
            .finish_non_exhaustive()
    }
}
