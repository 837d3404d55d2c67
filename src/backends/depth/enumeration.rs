// SPDX-License-Identifier: GPL-3.0-only

//! Device catalog enumeration
//!
//! The catalog lists every (device, color resolution) pair the attached
//! hardware offers. The active combination always comes first so a
//! selection list opens on it; the rest is sorted by label ascending, then
//! width and height descending.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::DepthBackend;
use super::types::{CameraDescriptor, DeviceInfo};
use crate::errors::DeviceResult;

/// Enumerated (device, resolution) combinations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CameraDescriptor>,
    max_width: u32,
    max_height: u32,
}

impl Catalog {
    /// Build a catalog from the active descriptor and the attached devices
    pub fn build(active: CameraDescriptor, devices: &[DeviceInfo]) -> Self {
        let mut max_width = active.width;
        let mut max_height = active.height;
        let mut rest = Vec::new();

        for device in devices {
            let resolutions: BTreeSet<(u32, u32)> =
                device.color_resolutions.iter().copied().collect();

            for (width, height) in resolutions {
                max_width = max_width.max(width);
                max_height = max_height.max(height);

                if active.same_mode(&device.serial, width, height) {
                    continue;
                }
                rest.push(CameraDescriptor::new(
                    &device.name,
                    &device.serial,
                    width,
                    height,
                ));
            }
        }

        rest.sort_by(|l, r| {
            l.label
                .cmp(&r.label)
                .then_with(|| r.width.cmp(&l.width))
                .then_with(|| r.height.cmp(&l.height))
        });

        let mut entries = Vec::with_capacity(rest.len() + 1);
        entries.push(active);
        entries.extend(rest);

        Self {
            entries,
            max_width,
            max_height,
        }
    }

    pub fn entries(&self) -> &[CameraDescriptor] {
        &self.entries
    }

    /// The descriptor of the device that was active when the catalog was built
    pub fn active(&self) -> &CameraDescriptor {
        &self.entries[0]
    }

    pub fn find(&self, serial: &str, resolution: &str) -> Option<&CameraDescriptor> {
        self.entries.iter().find(|e| e.matches(serial, resolution))
    }

    /// Largest width and height over all entries
    ///
    /// Width and height are maximized independently, so the product bounds
    /// every resolution in the catalog.
    pub fn max_dimensions(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    /// Bytes needed to hold any catalog resolution at `bytes_per_pixel`
    pub fn max_frame_size(&self, bytes_per_pixel: usize) -> usize {
        self.max_width as usize * self.max_height as usize * bytes_per_pixel
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Probes attached hardware for the catalog
#[derive(Clone)]
pub struct DeviceEnumerator {
    backend: Arc<dyn DepthBackend>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn DepthBackend>) -> Self {
        Self { backend }
    }

    /// Enumerate every device and resolution, with `active` first
    pub fn enumerate(&self, active: CameraDescriptor) -> DeviceResult<Catalog> {
        let devices = self.backend.query_devices()?;
        debug!(count = devices.len(), "Queried depth devices");

        let catalog = Catalog::build(active, &devices);
        let (max_width, max_height) = catalog.max_dimensions();
        info!(
            entries = catalog.len(),
            max_width, max_height, "Device catalog enumerated"
        );
        Ok(catalog)
    }
}

impl std::fmt::Debug for DeviceEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEnumerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::depth::{VirtualBackend, VirtualDeviceSpec};

    fn device(name: &str, serial: &str, resolutions: &[(u32, u32)]) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            serial: serial.to_string(),
            color_resolutions: resolutions.to_vec(),
        }
    }

    fn modes(catalog: &Catalog) -> Vec<(String, u32, u32)> {
        catalog
            .entries()
            .iter()
            .map(|e| (e.label.clone(), e.width, e.height))
            .collect()
    }

    #[test]
    fn test_active_first_then_sorted() {
        let devices = [
            device("Cam1", "1", &[(640, 480), (1280, 720)]),
            device("Cam0", "0", &[(640, 480)]),
        ];
        let active = CameraDescriptor::new("Cam0", "0", 640, 480);

        let catalog = Catalog::build(active, &devices);

        assert_eq!(
            modes(&catalog),
            vec![
                ("Cam0 [0]".to_string(), 640, 480),
                ("Cam1 [1]".to_string(), 1280, 720),
                ("Cam1 [1]".to_string(), 640, 480),
            ]
        );
    }

    #[test]
    fn test_height_breaks_width_ties() {
        let devices = [device("Cam", "7", &[(640, 360), (640, 480), (424, 240)])];
        let active = CameraDescriptor::new("Cam", "7", 424, 240);

        let catalog = Catalog::build(active, &devices);

        assert_eq!(
            modes(&catalog),
            vec![
                ("Cam [7]".to_string(), 424, 240),
                ("Cam [7]".to_string(), 640, 480),
                ("Cam [7]".to_string(), 640, 360),
            ]
        );
    }

    #[test]
    fn test_duplicate_resolutions_are_collapsed() {
        let devices = [device("Cam", "7", &[(640, 480), (640, 480), (1280, 720)])];
        let active = CameraDescriptor::new("Cam", "7", 1280, 720);

        let catalog = Catalog::build(active, &devices);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_only_active_device() {
        let active = CameraDescriptor::new("Cam", "7", 640, 480);
        let catalog = Catalog::build(active.clone(), &[]);

        assert_eq!(catalog.entries(), &[active]);
        assert_eq!(catalog.max_frame_size(4), 640 * 480 * 4);
    }

    #[test]
    fn test_max_frame_size_covers_all_devices() {
        let devices = [
            device("A", "a", &[(640, 480), (1280, 720)]),
            device("B", "b", &[(1920, 1080), (640, 480)]),
        ];
        let active = CameraDescriptor::new("A", "a", 640, 480);

        let catalog = Catalog::build(active, &devices);
        assert_eq!(catalog.max_dimensions(), (1920, 1080));
        assert_eq!(catalog.max_frame_size(3), 1920 * 1080 * 3);
    }

    #[test]
    fn test_find_by_serial_and_resolution() {
        let devices = [device("A", "a", &[(640, 480), (1280, 720)])];
        let catalog = Catalog::build(CameraDescriptor::new("A", "a", 640, 480), &devices);

        let found = catalog.find("a", "1280 × 720").unwrap();
        assert_eq!((found.width, found.height), (1280, 720));
        assert!(catalog.find("a", "1920 × 1080").is_none());
        assert!(catalog.find("b", "640 × 480").is_none());
    }

    #[test]
    fn test_enumerator_queries_backend() {
        let backend = Arc::new(VirtualBackend::new(vec![
            VirtualDeviceSpec::new("Cam1", "1", &[(640, 480), (1280, 720)]),
            VirtualDeviceSpec::new("Cam0", "0", &[(640, 480)]),
        ]));
        let enumerator = DeviceEnumerator::new(backend);

        let catalog = enumerator
            .enumerate(CameraDescriptor::new("Cam0", "0", 640, 480))
            .unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.active().serial, "0");
    }
}
