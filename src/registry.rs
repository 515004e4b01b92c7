//! Discovery of devices and the map of active sessions.

use crate::device::NumatoGpio;
use crate::error::{Error, Result};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Active device sessions keyed by the id read from each device.
///
/// Keys are device ids, not the index of the device file: the session
/// under key 2 is the device that answered `id get` with 2, which is in
/// general not `/dev/ttyACM2`. Give devices distinct ids with
/// [`NumatoGpio::set_id`] to keep configurations stable.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<u32, NumatoGpio>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every path in `paths` that is not registered yet, using
    /// serial transports with default settings.
    pub fn discover<S: AsRef<str>>(&mut self, paths: &[S]) -> usize {
        self.discover_with(paths, NumatoGpio::open)
    }

    /// Like [`DeviceRegistry::discover`], opening sessions with `open`.
    ///
    /// Sessions whose transport has closed are dropped first. Paths that
    /// fail to open or do not answer like a device are skipped, as are
    /// devices whose id is already taken. Returns the number of newly
    /// registered devices.
    pub fn discover_with<S, F>(&mut self, paths: &[S], mut open: F) -> usize
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Result<NumatoGpio>,
    {
        self.devices.retain(|id, device| {
            let open = device.is_open();
            if !open {
                debug!("Removing disconnected device {} ({})", id, device.path());
            }
            open
        });

        let mut added = 0;
        for path in paths {
            let path = path.as_ref();
            if self.devices.values().any(|device| device.path() == path) {
                continue;
            }
            match open(path).and_then(|device| self.insert(device)) {
                Ok(id) => {
                    debug!("Registered device {} at {}", id, path);
                    added += 1;
                }
                Err(e) => debug!("Skipping {}: {}", path, e),
            }
        }
        added
    }

    /// Registers an opened session under its device id. A session whose id
    /// is already registered is cleaned up and rejected.
    pub fn insert(&mut self, device: NumatoGpio) -> Result<u32> {
        let id = device.id()?;
        if self.devices.contains_key(&id) {
            let err = Error::DuplicateDeviceId {
                device: device.path().to_string(),
                id,
            };
            if let Err(e) = device.cleanup() {
                warn!("Cleanup of rejected device {} failed: {}", device.path(), e);
            }
            return Err(err);
        }
        self.devices.insert(id, device);
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Option<&NumatoGpio> {
        self.devices.get(&id)
    }

    /// Removes a session without cleaning it up.
    pub fn remove(&mut self, id: u32) -> Option<NumatoGpio> {
        self.devices.remove(&id)
    }

    /// Sessions ordered by device id.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &NumatoGpio)> {
        self.devices.iter().map(|(&id, device)| (id, device))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Cleans up and removes every session. Continues past failures and
    /// returns the number of sessions that failed to clean up.
    pub fn cleanup(&mut self) -> usize {
        let mut failures = 0;
        for (id, device) in std::mem::take(&mut self.devices) {
            if let Err(e) = device.cleanup() {
                warn!("Cleanup of device {} ({}) failed: {}", id, device.path(), e);
                failures += 1;
            }
        }
        failures
    }
}
