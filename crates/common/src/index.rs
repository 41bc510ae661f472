//! The index capability consumed by the folder service.
//!
//! The folder never owns the index database; it reads point-in-time
//! [`Snapshot`]s and publishes local adoptions through
//! [`IndexProvider::update_one`]. Snapshots are released when dropped, so
//! every exit path of a request releases its snapshot without bookkeeping.
//!
//! [`MemIndex`] is a complete in-memory provider. Tests use it as the index
//! fixture; embedders can use it to drive the service without a database.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{DeviceId, FileInfo};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index database closed")]
    Closed,
}

/// Point-in-time read view over the index.
pub trait Snapshot: Send + Sync {
    /// Look up the global (consensus) record for `name`.
    fn global(&self, name: &str) -> Option<FileInfo>;

    /// Visit every global entry, in index order. `visit` returns `false` to
    /// stop early.
    fn with_global(&self, visit: &mut dyn FnMut(&FileInfo) -> bool);

    /// Visit every global entry the given device does not have yet, in index
    /// order. `visit` returns `false` to stop early.
    fn with_need(&self, device: DeviceId, visit: &mut dyn FnMut(&FileInfo) -> bool);
}

/// Handle to the index database for one folder.
pub trait IndexProvider: Send + Sync {
    fn snapshot(&self) -> Result<Box<dyn Snapshot>, IndexError>;

    /// Record that `device` now has `file`. Bumps the device's sequence.
    fn update_one(&self, device: DeviceId, file: &FileInfo);

    /// The device's current index sequence number.
    fn sequence(&self, device: DeviceId) -> i64;
}

#[derive(Debug, Default)]
struct IndexState {
    global: BTreeMap<String, FileInfo>,
    devices: BTreeMap<DeviceId, BTreeMap<String, FileInfo>>,
    sequences: BTreeMap<DeviceId, i64>,
}

/// In-memory [`IndexProvider`].
#[derive(Debug, Clone, Default)]
pub struct MemIndex {
    inner: Arc<Mutex<IndexState>>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the global view with a record, as a remote index exchange would.
    pub fn insert_global(&self, file: FileInfo) {
        let mut state = self.inner.lock();
        state.global.insert(file.name.clone(), file);
    }

    /// The record `device` holds for `name`, if any.
    pub fn have(&self, device: DeviceId, name: &str) -> Option<FileInfo> {
        let state = self.inner.lock();
        state.devices.get(&device).and_then(|m| m.get(name)).cloned()
    }
}

impl IndexProvider for MemIndex {
    fn snapshot(&self) -> Result<Box<dyn Snapshot>, IndexError> {
        let state = self.inner.lock();
        Ok(Box::new(MemSnapshot {
            global: state.global.clone(),
            devices: state.devices.clone(),
        }))
    }

    fn update_one(&self, device: DeviceId, file: &FileInfo) {
        let mut state = self.inner.lock();
        state
            .devices
            .entry(device)
            .or_default()
            .insert(file.name.clone(), file.clone());
        *state.sequences.entry(device).or_insert(0) += 1;
    }

    fn sequence(&self, device: DeviceId) -> i64 {
        let state = self.inner.lock();
        state.sequences.get(&device).copied().unwrap_or(0)
    }
}

struct MemSnapshot {
    global: BTreeMap<String, FileInfo>,
    devices: BTreeMap<DeviceId, BTreeMap<String, FileInfo>>,
}

impl Snapshot for MemSnapshot {
    fn global(&self, name: &str) -> Option<FileInfo> {
        self.global.get(name).cloned()
    }

    fn with_global(&self, visit: &mut dyn FnMut(&FileInfo) -> bool) {
        for file in self.global.values() {
            if !visit(file) {
                return;
            }
        }
    }

    fn with_need(&self, device: DeviceId, visit: &mut dyn FnMut(&FileInfo) -> bool) {
        let have = self.devices.get(&device);
        for (name, file) in &self.global {
            if have.is_some_and(|m| m.contains_key(name)) {
                continue;
            }
            if !visit(file) {
                return;
            }
        }
    }
}
