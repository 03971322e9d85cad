//! In-memory device state store
//!
//! One entry per registered device, created at startup and never removed.
//! Each entry has its own lock, so updates to different devices never contend.
//! The only mutations are whole-record success/failure applications, tagged
//! with a per-device attempt number: an attempt that is not newer than the
//! last applied one is discarded.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{Device, DeviceState, DeviceView, Snapshot, SwitchReading};
use crate::registry::DeviceRegistry;

/// Result of applying a poll outcome to a device entry
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Transition),
    /// A newer attempt was already applied; nothing changed
    Stale,
    UnknownDevice,
}

/// State after an applied update, plus what it was before
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: DeviceState,
    pub was_connected: bool,
    /// Failures in a row including this one (0 after a success)
    pub consecutive_failures: u32,
    /// Failures in a row before this update
    pub previous_failures: u32,
}

#[derive(Debug, Default)]
struct Record {
    state: DeviceState,
    applied_attempt: u64,
    consecutive_failures: u32,
}

#[derive(Debug)]
struct Entry {
    device: Device,
    issued_attempts: AtomicU64,
    record: RwLock<Record>,
}

struct StoreInner {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

/// Cloneable handle to the shared store
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Build a store with a zero-state entry for every registered device.
    pub fn new(registry: &DeviceRegistry) -> Self {
        let entries: Vec<Entry> = registry
            .iter()
            .map(|device| Entry {
                device: device.clone(),
                issued_attempts: AtomicU64::new(0),
                record: RwLock::new(Record::default()),
            })
            .collect();

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.device.id.clone(), i))
            .collect();

        Self {
            inner: Arc::new(StoreInner { entries, index }),
        }
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.inner
            .index
            .get(id)
            .map(|&i| &self.inner.entries[i])
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.entry(id).map(|e| &e.device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.inner.entries.iter().map(|e| &e.device)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub async fn get(&self, id: &str) -> Option<DeviceState> {
        let entry = self.entry(id)?;
        let record = entry.record.read().await;
        Some(record.state.clone())
    }

    /// Issue the next attempt number for a device poll.
    pub fn begin_attempt(&self, id: &str) -> Option<u64> {
        self.entry(id)
            .map(|e| e.issued_attempts.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Mark a device connected and overwrite its readings from one response.
    pub async fn apply_success(
        &self,
        id: &str,
        attempt: u64,
        reading: SwitchReading,
    ) -> ApplyOutcome {
        self.apply(id, attempt, |record| {
            record.state.connected = true;
            record.state.last_error = None;
            record.state.metrics.apply(reading, Utc::now().timestamp_millis());
            record.consecutive_failures = 0;
        })
        .await
    }

    /// Mark a device disconnected, keeping its last metrics.
    pub async fn apply_failure(&self, id: &str, attempt: u64, message: &str) -> ApplyOutcome {
        self.apply(id, attempt, |record| {
            record.state.connected = false;
            record.state.last_error = Some(message.to_string());
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        })
        .await
    }

    async fn apply(&self, id: &str, attempt: u64, update: impl FnOnce(&mut Record)) -> ApplyOutcome {
        let Some(entry) = self.entry(id) else {
            return ApplyOutcome::UnknownDevice;
        };

        let mut record = entry.record.write().await;
        if attempt <= record.applied_attempt {
            return ApplyOutcome::Stale;
        }

        let was_connected = record.state.connected;
        let previous_failures = record.consecutive_failures;

        record.applied_attempt = attempt;
        update(&mut *record);

        ApplyOutcome::Applied(Transition {
            state: record.state.clone(),
            was_connected,
            consecutive_failures: record.consecutive_failures,
            previous_failures,
        })
    }

    /// Every device with its current state, in registry order.
    pub async fn views(&self) -> Vec<DeviceView> {
        let mut views = Vec::with_capacity(self.inner.entries.len());
        for entry in &self.inner.entries {
            let record = entry.record.read().await;
            views.push(DeviceView::new(&entry.device, record.state.clone()));
        }
        views
    }

    pub async fn view(&self, id: &str) -> Option<DeviceView> {
        let entry = self.entry(id)?;
        let record = entry.record.read().await;
        Some(DeviceView::new(&entry.device, record.state.clone()))
    }

    pub async fn snapshot(&self, poll_sec: f64) -> Snapshot {
        let devices: BTreeMap<String, DeviceView> = self
            .views()
            .await
            .into_iter()
            .map(|view| (view.id.clone(), view))
            .collect();

        Snapshot { poll_sec, devices }
    }
}
