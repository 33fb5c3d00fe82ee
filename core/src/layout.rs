//! Layout snapshot persistence.
//!
//! Snapshots are opaque beyond a structural check: restorable means a
//! grid descriptor plus a non-empty panel list. Writes are debounced so
//! a drag burst collapses into one store write; the pending write is
//! flushed or cancelled on every teardown path so nothing lands after
//! the owning view is gone.

use crate::panel::{LayoutSubscription, PanelManager};
use crate::{PlexusError, Result};
use rocksdb::{Options, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fixed storage key for the persisted layout blob.
pub const LAYOUT_KEY: &str = "dashboard.layout";

/// Opaque structural representation of the panel arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    /// Structural grid descriptor, owned by the docking engine
    pub grid: serde_json::Value,
    /// Active panel descriptors
    #[serde(default)]
    pub panels: Vec<serde_json::Value>,
}

impl LayoutSnapshot {
    /// Restorable only with a structural grid and at least one panel.
    pub fn is_valid(&self) -> bool {
        self.grid.is_object() && !self.panels.is_empty()
    }

    /// Parse a persisted blob; anything malformed or structurally
    /// invalid is treated as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        let snapshot: Self = serde_json::from_str(raw).ok()?;
        snapshot.is_valid().then_some(snapshot)
    }
}

/// Durable store for the layout blob: one JSON value under a fixed key.
pub struct LayoutStore {
    db: DB,
}

impl LayoutStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| PlexusError::StorageError(e.to_string()))?;

        debug!(target: "layout", "Layout store opened");
        Ok(Self { db })
    }

    pub fn put(&self, snapshot: &LayoutSnapshot) -> Result<()> {
        let serialized = serde_json::to_vec(snapshot)?;
        self.db
            .put(LAYOUT_KEY, serialized)
            .map_err(|e| PlexusError::StorageError(e.to_string()))
    }

    pub fn get_raw(&self) -> Option<String> {
        match self.db.get(LAYOUT_KEY) {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(target: "layout", error = %e, "Layout read failed");
                None
            }
        }
    }

    pub fn delete(&self) -> Result<()> {
        self.db
            .delete(LAYOUT_KEY)
            .map_err(|e| PlexusError::StorageError(e.to_string()))
    }
}

struct PendingSave {
    snapshot: Option<LayoutSnapshot>,
    timer: Option<JoinHandle<()>>,
}

/// Debounced layout persistence plus the auto-save subscription to the
/// panel manager.
///
/// At most one debounce timer exists at a time; re-scheduling replaces
/// it and the pending snapshot. Dropping the manager cancels the timer,
/// so no write can outlive its owner.
pub struct LayoutPersistence {
    store: Arc<LayoutStore>,
    window: Duration,
    pending: Arc<Mutex<PendingSave>>,
    auto_save: Mutex<Option<LayoutSubscription>>,
}

impl LayoutPersistence {
    pub fn new(store: LayoutStore, window: Duration) -> Self {
        Self {
            store: Arc::new(store),
            window,
            pending: Arc::new(Mutex::new(PendingSave {
                snapshot: None,
                timer: None,
            })),
            auto_save: Mutex::new(None),
        }
    }

    /// Record `snapshot` as the value to persist and (re)arm the
    /// debounce timer. Repeated calls within the window collapse into a
    /// single write of the latest snapshot. Must run inside a tokio
    /// runtime.
    pub fn schedule_save(&self, snapshot: LayoutSnapshot) {
        schedule_write(&self.store, &self.pending, self.window, snapshot);
    }

    /// Write any pending snapshot immediately, cancelling the timer.
    pub fn flush(&self) {
        let snapshot = {
            let mut pending = lock_pending(&self.pending);
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.snapshot.take()
        };
        if let Some(snapshot) = snapshot {
            if let Err(e) = self.store.put(&snapshot) {
                warn!(target: "layout", error = %e, "Layout flush failed");
            }
        }
    }

    /// Discard any pending write and cancel the timer.
    pub fn cancel_pending(&self) {
        let mut pending = lock_pending(&self.pending);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.snapshot = None;
    }

    /// Load the persisted snapshot. Absent when nothing was stored, the
    /// blob is malformed, or the structural check fails, so corrupt
    /// state can never reach the panel manager.
    pub fn load(&self) -> Option<LayoutSnapshot> {
        let raw = self.store.get_raw()?;
        match LayoutSnapshot::parse(&raw) {
            Some(snapshot) => Some(snapshot),
            None => {
                warn!(target: "layout", "Rejecting persisted layout: structural check failed");
                None
            }
        }
    }

    /// Remove the persisted snapshot and any pending write.
    pub fn clear(&self) -> Result<()> {
        self.cancel_pending();
        self.store.delete()
    }

    /// Subscribe to the panel manager's layout-change notifications,
    /// scheduling a debounced save per event. Idempotent: re-attaching
    /// disposes the prior subscription instead of stacking a duplicate.
    pub fn attach_auto_save(&self, panels: &dyn PanelManager) {
        let mut slot = lock_auto_save(&self.auto_save);
        if let Some(previous) = slot.take() {
            previous.dispose();
        }

        // The listener captures the store and pending slot, not the
        // manager, so its lifetime is bounded by the subscription alone.
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let window = self.window;
        let subscription = panels.on_layout_change(Arc::new(move |snapshot| {
            schedule_write(&store, &pending, window, snapshot);
        }));
        *slot = Some(subscription);
    }

    /// Cancel the auto-save subscription and any pending debounced
    /// write.
    pub fn detach_auto_save(&self) {
        if let Some(subscription) = lock_auto_save(&self.auto_save).take() {
            subscription.dispose();
        }
        self.cancel_pending();
    }
}

impl Drop for LayoutPersistence {
    fn drop(&mut self) {
        // The timer task holds only the store and the pending slot;
        // dropping the manager does not stop it implicitly.
        self.cancel_pending();
    }
}

// Replace the pending snapshot and re-arm the debounce timer; only one
// timer exists at a time.
fn schedule_write(
    store: &Arc<LayoutStore>,
    pending: &Arc<Mutex<PendingSave>>,
    window: Duration,
    snapshot: LayoutSnapshot,
) {
    let mut guard = lock_pending(pending);
    guard.snapshot = Some(snapshot);
    if let Some(timer) = guard.timer.take() {
        timer.abort();
    }

    let store = Arc::clone(store);
    let shared = Arc::clone(pending);
    guard.timer = Some(tokio::spawn(async move {
        tokio::time::sleep(window).await;
        let snapshot = {
            let mut guard = lock_pending(&shared);
            guard.timer = None;
            guard.snapshot.take()
        };
        if let Some(snapshot) = snapshot {
            if let Err(e) = store.put(&snapshot) {
                warn!(target: "layout", error = %e, "Debounced layout write failed");
            } else {
                debug!(target: "layout", "Layout persisted");
            }
        }
    }));
}

fn lock_pending(pending: &Mutex<PendingSave>) -> std::sync::MutexGuard<'_, PendingSave> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_auto_save(
    auto_save: &Mutex<Option<LayoutSubscription>>,
) -> std::sync::MutexGuard<'_, Option<LayoutSubscription>> {
    auto_save.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_with_grid_and_panels_is_valid() {
        let snapshot = LayoutSnapshot {
            grid: json!({"root": {"type": "row"}}),
            panels: vec![json!({"id": "federation"})],
        };
        assert!(snapshot.is_valid());
    }

    #[test]
    fn parse_rejects_empty_object() {
        assert!(LayoutSnapshot::parse("{}").is_none());
    }

    #[test]
    fn parse_rejects_grid_without_panels() {
        assert!(LayoutSnapshot::parse(r#"{"grid":{}}"#).is_none());
        assert!(LayoutSnapshot::parse(r#"{"grid":{},"panels":[]}"#).is_none());
    }

    #[test]
    fn parse_rejects_panels_without_grid() {
        assert!(LayoutSnapshot::parse(r#"{"panels":[{"id":"a"}]}"#).is_none());
        assert!(LayoutSnapshot::parse(r#"{"grid":null,"panels":[{"id":"a"}]}"#).is_none());
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(LayoutSnapshot::parse("{not json").is_none());
    }

    #[test]
    fn parse_accepts_minimal_valid_blob() {
        let snapshot = LayoutSnapshot::parse(r#"{"grid":{},"panels":[{"id":"a"}]}"#);
        assert!(snapshot.is_some());
    }
}
