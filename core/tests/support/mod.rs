//! Shared test support: ephemeral stub backends and a scriptable panel
//! manager.
#![allow(dead_code)]

use axum::Router;
use plexus_core::layout::LayoutSnapshot;
use plexus_core::panel::{LayoutListener, LayoutSubscription, PanelManager, PanelSpec};
use plexus_core::{PlexusError, Result};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Serve an axum router on an ephemeral port, returning its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

type ListenerEntry = (u64, LayoutListener);

/// Scriptable in-memory panel manager.
#[derive(Default)]
pub struct FakePanels {
    panels: Mutex<Vec<PanelSpec>>,
    listeners: Arc<Mutex<Vec<ListenerEntry>>>,
    next_listener: AtomicU64,
    fail_apply: AtomicBool,
    applied: Mutex<Vec<LayoutSnapshot>>,
}

impl FakePanels {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `from_snapshot` call fail.
    pub fn fail_apply(&self) {
        self.fail_apply.store(true, Ordering::SeqCst);
    }

    /// Fire a layout-change event at every subscriber.
    pub fn emit(&self, snapshot: &LayoutSnapshot) {
        let listeners: Vec<LayoutListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(snapshot.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn panel_ids(&self) -> Vec<String> {
        self.panels
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.id.clone())
            .collect()
    }

    pub fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

impl PanelManager for FakePanels {
    fn add_panel(&self, spec: &PanelSpec) -> Result<()> {
        self.panels.lock().unwrap().push(spec.clone());
        Ok(())
    }

    fn on_layout_change(&self, listener: LayoutListener) -> LayoutSubscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        let listeners = Arc::clone(&self.listeners);
        LayoutSubscription::new(move || {
            listeners
                .lock()
                .unwrap()
                .retain(|(listener_id, _)| *listener_id != id);
        })
    }

    fn to_snapshot(&self) -> LayoutSnapshot {
        let panels = self
            .panels
            .lock()
            .unwrap()
            .iter()
            .map(|spec| json!({"id": spec.id}))
            .collect();
        LayoutSnapshot {
            grid: json!({"root": {"type": "row"}}),
            panels,
        }
    }

    fn from_snapshot(&self, snapshot: &LayoutSnapshot) -> Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(PlexusError::PanelError(
                "snapshot not expressible".to_string(),
            ));
        }
        self.applied.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// A layout snapshot that passes the structural check.
pub fn valid_snapshot(marker: &str) -> LayoutSnapshot {
    LayoutSnapshot {
        grid: json!({"root": {"type": "row", "marker": marker}}),
        panels: vec![json!({"id": "federation"})],
    }
}
