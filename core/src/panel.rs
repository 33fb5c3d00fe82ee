//! Panel-management interface.
//!
//! The concrete docking engine lives outside this crate; the core drives
//! it only through the [`PanelManager`] trait. Implementations own all
//! rendering concerns and report layout-affecting events through the
//! subscription returned by [`PanelManager::on_layout_change`].

use crate::layout::LayoutSnapshot;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a panel docks relative to the anchor panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockSide {
    Center,
    Left,
    Right,
    Top,
    Bottom,
}

/// Declarative description of a panel to add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSpec {
    pub id: String,
    pub title: String,
    pub side: DockSide,
}

/// Callback invoked with the current snapshot after a layout-affecting
/// event.
pub type LayoutListener = Arc<dyn Fn(LayoutSnapshot) + Send + Sync>;

/// Cancels a layout-change subscription when disposed or dropped.
pub struct LayoutSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl LayoutSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the subscription now rather than at drop time.
    pub fn dispose(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for LayoutSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Abstract docking engine contract.
#[cfg_attr(test, mockall::automock)]
pub trait PanelManager: Send + Sync {
    /// Add a panel to the arrangement.
    fn add_panel(&self, spec: &PanelSpec) -> Result<()>;

    /// Subscribe to layout-affecting events. Dropping the returned
    /// subscription cancels it.
    fn on_layout_change(&self, listener: LayoutListener) -> LayoutSubscription;

    /// Capture the current arrangement.
    fn to_snapshot(&self) -> LayoutSnapshot;

    /// Apply a previously captured arrangement. Fails on snapshots the
    /// engine cannot express; callers must catch and fall back.
    fn from_snapshot(&self, snapshot: &LayoutSnapshot) -> Result<()>;
}
