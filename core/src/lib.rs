// Plexus Core Library
// Dockable panel dashboard core for agent federations

pub mod config;
pub mod controller;
pub mod federation;
pub mod layout;
pub mod memory;
pub mod messages;
pub mod panel;
pub mod status;
pub mod telemetry;

// Export core types
pub use config::DashboardConfig;
pub use controller::{DashboardController, LayoutInit};
pub use federation::{Activity, Agent, FederationHealth, FederationMonitor, FederationSummary};
pub use layout::{LayoutPersistence, LayoutSnapshot, LayoutStore};
pub use memory::{MemoryRecord, MemorySearchClient, SearchResults};
pub use messages::{Message, MessageChannelClient, OutgoingMessage, Recipient};
pub use panel::{PanelManager, PanelSpec};
pub use status::{Probe, ProbeHealth, StatusAggregator, StatusSummary};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlexusError {
    #[error("Status error: {0}")]
    StatusError(String),

    #[error("Panel error: {0}")]
    PanelError(String),

    #[error("Layout error: {0}")]
    LayoutError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, PlexusError>;
