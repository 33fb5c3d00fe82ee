//! Dashboard configuration.
//!
//! Every tunable policy value lives here: backend addresses, polling
//! cadences, quorum thresholds, the debounce window, the identifier
//! mapping table, and the default panel arrangement. Components receive
//! their section of this config at construction; nothing reads globals.

use crate::federation::AgentProfile;
use crate::panel::{DockSide, PanelSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connectivity health policy: the probe set is healthy when at least
/// `quorum` probes are connected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub quorum: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self { quorum: 2 }
    }
}

/// Configuration for the message channel client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Message bus base URL
    pub base_url: String,
    /// Internal identifier of the agent this process runs as
    pub local_agent: String,
    /// Channel used when an outgoing message names none
    pub default_channel: String,
    /// Timeout for fetch/send requests in milliseconds
    pub request_timeout_ms: u64,
    /// Timeout for the standalone health check in milliseconds
    pub health_timeout_ms: u64,
    /// Identifier mapping table: (internal agent id, wire lobe name)
    pub lobes: Vec<(String, String)>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8100".to_string(),
            local_agent: "deck".to_string(),
            default_channel: "general".to_string(),
            request_timeout_ms: 10_000,
            health_timeout_ms: 2_000,
            lobes: vec![
                ("deck".to_string(), "central".to_string()),
                ("planner".to_string(), "frontal".to_string()),
                ("archivist".to_string(), "hippocampus".to_string()),
                ("watcher".to_string(), "occipital".to_string()),
            ],
        }
    }
}

/// Configuration for the memory search client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Memory search base URL
    pub base_url: String,
    /// Timeout for search/browse requests in milliseconds
    pub request_timeout_ms: u64,
    /// Timeout for the standalone health check in milliseconds
    pub health_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8200".to_string(),
            request_timeout_ms: 10_000,
            health_timeout_ms: 2_000,
        }
    }
}

/// Configuration for layout persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory for the layout store
    pub path: PathBuf,
    /// Debounce window for layout writes in milliseconds
    pub debounce_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/layout"),
            debounce_ms: 1_000,
        }
    }
}

/// Configuration for agent-activity derivation and federation health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Agents participating in the federation
    pub agents: Vec<AgentProfile>,
    /// Internal id of the agent representing this process; always active
    pub local_agent: String,
    /// Channel whose recent messages drive activity derivation
    pub channel: String,
    /// Number of recent messages considered per cycle
    pub message_window: usize,
    /// An agent is active if it authored a message this recently (minutes)
    pub recency_minutes: i64,
    /// Federation is coherent when at least this many agents are active
    pub activity_quorum: usize,
    /// Probe id backing the message bus
    pub bus_probe: String,
    /// Probe id backing the memory search service
    pub memory_probe: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            agents: vec![
                AgentProfile {
                    id: "deck".to_string(),
                    name: "Deck".to_string(),
                    glyph: "🖥".to_string(),
                    substrate: "process".to_string(),
                },
                AgentProfile {
                    id: "planner".to_string(),
                    name: "Planner".to_string(),
                    glyph: "🧭".to_string(),
                    substrate: "cloud".to_string(),
                },
                AgentProfile {
                    id: "archivist".to_string(),
                    name: "Archivist".to_string(),
                    glyph: "📚".to_string(),
                    substrate: "cloud".to_string(),
                },
                AgentProfile {
                    id: "watcher".to_string(),
                    name: "Watcher".to_string(),
                    glyph: "👁".to_string(),
                    substrate: "edge".to_string(),
                },
            ],
            local_agent: "deck".to_string(),
            channel: "general".to_string(),
            message_window: 20,
            recency_minutes: 30,
            activity_quorum: 2,
            bus_probe: "bus".to_string(),
            memory_probe: "memory".to_string(),
        }
    }
}

/// An additional health-checked endpoint beyond the two primary backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEndpoint {
    pub id: String,
    pub name: String,
    pub endpoint: String,
}

/// Default panel arrangement: one anchor panel plus satellites docked
/// relative to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelArrangement {
    pub anchor: PanelSpec,
    pub satellites: Vec<PanelSpec>,
}

impl Default for PanelArrangement {
    fn default() -> Self {
        Self {
            anchor: PanelSpec {
                id: "federation".to_string(),
                title: "Federation".to_string(),
                side: DockSide::Center,
            },
            satellites: vec![
                PanelSpec {
                    id: "probes".to_string(),
                    title: "Probes".to_string(),
                    side: DockSide::Right,
                },
                PanelSpec {
                    id: "channel".to_string(),
                    title: "Messages".to_string(),
                    side: DockSide::Bottom,
                },
                PanelSpec {
                    id: "memory".to_string(),
                    title: "Memory Search".to_string(),
                    side: DockSide::Left,
                },
            ],
        }
    }
}

/// Top-level dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DashboardConfig {
    pub channel: ChannelConfig,
    pub memory: MemoryConfig,
    pub layout: LayoutConfig,
    pub federation: FederationConfig,
    pub panels: PanelArrangement,
    /// Extra health-checked endpoints beyond the bus and memory backends
    pub extra_probes: Vec<ProbeEndpoint>,
    pub health: HealthPolicy,
    pub timing: TimingConfig,
}

/// Polling cadences and the probe check ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Hard ceiling on a single probe check in milliseconds
    pub check_timeout_ms: u64,
    /// Probe polling interval in milliseconds
    pub probe_interval_ms: u64,
    /// Federation polling interval in milliseconds
    pub federation_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: 3_000,
            probe_interval_ms: 15_000,
            federation_interval_ms: 10_000,
        }
    }
}

impl DashboardConfig {
    /// Build a configuration from the environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("PLEXUS_BUS_URL") {
            config.channel.base_url = base;
        }
        if let Ok(base) = std::env::var("PLEXUS_MEMORY_URL") {
            config.memory.base_url = base;
        }
        if let Ok(path) = std::env::var("PLEXUS_LAYOUT_PATH") {
            config.layout.path = PathBuf::from(path);
        }
        config
    }
}
