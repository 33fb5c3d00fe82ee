//! Agent activity derivation and federation-level health.
//!
//! Shares the aggregator's polling cadence: each cycle fetches the
//! recent-message window from the bus, classifies every agent's
//! activity, and replaces the federation summary atomically. A failed
//! cycle downgrades connectivity and health only; previously fetched
//! agent and message data stays visible (stale-but-present) so the
//! operator view never flashes empty on a transient failure.

use crate::config::FederationConfig;
use crate::messages::{Message, MessageChannelClient};
use crate::status::{ProbeHealth, StatusAggregator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Fixed identity metadata for a federation participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub glyph: String,
    pub substrate: String,
}

/// Derived activity classification; recomputed per cycle, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Active,
    Idle,
    Offline,
}

/// A federation participant with its current derived activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub profile: AgentProfile,
    pub activity: Activity,
}

/// Federation health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationHealth {
    Coherent,
    Degraded,
    Offline,
}

impl fmt::Display for FederationHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Coherent => "coherent",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Aggregate federation view; replaced whole every poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationSummary {
    pub health: FederationHealth,
    pub active_agents: usize,
    pub total_agents: usize,
    pub memory_connected: bool,
    pub bus_connected: bool,
    pub uptime_secs: u64,
}

struct MonitorState {
    recent: Vec<Message>,
    agents: Vec<Agent>,
    summary: FederationSummary,
}

/// Polls the message bus and derives agent activity and federation
/// health from the recent-message window plus probe connectivity.
pub struct FederationMonitor {
    channel: Arc<MessageChannelClient>,
    status: Arc<StatusAggregator>,
    config: FederationConfig,
    started: Instant,
    state: RwLock<MonitorState>,
}

impl FederationMonitor {
    pub fn new(
        channel: Arc<MessageChannelClient>,
        status: Arc<StatusAggregator>,
        config: FederationConfig,
    ) -> Self {
        let agents = initial_agents(&config);
        let summary = FederationSummary {
            health: FederationHealth::Offline,
            active_agents: count_active(&agents),
            total_agents: agents.len(),
            memory_connected: false,
            bus_connected: false,
            uptime_secs: 0,
        };

        Self {
            channel,
            status,
            config,
            started: Instant::now(),
            state: RwLock::new(MonitorState {
                recent: Vec::new(),
                agents,
                summary,
            }),
        }
    }

    /// Run one poll cycle and return the new summary.
    pub async fn poll(&self) -> FederationSummary {
        let fetched = self
            .channel
            .fetch_messages(&self.config.channel, self.config.message_window, false)
            .await;
        let bus_connected = self.probe_connected(&self.config.bus_probe);
        let memory_connected = self.probe_connected(&self.config.memory_probe);

        let mut state = self.state.write().await;

        if bus_connected {
            // An empty fetch with a live bus is "no new data"; the
            // retained window still drives derivation.
            if !fetched.is_empty() {
                state.recent = fetched;
            }
            let cutoff = Utc::now() - chrono::Duration::minutes(self.config.recency_minutes);
            state.agents = derive_agents(
                &self.config.agents,
                &self.config.local_agent,
                &state.recent,
                cutoff,
            );
        }
        // With the bus unreachable, agents and messages keep their last
        // known values; only connectivity and health degrade.

        let active = count_active(&state.agents);
        let summary = FederationSummary {
            health: derive_health(bus_connected, active, self.config.activity_quorum),
            active_agents: active,
            total_agents: state.agents.len(),
            memory_connected,
            bus_connected,
            uptime_secs: self.started.elapsed().as_secs(),
        };
        state.summary = summary.clone();

        debug!(
            target: "federation",
            health = %summary.health,
            active = summary.active_agents,
            total = summary.total_agents,
            "Poll cycle completed"
        );
        summary
    }

    /// Latest summary, as of the last completed poll cycle.
    pub async fn summary(&self) -> FederationSummary {
        self.state.read().await.summary.clone()
    }

    /// Agents with their activity as of the last completed poll cycle.
    pub async fn agents(&self) -> Vec<Agent> {
        self.state.read().await.agents.clone()
    }

    /// The retained recent-message window.
    pub async fn recent_messages(&self) -> Vec<Message> {
        self.state.read().await.recent.clone()
    }

    fn probe_connected(&self, probe_id: &str) -> bool {
        self.status
            .get(probe_id)
            .map(|probe| probe.status == ProbeHealth::Connected)
            .unwrap_or(false)
    }
}

fn initial_agents(config: &FederationConfig) -> Vec<Agent> {
    config
        .agents
        .iter()
        .map(|profile| Agent {
            profile: profile.clone(),
            activity: if profile.id == config.local_agent {
                Activity::Active
            } else {
                Activity::Offline
            },
        })
        .collect()
}

fn count_active(agents: &[Agent]) -> usize {
    agents
        .iter()
        .filter(|agent| agent.activity == Activity::Active)
        .count()
}

// An agent is active when it authored a message after the cutoff; the
// local agent represents this process and is always active.
fn derive_agents(
    profiles: &[AgentProfile],
    local_agent: &str,
    recent: &[Message],
    cutoff: DateTime<Utc>,
) -> Vec<Agent> {
    profiles
        .iter()
        .map(|profile| {
            let authored_recently = recent
                .iter()
                .any(|m| m.from_agent == profile.id && m.timestamp >= cutoff);
            let activity = if profile.id == local_agent || authored_recently {
                Activity::Active
            } else {
                Activity::Idle
            };
            Agent {
                profile: profile.clone(),
                activity,
            }
        })
        .collect()
}

fn derive_health(bus_connected: bool, active: usize, quorum: usize) -> FederationHealth {
    if !bus_connected {
        FederationHealth::Offline
    } else if active >= quorum {
        FederationHealth::Coherent
    } else {
        FederationHealth::Degraded
    }
}
