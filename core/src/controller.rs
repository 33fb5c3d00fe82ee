//! Dashboard composition root.
//!
//! Owns every core service as an explicitly constructed instance, drives
//! the layout initialization state machine, and routes operator actions
//! to the clients. Rendering happens elsewhere; this module only talks
//! to the abstract panel manager.

use crate::config::{DashboardConfig, PanelArrangement, TimingConfig};
use crate::federation::{FederationMonitor, FederationSummary};
use crate::layout::{LayoutPersistence, LayoutStore};
use crate::memory::{MemorySearchClient, SearchOptions, SearchResults};
use crate::messages::{Message, MessageChannelClient, OutgoingMessage};
use crate::panel::PanelManager;
use crate::status::{HttpHealthCheck, ProbeSpec, StatusAggregator};
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How the panel arrangement came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutInit {
    /// Initialization has not run yet
    Idle,
    /// A persisted snapshot passed validation and was applied
    Restored,
    /// No usable snapshot; the default arrangement was built
    DefaultConstructed,
}

/// Composes the aggregator, clients, persistence, and panel manager into
/// the running dashboard.
pub struct DashboardController {
    panels: Arc<dyn PanelManager>,
    persistence: Arc<LayoutPersistence>,
    status: Arc<StatusAggregator>,
    channel: Arc<MessageChannelClient>,
    memory: Arc<MemorySearchClient>,
    federation: Arc<FederationMonitor>,
    arrangement: PanelArrangement,
    timing: TimingConfig,
    init_state: Mutex<LayoutInit>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl DashboardController {
    /// Construct every core service from configuration. Fails only when
    /// the layout store cannot be opened.
    pub fn new(config: DashboardConfig, panels: Arc<dyn PanelManager>) -> Result<Self> {
        let check_timeout = Duration::from_millis(config.timing.check_timeout_ms);
        let status = Arc::new(StatusAggregator::new(config.health, check_timeout));

        let probe_client = reqwest::Client::builder()
            .timeout(check_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let health_check = Arc::new(HttpHealthCheck::new(probe_client));

        let mut probes = vec![
            ProbeSpec {
                id: config.federation.bus_probe.clone(),
                name: "Message Bus".to_string(),
                endpoint: config.channel.base_url.clone(),
                check: health_check.clone(),
            },
            ProbeSpec {
                id: config.federation.memory_probe.clone(),
                name: "Memory Search".to_string(),
                endpoint: config.memory.base_url.clone(),
                check: health_check.clone(),
            },
        ];
        for extra in &config.extra_probes {
            probes.push(ProbeSpec {
                id: extra.id.clone(),
                name: extra.name.clone(),
                endpoint: extra.endpoint.clone(),
                check: health_check.clone(),
            });
        }
        status.register_probes(probes);

        let channel = Arc::new(MessageChannelClient::new(config.channel));
        let memory = Arc::new(MemorySearchClient::new(config.memory));
        let federation = Arc::new(FederationMonitor::new(
            channel.clone(),
            status.clone(),
            config.federation,
        ));

        let store = LayoutStore::open(&config.layout.path)?;
        let persistence = Arc::new(LayoutPersistence::new(
            store,
            Duration::from_millis(config.layout.debounce_ms),
        ));

        Ok(Self {
            panels,
            persistence,
            status,
            channel,
            memory,
            federation,
            arrangement: config.panels,
            timing: config.timing,
            init_state: Mutex::new(LayoutInit::Idle),
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// Initialize the panel arrangement: restore the persisted layout if
    /// one validates, otherwise build the default arrangement; then
    /// attach auto-save. Idempotent: a duplicate mount observes the
    /// recorded state and changes nothing.
    pub fn init(&self) -> Result<LayoutInit> {
        let mut state = self
            .init_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != LayoutInit::Idle {
            debug!(target: "controller", "Duplicate init ignored");
            return Ok(*state);
        }

        let outcome = match self.persistence.load() {
            Some(snapshot) => match self.panels.from_snapshot(&snapshot) {
                Ok(()) => {
                    info!(target: "controller", "Restored persisted layout");
                    LayoutInit::Restored
                }
                Err(e) => {
                    warn!(
                        target: "controller",
                        error = %e,
                        "Persisted layout failed to apply; building default"
                    );
                    self.build_default_layout()?;
                    LayoutInit::DefaultConstructed
                }
            },
            None => {
                info!(target: "controller", "No usable persisted layout; building default");
                self.build_default_layout()?;
                LayoutInit::DefaultConstructed
            }
        };

        self.persistence.attach_auto_save(self.panels.as_ref());
        *state = outcome;
        Ok(outcome)
    }

    /// Current position in the layout initialization state machine.
    pub fn init_state(&self) -> LayoutInit {
        *self
            .init_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the probe-check and federation poll loops. Idempotent; a
    /// second call while loops are running does nothing.
    pub fn start_polling(&self) {
        let mut pollers = self.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        if !pollers.is_empty() {
            return;
        }

        let status = self.status.clone();
        let probe_interval = Duration::from_millis(self.timing.probe_interval_ms);
        pollers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                status.check_all().await;
            }
        }));

        let federation = self.federation.clone();
        let federation_interval = Duration::from_millis(self.timing.federation_interval_ms);
        pollers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(federation_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                federation.poll().await;
            }
        }));

        info!(target: "controller", "Polling started");
    }

    /// Stop polling, flush the pending layout write, and detach
    /// auto-save. Timers are cancelled explicitly; nothing fires against
    /// a torn-down context.
    pub fn shutdown(&self) {
        for poller in self
            .pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            poller.abort();
        }
        self.persistence.flush();
        self.persistence.detach_auto_save();
        info!(target: "controller", "Dashboard shut down");
    }

    /// Operator-facing health label derived from the latest federation
    /// summary.
    pub async fn health_label(&self) -> String {
        self.federation.summary().await.health.to_string()
    }

    /// Latest federation summary.
    pub async fn federation_summary(&self) -> FederationSummary {
        self.federation.summary().await
    }

    /// Route an operator search to the memory client.
    pub async fn run_search(&self, query: &str, options: &SearchOptions) -> Option<SearchResults> {
        self.memory.search(query, options).await
    }

    /// Route an operator send to the message channel. The caller
    /// re-fetches to observe the sent message.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> bool {
        self.channel.send_message(outgoing).await
    }

    /// Fetch the current message view for a channel.
    pub async fn fetch_messages(&self, channel: &str, limit: usize) -> Vec<Message> {
        self.channel.fetch_messages(channel, limit, false).await
    }

    /// Mark messages read on the bus.
    pub async fn mark_read(&self, message_ids: &[String]) -> bool {
        self.channel.mark_read(message_ids).await
    }

    /// The status aggregator, for subscribing panel views.
    pub fn status(&self) -> Arc<StatusAggregator> {
        self.status.clone()
    }

    /// The federation monitor, for panel views.
    pub fn federation(&self) -> Arc<FederationMonitor> {
        self.federation.clone()
    }

    /// The layout persistence manager.
    pub fn persistence(&self) -> Arc<LayoutPersistence> {
        self.persistence.clone()
    }

    fn build_default_layout(&self) -> Result<()> {
        self.panels.add_panel(&self.arrangement.anchor)?;
        for satellite in &self.arrangement.satellites {
            self.panels.add_panel(satellite)?;
        }
        debug!(
            target: "controller",
            satellites = self.arrangement.satellites.len(),
            "Default layout constructed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{LayoutSubscription, MockPanelManager};

    fn test_config(dir: &std::path::Path) -> DashboardConfig {
        let mut config = DashboardConfig::default();
        config.layout.path = dir.to_path_buf();
        config
    }

    #[test]
    fn fresh_start_builds_default_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut panels = MockPanelManager::new();
        // One anchor plus three default satellites.
        panels.expect_add_panel().times(4).returning(|_| Ok(()));
        panels
            .expect_on_layout_change()
            .times(1)
            .returning(|_| LayoutSubscription::new(|| {}));

        let controller =
            DashboardController::new(test_config(dir.path()), Arc::new(panels)).unwrap();
        assert_eq!(controller.init_state(), LayoutInit::Idle);
        assert_eq!(controller.init().unwrap(), LayoutInit::DefaultConstructed);
        assert_eq!(controller.init_state(), LayoutInit::DefaultConstructed);
    }

    #[test]
    fn duplicate_init_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut panels = MockPanelManager::new();
        panels.expect_add_panel().times(4).returning(|_| Ok(()));
        panels
            .expect_on_layout_change()
            .times(1)
            .returning(|_| LayoutSubscription::new(|| {}));

        let controller =
            DashboardController::new(test_config(dir.path()), Arc::new(panels)).unwrap();
        controller.init().unwrap();
        // Second mount: no extra panels, no extra subscription.
        assert_eq!(controller.init().unwrap(), LayoutInit::DefaultConstructed);
    }
}
