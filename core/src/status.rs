//! Probe registry and status aggregation.
//!
//! Each registered probe owns its own check procedure; the aggregator
//! runs checks with a bounded ceiling, keeps last-known state per probe,
//! and notifies subscribers after every mutation. Check failures never
//! escape: they are captured into the failing probe's own state.

use crate::config::HealthPolicy;
use crate::{PlexusError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Probe connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeHealth {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// Last-known state of a single backend probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub status: ProbeHealth,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub latency_ms: Option<u64>,
}

/// Check procedure owned by a probe entry.
///
/// `Ok(true)` means reachable and healthy, `Ok(false)` means the backend
/// responded but signaled failure, `Err` carries a transport error.
#[async_trait]
pub trait ProbeCheck: Send + Sync {
    async fn check(&self, endpoint: &str) -> std::result::Result<bool, String>;
}

/// Stock check procedure: `GET {endpoint}/health`, 2xx means healthy.
pub struct HttpHealthCheck {
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProbeCheck for HttpHealthCheck {
    async fn check(&self, endpoint: &str) -> std::result::Result<bool, String> {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// A probe to register: identity plus its check procedure.
#[derive(Clone)]
pub struct ProbeSpec {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub check: Arc<dyn ProbeCheck>,
}

/// Derived view over the current probe set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub connected: usize,
    pub total: usize,
    pub healthy: bool,
}

type StatusListener = Arc<dyn Fn(&[Probe]) + Send + Sync>;

struct Registered {
    probe: Probe,
    check: Arc<dyn ProbeCheck>,
}

/// Aggregates per-probe health over independent check procedures.
///
/// Listeners are invoked after mutation completes, with a snapshot built
/// once the probe map is consistent; they never observe a half-updated
/// set. Listeners must not mutate the aggregator from inside the
/// callback.
pub struct StatusAggregator {
    probes: DashMap<String, Registered>,
    listeners: DashMap<String, StatusListener>,
    policy: HealthPolicy,
    check_timeout: Duration,
}

impl StatusAggregator {
    pub fn new(policy: HealthPolicy, check_timeout: Duration) -> Self {
        Self {
            probes: DashMap::new(),
            listeners: DashMap::new(),
            policy,
            check_timeout,
        }
    }

    /// Register probes, replacing any that share an identifier.
    pub fn register_probes(&self, specs: Vec<ProbeSpec>) {
        for spec in specs {
            let probe = Probe {
                id: spec.id.clone(),
                name: spec.name,
                endpoint: spec.endpoint,
                status: ProbeHealth::Disconnected,
                last_checked: None,
                last_error: None,
                latency_ms: None,
            };
            self.probes.insert(
                spec.id,
                Registered {
                    probe,
                    check: spec.check,
                },
            );
        }
        self.notify();
    }

    /// Run one probe's check procedure and return its updated state.
    ///
    /// Errors only for an unregistered identifier; every check failure is
    /// captured into the probe's own status. Subscribers observe the
    /// in-flight `Connecting` state before the check is issued.
    pub async fn check_one(&self, id: &str) -> Result<Probe> {
        let (endpoint, check) = {
            let entry = self
                .probes
                .get(id)
                .ok_or_else(|| PlexusError::StatusError(format!("unknown probe: {}", id)))?;
            (entry.probe.endpoint.clone(), entry.check.clone())
        };

        self.mutate(id, |probe| {
            probe.status = ProbeHealth::Connecting;
        });

        debug!(target: "status", probe = %id, endpoint = %endpoint, "Checking probe");
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.check_timeout, check.check(&endpoint)).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let checked_at = Utc::now();

        let updated = self.mutate(id, |probe| {
            probe.last_checked = Some(checked_at);
            match &outcome {
                Ok(Ok(true)) => {
                    probe.status = ProbeHealth::Connected;
                    probe.last_error = None;
                    probe.latency_ms = Some(latency_ms);
                }
                Ok(Ok(false)) => {
                    probe.status = ProbeHealth::Error;
                    probe.last_error = Some("backend reported failure".to_string());
                    probe.latency_ms = Some(latency_ms);
                }
                Ok(Err(e)) => {
                    probe.status = ProbeHealth::Disconnected;
                    probe.last_error = Some(e.clone());
                    probe.latency_ms = None;
                }
                Err(_) => {
                    probe.status = ProbeHealth::Disconnected;
                    probe.last_error = Some(format!(
                        "health check timed out after {}ms",
                        self.check_timeout.as_millis()
                    ));
                    probe.latency_ms = None;
                }
            }
        });

        if let Some(probe) = &updated {
            if probe.status != ProbeHealth::Connected {
                warn!(
                    target: "status",
                    probe = %id,
                    status = ?probe.status,
                    error = probe.last_error.as_deref().unwrap_or(""),
                    "Probe check did not succeed"
                );
            }
        }

        updated.ok_or_else(|| PlexusError::StatusError(format!("unknown probe: {}", id)))
    }

    /// Check every registered probe concurrently and return the resulting
    /// snapshot. One probe's failure never blocks or fails another.
    pub async fn check_all(&self) -> Vec<Probe> {
        let ids: Vec<String> = self.probes.iter().map(|e| e.key().clone()).collect();
        let checks = ids.iter().map(|id| self.check_one(id));
        let _ = futures_util::future::join_all(checks).await;
        self.snapshot()
    }

    /// Subscribe to probe-state changes. The listener is invoked
    /// synchronously with the current snapshot, then after every
    /// mutation. Returns a subscription id for [`Self::unsubscribe`].
    pub fn subscribe(&self, listener: StatusListener) -> String {
        let subscription_id = format!("sub_{}", uuid::Uuid::new_v4());
        listener(&self.snapshot());
        self.listeners.insert(subscription_id.clone(), listener);
        subscription_id
    }

    /// Remove one listener; other subscriptions are unaffected.
    pub fn unsubscribe(&self, subscription_id: &str) {
        self.listeners.remove(subscription_id);
    }

    /// Current state of every probe, sorted by identifier.
    pub fn snapshot(&self) -> Vec<Probe> {
        let mut all: Vec<Probe> = self.probes.iter().map(|e| e.probe.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Last-known state of one probe.
    pub fn get(&self, id: &str) -> Option<Probe> {
        self.probes.get(id).map(|e| e.probe.clone())
    }

    /// Derived summary over the current probe set. Healthy iff at least
    /// the configured quorum of probes is connected.
    pub fn summary(&self) -> StatusSummary {
        let snapshot = self.snapshot();
        let connected = snapshot
            .iter()
            .filter(|p| p.status == ProbeHealth::Connected)
            .count();
        StatusSummary {
            connected,
            total: snapshot.len(),
            healthy: connected >= self.policy.quorum,
        }
    }

    // Apply a mutation to one probe, then notify with a consistent
    // snapshot. The map reference is released before listeners run.
    fn mutate<F>(&self, id: &str, f: F) -> Option<Probe>
    where
        F: FnOnce(&mut Probe),
    {
        let updated = {
            let mut entry = self.probes.get_mut(id)?;
            f(&mut entry.probe);
            entry.probe.clone()
        };
        self.notify();
        Some(updated)
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<StatusListener> =
            self.listeners.iter().map(|e| e.value().clone()).collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}
