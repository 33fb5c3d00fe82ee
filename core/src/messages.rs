//! Message channel client.
//!
//! Talks to the message bus over its corpus-callosum HTTP surface and
//! maps wire records into the internal message model. Expected failures
//! never cross this boundary as errors: fetches degrade to an empty
//! sequence and writes report `false`. Callers needing failure
//! visibility consult connectivity state separately.

use crate::config::ChannelConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Recipient marker used on the wire for broadcast messages.
const BROADCAST_LOBE: &str = "all";

/// Message destination: a single agent or the whole federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Agent(String),
    Broadcast,
}

/// An inter-agent communication unit.
///
/// Immutable once received; only the `read` flag changes post-receipt,
/// through [`MessageChannelClient::mark_read`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from_agent: String,
    pub to: Recipient,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub read: bool,
}

/// A message to send. Missing recipient means broadcast; missing channel
/// falls back to the configured default.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub content: String,
    pub to_agent: Option<String>,
    pub channel: Option<String>,
}

/// Bidirectional identifier mapping between internal agent ids and the
/// lobe names used on the wire. Built from configuration so new agents
/// need a table entry, not a code change. Unmapped identifiers pass
/// through unchanged.
#[derive(Debug, Clone, Default)]
pub struct LobeMap {
    to_wire: HashMap<String, String>,
    to_internal: HashMap<String, String>,
}

impl LobeMap {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut map = Self::default();
        for (internal, wire) in pairs {
            map.to_wire.insert(internal.clone(), wire.clone());
            map.to_internal.insert(wire.clone(), internal.clone());
        }
        map
    }

    pub fn wire(&self, internal: &str) -> String {
        self.to_wire
            .get(internal)
            .cloned()
            .unwrap_or_else(|| internal.to_string())
    }

    pub fn internal(&self, wire: &str) -> String {
        self.to_internal
            .get(wire)
            .cloned()
            .unwrap_or_else(|| wire.to_string())
    }
}

/// Raw record shape on the wire; every field is optional so one malformed
/// record cannot poison a fetch.
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    from_lobe: Option<String>,
    #[serde(default)]
    to_lobe: Option<String>,
    #[serde(default, alias = "content")]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    read: bool,
}

/// The bus answers either a bare list or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessagesResponse {
    Wrapped { messages: Vec<WireMessage> },
    Bare(Vec<WireMessage>),
}

impl MessagesResponse {
    fn into_records(self) -> Vec<WireMessage> {
        match self {
            Self::Wrapped { messages } => messages,
            Self::Bare(records) => records,
        }
    }
}

/// HTTP client for the message bus.
pub struct MessageChannelClient {
    config: ChannelConfig,
    client: reqwest::Client,
    lobes: LobeMap,
}

impl MessageChannelClient {
    pub fn new(config: ChannelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let lobes = LobeMap::from_pairs(&config.lobes);

        Self {
            config,
            client,
            lobes,
        }
    }

    /// Fetch recent messages for a channel, addressed to the local agent,
    /// sorted ascending by timestamp regardless of delivery order.
    ///
    /// Transport or decode failure yields an empty sequence; callers
    /// treat empty as "no new data", not as a hard failure.
    pub async fn fetch_messages(
        &self,
        channel: &str,
        limit: usize,
        unread_only: bool,
    ) -> Vec<Message> {
        let url = format!("{}/corpus-callosum/messages", self.config.base_url);
        let limit_param = limit.to_string();
        let to_lobe = self.lobes.wire(&self.config.local_agent);
        let mut request = self.client.get(&url).query(&[
            ("channel", channel),
            ("limit", limit_param.as_str()),
            ("to_lobe", to_lobe.as_str()),
        ]);
        if unread_only {
            request = request.query(&[("unread_only", "true")]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "messages", error = %e, "Message fetch failed");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            warn!(
                target: "messages",
                status = %response.status(),
                "Message bus rejected fetch"
            );
            return Vec::new();
        }

        let decoded: MessagesResponse = match response.json().await {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(target: "messages", error = %e, "Failed to parse messages response");
                return Vec::new();
            }
        };

        let mut messages: Vec<Message> = decoded
            .into_records()
            .into_iter()
            .map(|wire| self.map_wire(wire, channel))
            .collect();
        messages.sort_by_key(|m| m.timestamp);

        debug!(
            target: "messages",
            channel = %channel,
            count = messages.len(),
            "Fetched messages"
        );
        messages
    }

    /// Post a message to the bus. Returns `false` on empty content,
    /// non-2xx status, or transport failure; no partial side effect is
    /// visible to the caller. The sent message appears on the next fetch
    /// rather than being injected locally.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> bool {
        if outgoing.content.trim().is_empty() {
            debug!(target: "messages", "Refusing to send empty message");
            return false;
        }

        let to_lobe = outgoing
            .to_agent
            .as_deref()
            .map(|agent| self.lobes.wire(agent))
            .unwrap_or_else(|| BROADCAST_LOBE.to_string());
        let body = json!({
            "from_lobe": self.lobes.wire(&self.config.local_agent),
            "to_lobe": to_lobe,
            "message": outgoing.content,
            "channel": outgoing
                .channel
                .as_deref()
                .unwrap_or(&self.config.default_channel),
        });

        let url = format!("{}/corpus-callosum/messages", self.config.base_url);
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    target: "messages",
                    status = %response.status(),
                    "Message bus rejected send"
                );
                false
            }
            Err(e) => {
                warn!(target: "messages", error = %e, "Message send failed");
                false
            }
        }
    }

    /// Mark messages as read. An empty id list is a no-op success.
    pub async fn mark_read(&self, message_ids: &[String]) -> bool {
        if message_ids.is_empty() {
            return true;
        }

        let url = format!("{}/corpus-callosum/messages/read", self.config.base_url);
        let body = json!({ "message_ids": message_ids });
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    target: "messages",
                    status = %response.status(),
                    "Message bus rejected mark-read"
                );
                false
            }
            Err(e) => {
                warn!(target: "messages", error = %e, "Mark-read failed");
                false
            }
        }
    }

    /// Short, independently bounded reachability check against the bus.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_millis(self.config.health_timeout_ms))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn map_wire(&self, wire: WireMessage, channel: &str) -> Message {
        let to = match wire.to_lobe.as_deref() {
            None | Some("") | Some(BROADCAST_LOBE) => Recipient::Broadcast,
            Some(lobe) => Recipient::Agent(self.lobes.internal(lobe)),
        };

        Message {
            id: wire.id.unwrap_or_default(),
            from_agent: wire
                .from_lobe
                .map(|lobe| self.lobes.internal(&lobe))
                .unwrap_or_default(),
            to,
            body: wire.message.unwrap_or_default(),
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            channel: wire.channel.unwrap_or_else(|| channel.to_string()),
            read: wire.read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<(String, String)> {
        vec![
            ("planner".to_string(), "frontal".to_string()),
            ("deck".to_string(), "central".to_string()),
        ]
    }

    #[test]
    fn lobe_map_is_bidirectional() {
        let map = LobeMap::from_pairs(&pairs());
        assert_eq!(map.wire("planner"), "frontal");
        assert_eq!(map.internal("frontal"), "planner");
    }

    #[test]
    fn lobe_map_passes_unmapped_ids_through() {
        let map = LobeMap::from_pairs(&pairs());
        assert_eq!(map.wire("newcomer"), "newcomer");
        assert_eq!(map.internal("parietal"), "parietal");
    }

    #[test]
    fn wire_mapping_defaults_missing_fields() {
        let client = MessageChannelClient::new(ChannelConfig {
            lobes: pairs(),
            ..ChannelConfig::default()
        });
        let before = Utc::now();
        let mapped = client.map_wire(
            WireMessage {
                id: None,
                from_lobe: Some("frontal".to_string()),
                to_lobe: None,
                message: None,
                timestamp: None,
                channel: None,
                read: false,
            },
            "general",
        );

        assert_eq!(mapped.from_agent, "planner");
        assert_eq!(mapped.to, Recipient::Broadcast);
        assert_eq!(mapped.body, "");
        assert_eq!(mapped.channel, "general");
        assert!(mapped.timestamp >= before);
    }

    #[test]
    fn wire_mapping_resolves_direct_recipient() {
        let client = MessageChannelClient::new(ChannelConfig {
            lobes: pairs(),
            ..ChannelConfig::default()
        });
        let mapped = client.map_wire(
            WireMessage {
                id: Some("m1".to_string()),
                from_lobe: Some("frontal".to_string()),
                to_lobe: Some("central".to_string()),
                message: Some("hello".to_string()),
                timestamp: None,
                channel: Some("ops".to_string()),
                read: true,
            },
            "general",
        );

        assert_eq!(mapped.to, Recipient::Agent("deck".to_string()));
        assert_eq!(mapped.channel, "ops");
        assert!(mapped.read);
    }
}
