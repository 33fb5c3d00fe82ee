//! Memory search client.
//!
//! Issues search, browse, and fetch-by-id requests against the memory
//! search backend. A newly issued search explicitly aborts any still
//! pending predecessor, so only the latest query's result is ever
//! delivered regardless of response arrival order. Transport errors are
//! logged and mapped to empty results; the dashboard stays usable while
//! this backend is degraded.

use crate::config::MemoryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// A searchable content unit owned by the memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    pub category: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    /// Relevance score; populated only in search context, never on a
    /// direct fetch-by-id.
    pub score: Option<f64>,
}

/// Result set for one search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub records: Vec<MemoryRecord>,
    pub total: usize,
    pub query: String,
}

impl SearchResults {
    fn empty(query: &str) -> Self {
        Self {
            records: Vec::new(),
            total: 0,
            query: query.to_string(),
        }
    }
}

/// Knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub category: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            category: None,
        }
    }
}

/// A category known to the memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(alias = "category")]
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub children: Vec<Category>,
}

/// Loose wire shape for a record; field spellings vary across backend
/// versions.
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "text")]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl WireRecord {
    fn into_record(self) -> MemoryRecord {
        MemoryRecord {
            id: self.id.unwrap_or_default(),
            title: self.title,
            content: self.content.unwrap_or_default(),
            category: self.category,
            timestamp: self.timestamp,
            tags: self.tags,
            score: self.score,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped {
        results: Vec<WireRecord>,
        #[serde(default)]
        total: Option<usize>,
    },
    Bare(Vec<WireRecord>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordListResponse {
    Results { results: Vec<WireRecord> },
    Memories { memories: Vec<WireRecord> },
    Bare(Vec<WireRecord>),
}

impl RecordListResponse {
    fn into_records(self) -> Vec<WireRecord> {
        match self {
            Self::Results { results } => results,
            Self::Memories { memories } => memories,
            Self::Bare(records) => records,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoriesResponse {
    Wrapped { categories: Vec<Category> },
    Bare(Vec<Category>),
}

/// HTTP client for the memory search backend.
pub struct MemorySearchClient {
    config: MemoryConfig,
    client: reqwest::Client,
    // Monotonic issue order; the latest generation wins delivery.
    generation: AtomicU64,
    // Abort handle for the in-flight search, if any.
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl MemorySearchClient {
    pub fn new(config: MemoryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            client,
            generation: AtomicU64::new(0),
            cancel: Mutex::new(None),
        }
    }

    /// Run a search. A whitespace-only query short-circuits to an empty
    /// result without touching the network. Issuing a new search aborts
    /// any still-pending prior one; a superseded search returns `None`
    /// and must not be delivered. Transport failure yields `Some(empty)`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Option<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Some(SearchResults::empty(query));
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        {
            let mut slot = self.cancel.lock().await;
            if let Some(previous) = slot.replace(cancel_tx) {
                // Aborts the predecessor's request future, dropping the
                // connection rather than merely ignoring the response.
                let _ = previous.send(());
            }
        }

        let url = format!("{}/api/search", self.config.base_url);
        let limit_param = options.limit.to_string();
        let mut request = self
            .client
            .get(&url)
            .query(&[("q", query), ("limit", limit_param.as_str())]);
        if let Some(category) = &options.category {
            request = request.query(&[("category", category.as_str())]);
        }

        let outcome = tokio::select! {
            _ = &mut cancel_rx => {
                debug!(target: "memory", query = %query, "Search superseded by newer query");
                return None;
            }
            outcome = request.send() => outcome,
        };

        if self.generation.load(Ordering::SeqCst) != my_generation {
            return None;
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "memory", error = %e, "Search request failed");
                return Some(SearchResults::empty(query));
            }
        };
        if !response.status().is_success() {
            warn!(
                target: "memory",
                status = %response.status(),
                "Memory backend rejected search"
            );
            return Some(SearchResults::empty(query));
        }

        let decoded: SearchResponse = match response.json().await {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(target: "memory", error = %e, "Failed to parse search response");
                return Some(SearchResults::empty(query));
            }
        };

        let (records, total) = match decoded {
            SearchResponse::Wrapped { results, total } => {
                let records: Vec<MemoryRecord> =
                    results.into_iter().map(WireRecord::into_record).collect();
                let total = total.unwrap_or(records.len());
                (records, total)
            }
            SearchResponse::Bare(results) => {
                let records: Vec<MemoryRecord> =
                    results.into_iter().map(WireRecord::into_record).collect();
                let total = records.len();
                (records, total)
            }
        };

        // A newer search may have been issued while the body was read.
        if self.generation.load(Ordering::SeqCst) != my_generation {
            return None;
        }

        debug!(target: "memory", query = %query, count = records.len(), "Search completed");
        Some(SearchResults {
            records,
            total,
            query: query.to_string(),
        })
    }

    /// List known categories. Tolerates a bare list or a wrapping object;
    /// unrecognized shapes degrade to an empty list.
    pub async fn get_categories(&self) -> Vec<Category> {
        let url = format!("{}/api/categories", self.config.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "memory", error = %e, "Categories request failed");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            warn!(
                target: "memory",
                status = %response.status(),
                "Memory backend rejected categories request"
            );
            return Vec::new();
        }

        match response.json::<CategoriesResponse>().await {
            Ok(CategoriesResponse::Wrapped { categories }) => categories,
            Ok(CategoriesResponse::Bare(categories)) => categories,
            Err(e) => {
                warn!(target: "memory", error = %e, "Unrecognized categories shape");
                Vec::new()
            }
        }
    }

    /// Browse records in a category. Falls back to the search endpoint
    /// filtered by category when the primary endpoint fails; exhausting
    /// both yields an empty list.
    pub async fn get_by_category(&self, category: &str, limit: usize) -> Vec<MemoryRecord> {
        if let Some(records) = self.browse_memories(category, limit).await {
            return records;
        }

        debug!(
            target: "memory",
            category = %category,
            "Primary browse failed; falling back to search endpoint"
        );
        if let Some(records) = self.browse_via_search(category, limit).await {
            return records;
        }

        warn!(target: "memory", category = %category, "Both browse paths failed");
        Vec::new()
    }

    /// Fetch a single record by identifier. Absent on any failure. The
    /// relevance score is never populated on this path.
    pub async fn get_by_id(&self, id: &str) -> Option<MemoryRecord> {
        let url = format!("{}/api/conversations/{}", self.config.base_url, id);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "memory", error = %e, "Fetch-by-id request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(
                target: "memory",
                id = %id,
                status = %response.status(),
                "Record not available"
            );
            return None;
        }

        match response.json::<WireRecord>().await {
            Ok(wire) => {
                let mut record = wire.into_record();
                record.score = None;
                Some(record)
            }
            Err(e) => {
                warn!(target: "memory", error = %e, "Failed to parse record");
                None
            }
        }
    }

    /// Short, independently bounded reachability check.
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

    async fn browse_memories(&self, category: &str, limit: usize) -> Option<Vec<MemoryRecord>> {
        let url = format!("{}/api/memories", self.config.base_url);
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("category", category), ("limit", limit_param.as_str())])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let decoded: RecordListResponse = response.json().await.ok()?;
        Some(
            decoded
                .into_records()
                .into_iter()
                .map(WireRecord::into_record)
                .collect(),
        )
    }

    async fn browse_via_search(&self, category: &str, limit: usize) -> Option<Vec<MemoryRecord>> {
        let url = format!("{}/api/search", self.config.base_url);
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", category),
                ("category", category),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let decoded: RecordListResponse = response.json().await.ok()?;
        Some(
            decoded
                .into_records()
                .into_iter()
                .map(WireRecord::into_record)
                .collect(),
        )
    }
}
