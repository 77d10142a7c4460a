//! Persistence of applied script versions inside the target cluster.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::MigrationError;
use crate::log::log_warn;
use crate::scripts::ScriptVersion;
use crate::transport::{Method, SearchRequest, SearchTransport};

/// Hits requested per history search page.
pub const HISTORY_PAGE_SIZE: usize = 1_000;

const COMPONENT: &str = "history_index";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub version: String,
    pub description: String,
    pub script: String,
    pub checksum: String,
    pub execution_timestamp: String,
    pub execution_runtime_in_millis: u64,
    pub success: bool,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

/// Hit bodies stay loosely typed so one foreign document cannot fail the
/// whole read.
#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Option<Vec<Value>>,
}

/// History index accessor bound to a transport.
pub struct HistoryIndex<'a> {
    name: &'a str,
    transport: &'a dyn SearchTransport,
}

impl<'a> HistoryIndex<'a> {
    pub fn new(name: &'a str, transport: &'a dyn SearchTransport) -> Self {
        Self { name, transport }
    }

    /// Create the index with its mapping unless it already exists.
    pub fn ensure_exists(&self) -> Result<(), MigrationError> {
        let probe = self
            .transport
            .send(&SearchRequest::new(Method::Head, format!("/{}", self.name)))?;

        match probe.status {
            200 => Ok(()),
            404 => {
                let create = SearchRequest::new(Method::Put, format!("/{}", self.name))
                    .with_json_body(&history_index_mapping());
                let response = self.transport.send(&create)?;
                // 400 here is the race with a concurrent creator
                if response.is_success() || is_already_exists(&response.body) {
                    Ok(())
                } else {
                    Err(self.error(format!(
                        "failed to create index (status {}): {}",
                        response.status, response.body
                    )))
                }
            }
            status => Err(self.error(format!("unexpected status {status} probing index"))),
        }
    }

    /// Versions recorded with `success: true`, ascending and deduplicated.
    ///
    /// Pages through the index sorted by version with `search_after`, so the
    /// result is complete however many failed attempts were recorded.
    /// Documents without a usable version are logged and ignored.
    pub fn applied_versions(&self) -> Result<Vec<ScriptVersion>, MigrationError> {
        let mut versions = Vec::new();
        let mut search_after: Option<Vec<Value>> = None;

        loop {
            let hits = self.search_page(search_after.as_deref())?;
            let page_len = hits.len();

            for hit in &hits {
                match version_of(hit) {
                    Ok(version) => versions.push(version),
                    Err(reason) => log_warn(
                        COMPONENT,
                        "history_entry_ignored",
                        json!({
                            "index": self.name,
                            "id": hit.id,
                            "reason": reason,
                        }),
                    ),
                }
            }

            if page_len < HISTORY_PAGE_SIZE {
                break;
            }
            match hits.last().and_then(|hit| hit.sort.clone()) {
                Some(sort) => search_after = Some(sort),
                None => {
                    return Err(self.error(
                        "search response is missing sort values for pagination".to_string(),
                    ))
                }
            }
        }

        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn search_page(
        &self,
        search_after: Option<&[Value]>,
    ) -> Result<Vec<SearchHit>, MigrationError> {
        let mut query = json!({
            "size": HISTORY_PAGE_SIZE,
            "_source": ["version"],
            "query": { "term": { "success": true } },
            "sort": [{ "version": "asc" }],
        });
        if let Some(search_after) = search_after {
            query["search_after"] = Value::Array(search_after.to_vec());
        }

        let request = SearchRequest::new(Method::Post, format!("/{}/_search", self.name))
            .with_json_body(&query);
        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(self.error(format!(
                "failed to read history (status {}): {}",
                response.status, response.body
            )));
        }

        let envelope: SearchEnvelope = serde_json::from_str(&response.body)
            .map_err(|error| self.error(format!("malformed search response: {error}")))?;
        Ok(envelope.hits.hits)
    }

    pub fn record(&self, entry: &HistoryEntry) -> Result<(), MigrationError> {
        let body = serde_json::to_value(entry)
            .map_err(|error| self.error(format!("failed to serialize entry: {error}")))?;
        let request = SearchRequest::new(Method::Post, format!("/{}/_doc?refresh=true", self.name))
            .with_json_body(&body);
        let response = self.transport.send(&request)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.error(format!(
                "failed to record '{}' (status {}): {}",
                entry.script, response.status, response.body
            )))
        }
    }

    fn error(&self, message: String) -> MigrationError {
        MigrationError::History {
            index: self.name.to_string(),
            message,
        }
    }
}

fn history_index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "version": { "type": "keyword" },
                "description": { "type": "text" },
                "script": { "type": "keyword" },
                "checksum": { "type": "keyword" },
                "executionTimestamp": { "type": "date" },
                "executionRuntimeInMillis": { "type": "long" },
                "success": { "type": "boolean" }
            }
        }
    })
}

fn version_of(hit: &SearchHit) -> Result<ScriptVersion, String> {
    let raw = hit
        .source
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| "document has no string 'version' field".to_string())?;
    ScriptVersion::parse(raw).map_err(|message| format!("bad version '{raw}': {message}"))
}

fn is_already_exists(body: &str) -> bool {
    body.contains("resource_already_exists_exception")
}
