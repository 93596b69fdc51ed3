// src/storage/elastic.rs

//! Elasticsearch search index client.
//!
//! Talks to the `_bulk` NDJSON API directly over `reqwest`. Upserts are sent
//! as `index` actions keyed by facility id, so a resubmission fully replaces
//! the stored document.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::IndexConfig;
use crate::storage::{BulkAction, BulkItemOutcome, BulkResponse, Refresh, SearchIndex};
use crate::utils::http::{create_async_client, endpoint};

/// Elasticsearch-backed search index.
#[derive(Debug, Clone)]
pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemBody>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemBody {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CountBody {
    count: u64,
}

impl ElasticIndex {
    pub fn new(client: Client, base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            index: index.into(),
        }
    }

    /// Create an index client from configuration.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let client = create_async_client(config)?;
        Ok(Self::new(client, &config.url, &config.index_name))
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Check that the cluster answers.
    pub async fn ping(&self) -> Result<()> {
        let response = self.client.get(endpoint(&self.base_url, "")?).send().await?;
        check_status(response.status(), "ping", || String::new())
    }

    /// Number of documents currently in the index.
    pub async fn count(&self) -> Result<u64> {
        let url = endpoint(&self.base_url, &format!("{}/_count", self.index))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        check_status(status, "_count", || text.clone())?;
        Ok(serde_json::from_str::<CountBody>(&text)?.count)
    }

    /// Create the index with its mapping if it does not exist yet.
    ///
    /// Returns whether the index was created.
    pub async fn ensure_index(&self) -> Result<bool> {
        let url = endpoint(&self.base_url, &self.index)?;
        let response = self.client.head(url.clone()).send().await?;
        match response.status() {
            StatusCode::OK => return Ok(false),
            StatusCode::NOT_FOUND => {}
            status => check_status(status, "index exists", String::new)?,
        }

        let response = self.client.put(url).json(&index_mapping()).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status == StatusCode::BAD_REQUEST && text.contains("resource_already_exists_exception") {
            return Ok(false);
        }
        check_status(status, "create index", || text.clone())?;
        log::info!("Created index {}", self.index);
        Ok(true)
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn bulk(&self, actions: &[BulkAction], refresh: Refresh) -> Result<BulkResponse> {
        if actions.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = encode_bulk(&self.index, actions)?;
        let mut url = endpoint(&self.base_url, "_bulk")?;
        url.query_pairs_mut().append_pair(
            "refresh",
            match refresh {
                Refresh::Deferred => "false",
                Refresh::Immediate => "true",
            },
        );

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        check_status(status, "_bulk", || truncate(&text, 512))?;

        decode_bulk(&text)
    }

    async fn refresh(&self) -> Result<()> {
        let url = endpoint(&self.base_url, &format!("{}/_refresh", self.index))?;
        let response = self.client.post(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        check_status(status, "_refresh", || truncate(&text, 512))
    }
}

/// Map a response status to an error. 429 and 5xx are transient.
fn check_status(status: StatusCode, context: &str, body: impl FnOnce() -> String) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{status}: {}", body());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(AppError::network(context, message))
    } else {
        Err(AppError::index(format!("{context} failed with {message}")))
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Encode actions as an NDJSON bulk body.
pub fn encode_bulk(index: &str, actions: &[BulkAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        match action {
            BulkAction::Upsert { id, document } => {
                let header = json!({ "index": { "_index": index, "_id": id } });
                body.push_str(&serde_json::to_string(&header)?);
                body.push('\n');
                body.push_str(&serde_json::to_string(document)?);
                body.push('\n');
            }
        }
    }
    Ok(body)
}

/// Decode a bulk response into per-item outcomes.
pub fn decode_bulk(text: &str) -> Result<BulkResponse> {
    let body: BulkBody = serde_json::from_str(text)?;
    let items = body
        .items
        .into_iter()
        .filter_map(|mut item| {
            let (_, result) = item.drain().next()?;
            Some(BulkItemOutcome {
                id: result.id.unwrap_or_default(),
                error: result.error.map(describe_error),
            })
        })
        .collect();
    Ok(BulkResponse { items })
}

fn describe_error(error: Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (None, Some(reason)) => reason.to_string(),
        _ => error.to_string(),
    }
}

fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "ykiho": { "type": "keyword" },
                "yadmNm": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "addr": { "type": "text" },
                "region": { "type": "keyword" },
                "category": { "type": "keyword" },
                "major": { "type": "keyword" },
                "location": { "type": "geo_point" },
                "nightCare": { "type": "boolean" },
                "weekendCare": { "type": "boolean" },
                "nearby_pharmacies": {
                    "properties": {
                        "distance": { "type": "float" }
                    }
                }
            }
        }
    })
}
