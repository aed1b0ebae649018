//! Firestore REST reads

use async_trait::async_trait;
use bobqa_common::config::BackendConfig;
use bobqa_common::replan::{CalendarBlock, ItemKind, Sprint, WorkItem, WorkRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};
use crate::store::{BlockWindow, WorkStore};

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";
const EMULATOR_ENV: &str = "FIRESTORE_EMULATOR_HOST";

/// Store that issues structured queries against the Firestore REST API
pub struct FirestoreStore {
    http: reqwest::Client,
    documents_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreStore {
    pub fn new(host: &str, project_id: &str, token: String) -> ProbeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                host.trim_end_matches('/'),
                project_id
            ),
            token,
        })
    }

    /// Production API, or the emulator when `FIRESTORE_EMULATOR_HOST` is set
    pub fn from_config(backend: &BackendConfig) -> ProbeResult<Self> {
        if backend.project_id.is_empty() {
            return Err(bobqa_common::Error::InvalidConfig("backend.project_id is not set".to_string()).into());
        }
        match std::env::var(EMULATOR_ENV) {
            Ok(host) if !host.is_empty() => {
                debug!("Using Firestore emulator at {}", host);
                // The emulator accepts this token as an admin credential
                Self::new(&format!("http://{}", host), &backend.project_id, "owner".to_string())
            }
            _ => Self::new(PRODUCTION_HOST, &backend.project_id, backend.firestore_token.resolve()?),
        }
    }

    async fn run_query<T>(&self, collection: &str, filters: Vec<Value>) -> ProbeResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let query_err = |reason: String| ProbeError::Query {
            collection: collection.to_string(),
            reason,
        };

        let body = structured_query(collection, filters);
        let response = self
            .http
            .post(format!("{}:runQuery", self.documents_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(query_err(format!("{}: {}", status, text)));
        }

        let rows: Vec<QueryRow> = response.json().await?;
        let mut records = Vec::with_capacity(rows.len());
        for document in rows.into_iter().filter_map(|r| r.document) {
            let value = document_to_json(&document);
            let record = serde_json::from_value(value)
                .map_err(|e| query_err(format!("document {}: {}", document.name, e)))?;
            records.push(record);
        }
        debug!("{}: {} documents", collection, records.len());
        Ok(records)
    }

    async fn items(&self, collection: &str, kind: ItemKind, owner: &str) -> ProbeResult<Vec<WorkItem>> {
        let records: Vec<WorkRecord> = self.run_query(collection, vec![owner_filter(owner)]).await?;
        Ok(records
            .into_iter()
            .map(|r| WorkItem::from_record(kind, r))
            .collect())
    }
}

#[async_trait]
impl WorkStore for FirestoreStore {
    async fn sprints(&self, owner: &str) -> ProbeResult<Vec<Sprint>> {
        self.run_query("sprints", vec![owner_filter(owner)]).await
    }

    async fn stories(&self, owner: &str) -> ProbeResult<Vec<WorkItem>> {
        self.items("stories", ItemKind::Story, owner).await
    }

    async fn tasks(&self, owner: &str) -> ProbeResult<Vec<WorkItem>> {
        self.items("tasks", ItemKind::Task, owner).await
    }

    async fn calendar_blocks(&self, owner: &str, window: BlockWindow) -> ProbeResult<Vec<CalendarBlock>> {
        let filters = vec![
            owner_filter(owner),
            field_filter("start", "GREATER_THAN_OR_EQUAL", json!({ "integerValue": window.start_ms.to_string() })),
            field_filter("start", "LESS_THAN", json!({ "integerValue": window.end_ms.to_string() })),
        ];
        self.run_query("calendar_blocks", filters).await
    }
}

fn owner_filter(owner: &str) -> Value {
    field_filter("ownerUid", "EQUAL", json!({ "stringValue": owner }))
}

fn field_filter(path: &str, op: &str, value: Value) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": path },
            "op": op,
            "value": value,
        }
    })
}

fn structured_query(collection: &str, mut filters: Vec<Value>) -> Value {
    let mut query = json!({ "from": [{ "collectionId": collection }] });
    let filter = match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(json!({ "compositeFilter": { "op": "AND", "filters": filters } })),
    };
    if let Some(filter) = filter {
        query["where"] = filter;
    }
    json!({ "structuredQuery": query })
}

/// Plain JSON object for a document, with `id` set from the last segment
/// of its resource name
fn document_to_json(document: &Document) -> Value {
    let mut object = decode_fields(&document.fields);
    let id = document.name.rsplit('/').next().unwrap_or_default();
    object.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(object)
}

fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Firestore typed value to plain JSON
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        // 64-bit integers arrive as strings
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "doubleValue" | "booleanValue" | "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
        "nullValue" => Value::Null,
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => Value::Object(decode_fields(fields)),
            None => Value::Object(Map::new()),
        },
        "arrayValue" => match inner.get("values").and_then(Value::as_array) {
            Some(values) => Value::Array(values.iter().map(decode_value).collect()),
            None => Value::Array(Vec::new()),
        },
        _ => Value::Null,
    }
}
