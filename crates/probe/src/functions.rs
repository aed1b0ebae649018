//! Callable cloud function client

use async_trait::async_trait;
use bobqa_common::config::BackendConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ProbeError, ProbeResult};

/// Bounds the remote function clamps `days` to
pub const MIN_DAYS: u32 = 1;
pub const MAX_DAYS: u32 = 14;

pub fn check_days(days: u32) -> ProbeResult<u32> {
    if (MIN_DAYS..=MAX_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ProbeError::InvalidDays(days))
    }
}

/// Counts the replan function reports. Anything else it returns is kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplanResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub removed: Option<i64>,
    #[serde(default)]
    pub rescheduled: Option<i64>,
    #[serde(default)]
    pub blocked: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Triggers a remote calendar replan
#[async_trait]
pub trait ReplanTrigger: Send + Sync {
    async fn replan(&self, days: u32) -> ProbeResult<ReplanResponse>;
}

pub struct CallableClient {
    http: reqwest::Client,
    url: String,
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct CallableError {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallableEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CallableError>,
}

impl CallableClient {
    pub fn new(url: impl Into<String>, id_token: String) -> ProbeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            id_token,
        })
    }

    pub fn from_config(backend: &BackendConfig) -> ProbeResult<Self> {
        let url = format!("{}/{}", backend.functions_url()?, backend.replan_function);
        Self::new(url, backend.id_token.resolve()?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReplanTrigger for CallableClient {
    async fn replan(&self, days: u32) -> ProbeResult<ReplanResponse> {
        let days = check_days(days)?;
        info!("Calling {} with days={}", self.url, days);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.id_token)
            .json(&json!({ "data": { "days": days } }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Callable responded {} ({} bytes)", status, body.len());
        parse_envelope(status.as_u16(), &body)
    }
}

/// Unwrap a callable protocol response body
fn parse_envelope(status: u16, body: &str) -> ProbeResult<ReplanResponse> {
    let envelope: Option<CallableEnvelope> = serde_json::from_str(body).ok();

    if let Some(error) = envelope.as_ref().and_then(|e| e.error.as_ref()) {
        return Err(ProbeError::Function {
            status: error.status.clone().unwrap_or_else(|| status.to_string()),
            message: error.message.clone().unwrap_or_default(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(ProbeError::Function {
            status: status.to_string(),
            message: body.chars().take(500).collect(),
        });
    }
    match envelope.and_then(|e| e.result) {
        Some(result) => Ok(serde_json::from_value(result)?),
        None => Err(ProbeError::Function {
            status: status.to_string(),
            message: "response carries no result".to_string(),
        }),
    }
}
