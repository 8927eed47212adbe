//! JSON web API backend
//!
//! Routes, relative to the configured base URL:
//!
//! | Method | Path                          | Body                 |
//! |--------|-------------------------------|----------------------|
//! | POST   | `users/{user}/runs`           | run → `{"runId"}`    |
//! | PUT    | `users/{user}/runs/{run_id}`  | run                  |
//! | GET    | `users/{user}/runs`           | → `{"runs": [...]}`  |
//! | DELETE | `users/{user}/runs/{run_id}`  |                      |
//! | GET    | `users/{user}/settings`       | → settings           |
//! | PUT    | `users/{user}/settings`       | settings             |
//!
//! Runs go out through `prepare_for_submission` + `sanitize_for_upload` and
//! come back through `normalize_incoming`, so the server sees both canonical
//! keys and the legacy aliases.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};

use runlog_common::config::BackendConfig;
use runlog_common::normalize::{normalize_incoming, prepare_for_submission, sanitize_for_upload};
use runlog_common::{Error, Result, RunRecord, RunType, UserSettings};

use super::{RunHistory, SubmissionBackend};

const USER_AGENT: &str = concat!("runlog-bot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResponse {
    #[serde(alias = "id", alias = "run_id")]
    run_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunListResponse {
    #[serde(default, alias = "allRuns")]
    runs: Vec<Map<String, Value>>,
    #[serde(default)]
    last_run: Option<Map<String, Value>>,
    #[serde(default, alias = "runTypeCountsByType")]
    run_type_counts: Option<BTreeMap<String, usize>>,
}

impl RunListResponse {
    fn into_history(self) -> RunHistory {
        let empty = Map::new();
        let runs: Vec<RunRecord> = self.runs.iter().map(|raw| normalize_incoming(raw, &empty)).collect();
        let mut history = RunHistory::from_runs(runs);

        if let Some(raw) = self.last_run {
            history.last_run = Some(normalize_incoming(&raw, &empty));
        }
        if let Some(counts) = self.run_type_counts {
            history.counts_by_type = counts
                .into_iter()
                .filter_map(|(name, count)| RunType::parse(&name).map(|t| (t, count)))
                .collect();
        }
        history
    }
}

/// Client for the run logging web API
pub struct WebApiBackend {
    http_client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl WebApiBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("Invalid backend URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Backend URL {} cannot carry a path", base_url)));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("backend.base_url is required for the web backend".to_string()))?;
        Self::new(base_url, config.api_key.clone(), config.request_timeout())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Backend URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Backend(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        tracing::debug!(operation, status_code = status.as_u16(), "Backend response");

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{}: {}", operation, response.url().path())));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Backend(format!("{} rejected: check the API key ({})", operation, status)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Backend(format!("{} failed with {}: {}", operation, status, body)))
    }

    fn run_body(run: &RunRecord) -> Value {
        Value::Object(sanitize_for_upload(prepare_for_submission(run)))
    }
}

#[async_trait]
impl SubmissionBackend for WebApiBackend {
    async fn insert_run(&self, user_id: &str, run: &RunRecord) -> Result<String> {
        let url = self.endpoint(&["users", user_id, "runs"])?;
        let response = self
            .send("insert_run", self.request(Method::POST, url).json(&Self::run_body(run)))
            .await?;
        let inserted: InsertResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("insert_run returned an unreadable body: {}", e)))?;
        tracing::info!(user_id = %user_id, run_id = %inserted.run_id, "Run inserted");
        Ok(inserted.run_id)
    }

    async fn update_run(&self, user_id: &str, run_id: &str, run: &RunRecord) -> Result<()> {
        let url = self.endpoint(&["users", user_id, "runs", run_id])?;
        self.send("update_run", self.request(Method::PUT, url).json(&Self::run_body(run)))
            .await?;
        tracing::info!(user_id = %user_id, run_id = %run_id, "Run updated");
        Ok(())
    }

    async fn list_runs(&self, user_id: &str) -> Result<RunHistory> {
        let url = self.endpoint(&["users", user_id, "runs"])?;
        let response = match self.send("list_runs", self.request(Method::GET, url)).await {
            Ok(response) => response,
            Err(Error::NotFound(_)) => return Ok(RunHistory::default()),
            Err(e) => return Err(e),
        };
        let list: RunListResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("list_runs returned an unreadable body: {}", e)))?;
        Ok(list.into_history())
    }

    async fn delete_run(&self, user_id: &str, run_id: &str) -> Result<()> {
        let url = self.endpoint(&["users", user_id, "runs", run_id])?;
        self.send("delete_run", self.request(Method::DELETE, url)).await?;
        tracing::info!(user_id = %user_id, run_id = %run_id, "Run deleted");
        Ok(())
    }

    async fn get_user_settings(&self, user_id: &str) -> Result<UserSettings> {
        let url = self.endpoint(&["users", user_id, "settings"])?;
        let response = match self.send("get_user_settings", self.request(Method::GET, url)).await {
            Ok(response) => response,
            Err(Error::NotFound(_)) => return Ok(UserSettings::default()),
            Err(e) => return Err(e),
        };
        response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("get_user_settings returned an unreadable body: {}", e)))
    }

    async fn save_user_settings(&self, user_id: &str, settings: &UserSettings) -> Result<()> {
        let url = self.endpoint(&["users", user_id, "settings"])?;
        self.send("save_user_settings", self.request(Method::PUT, url).json(settings))
            .await?;
        Ok(())
    }
}
