//! HTTP persistence of recorded steps.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use devdrive::{StepStore, TaskBlock, async_trait};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ApiSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes a test's step list through `PUT /api/v1/tests/update/{id}`.
#[derive(Debug, Clone)]
pub struct HttpStepStore {
	client: reqwest::Client,
	base: Url,
	api_key: String,
}

#[derive(Serialize)]
struct UpdateTestRequest<'a> {
	tasks: &'a [TaskBlock],
	#[serde(skip_serializing_if = "Option::is_none")]
	expected_version: Option<u64>,
}

#[derive(Deserialize)]
struct UpdateTestResponse {
	version: u64,
}

/// Error bodies vary by endpoint; take whichever field is present.
#[derive(Deserialize, Default)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	detail: Option<String>,
}

impl HttpStepStore {
	pub fn new(settings: &ApiSettings) -> Result<Self> {
		let base = Url::parse(&settings.api_url).with_context(|| format!("invalid API URL '{}'", settings.api_url))?;
		let client = reqwest::Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.user_agent(concat!("devdrive-cli/", env!("CARGO_PKG_VERSION")))
			.build()
			.context("failed to create HTTP client")?;
		Ok(Self {
			client,
			base,
			api_key: settings.api_key.clone(),
		})
	}

	fn update_url(&self, test_id: &str) -> Result<Url> {
		let mut url = self.base.clone();
		url.path_segments_mut()
			.map_err(|()| anyhow::anyhow!("API URL cannot be a base: {}", self.base))?
			.pop_if_empty()
			.extend(["api", "v1", "tests", "update", test_id]);
		Ok(url)
	}
}

#[async_trait]
impl StepStore for HttpStepStore {
	async fn sync_steps(&self, test_id: &str, tasks: &[TaskBlock], expected_version: Option<u64>) -> Result<u64> {
		let url = self.update_url(test_id)?;
		debug!(target = "devdrive", %url, tasks = tasks.len(), ?expected_version, "updating test");

		let response = self
			.client
			.put(url)
			.bearer_auth(&self.api_key)
			.json(&UpdateTestRequest { tasks, expected_version })
			.send()
			.await
			.context("update request failed")?;

		let status = response.status();
		if !status.is_success() {
			let text = response.text().await.unwrap_or_default();
			let message = error_message(&text);
			if status == StatusCode::CONFLICT {
				bail!("test was modified elsewhere (version conflict): {message}");
			}
			bail!("update failed with {status}: {message}");
		}

		let body: UpdateTestResponse = response.json().await.context("invalid update response")?;
		Ok(body.version)
	}
}

fn error_message(body: &str) -> String {
	let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
	let message = parsed.error.or(parsed.message).filter(|m| !m.is_empty());
	match (message, parsed.detail.filter(|d| !d.is_empty())) {
		(Some(m), Some(d)) => format!("{m} ({d})"),
		(Some(m), None) => m,
		(None, Some(d)) => d,
		(None, None) if body.chars().count() > 200 => format!("{}...", body.chars().take(200).collect::<String>()),
		(None, None) => body.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store(api_url: &str) -> HttpStepStore {
		HttpStepStore::new(&ApiSettings {
			api_key: "k".into(),
			api_url: api_url.into(),
		})
		.unwrap()
	}

	#[test]
	fn update_url_joins_path() {
		assert_eq!(
			store("https://api.example.com").update_url("t-1").unwrap().as_str(),
			"https://api.example.com/api/v1/tests/update/t-1"
		);
		assert_eq!(
			store("https://api.example.com/").update_url("t 2").unwrap().as_str(),
			"https://api.example.com/api/v1/tests/update/t%202"
		);
	}

	#[test]
	fn error_message_prefers_structured_fields() {
		assert_eq!(error_message(r#"{"error":"forbidden"}"#), "forbidden");
		assert_eq!(error_message(r#"{"message":"bad","detail":"tasks[0]"}"#), "bad (tasks[0])");
		assert_eq!(error_message("plain text"), "plain text");
		assert!(error_message(&"x".repeat(300)).ends_with("..."));
	}

	#[test]
	fn response_needs_only_version() {
		let body: UpdateTestResponse = serde_json::from_str(r#"{"id":"t-1","version":3,"name":"checkout"}"#).unwrap();
		assert_eq!(body.version, 3);
		assert!(serde_json::from_str::<UpdateTestResponse>(r#"{"id":"t-1"}"#).is_err());
	}

	#[test]
	fn request_omits_missing_version() {
		let body = serde_json::to_value(UpdateTestRequest {
			tasks: &[],
			expected_version: None,
		})
		.unwrap();
		assert_eq!(body, serde_json::json!({"tasks": []}));
	}
}
