//! Collaborators a session depends on but does not implement.
//!
//! Device provisioning and step persistence live behind REST APIs this crate
//! knows nothing about. Frontends plug in implementations of these traits;
//! tests plug in fakes.

use async_trait::async_trait;
use devdrive_protocol::TaskBlock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartDeviceRequest {
	/// `android` or `ios`.
	pub platform: String,
	pub test_id: Option<String>,
	pub is_simulation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartDeviceResponse {
	pub run_id: Option<String>,
	/// Set when the provisioner accepted the call but refused the request.
	pub error: Option<String>,
}

/// Answer to one worker URL poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerUrlStatus {
	/// `ready` once the worker is reachable; anything else means keep polling.
	pub status: String,
	pub url: Option<String>,
}

impl WorkerUrlStatus {
	pub fn ready(url: impl Into<String>) -> Self {
		Self {
			status: "ready".to_string(),
			url: Some(url.into()),
		}
	}

	pub fn pending() -> Self {
		Self {
			status: "pending".to_string(),
			url: None,
		}
	}

	/// The URL, if the worker is ready and the URL is non-empty.
	pub fn ready_url(&self) -> Option<&str> {
		if self.status != "ready" {
			return None;
		}
		self.url.as_deref().filter(|url| !url.is_empty())
	}
}

/// Starts, locates and releases remote devices.
#[async_trait]
pub trait DeviceProvisioner: Send + Sync {
	async fn start_device(&self, request: &StartDeviceRequest) -> anyhow::Result<StartDeviceResponse>;

	/// Polled until it reports a ready worker URL.
	async fn connection_url(&self, run_id: &str) -> anyhow::Result<WorkerUrlStatus>;

	/// Releases the device. Best effort; failures are only logged.
	async fn cancel_device(&self, run_id: &str) -> anyhow::Result<()>;
}

/// Persists the recorded step list of a test.
#[async_trait]
pub trait StepStore: Send + Sync {
	/// Replaces the stored step list if the stored version still equals
	/// `expected_version`, returning the new version.
	async fn sync_steps(&self, test_id: &str, tasks: &[TaskBlock], expected_version: Option<u64>) -> anyhow::Result<u64>;
}
