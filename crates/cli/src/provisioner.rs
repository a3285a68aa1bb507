//! Attaching to a device that something else already provisioned.

use anyhow::Result;
use devdrive::{DeviceProvisioner, StartDeviceRequest, StartDeviceResponse, WorkerUrlStatus, async_trait};
use tracing::debug;

/// Yields a fixed run id and worker URL.
///
/// The device's lifetime belongs to whoever provisioned it, so cancelling is a
/// no-op.
#[derive(Debug, Clone)]
pub struct StaticProvisioner {
	run_id: String,
	worker_url: String,
}

impl StaticProvisioner {
	pub fn new(worker_url: impl Into<String>, run_id: Option<String>) -> Self {
		Self {
			run_id: run_id.unwrap_or_else(|| "attached".to_string()),
			worker_url: worker_url.into(),
		}
	}
}

#[async_trait]
impl DeviceProvisioner for StaticProvisioner {
	async fn start_device(&self, request: &StartDeviceRequest) -> Result<StartDeviceResponse> {
		debug!(target = "devdrive", run_id = %self.run_id, platform = %request.platform, "attaching to provisioned device");
		Ok(StartDeviceResponse {
			run_id: Some(self.run_id.clone()),
			error: None,
		})
	}

	async fn connection_url(&self, _run_id: &str) -> Result<WorkerUrlStatus> {
		Ok(WorkerUrlStatus::ready(self.worker_url.clone()))
	}

	async fn cancel_device(&self, run_id: &str) -> Result<()> {
		debug!(target = "devdrive", run_id, "leaving attached device running");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reports_worker_immediately() {
		let provisioner = StaticProvisioner::new("wss://worker/ws", None);
		let request = StartDeviceRequest {
			platform: "android".into(),
			test_id: None,
			is_simulation: true,
		};

		let started = provisioner.start_device(&request).await.unwrap();
		assert_eq!(started.run_id.as_deref(), Some("attached"));

		let status = provisioner.connection_url("attached").await.unwrap();
		assert_eq!(status.ready_url(), Some("wss://worker/ws"));
		provisioner.cancel_device("attached").await.unwrap();
	}
}
