use std::time::Duration;

use devdrive_runtime::{ConnectionConfig, ReconnectPolicy};

/// Everything a [`Session`](crate::Session) needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	pub test_id: Option<String>,
	pub test_name: Option<String>,
	/// Stored version of the test's step list, for optimistic locking.
	pub test_version: Option<u64>,
	/// `android` or `ios`.
	pub platform: String,
	/// Stream the device without creating execution records or persisting steps.
	pub is_simulation: bool,
	/// Per-step wait for a terminal result.
	pub step_timeout: Duration,
	/// Total wait for the worker URL to become ready.
	pub connection_timeout: Duration,
	pub url_poll_interval: Duration,
	/// Bound on device cancellation during stop.
	pub cancel_timeout: Duration,
	pub connection: ConnectionConfig,
	pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			test_id: None,
			test_name: None,
			test_version: None,
			platform: "android".to_string(),
			is_simulation: false,
			step_timeout: Duration::from_secs(60),
			connection_timeout: Duration::from_secs(120),
			url_poll_interval: Duration::from_secs(2),
			cancel_timeout: Duration::from_secs(10),
			connection: ConnectionConfig::default(),
			reconnect: ReconnectPolicy::default(),
		}
	}
}

impl SessionConfig {
	pub fn new(platform: impl Into<String>) -> Self {
		Self {
			platform: platform.into(),
			..Self::default()
		}
	}

	pub fn with_test(mut self, id: impl Into<String>, name: Option<String>) -> Self {
		self.test_id = Some(id.into());
		self.test_name = name;
		self
	}

	pub fn with_test_version(mut self, version: u64) -> Self {
		self.test_version = Some(version);
		self
	}

	pub fn with_simulation(mut self, simulation: bool) -> Self {
		self.is_simulation = simulation;
		self
	}

	pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
		self.step_timeout = timeout;
		self
	}

	pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
		self.connection_timeout = timeout;
		self
	}

	pub fn with_url_poll_interval(mut self, interval: Duration) -> Self {
		self.url_poll_interval = interval;
		self
	}

	pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
		self.cancel_timeout = timeout;
		self
	}

	pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
		self.connection = connection;
		self
	}

	pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
		self.reconnect = policy;
		self
	}

	/// True when recorded steps should be written back to the step store.
	pub(crate) fn persists_steps(&self) -> bool {
		!self.is_simulation && self.test_id.is_some()
	}
}
