//! Bounded exponential-backoff reconnection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::WorkerConnection;
use crate::error::{Error, Result};

/// Retry budget and delays for reconnecting after transport loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
	/// Delay before the first attempt.
	pub base_delay: Duration,
	/// Ceiling for any single delay.
	pub max_delay: Duration,
	pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			max_attempts: 5,
		}
	}
}

impl ReconnectPolicy {
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;
		self
	}

	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;
		self
	}

	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;
		self
	}

	/// Delay before 0-based attempt `attempt`: `base * 2^attempt`, capped.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		2u32.checked_pow(attempt)
			.and_then(|factor| self.base_delay.checked_mul(factor))
			.map_or(self.max_delay, |delay| delay.min(self.max_delay))
	}
}

/// Replaces the connection's generation, retrying with backoff.
///
/// Sleeps before every attempt, including the first. Returns the number of
/// attempts used on success. `on_failed_attempt` sees the 1-based attempt
/// number and its error.
pub async fn reconnect_with_backoff<F>(
	connection: &WorkerConnection,
	url: &str,
	policy: &ReconnectPolicy,
	cancel: &CancellationToken,
	mut on_failed_attempt: F,
) -> Result<u32>
where
	F: FnMut(u32, &Error),
{
	let mut last = None;

	for attempt in 0..policy.max_attempts {
		let delay = policy.delay_for(attempt);
		info!(
			target = "devdrive",
			attempt = attempt + 1,
			max_attempts = policy.max_attempts,
			delay_ms = delay.as_millis() as u64,
			"reconnecting to worker"
		);

		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			result = async {
				tokio::time::sleep(delay).await;
				connection.reconnect(url).await
			} => result,
		};

		match result {
			Ok(generation) => {
				info!(target = "devdrive", attempt = attempt + 1, generation = generation.id(), "reconnected to worker");
				return Ok(attempt + 1);
			}
			Err(e) => {
				warn!(target = "devdrive", attempt = attempt + 1, error = %e, "reconnect attempt failed");
				on_failed_attempt(attempt + 1, &e);
				last = Some(e);
			}
		}
	}

	Err(Error::ReconnectExhausted {
		attempts: policy.max_attempts,
		last: Box::new(last.unwrap_or(Error::NotConnected)),
	})
}
