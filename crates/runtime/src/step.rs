//! Correlated request/response over the step-result queue.

use std::time::Duration;

use devdrive_protocol::{EventKind, InboundEvent, RemoteError, StepCommand, StepExecutionMessage, StepUpdate};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::connection::WorkerConnection;
use crate::error::{Error, Result};

/// Callback for non-terminal updates of the step being awaited.
pub type ProgressFn = dyn Fn(&StepUpdate) + Send + Sync;

/// Parameters for one step execution.
pub struct StepRequest<'a> {
	pub command: StepCommand,
	pub test_id: Option<String>,
	pub is_simulation: bool,
	pub timeout: Duration,
	pub cancel: &'a CancellationToken,
	pub progress: Option<&'a ProgressFn>,
}

impl WorkerConnection {
	/// Sends `request.command` and waits for its terminal update.
	///
	/// Holds the generation's step-result receiver for the whole call, so a
	/// second concurrent call waits until the first resolves.
	pub async fn execute_step(&self, request: StepRequest<'_>) -> Result<StepUpdate> {
		let generation = self.current_generation().ok_or(Error::NotConnected)?;
		if !generation.is_live() {
			return Err(Error::NotConnected);
		}

		let mut steps = tokio::select! {
			biased;
			_ = request.cancel.cancelled() => return Err(Error::Cancelled),
			guard = generation.steps().lock() => guard,
		};

		let step_id = request.command.id.clone();
		let message = StepExecutionMessage::execute(request.command, request.test_id, request.is_simulation);
		generation.send_json(&message).await?;
		info!(target = "devdrive", generation = generation.id(), step_id = %step_id, "step sent");

		await_step_result(&mut steps, &step_id, request.timeout, request.cancel, request.progress).await
	}
}

/// Waits on `rx` for the terminal update of `step_id`.
///
/// Updates for other ids are skipped. Non-terminal updates for `step_id` go to
/// `progress` in arrival order. An `ERROR` event fails the wait regardless of
/// id, since the worker uses it to reject the whole session.
pub async fn await_step_result(
	rx: &mut mpsc::Receiver<InboundEvent>,
	step_id: &str,
	timeout: Duration,
	cancel: &CancellationToken,
	progress: Option<&ProgressFn>,
) -> Result<StepUpdate> {
	let deadline = Instant::now() + timeout;

	loop {
		let event = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			_ = tokio::time::sleep_until(deadline) => {
				return Err(Error::StepTimeout {
					step_id: step_id.to_string(),
					timeout,
				});
			}
			event = rx.recv() => event.ok_or(Error::ConnectionLost)?,
		};

		match event.kind() {
			EventKind::Error => {
				let remote: RemoteError = event.parse_as().unwrap_or_default();
				let message = if remote.message.is_empty() {
					event.raw_text().into_owned()
				} else {
					remote.message
				};
				return Err(Error::Remote { message });
			}
			EventKind::StepExecution => {}
			_ => continue,
		}

		let update: StepUpdate = match event.parse_as() {
			Ok(update) => update,
			Err(e) => {
				debug!(target = "devdrive", error = %e, raw = %event.raw_text(), "skipping malformed step update");
				continue;
			}
		};

		if update.step_id != step_id {
			trace!(target = "devdrive", expected = step_id, got = %update.step_id, "ignoring update for another step");
			continue;
		}

		if update.is_terminal() {
			debug!(target = "devdrive", step_id, status = %update.status, "step finished");
			return Ok(update);
		}

		if let Some(progress) = progress {
			progress(&update);
		}
	}
}
