//! Demultiplexes inbound frames onto the control and step-result queues.
//!
//! A single WebSocket has a single reader. Step waiters and the session event
//! loop both consume from it, so the read loop splits traffic by
//! `event_type` and each consumer owns exactly one queue.

use devdrive_protocol::{EventKind, InboundEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Destination queue for an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
	/// `STEP_EXECUTION` and `ERROR`.
	StepResult,
	/// Everything else, including unknown and undecodable frames.
	Control,
}

/// Chooses the queue for a frame from its `event_type` alone.
pub fn classify(event: &InboundEvent) -> Route {
	match event.kind() {
		EventKind::StepExecution | EventKind::Error => Route::StepResult,
		_ => Route::Control,
	}
}

/// Result of offering one frame to the router.
#[derive(Debug, PartialEq)]
pub(crate) enum Routed {
	Delivered(Route),
	/// Keepalive probe; the caller answers it with a pong carrying this id.
	Ping(String),
	/// Shutdown fired or the consumer went away before the frame fit.
	Abandoned,
}

/// Sending half of one generation's queues.
///
/// Owned by the read loop; dropping it closes both queues.
pub(crate) struct Router {
	control_tx: mpsc::Sender<InboundEvent>,
	step_tx: mpsc::Sender<InboundEvent>,
	shutdown: CancellationToken,
}

impl Router {
	pub(crate) fn new(
		control_tx: mpsc::Sender<InboundEvent>,
		step_tx: mpsc::Sender<InboundEvent>,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			control_tx,
			step_tx,
			shutdown,
		}
	}

	/// Enqueues `event`, waiting for space unless shutdown fires first.
	pub(crate) async fn route(&self, event: InboundEvent) -> Routed {
		if event.is_ping() {
			return Routed::Ping(event.id.clone().unwrap_or_default());
		}

		let route = classify(&event);
		let tx = match route {
			Route::StepResult => &self.step_tx,
			Route::Control => &self.control_tx,
		};
		trace!(target = "devdrive", event_type = %event.event_type, ?route, "routing frame");

		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => Routed::Abandoned,
			sent = tx.send(event) => match sent {
				Ok(()) => Routed::Delivered(route),
				Err(_) => Routed::Abandoned,
			},
		}
	}
}
