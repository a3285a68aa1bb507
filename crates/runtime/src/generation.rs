//! One lifetime of one WebSocket.
//!
//! A [`Generation`] bundles everything that belongs to a single underlying
//! connection: its outbound sink, its shutdown token and the receiving ends of
//! its queues. It is built once, never mutated field by field, and replaced
//! as a unit on reconnect. Background tasks hold an `Arc<Generation>` taken at
//! spawn time and never look at the connection's current slot again, so a
//! reconnect cannot hand an old loop a new generation's channels.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use devdrive_protocol::{InboundEvent, Probe};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::router::{Router, Routed};
use crate::transport::{Frame, WsSink};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Consumer side of the control plane: control events plus transport errors.
///
/// Handed out once per generation through [`Generation::take_control`].
#[derive(Debug)]
pub struct ControlStream {
	/// `LOG`, `DEVICE_INIT_STATUS`, `CONNECTION` and anything unrecognised.
	pub events: mpsc::Receiver<InboundEvent>,
	/// Read failures and peer close, reported at most once per generation
	/// unless the queue is full.
	pub errors: mpsc::Receiver<Error>,
}

pub struct Generation {
	id: u64,
	shutdown: CancellationToken,
	outbound: tokio::sync::Mutex<WsSink>,
	live: AtomicBool,
	closed: AtomicBool,
	control: parking_lot::Mutex<Option<ControlStream>>,
	steps: tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>,
}

/// Sending halves, owned by the read loop for the life of the generation.
/// The keepalive loop holds a clone of `errors`; the error queue closes once
/// both loops have returned.
pub(crate) struct GenerationSenders {
	pub(crate) router: Router,
	pub(crate) errors: mpsc::Sender<Error>,
}

impl Generation {
	pub(crate) fn new(id: u64, outbound: WsSink, queue_capacity: usize, error_capacity: usize) -> (Arc<Self>, GenerationSenders) {
		let shutdown = CancellationToken::new();
		let (control_tx, control_rx) = mpsc::channel(queue_capacity.max(1));
		let (step_tx, step_rx) = mpsc::channel(queue_capacity.max(1));
		let (error_tx, error_rx) = mpsc::channel(error_capacity.max(1));

		let generation = Arc::new(Self {
			id,
			shutdown: shutdown.clone(),
			outbound: tokio::sync::Mutex::new(outbound),
			live: AtomicBool::new(true),
			closed: AtomicBool::new(false),
			control: parking_lot::Mutex::new(Some(ControlStream {
				events: control_rx,
				errors: error_rx,
			})),
			steps: tokio::sync::Mutex::new(step_rx),
		});
		let senders = GenerationSenders {
			router: Router::new(control_tx, step_tx, shutdown),
			errors: error_tx,
		};
		(generation, senders)
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	/// Fires when this generation is closed by its owner.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	/// False once the read loop has stopped or the generation was closed.
	pub fn is_live(&self) -> bool {
		self.live.load(Ordering::Acquire)
	}

	/// Takes the control plane. Returns `None` after the first call.
	pub fn take_control(&self) -> Option<ControlStream> {
		self.control.lock().take()
	}

	pub(crate) fn steps(&self) -> &tokio::sync::Mutex<mpsc::Receiver<InboundEvent>> {
		&self.steps
	}

	pub(crate) async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
		let text = serde_json::to_string(value)?;
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::NotConnected);
		}
		self.outbound
			.lock()
			.await
			.send(Message::Text(text))
			.await
			.map_err(|e| Error::Transport(e.to_string()))
	}

	/// Stops both loops and closes the socket. Only the first call does work.
	pub(crate) async fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.shutdown.cancel();
		self.live.store(false, Ordering::Release);
		debug!(target = "devdrive", generation = self.id, "closing connection");

		let frame = Message::Close(Some(CloseFrame {
			code: CloseCode::Normal,
			reason: Cow::Borrowed(""),
		}));
		let closing = async {
			let mut sink = self.outbound.lock().await;
			// the peer may already be gone; nothing to report either way
			let _ = sink.send(frame).await;
			let _ = sink.close().await;
		};
		if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
			debug!(target = "devdrive", generation = self.id, "close frame not flushed in time");
		}
	}

	/// Cancels the loops without touching the socket. Used from `Drop`.
	pub(crate) fn abort(&self) {
		self.closed.store(true, Ordering::Release);
		self.live.store(false, Ordering::Release);
		self.shutdown.cancel();
	}
}

impl std::fmt::Debug for Generation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Generation")
			.field("id", &self.id)
			.field("live", &self.is_live())
			.finish_non_exhaustive()
	}
}

/// Reads frames until the socket ends or the generation shuts down.
///
/// Consumes the senders: returning drops them, which closes both queues and
/// the error queue exactly once.
pub(crate) async fn read_loop<S, E>(generation: Arc<Generation>, mut source: S, senders: GenerationSenders)
where
	S: Stream<Item = std::result::Result<Message, E>> + Unpin,
	E: std::fmt::Display,
{
	let GenerationSenders { router, errors } = senders;
	let shutdown = generation.shutdown_token();
	let report = |err: Error| {
		if shutdown.is_cancelled() {
			return;
		}
		if errors.try_send(err).is_err() {
			warn!(target = "devdrive", generation = generation.id, "error queue full, dropping transport error");
		}
	};

	loop {
		let next = tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			next = source.next() => next,
		};

		let message = match next {
			Some(Ok(message)) => message,
			Some(Err(e)) => {
				debug!(target = "devdrive", generation = generation.id, error = %e, "read failed");
				report(Error::Transport(e.to_string()));
				break;
			}
			None => {
				report(Error::ConnectionLost);
				break;
			}
		};

		let bytes = match Frame::from(message) {
			Frame::Data(bytes) => bytes,
			Frame::Closed => {
				debug!(target = "devdrive", generation = generation.id, "worker closed the connection");
				report(Error::ConnectionLost);
				break;
			}
			Frame::Skip => continue,
		};

		let event = InboundEvent::decode(bytes);
		if let Some(reason) = &event.decode_error {
			debug!(target = "devdrive", generation = generation.id, %reason, raw = %event.raw_text(), "forwarding undecodable frame");
		}

		match router.route(event).await {
			Routed::Delivered(_) => {}
			Routed::Ping(id) => {
				if let Err(e) = generation.send_json(&Probe::pong(id)).await {
					debug!(target = "devdrive", generation = generation.id, error = %e, "failed to answer ping");
				}
			}
			Routed::Abandoned if shutdown.is_cancelled() => break,
			Routed::Abandoned => trace!(target = "devdrive", generation = generation.id, "consumer gone, frame dropped"),
		}
	}

	generation.live.store(false, Ordering::Release);
	debug!(target = "devdrive", generation = generation.id, "read loop stopped");
}

/// Sends an application-level ping every `interval` until shutdown or a
/// send failure. A failed ping is reported on the error queue, so a dead
/// write side triggers recovery even while reads are still pending.
pub(crate) async fn keepalive_loop(generation: Arc<Generation>, interval: Duration, errors: mpsc::Sender<Error>) {
	if interval.is_zero() {
		return;
	}
	let shutdown = generation.shutdown_token();
	let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

	loop {
		tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			_ = ticker.tick() => {
				if let Err(e) = generation.send_json(&Probe::ping_now()).await {
					debug!(target = "devdrive", generation = generation.id, error = %e, "keepalive failed");
					if !shutdown.is_cancelled() && errors.try_send(Error::Transport(format!("ping failed: {e}"))).is_err() {
						warn!(target = "devdrive", generation = generation.id, "error queue full, dropping keepalive error");
					}
					break;
				}
				trace!(target = "devdrive", generation = generation.id, "keepalive sent");
			}
		}
	}
}
