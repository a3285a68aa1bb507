//! Reconnectable duplex connection to a worker.
//!
//! [`WorkerConnection`] owns a single slot holding the current
//! [`Generation`]. `connect` and `reconnect` build a fresh generation, start its
//! read and keepalive loops, and install it under the slot's mutex. `close`
//! takes the generation out of the slot, which makes it idempotent until the
//! next reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use devdrive_protocol::{TaskBlock, TaskListMessage};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::generation::{self, Generation};
use crate::transport;

/// Tunables for one worker connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
	/// Upper bound on the WebSocket handshake.
	pub handshake_timeout: Duration,
	/// Interval between application-level pings. Zero disables them.
	pub keepalive_interval: Duration,
	/// Capacity of the control and step-result queues.
	pub queue_capacity: usize,
	/// Capacity of the transport error queue.
	pub error_capacity: usize,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			handshake_timeout: Duration::from_secs(30),
			keepalive_interval: Duration::from_secs(25),
			queue_capacity: 100,
			error_capacity: 10,
		}
	}
}

impl ConnectionConfig {
	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}

	pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
		self.keepalive_interval = interval;
		self
	}

	pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
		self.queue_capacity = capacity;
		self
	}

	pub fn with_error_capacity(mut self, capacity: usize) -> Self {
		self.error_capacity = capacity;
		self
	}
}

/// Connection to one worker, surviving reconnects.
pub struct WorkerConnection {
	config: ConnectionConfig,
	current: Mutex<Option<Arc<Generation>>>,
	next_id: AtomicU64,
}

impl WorkerConnection {
	pub fn new(config: ConnectionConfig) -> Self {
		Self {
			config,
			current: Mutex::new(None),
			next_id: AtomicU64::new(1),
		}
	}

	pub fn config(&self) -> &ConnectionConfig {
		&self.config
	}

	/// Opens the first generation.
	///
	/// Fails with [`Error::AlreadyConnected`] while a generation is installed,
	/// even one whose socket has since died; use [`reconnect`](Self::reconnect)
	/// to replace it.
	pub async fn connect(&self, url: &str) -> Result<Arc<Generation>> {
		if self.current.lock().is_some() {
			return Err(Error::AlreadyConnected);
		}
		let generation = self.open(url).await?;

		let mut slot = self.current.lock();
		if slot.is_some() {
			drop(slot);
			generation.abort();
			return Err(Error::AlreadyConnected);
		}
		*slot = Some(Arc::clone(&generation));
		Ok(generation)
	}

	/// Closes the current generation, if any, and opens a new one.
	///
	/// On failure the slot is left empty, so the next attempt starts clean.
	pub async fn reconnect(&self, url: &str) -> Result<Arc<Generation>> {
		let previous = self.current.lock().take();
		if let Some(previous) = previous {
			previous.close().await;
		}

		let generation = self.open(url).await?;
		let replaced = self.current.lock().replace(Arc::clone(&generation));
		if let Some(stale) = replaced {
			stale.abort();
		}
		Ok(generation)
	}

	/// Closes the current generation. A no-op when nothing is installed.
	pub async fn close(&self) {
		let current = self.current.lock().take();
		if let Some(generation) = current {
			generation.close().await;
			info!(target = "devdrive", generation = generation.id(), "disconnected from worker");
		}
	}

	/// Sends an arbitrary JSON frame on the current generation.
	pub async fn send_raw<T: Serialize>(&self, value: &T) -> Result<()> {
		let generation = self.current_generation().ok_or(Error::NotConnected)?;
		generation.send_json(value).await
	}

	/// Broadcasts the recorded step list so other clients on the worker see it.
	pub async fn send_task_list(&self, tasks: Vec<TaskBlock>) -> Result<()> {
		let count = tasks.len();
		self.send_raw(&TaskListMessage::new(tasks)).await?;
		debug!(target = "devdrive", tasks = count, "broadcast task list");
		Ok(())
	}

	/// True while a generation is installed and its read loop is running.
	pub fn is_connected(&self) -> bool {
		self.current.lock().as_ref().is_some_and(|g| g.is_live())
	}

	pub fn current_generation(&self) -> Option<Arc<Generation>> {
		self.current.lock().clone()
	}

	async fn open(&self, url: &str) -> Result<Arc<Generation>> {
		let url = transport::normalize_url(url)?;
		let (sink, source) = transport::dial(&url, self.config.handshake_timeout).await?;

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (generation, senders) = Generation::new(id, sink, self.config.queue_capacity, self.config.error_capacity);

		let keepalive_errors = senders.errors.clone();
		tokio::spawn(generation::read_loop(Arc::clone(&generation), source, senders));
		tokio::spawn(generation::keepalive_loop(Arc::clone(&generation), self.config.keepalive_interval, keepalive_errors));

		info!(target = "devdrive", generation = id, url = %url, "connected to worker");
		Ok(generation)
	}
}

impl Default for WorkerConnection {
	fn default() -> Self {
		Self::new(ConnectionConfig::default())
	}
}

impl Drop for WorkerConnection {
	fn drop(&mut self) {
		if let Some(generation) = self.current.get_mut().take() {
			generation.abort();
		}
	}
}

impl std::fmt::Debug for WorkerConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkerConnection")
			.field("config", &self.config)
			.field("current", &*self.current.lock())
			.finish()
	}
}
