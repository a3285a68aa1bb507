#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use devdrive::{
	ConnectionConfig, DeviceProvisioner, ReconnectPolicy, SessionConfig, StartDeviceRequest, StartDeviceResponse, StepStore,
	TaskBlock, WorkerUrlStatus, async_trait,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Local stand-in for a device worker.
pub struct MockWorker {
	pub addr: SocketAddr,
	sockets: mpsc::UnboundedReceiver<ServerSocket>,
	refuse: Arc<AtomicUsize>,
}

impl MockWorker {
	pub async fn spawn() -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let (tx, sockets) = mpsc::unbounded_channel();
		let refuse = Arc::new(AtomicUsize::new(0));

		let refusing = Arc::clone(&refuse);
		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				// drop the TCP stream before the upgrade to fail the handshake
				if refusing
					.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
					.is_ok()
				{
					drop(stream);
					continue;
				}
				if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
					if tx.send(ws).is_err() {
						break;
					}
				}
			}
		});

		Self { addr, sockets, refuse }
	}

	pub fn url(&self) -> String {
		format!("ws://{}", self.addr)
	}

	/// Fail the next `n` handshakes.
	pub fn refuse_next(&self, n: usize) {
		self.refuse.store(n, Ordering::SeqCst);
	}

	pub async fn accept(&mut self) -> ServerSocket {
		tokio::time::timeout(Duration::from_secs(5), self.sockets.recv())
			.await
			.expect("no client connected in time")
			.expect("listener stopped")
	}

	pub fn try_accept(&mut self) -> Option<ServerSocket> {
		self.sockets.try_recv().ok()
	}
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
	ws.send(Message::Text(value.to_string())).await.unwrap();
}

pub async fn send_device_ready(ws: &mut ServerSocket) {
	send_json(ws, serde_json::json!({"event_type": "DEVICE_INIT_STATUS", "status": "initialized"})).await;
}

/// Next JSON text frame from the client, skipping everything else.
pub async fn next_json(ws: &mut ServerSocket) -> Value {
	loop {
		let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
			.await
			.expect("no frame in time")
			.expect("socket ended")
			.expect("read failed");
		if let Message::Text(text) = message {
			return serde_json::from_str(&text).unwrap();
		}
	}
}

/// Next frame with the given `event_type`.
pub async fn next_event(ws: &mut ServerSocket, event_type: &str) -> Value {
	loop {
		let frame = next_json(ws).await;
		if frame["event_type"] == event_type {
			return frame;
		}
	}
}

/// Waits for a `STEP_EXECUTION` request and returns its step id.
pub async fn next_step_id(ws: &mut ServerSocket) -> String {
	let request = next_event(ws, "STEP_EXECUTION").await;
	request["step_details"]["steps"][0]["id"].as_str().unwrap().to_string()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition not reached in time");
}

/// Millisecond-scale timings so tests exercise the real state machine quickly.
pub fn fast_config() -> SessionConfig {
	SessionConfig::new("android")
		.with_test("test-1", Some("Login flow".into()))
		.with_step_timeout(Duration::from_secs(2))
		.with_connection_timeout(Duration::from_secs(2))
		.with_url_poll_interval(Duration::from_millis(5))
		.with_cancel_timeout(Duration::from_secs(1))
		.with_connection(
			ConnectionConfig::default()
				.with_handshake_timeout(Duration::from_secs(2))
				.with_keepalive_interval(Duration::ZERO),
		)
		.with_reconnect(
			ReconnectPolicy::default()
				.with_base_delay(Duration::from_millis(5))
				.with_max_delay(Duration::from_millis(20)),
		)
}

pub struct FakeProvisioner {
	pub url: String,
	pub run_id: Option<String>,
	pub start_error: Option<String>,
	/// Polls answered with `pending` before the URL is reported.
	pub pending_polls: AtomicUsize,
	pub polls: AtomicUsize,
	pub starts: AtomicUsize,
	pub cancels: AtomicUsize,
}

impl FakeProvisioner {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			run_id: Some("run-1".into()),
			start_error: None,
			pending_polls: AtomicUsize::new(0),
			polls: AtomicUsize::new(0),
			starts: AtomicUsize::new(0),
			cancels: AtomicUsize::new(0),
		}
	}

	pub fn pending_for(self, polls: usize) -> Self {
		self.pending_polls.store(polls, Ordering::SeqCst);
		self
	}

	pub fn cancels(&self) -> usize {
		self.cancels.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl DeviceProvisioner for FakeProvisioner {
	async fn start_device(&self, _request: &StartDeviceRequest) -> anyhow::Result<StartDeviceResponse> {
		self.starts.fetch_add(1, Ordering::SeqCst);
		Ok(StartDeviceResponse {
			run_id: self.run_id.clone(),
			error: self.start_error.clone(),
		})
	}

	async fn connection_url(&self, _run_id: &str) -> anyhow::Result<WorkerUrlStatus> {
		self.polls.fetch_add(1, Ordering::SeqCst);
		let still_pending = self
			.pending_polls
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if still_pending {
			return Ok(WorkerUrlStatus::pending());
		}
		Ok(WorkerUrlStatus::ready(self.url.clone()))
	}

	async fn cancel_device(&self, _run_id: &str) -> anyhow::Result<()> {
		self.cancels.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncCall {
	pub test_id: String,
	pub tasks: Vec<TaskBlock>,
	pub expected_version: Option<u64>,
}

#[derive(Default)]
pub struct FakeStore {
	pub calls: parking_lot::Mutex<Vec<SyncCall>>,
}

impl FakeStore {
	pub fn calls(&self) -> Vec<SyncCall> {
		self.calls.lock().clone()
	}
}

#[async_trait]
impl StepStore for FakeStore {
	async fn sync_steps(&self, test_id: &str, tasks: &[TaskBlock], expected_version: Option<u64>) -> anyhow::Result<u64> {
		self.calls.lock().push(SyncCall {
			test_id: test_id.to_string(),
			tasks: tasks.to_vec(),
			expected_version,
		});
		Ok(expected_version.unwrap_or(0) + 1)
	}
}
