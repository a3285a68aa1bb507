//! Interactive device session.
//!
//! A [`Session`] provisions a device, connects to its worker and then accepts
//! one step at a time. Control-plane traffic (worker logs, device init status)
//! is consumed by a background event loop that also owns recovery: when the
//! connection drops it reconnects with backoff and resumes on the new
//! generation, or moves the session to [`SessionState::Error`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use devdrive_protocol::{DeviceInitStatus, EventKind, InboundEvent, StepCommand, StepUpdate};
use devdrive_runtime::{ControlStream, StepRequest, WorkerConnection};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::provision::{DeviceProvisioner, StartDeviceRequest, StepStore};
use crate::record::{StepLog, StepRecord};
use crate::state::SessionState;
use crate::step_kind::StepKind;

type StateObserver = Arc<dyn Fn(SessionState) + Send + Sync>;
type StepObserver = Arc<dyn Fn(&StepRecord) + Send + Sync>;
type ProgressObserver = Arc<dyn Fn(&StepUpdate) + Send + Sync>;
type LogObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Observers {
	state: Option<StateObserver>,
	step: Option<StepObserver>,
	progress: Option<ProgressObserver>,
	log: Option<LogObserver>,
}

struct Shared {
	state: SessionState,
	run_id: Option<String>,
	worker_url: Option<String>,
	steps: StepLog,
	test_version: Option<u64>,
	/// Claimed by the first `start` call.
	started: bool,
	event_loop: Option<JoinHandle<()>>,
	observers: Observers,
}

struct Inner {
	config: SessionConfig,
	provisioner: Arc<dyn DeviceProvisioner>,
	store: Option<Arc<dyn StepStore>>,
	connection: WorkerConnection,
	shared: Mutex<Shared>,
	device_ready: AtomicBool,
	stopped: AtomicBool,
	cancel: CancellationToken,
}

/// One interactive session against one remote device.
pub struct Session {
	inner: Arc<Inner>,
}

impl Session {
	pub fn new(config: SessionConfig, provisioner: Arc<dyn DeviceProvisioner>, store: Option<Arc<dyn StepStore>>) -> Self {
		let connection = WorkerConnection::new(config.connection.clone());
		let shared = Shared {
			state: SessionState::Initializing,
			run_id: None,
			worker_url: None,
			steps: StepLog::default(),
			test_version: config.test_version,
			started: false,
			event_loop: None,
			observers: Observers::default(),
		};
		Self {
			inner: Arc::new(Inner {
				config,
				provisioner,
				store,
				connection,
				shared: Mutex::new(shared),
				device_ready: AtomicBool::new(false),
				stopped: AtomicBool::new(false),
				cancel: CancellationToken::new(),
			}),
		}
	}

	pub fn on_state_change(&self, f: impl Fn(SessionState) + Send + Sync + 'static) {
		self.inner.shared.lock().observers.state = Some(Arc::new(f));
	}

	pub fn on_step_result(&self, f: impl Fn(&StepRecord) + Send + Sync + 'static) {
		self.inner.shared.lock().observers.step = Some(Arc::new(f));
	}

	/// Non-terminal updates of the step currently executing.
	pub fn on_step_progress(&self, f: impl Fn(&StepUpdate) + Send + Sync + 'static) {
		self.inner.shared.lock().observers.progress = Some(Arc::new(f));
	}

	/// Worker logs and session notices meant for the operator.
	pub fn on_log(&self, f: impl Fn(&str) + Send + Sync + 'static) {
		self.inner.shared.lock().observers.log = Some(Arc::new(f));
	}

	pub fn state(&self) -> SessionState {
		self.inner.state()
	}

	pub fn is_device_ready(&self) -> bool {
		self.inner.device_ready.load(Ordering::Acquire)
	}

	pub fn steps(&self) -> Vec<StepRecord> {
		self.inner.shared.lock().steps.records().to_vec()
	}

	pub fn run_id(&self) -> Option<String> {
		self.inner.shared.lock().run_id.clone()
	}

	pub fn worker_url(&self) -> Option<String> {
		self.inner.shared.lock().worker_url.clone()
	}

	pub fn test_id(&self) -> Option<&str> {
		self.inner.config.test_id.as_deref()
	}

	pub fn test_name(&self) -> Option<&str> {
		self.inner.config.test_name.as_deref()
	}

	pub fn platform(&self) -> &str {
		&self.inner.config.platform
	}

	pub fn is_simulation(&self) -> bool {
		self.inner.config.is_simulation
	}

	/// Provisions the device, waits for its worker and connects.
	///
	/// Only the first call does anything; later or concurrent calls are
	/// rejected with [`SessionError::NotReady`]. Any failure leaves the session
	/// in [`SessionState::Error`].
	pub async fn start(&self) -> Result<()> {
		let inner = &self.inner;
		{
			let mut shared = inner.shared.lock();
			if shared.state != SessionState::Initializing || shared.started {
				return Err(SessionError::NotReady { state: shared.state });
			}
			shared.started = true;
		}
		inner.notify_state(SessionState::Initializing);

		match inner.provision_and_connect().await {
			Ok(()) => {
				let handle = tokio::spawn(run_event_loop(Arc::clone(inner)));
				inner.shared.lock().event_loop = Some(handle);
				inner.set_state(SessionState::Ready);
				Ok(())
			}
			Err(e) => {
				warn!(target = "devdrive", error = %e, "session start failed");
				inner.set_state(SessionState::Error);
				Err(e)
			}
		}
	}

	/// Runs one step and records its result.
	///
	/// Only accepted in [`SessionState::Ready`] with the device initialized.
	/// The session is back in `Ready` when this returns, whatever the outcome,
	/// and also if the returned future is dropped midway.
	pub async fn execute_step(&self, kind: StepKind, instruction: &str) -> Result<StepRecord> {
		let inner = &self.inner;

		let (index, observer) = {
			let mut shared = inner.shared.lock();
			if shared.state != SessionState::Ready {
				return Err(SessionError::NotReady { state: shared.state });
			}
			if !inner.device_ready.load(Ordering::Acquire) {
				return Err(SessionError::DeviceNotReady);
			}
			shared.state = SessionState::Executing;
			(shared.steps.next_index(), shared.observers.state.clone())
		};
		if let Some(observer) = observer {
			observer(SessionState::Executing);
		}
		let guard = ExecutingGuard { inner: inner.as_ref() };

		let step_id = format!("step-{index}-{}", unix_nanos());
		let command = StepCommand {
			id: step_id.clone(),
			block_type: kind.block_type().to_string(),
			step_type: kind.step_type().to_string(),
			step_description: instruction.to_string(),
			index,
			timeout: u32::try_from(inner.config.step_timeout.as_secs()).unwrap_or(u32::MAX),
		};
		let progress = inner.shared.lock().observers.progress.clone();

		info!(target = "devdrive", step_id = %step_id, step_type = kind.step_type(), "executing step");
		let update = inner
			.connection
			.execute_step(StepRequest {
				command,
				test_id: inner.config.test_id.clone(),
				is_simulation: inner.config.is_simulation,
				timeout: inner.config.step_timeout,
				cancel: &inner.cancel,
				progress: progress.as_deref(),
			})
			.await?;

		let record = StepRecord::from_update(step_id, kind, instruction.to_string(), index, &update);
		let observer = {
			let mut shared = inner.shared.lock();
			shared.steps.push(record.clone());
			shared.observers.step.clone()
		};
		drop(guard);

		if let Some(observer) = observer {
			observer(&record);
		}
		inner.sync_steps().await;
		inner.broadcast_tasks().await;

		Ok(record)
	}

	/// Removes the most recent step and re-syncs the list.
	pub async fn undo_last_step(&self) -> Result<StepRecord> {
		let removed = self.inner.shared.lock().steps.pop_last().ok_or(SessionError::NoSteps)?;
		info!(target = "devdrive", step_id = %removed.id, "undid step");

		self.inner.sync_steps().await;
		self.inner.broadcast_tasks().await;
		Ok(removed)
	}

	/// Shuts the session down and releases the device. Safe to call repeatedly.
	pub async fn stop(&self) {
		let inner = &self.inner;
		if inner.stopped.swap(true, Ordering::AcqRel) {
			return;
		}
		inner.set_state(SessionState::Stopping);

		inner.cancel.cancel();
		inner.connection.close().await;

		let event_loop = inner.shared.lock().event_loop.take();
		if let Some(handle) = event_loop {
			if let Err(e) = handle.await {
				warn!(target = "devdrive", error = %e, "event loop ended abnormally");
			}
		}
		// a reconnect racing the cancellation may have installed a generation
		inner.connection.close().await;

		inner.release_device().await;
		inner.set_state(SessionState::Stopped);
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if self.inner.stopped.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.cancel.cancel();

		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let inner = Arc::clone(&self.inner);
		handle.spawn(async move {
			inner.connection.close().await;
			inner.release_device().await;
		});
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("state", &self.state())
			.field("device_ready", &self.is_device_ready())
			.field("run_id", &self.run_id())
			.finish_non_exhaustive()
	}
}

/// Returns the session from `Executing` to `Ready` when dropped, unless
/// something else (reconnect, stop) has moved it on already.
struct ExecutingGuard<'a> {
	inner: &'a Inner,
}

impl Drop for ExecutingGuard<'_> {
	fn drop(&mut self) {
		self.inner.compare_and_set(SessionState::Executing, SessionState::Ready);
	}
}

/// How consuming one generation's control plane ended.
enum ControlEnd {
	Shutdown,
	Lost(Option<devdrive_runtime::Error>),
}

impl Inner {
	fn state(&self) -> SessionState {
		self.shared.lock().state
	}

	fn set_state(&self, next: SessionState) {
		let observer = {
			let mut shared = self.shared.lock();
			let current = shared.state;
			if current == next {
				return;
			}
			// once stopping, only the final transition is allowed
			if matches!(current, SessionState::Stopping | SessionState::Stopped) && next != SessionState::Stopped {
				return;
			}
			shared.state = next;
			shared.observers.state.clone()
		};
		debug!(target = "devdrive", state = %next, "session state changed");
		if let Some(observer) = observer {
			observer(next);
		}
	}

	fn compare_and_set(&self, expected: SessionState, next: SessionState) {
		let observer = {
			let mut shared = self.shared.lock();
			if shared.state != expected {
				return;
			}
			shared.state = next;
			shared.observers.state.clone()
		};
		debug!(target = "devdrive", state = %next, "session state changed");
		if let Some(observer) = observer {
			observer(next);
		}
	}

	fn notify_state(&self, state: SessionState) {
		let observer = self.shared.lock().observers.state.clone();
		if let Some(observer) = observer {
			observer(state);
		}
	}

	fn log(&self, message: &str) {
		debug!(target = "devdrive", text = message, "session log");
		let observer = self.shared.lock().observers.log.clone();
		if let Some(observer) = observer {
			observer(message);
		}
	}

	async fn provision_and_connect(&self) -> Result<()> {
		let request = StartDeviceRequest {
			platform: self.config.platform.clone(),
			test_id: self.config.test_id.clone(),
			is_simulation: self.config.is_simulation,
		};

		let response = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => return Err(SessionError::Stopped),
			response = self.provisioner.start_device(&request) => {
				response.map_err(|e| SessionError::Provision(format!("{e:#}")))?
			}
		};
		if let Some(error) = response.error.filter(|e| !e.is_empty()) {
			return Err(SessionError::Provision(error));
		}
		let run_id = response.run_id.filter(|id| !id.is_empty()).ok_or(SessionError::MissingRunId)?;
		info!(target = "devdrive", run_id = %run_id, platform = %self.config.platform, "device requested");
		self.shared.lock().run_id = Some(run_id.clone());

		self.set_state(SessionState::Connecting);
		let url = self.wait_for_worker_url(&run_id).await?;
		self.shared.lock().worker_url = Some(url.clone());

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(SessionError::Stopped),
			connected = self.connection.connect(&url) => connected.map(|_| ()).map_err(SessionError::from),
		}
	}

	/// Polls the provisioner every poll interval until the worker is ready.
	async fn wait_for_worker_url(&self, run_id: &str) -> Result<String> {
		let timeout = self.config.connection_timeout;
		let period = self.config.url_poll_interval.max(Duration::from_millis(1));

		let polling = async {
			let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
			loop {
				ticker.tick().await;
				match self.provisioner.connection_url(run_id).await {
					Ok(status) => match status.ready_url() {
						Some(url) => return url.to_string(),
						None => self.log("Waiting for device to initialize..."),
					},
					Err(e) => self.log(&format!("Waiting for worker... ({e:#})")),
				}
			}
		};

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(SessionError::Stopped),
			polled = tokio::time::timeout(timeout, polling) => {
				polled.map_err(|_| SessionError::WorkerUrlTimeout(timeout))
			}
		}
	}

	async fn sync_steps(&self) {
		if !self.config.persists_steps() {
			return;
		}
		let (Some(store), Some(test_id)) = (&self.store, self.config.test_id.as_deref()) else {
			return;
		};

		let (blocks, version) = {
			let shared = self.shared.lock();
			(shared.steps.to_blocks(), shared.test_version)
		};
		match store.sync_steps(test_id, &blocks, version).await {
			Ok(new_version) => {
				debug!(target = "devdrive", test_id, version = new_version, "synced steps");
				self.shared.lock().test_version = Some(new_version);
			}
			Err(e) => {
				warn!(target = "devdrive", test_id, error = %e, "step sync failed");
				self.log(&format!("Warning: failed to sync steps: {e:#}"));
			}
		}
	}

	async fn broadcast_tasks(&self) {
		if !self.connection.is_connected() {
			return;
		}
		let blocks = self.shared.lock().steps.to_blocks();
		if let Err(e) = self.connection.send_task_list(blocks).await {
			warn!(target = "devdrive", error = %e, "task list broadcast failed");
			self.log(&format!("Warning: failed to broadcast task list: {e}"));
		}
	}

	async fn release_device(&self) {
		let run_id = self.shared.lock().run_id.clone();
		let Some(run_id) = run_id else {
			return;
		};
		match tokio::time::timeout(self.config.cancel_timeout, self.provisioner.cancel_device(&run_id)).await {
			Ok(Ok(())) => info!(target = "devdrive", run_id = %run_id, "device released"),
			Ok(Err(e)) => {
				warn!(target = "devdrive", run_id = %run_id, error = %e, "device cancel failed");
				self.log(&format!("Warning: error cancelling device: {e:#}"));
			}
			Err(_) => warn!(target = "devdrive", run_id = %run_id, "device cancel timed out"),
		}
	}

	/// Consumes one generation's control plane until it ends.
	async fn consume(&self, generation: u64, mut control: ControlStream) -> ControlEnd {
		let mut errors_open = true;
		loop {
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => return ControlEnd::Shutdown,
				error = control.errors.recv(), if errors_open => match error {
					Some(error) => return ControlEnd::Lost(Some(error)),
					None => errors_open = false,
				},
				event = control.events.recv() => match event {
					Some(event) => self.handle_control(generation, &event),
					None => return ControlEnd::Lost(None),
				},
			}
		}
	}

	fn handle_control(&self, generation: u64, event: &InboundEvent) {
		match event.kind() {
			EventKind::Log => self.log(&payload_text(event.data.as_ref())),
			EventKind::DeviceInitStatus => {
				let initialized = event.parse_as::<DeviceInitStatus>().is_ok_and(|s| s.is_initialized());
				if initialized && !self.device_ready.swap(true, Ordering::AcqRel) {
					info!(target = "devdrive", generation, "device initialized");
					self.log("Device initialized and ready");
				}
			}
			EventKind::Connection => {
				let status = event.status.as_deref().unwrap_or("unknown");
				self.log(&format!("Connection: {status}"));
			}
			_ => debug!(target = "devdrive", generation, event_type = %event.event_type, "ignoring control event"),
		}
	}

	/// Reconnects after transport loss. Returns false when the loop should end.
	async fn recover(&self, reason: Option<devdrive_runtime::Error>) -> bool {
		if self.cancel.is_cancelled() {
			return false;
		}
		match &reason {
			Some(e) => self.log(&format!("Connection lost: {e}. Reconnecting...")),
			None => self.log("Connection closed. Reconnecting..."),
		}
		self.set_state(SessionState::Reconnecting);

		let Some(url) = self.shared.lock().worker_url.clone() else {
			self.set_state(SessionState::Error);
			return false;
		};

		let outcome = devdrive_runtime::reconnect_with_backoff(&self.connection, &url, &self.config.reconnect, &self.cancel, |attempt, e| {
			self.log(&format!("Reconnect attempt {attempt} failed: {e}"))
		})
		.await;

		match outcome {
			Ok(attempts) => {
				self.device_ready.store(false, Ordering::Release);
				info!(target = "devdrive", attempts, "session resumed on new connection");
				self.log("Reconnected, waiting for device to initialize");
				self.set_state(SessionState::Ready);
				true
			}
			Err(devdrive_runtime::Error::Cancelled) => false,
			Err(e) => {
				warn!(target = "devdrive", error = %e, "giving up on worker connection");
				self.log(&format!("Reconnect failed: {e}"));
				self.set_state(SessionState::Error);
				false
			}
		}
	}
}

/// Drains control-plane traffic, one generation at a time.
async fn run_event_loop(inner: Arc<Inner>) {
	loop {
		let end = match inner.connection.current_generation() {
			Some(generation) => match generation.take_control() {
				Some(control) => inner.consume(generation.id(), control).await,
				None => ControlEnd::Lost(None),
			},
			None => ControlEnd::Lost(None),
		};

		let reason = match end {
			ControlEnd::Shutdown => break,
			ControlEnd::Lost(reason) => reason,
		};
		if !inner.recover(reason).await {
			break;
		}
	}
	debug!(target = "devdrive", "event loop stopped");
}

fn payload_text(data: Option<&Value>) -> String {
	match data {
		Some(Value::String(text)) => text.clone(),
		Some(other) => other.to_string(),
		None => String::new(),
	}
}

fn unix_nanos() -> u128 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos()
}
