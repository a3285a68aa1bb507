//! Session-level errors.

use std::time::Duration;

use thiserror::Error;

use crate::state::SessionState;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
	/// A step was requested while the session was not idle.
	#[error("Session not ready (state: {state})")]
	NotReady { state: SessionState },

	/// The worker has not reported the device as initialized yet.
	#[error("Device not ready yet, wait for initialization to complete")]
	DeviceNotReady,

	#[error("No steps to undo")]
	NoSteps,

	/// The provisioning collaborator failed or rejected the request.
	#[error("Failed to start device: {0}")]
	Provision(String),

	#[error("No run id in start device response")]
	MissingRunId,

	#[error("Timed out after {0:?} waiting for worker URL")]
	WorkerUrlTimeout(Duration),

	#[error("Session stopped")]
	Stopped,

	#[error(transparent)]
	Runtime(#[from] devdrive_runtime::Error),
}

impl SessionError {
	/// Misuse errors leave the session untouched and can simply be retried later.
	pub fn is_rejection(&self) -> bool {
		matches!(self, Self::NotReady { .. } | Self::DeviceNotReady | Self::NoSteps)
	}

	pub fn is_timeout(&self) -> bool {
		match self {
			Self::WorkerUrlTimeout(_) => true,
			Self::Runtime(e) => e.is_timeout(),
			_ => false,
		}
	}
}
