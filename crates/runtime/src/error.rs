//! Error types for the worker runtime.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a worker.
#[derive(Debug, Error)]
pub enum Error {
	/// `connect` was called while a live generation already exists.
	#[error("Already connected to worker")]
	AlreadyConnected,

	/// Worker URL could not be parsed or has an unsupported scheme.
	#[error("Invalid worker URL '{url}': {reason}")]
	InvalidUrl { url: String, reason: String },

	/// WebSocket handshake did not complete in time.
	#[error("Handshake with worker timed out after {0:?}")]
	HandshakeTimeout(Duration),

	/// WebSocket handshake failed.
	#[error("Failed to connect to worker: {0}")]
	ConnectionFailed(String),

	/// No live connection to send on.
	#[error("Not connected to worker")]
	NotConnected,

	/// Socket-level read or write failure.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The step-result queue closed before the step resolved.
	#[error("Connection to worker lost")]
	ConnectionLost,

	/// No terminal result for the step before the deadline.
	#[error("Timeout after {timeout:?} waiting for step '{step_id}'")]
	StepTimeout { step_id: String, timeout: Duration },

	/// The worker sent an `ERROR` event, rejecting the session.
	#[error("Worker error: {message}")]
	Remote { message: String },

	/// Every reconnect attempt in the budget failed.
	#[error("Reconnect failed after {attempts} attempts: {last}")]
	ReconnectExhausted { attempts: u32, last: Box<Error> },

	/// The caller's cancellation token fired.
	#[error("Operation cancelled")]
	Cancelled,

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true for handshake and step timeouts.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::HandshakeTimeout(_) | Error::StepTimeout { .. })
	}

	/// Returns true for errors raised while establishing a connection.
	pub fn is_connection_error(&self) -> bool {
		matches!(
			self,
			Error::AlreadyConnected | Error::InvalidUrl { .. } | Error::HandshakeTimeout(_) | Error::ConnectionFailed(_)
		)
	}

	/// Returns true if the live connection went away underneath the caller.
	pub fn is_connection_lost(&self) -> bool {
		matches!(self, Error::ConnectionLost | Error::Transport(_) | Error::NotConnected)
	}
}
