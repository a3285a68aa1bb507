use std::fmt;

/// Lifecycle of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
	#[default]
	Initializing,
	Connecting,
	Ready,
	Executing,
	Stopping,
	Stopped,
	Reconnecting,
	Error,
}

impl SessionState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Initializing => "initializing",
			Self::Connecting => "connecting",
			Self::Ready => "ready",
			Self::Executing => "executing",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
			Self::Reconnecting => "reconnecting",
			Self::Error => "error",
		}
	}

	/// `Stopped` and `Error` are final; nothing transitions out of them.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Stopped | Self::Error)
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
