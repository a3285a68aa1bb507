//! Interactive remote device test sessions.
//!
//! A [`Session`] provisions a device through a [`DeviceProvisioner`], connects
//! to the worker driving it, and sends natural-language steps one at a time.
//! Results stream back over the same connection; the session records them in a
//! [`StepLog`] and mirrors the list to a [`StepStore`].
//!
//! Wire types live in [`devdrive_protocol`]; the connection, routing and
//! reconnection machinery in [`devdrive_runtime`].

pub mod config;
pub mod error;
pub mod provision;
pub mod record;
pub mod session;
pub mod state;
pub mod step_kind;

pub use config::SessionConfig;
pub use devdrive_protocol::{ActionTaken, StepOutcome, StepStatus, StepUpdate, TaskBlock};
pub use devdrive_runtime::{ConnectionConfig, ReconnectPolicy};
pub use error::{Result, SessionError};
pub use provision::{DeviceProvisioner, StartDeviceRequest, StartDeviceResponse, StepStore, WorkerUrlStatus};
pub use record::{StepLog, StepRecord};
pub use session::Session;
pub use state::SessionState;
pub use step_kind::{StepKind, UnknownStepKind};

/// Re-exported so implementors of the collaborator traits need no direct dependency.
pub use async_trait::async_trait;
