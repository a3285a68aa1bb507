//! Worker connection runtime for devdrive.
//!
//! This crate owns the live WebSocket to a device worker:
//!
//! - [`WorkerConnection`]: connect, reconnect and close, one [`Generation`]
//!   per underlying socket
//! - [`router`]: splits inbound frames between the control plane and the
//!   step-result queue
//! - [`step`]: turns the step-result queue into a request/response call
//! - [`supervisor`]: bounded exponential-backoff reconnection

pub mod connection;
pub mod error;
pub mod generation;
pub mod router;
pub mod step;
pub mod supervisor;
pub mod transport;

pub use connection::{ConnectionConfig, WorkerConnection};
pub use error::{Error, Result};
pub use generation::{ControlStream, Generation};
pub use router::{Route, classify};
pub use step::{ProgressFn, StepRequest, await_step_result};
pub use supervisor::{ReconnectPolicy, reconnect_with_backoff};
pub use transport::normalize_url;
