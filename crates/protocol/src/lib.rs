//! Wire types for the device worker stream.
//!
//! Everything exchanged with a worker over its WebSocket is JSON. Inbound
//! frames are decoded into the generic [`InboundEvent`] envelope first and
//! re-parsed into a narrower shape ([`StepUpdate`], [`RemoteError`],
//! [`DeviceInitStatus`]) by whichever consumer ends up owning the frame.
//!
//! # Main Types
//!
//! - [`InboundEvent`] - Generic envelope for every frame received from a worker
//! - [`StepCommand`] / [`StepExecutionMessage`] - Outbound step execution request
//! - [`StepUpdate`] - Progress or terminal result for one step
//! - [`Probe`] - Application-level keepalive ping/pong
//! - [`TaskBlock`] / [`TaskListMessage`] - Step list mirrored to other clients

pub mod event;
pub mod outbound;
pub mod step;

pub use event::{DeviceInitStatus, EventKind, InboundEvent, RemoteError};
pub use outbound::{Probe, StepDetails, StepExecutionMessage, TaskBlock, TaskListMessage};
pub use step::{ActionTaken, Coordinates, StepCommand, StepOutcome, StepStatus, StepUpdate};
