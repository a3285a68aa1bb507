//! Frames sent to the worker.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::step::StepCommand;

/// `STEP_EXECUTION` request wrapping a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionMessage {
	pub event_type: String,
	/// `EXECUTE` or `STOP_EXECUTION`.
	pub action: String,
	pub step_details: StepDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDetails {
	pub steps: Vec<StepCommand>,
	#[serde(rename = "testId", default, skip_serializing_if = "Option::is_none")]
	pub test_id: Option<String>,
	/// Simulation runs stream the device without creating execution records.
	pub is_simulation: bool,
}

impl StepExecutionMessage {
	pub fn execute(step: StepCommand, test_id: Option<String>, is_simulation: bool) -> Self {
		Self {
			event_type: "STEP_EXECUTION".to_string(),
			action: "EXECUTE".to_string(),
			step_details: StepDetails {
				steps: vec![step],
				test_id,
				is_simulation,
			},
		}
	}
}

/// Application-level keepalive, independent of WebSocket control frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Probe {
	Ping { id: String, timestamp: f64 },
	Pong { id: String },
}

impl Probe {
	/// A fresh ping stamped with the current wall clock.
	pub fn ping_now() -> Self {
		let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
		Self::Ping {
			id: format!("cli-{}", now.as_nanos()),
			timestamp: now.as_secs_f64(),
		}
	}

	pub fn pong(id: impl Into<String>) -> Self {
		Self::Pong { id: id.into() }
	}
}

/// A recorded step in block form, as persisted and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBlock {
	pub id: String,
	#[serde(rename = "type")]
	pub block_type: String,
	pub step_type: String,
	pub step_description: String,
}

/// `TASK_LIST` broadcast so other clients on the same worker see the step list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListMessage {
	pub event_type: String,
	pub tasks: Vec<TaskBlock>,
}

impl TaskListMessage {
	pub fn new(tasks: Vec<TaskBlock>) -> Self {
		Self {
			event_type: "TASK_LIST".to_string(),
			tasks,
		}
	}
}
