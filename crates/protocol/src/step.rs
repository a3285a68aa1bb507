//! Step commands and the updates a worker streams back for them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One step sent to the worker for execution.
///
/// `id` is generated by the caller and must be unique for the life of the
/// session; every [`StepUpdate`] for this step echoes it back as `step_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommand {
	pub id: String,
	/// Block category (`instructions`, `manual`, `validation`).
	#[serde(rename = "type")]
	pub block_type: String,
	/// Concrete step type (`instruction`, `navigate`, `wait`, ...).
	pub step_type: String,
	/// Natural language instruction.
	pub step_description: String,
	pub index: u32,
	/// Maximum execution time in seconds, 0 means worker default.
	#[serde(default, skip_serializing_if = "is_zero")]
	pub timeout: u32,
}

fn is_zero(v: &u32) -> bool {
	*v == 0
}

/// Lifecycle status of a step as reported by the worker.
///
/// Unrecognised values decode as [`StepStatus::Unknown`], which is treated as
/// non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
	Started,
	InProgress,
	Completed,
	Error,
	Canceled,
	#[default]
	#[serde(other)]
	Unknown,
}

impl StepStatus {
	/// `completed`, `error` and `canceled` end a step; nothing follows them.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Error | Self::Canceled)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Started => "started",
			Self::InProgress => "in_progress",
			Self::Completed => "completed",
			Self::Error => "error",
			Self::Canceled => "canceled",
			Self::Unknown => "unknown",
		}
	}
}

impl std::fmt::Display for StepStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A `STEP_EXECUTION` frame from the worker: progress or the terminal result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepUpdate {
	#[serde(default)]
	pub event_type: String,
	pub step_id: String,
	#[serde(default)]
	pub status: StepStatus,
	/// Unknown until a terminal status arrives.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<StepOutcome>,
	#[serde(default, deserialize_with = "null_as_default")]
	pub actions_taken: Vec<ActionTaken>,
	/// Base64 screenshot taken after the step, if the worker attached one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub screenshot: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<i64>,
}

impl StepUpdate {
	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Duration reported by the worker, falling back to the nested result.
	pub fn duration_ms(&self) -> Option<i64> {
		self.duration_ms
			.or_else(|| self.result.as_ref().and_then(|r| r.step_duration))
	}
}

/// Detailed execution data nested under `result`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutcome {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_value: Option<Value>,
	/// Description of what the worker is currently doing.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_step: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_step_index: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_steps: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validation_result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extracted_data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub step_duration: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action_description: Option<String>,
}

/// A discrete device action performed while executing a step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionTaken {
	/// `tap`, `type`, `swipe`, ...
	#[serde(rename = "type", default)]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub coordinates: Option<Coordinates>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coordinates {
	pub x: i32,
	pub y: i32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
