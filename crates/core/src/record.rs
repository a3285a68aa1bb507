//! Recorded steps of a session.

use std::time::SystemTime;

use devdrive_protocol::{ActionTaken, StepUpdate, TaskBlock};

use crate::step_kind::StepKind;

/// One executed step, as kept in the session's log.
#[derive(Debug, Clone)]
pub struct StepRecord {
	pub id: String,
	pub kind: StepKind,
	pub instruction: String,
	pub index: u32,
	pub success: bool,
	pub error: Option<String>,
	pub duration_ms: Option<i64>,
	pub actions_taken: Vec<ActionTaken>,
	pub executed_at: SystemTime,
}

impl StepRecord {
	pub(crate) fn from_update(id: String, kind: StepKind, instruction: String, index: u32, update: &StepUpdate) -> Self {
		Self {
			id,
			kind,
			instruction,
			index,
			success: update.success.unwrap_or(false),
			error: update.error.clone(),
			duration_ms: update.duration_ms(),
			actions_taken: update.actions_taken.clone(),
			executed_at: SystemTime::now(),
		}
	}

	pub fn block_type(&self) -> &'static str {
		self.kind.block_type()
	}

	pub fn to_block(&self) -> TaskBlock {
		TaskBlock {
			id: self.id.clone(),
			block_type: self.kind.block_type().to_string(),
			step_type: self.kind.step_type().to_string(),
			step_description: self.instruction.clone(),
		}
	}
}

/// Append-only log with removal of the last entry.
#[derive(Debug, Clone, Default)]
pub struct StepLog {
	records: Vec<StepRecord>,
}

impl StepLog {
	pub fn push(&mut self, record: StepRecord) {
		self.records.push(record);
	}

	pub fn pop_last(&mut self) -> Option<StepRecord> {
		self.records.pop()
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Index the next step will be recorded under.
	pub fn next_index(&self) -> u32 {
		u32::try_from(self.records.len()).unwrap_or(u32::MAX)
	}

	pub fn records(&self) -> &[StepRecord] {
		&self.records
	}

	pub fn to_blocks(&self) -> Vec<TaskBlock> {
		self.records.iter().map(StepRecord::to_block).collect()
	}
}

#[cfg(test)]
mod tests {
	use devdrive_protocol::StepStatus;

	use super::*;

	fn record(id: &str, kind: StepKind) -> StepRecord {
		let update = StepUpdate {
			step_id: id.to_string(),
			status: StepStatus::Completed,
			success: Some(true),
			duration_ms: Some(10),
			..StepUpdate::default()
		};
		StepRecord::from_update(id.to_string(), kind, "do it".into(), 0, &update)
	}

	#[test]
	fn push_and_pop_last() {
		let mut log = StepLog::default();
		assert!(log.pop_last().is_none());

		log.push(record("a", StepKind::Instruction));
		log.push(record("b", StepKind::Back));
		assert_eq!(log.next_index(), 2);

		assert_eq!(log.pop_last().unwrap().id, "b");
		assert_eq!(log.len(), 1);
		assert_eq!(log.records()[0].id, "a");
	}

	#[test]
	fn blocks_carry_categories() {
		let mut log = StepLog::default();
		log.push(record("a", StepKind::Validation));
		log.push(record("b", StepKind::OpenApp));

		let blocks = log.to_blocks();
		assert_eq!(blocks[0].block_type, "validation");
		assert_eq!(blocks[1].block_type, "manual");
		assert_eq!(blocks[1].step_type, "open_app");
		assert_eq!(blocks[1].step_description, "do it");
	}
}
