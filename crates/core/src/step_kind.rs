//! Step types and their block categories.

use std::fmt;
use std::str::FromStr;

/// What kind of step is being sent to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
	/// Free-form natural language action.
	Instruction,
	/// Assertion about what is on screen.
	Validation,
	Wait,
	/// Open a URL or deep link.
	Navigate,
	Back,
	GoHome,
	OpenApp,
	KillApp,
}

impl StepKind {
	pub const ALL: [StepKind; 8] = [
		Self::Instruction,
		Self::Validation,
		Self::Wait,
		Self::Navigate,
		Self::Back,
		Self::GoHome,
		Self::OpenApp,
		Self::KillApp,
	];

	/// Wire value of `step_type`.
	pub fn step_type(self) -> &'static str {
		match self {
			Self::Instruction => "instruction",
			Self::Validation => "validation",
			Self::Wait => "wait",
			Self::Navigate => "navigate",
			Self::Back => "back",
			Self::GoHome => "go_home",
			Self::OpenApp => "open_app",
			Self::KillApp => "kill_app",
		}
	}

	/// Block category the step is grouped under.
	pub fn block_type(self) -> &'static str {
		match self {
			Self::Validation => "validation",
			Self::Navigate | Self::Wait | Self::Back | Self::GoHome | Self::OpenApp | Self::KillApp => "manual",
			Self::Instruction => "instructions",
		}
	}

	/// True when the step is meaningless without an argument.
	pub fn requires_argument(self) -> bool {
		matches!(self, Self::Validation | Self::Wait | Self::Navigate | Self::OpenApp)
	}
}

impl fmt::Display for StepKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.step_type())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStepKind(pub String);

impl fmt::Display for UnknownStepKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unknown step type '{}'", self.0)
	}
}

impl std::error::Error for UnknownStepKind {}

impl FromStr for StepKind {
	type Err = UnknownStepKind;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|kind| kind.step_type() == s)
			.ok_or_else(|| UnknownStepKind(s.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn block_types() {
		assert_eq!(StepKind::Instruction.block_type(), "instructions");
		assert_eq!(StepKind::Validation.block_type(), "validation");
		for kind in [StepKind::Wait, StepKind::Navigate, StepKind::Back, StepKind::GoHome, StepKind::OpenApp, StepKind::KillApp] {
			assert_eq!(kind.block_type(), "manual", "{kind}");
		}
	}

	#[test]
	fn parses_wire_names() {
		for kind in StepKind::ALL {
			assert_eq!(kind.step_type().parse::<StepKind>().unwrap(), kind);
		}
		assert!("swipe".parse::<StepKind>().is_err());
	}
}
