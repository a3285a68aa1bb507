//! Human-readable terminal output.

use colored::{ColoredString, Colorize};
use devdrive::{SessionState, StepRecord, StepStatus, StepUpdate};

pub fn status_icon(status: StepStatus) -> ColoredString {
	match status {
		StepStatus::Started => "▶".cyan(),
		StepStatus::InProgress => "…".cyan(),
		StepStatus::Completed => "✓".green(),
		StepStatus::Error => "✗".red(),
		StepStatus::Canceled => "○".yellow(),
		StepStatus::Unknown => "?".dimmed(),
	}
}

pub fn state_label(state: SessionState) -> ColoredString {
	let label = state.as_str();
	match state {
		SessionState::Ready => label.green(),
		SessionState::Executing | SessionState::Connecting | SessionState::Initializing => label.cyan(),
		SessionState::Reconnecting | SessionState::Stopping => label.yellow(),
		SessionState::Error => label.red().bold(),
		SessionState::Stopped => label.dimmed(),
	}
}

pub fn print_progress(update: &StepUpdate) {
	let mut line = format!("  {} {}", status_icon(update.status), update.status.as_str());
	let detail = update
		.result
		.as_ref()
		.and_then(|r| r.action_description.as_deref().or(r.reasoning.as_deref()));
	if let Some(detail) = detail {
		line.push_str(&format!(" {}", detail.dimmed()));
	}
	eprintln!("{line}");
}

pub fn print_step(record: &StepRecord) {
	let icon = if record.success { "✓".green() } else { "✗".red() };
	let duration = record.duration_ms.map(|ms| format!(" ({ms}ms)")).unwrap_or_default();
	println!(
		"{icon} #{} {} {}{}",
		record.index + 1,
		record.kind.to_string().bold(),
		record.instruction,
		duration.dimmed()
	);
	if let Some(error) = &record.error {
		println!("    {}", error.red());
	}
	for action in &record.actions_taken {
		println!("    - {}", action.description.as_deref().unwrap_or(&action.kind));
	}
}

pub fn print_steps(records: &[StepRecord]) {
	if records.is_empty() {
		println!("{}", "No steps recorded".dimmed());
		return;
	}
	for record in records {
		let icon = if record.success { "✓".green() } else { "✗".red() };
		println!("{icon} {:>3}. [{}] {}", record.index + 1, record.kind, record.instruction);
	}
}

pub fn print_state(state: SessionState) {
	eprintln!("{} {}", "state:".dimmed(), state_label(state));
}

pub fn print_log(message: &str) {
	eprintln!("{} {message}", "worker:".dimmed());
}

pub fn print_error(err: &anyhow::Error) {
	eprintln!("{} {err:#}", "error:".red().bold());
}
