//! Line-oriented interactive recorder.

use std::future::Future;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use devdrive::{Session, StepKind, StepRecord};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tracing::debug;

use crate::output;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
	Step { kind: StepKind, instruction: String },
	/// Re-run recorded step `n` (1-based), the last one when absent.
	Replay(Option<usize>),
	/// Re-run every recorded step in order.
	Run,
	/// Undo every recorded step.
	Clear,
	Undo,
	List,
	Status,
	Help,
	Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
	#[error("{command} needs an argument, usage: {usage}")]
	MissingArgument { command: &'static str, usage: &'static str },
	#[error("invalid step index: {0}")]
	InvalidIndex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
	#[error("no steps to replay")]
	NoSteps,
	#[error("step index out of range (1-{len})")]
	OutOfRange { len: usize },
}

const HELP: &str = "\
Commands:
  <text>                 run a natural-language instruction
  validate <text>        assert something about the screen (alias: assert)
  wait <text>            wait for a condition or duration
  navigate <url>         open a URL or deep link
  open-app <package>     launch an app
  kill-app [package]     stop an app (the foreground app if omitted)
  back                   press back
  home                   go to the home screen
  undo                   remove the last recorded step
  replay [n]             re-run step n (the last step if omitted)
  run                    re-run all recorded steps from the start
  clear                  remove all recorded steps
  list                   show recorded steps (alias: ls)
  status                 show session status
  help                   show this help (alias: ?)
  quit                   end the session (aliases: exit, q)";

/// Parses `line`. Blank lines yield `None`.
///
/// The first word selects a command, case-insensitively; anything that is not
/// a command word is sent verbatim as an instruction.
pub fn parse_line(line: &str) -> Option<Result<ReplCommand, ParseError>> {
	let line = line.trim();
	if line.is_empty() {
		return None;
	}
	let mut words = line.split_whitespace();
	let head = words.next()?.to_lowercase();
	let args: Vec<&str> = words.collect();
	let rest = args.join(" ");

	let step = |kind: StepKind, instruction: String| -> Result<ReplCommand, ParseError> {
		Ok(ReplCommand::Step { kind, instruction })
	};
	let required = |kind: StepKind, command: &'static str, usage: &'static str, value: String| {
		if value.is_empty() {
			Err(ParseError::MissingArgument { command, usage })
		} else {
			step(kind, value)
		}
	};

	let parsed = match head.as_str() {
		"validate" | "assert" => required(StepKind::Validation, "validate", "validate <condition>", rest),
		"wait" => required(StepKind::Wait, "wait", "wait <condition>", rest),
		"navigate" => required(StepKind::Navigate, "navigate", "navigate <url>", rest),
		"open-app" | "openapp" => required(
			StepKind::OpenApp,
			"open-app",
			"open-app <package>",
			args.first().map(|s| s.to_string()).unwrap_or_default(),
		),
		"kill-app" | "killapp" => step(StepKind::KillApp, args.first().map(|s| s.to_string()).unwrap_or_default()),
		"back" => step(StepKind::Back, String::new()),
		"home" => step(StepKind::GoHome, String::new()),
		"replay" => match args.first() {
			None => Ok(ReplCommand::Replay(None)),
			Some(n) => n
				.parse::<usize>()
				.map(|n| ReplCommand::Replay(Some(n)))
				.map_err(|_| ParseError::InvalidIndex(n.to_string())),
		},
		"run" => Ok(ReplCommand::Run),
		"clear" => Ok(ReplCommand::Clear),
		"undo" => Ok(ReplCommand::Undo),
		"list" | "ls" => Ok(ReplCommand::List),
		"status" => Ok(ReplCommand::Status),
		"help" | "?" => Ok(ReplCommand::Help),
		"quit" | "exit" | "q" => Ok(ReplCommand::Quit),
		_ => step(StepKind::Instruction, line.to_string()),
	};
	Some(parsed)
}

/// Step kind for a persisted `step_type`; unknown values replay as instructions.
pub fn replay_kind(step_type: &str) -> StepKind {
	step_type.parse().unwrap_or(StepKind::Instruction)
}

/// Replays go through the block form, so a step re-runs exactly as it was stored.
fn replay_step(record: &StepRecord) -> (StepKind, String) {
	let block = record.to_block();
	(replay_kind(&block.step_type), block.step_description)
}

/// Picks the step for `replay [n]`, returning its 1-based position.
pub fn replay_target(records: &[StepRecord], n: Option<usize>) -> Result<(usize, StepKind, String), ReplayError> {
	if records.is_empty() {
		return Err(ReplayError::NoSteps);
	}
	let position = n.unwrap_or(records.len());
	if position == 0 || position > records.len() {
		return Err(ReplayError::OutOfRange { len: records.len() });
	}
	let (kind, instruction) = replay_step(&records[position - 1]);
	Ok((position, kind, instruction))
}

/// Steps for `run`, in recorded order.
pub fn run_plan(records: &[StepRecord]) -> Vec<(StepKind, String)> {
	records.iter().map(replay_step).collect()
}

/// Reads commands from `input` until it ends, `quit`, ctrl-c, or the session
/// reaches a terminal state. The caller stops the session afterwards.
pub async fn run<R>(session: &Session, input: R) -> Result<()>
where
	R: AsyncBufRead + Unpin,
{
	let mut lines = input.lines();
	let mut stdout = tokio::io::stdout();

	loop {
		if session.state().is_terminal() {
			debug!(target = "devdrive", state = %session.state(), "session ended, leaving prompt");
			break;
		}

		stdout.write_all(format!("{} ", "devdrive>".bold()).as_bytes()).await?;
		stdout.flush().await?;

		let line = tokio::select! {
			line = lines.next_line() => line?,
			_ = tokio::signal::ctrl_c() => {
				eprintln!();
				break;
			}
		};
		let Some(line) = line else {
			break;
		};
		let command = match parse_line(&line) {
			None => continue,
			Some(Ok(command)) => command,
			Some(Err(err)) => {
				eprintln!("{} {err}", "usage:".yellow());
				continue;
			}
		};

		let outcome = match command {
			ReplCommand::Quit => break,
			ReplCommand::Help => {
				println!("{HELP}");
				Ok(())
			}
			ReplCommand::List => {
				output::print_steps(&session.steps());
				Ok(())
			}
			ReplCommand::Status => {
				print_status(session);
				Ok(())
			}
			ReplCommand::Undo => undo(session).await,
			ReplCommand::Clear => clear(session).await,
			ReplCommand::Step { kind, instruction } => match interruptible(execute(session, kind, &instruction)).await {
				Some(outcome) => outcome,
				None => break,
			},
			ReplCommand::Replay(n) => match interruptible(replay(session, n)).await {
				Some(outcome) => outcome,
				None => break,
			},
			ReplCommand::Run => match interruptible(run_all(session)).await {
				Some(outcome) => outcome,
				None => break,
			},
		};
		if let Err(err) = outcome {
			output::print_error(&err);
		}
	}
	Ok(())
}

/// Races `work` against ctrl-c. `None` means the user interrupted.
async fn interruptible<F>(work: F) -> Option<Result<()>>
where
	F: Future<Output = Result<()>>,
{
	tokio::select! {
		outcome = work => Some(outcome),
		_ = tokio::signal::ctrl_c() => {
			eprintln!();
			None
		}
	}
}

async fn execute(session: &Session, kind: StepKind, instruction: &str) -> Result<()> {
	let record = session.execute_step(kind, instruction).await?;
	output::print_step(&record);
	Ok(())
}

async fn undo(session: &Session) -> Result<()> {
	let record = session.undo_last_step().await?;
	println!("{} removed #{} {}", "↶".yellow(), record.index + 1, record.instruction);
	Ok(())
}

async fn clear(session: &Session) -> Result<()> {
	let count = session.steps().len();
	if count == 0 {
		println!("{}", "No steps to clear".dimmed());
		return Ok(());
	}
	for _ in 0..count {
		session.undo_last_step().await.context("failed to clear steps")?;
	}
	println!("{}", format!("Cleared {count} steps").green());
	Ok(())
}

async fn replay(session: &Session, n: Option<usize>) -> Result<()> {
	let (position, kind, instruction) = replay_target(&session.steps(), n)?;
	println!("{}", format!("Replaying step {position}: {instruction}").cyan());
	execute(session, kind, &instruction).await
}

async fn run_all(session: &Session) -> Result<()> {
	// snapshot first; every executed step appends to the log
	let plan = run_plan(&session.steps());
	if plan.is_empty() {
		bail!("no steps to run");
	}
	println!("{}", format!("Running {} steps...", plan.len()).cyan());

	let total = plan.len();
	for (i, (kind, instruction)) in plan.into_iter().enumerate() {
		println!("{}", format!("Step {}/{total}: {instruction}", i + 1).cyan());
		execute(session, kind, &instruction)
			.await
			.with_context(|| format!("step {} failed", i + 1))?;
	}
	println!("{}", "All steps completed!".green());
	Ok(())
}

fn print_status(session: &Session) {
	println!("state:    {}", output::state_label(session.state()));
	println!("device:   {}", if session.is_device_ready() { "ready".green() } else { "initializing".yellow() });
	println!("platform: {}", session.platform());
	if let Some(run_id) = session.run_id() {
		println!("run:      {run_id}");
	}
	if let Some(url) = session.worker_url() {
		println!("worker:   {url}");
	}
	if let Some(test_id) = session.test_id() {
		let name = session.test_name().map(|n| format!(" ({n})")).unwrap_or_default();
		println!("test:     {test_id}{name}");
	}
	if session.is_simulation() {
		println!("mode:     simulation");
	}
	println!("steps:    {}", session.steps().len());
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::SystemTime;

	use devdrive::SessionConfig;

	use super::*;
	use crate::provisioner::StaticProvisioner;

	fn parse(line: &str) -> ReplCommand {
		parse_line(line).unwrap().unwrap()
	}

	fn step(kind: StepKind, instruction: &str) -> ReplCommand {
		ReplCommand::Step {
			kind,
			instruction: instruction.to_string(),
		}
	}

	fn record(index: u32, kind: StepKind, instruction: &str) -> StepRecord {
		StepRecord {
			id: format!("step-{index}"),
			kind,
			instruction: instruction.to_string(),
			index,
			success: true,
			error: None,
			duration_ms: None,
			actions_taken: Vec::new(),
			executed_at: SystemTime::now(),
		}
	}

	#[test]
	fn plain_text_is_an_instruction() {
		assert_eq!(parse("  tap the Login button "), step(StepKind::Instruction, "tap the Login button"));
		assert_eq!(parse("validating is not a keyword"), step(StepKind::Instruction, "validating is not a keyword"));
	}

	#[test]
	fn keywords_are_case_insensitive() {
		assert_eq!(parse("VALIDATE title  shows  Welcome"), step(StepKind::Validation, "title shows Welcome"));
		assert_eq!(parse("Assert cart is empty"), step(StepKind::Validation, "cart is empty"));
		assert_eq!(parse("Home"), step(StepKind::GoHome, ""));
		assert_eq!(parse("QUIT"), ReplCommand::Quit);
	}

	#[test]
	fn app_commands_take_first_argument() {
		assert_eq!(parse("open-app com.example.shop extra"), step(StepKind::OpenApp, "com.example.shop"));
		assert_eq!(parse("openapp com.example.shop"), step(StepKind::OpenApp, "com.example.shop"));
		assert_eq!(parse("kill-app"), step(StepKind::KillApp, ""));
		assert_eq!(parse("killapp com.example.shop"), step(StepKind::KillApp, "com.example.shop"));
	}

	#[test]
	fn missing_arguments_are_rejected() {
		for line in ["validate", "assert", "wait", "navigate  ", "open-app"] {
			let err = parse_line(line).unwrap().unwrap_err();
			assert!(err.to_string().contains("usage"), "{line}: {err}");
		}
	}

	#[test]
	fn session_commands() {
		assert_eq!(parse("undo"), ReplCommand::Undo);
		assert_eq!(parse("ls"), ReplCommand::List);
		assert_eq!(parse("list"), ReplCommand::List);
		assert_eq!(parse("status"), ReplCommand::Status);
		assert_eq!(parse("?"), ReplCommand::Help);
		assert_eq!(parse("exit"), ReplCommand::Quit);
		assert_eq!(parse("q"), ReplCommand::Quit);
		assert_eq!(parse("Run"), ReplCommand::Run);
		assert_eq!(parse("clear"), ReplCommand::Clear);
		assert!(parse_line("   ").is_none());
	}

	#[test]
	fn replay_index_parsing() {
		assert_eq!(parse("replay"), ReplCommand::Replay(None));
		assert_eq!(parse("replay 2"), ReplCommand::Replay(Some(2)));
		assert_eq!(parse_line("replay two").unwrap().unwrap_err(), ParseError::InvalidIndex("two".into()));
		assert_eq!(parse_line("replay -1").unwrap().unwrap_err(), ParseError::InvalidIndex("-1".into()));
	}

	#[test]
	fn replay_kind_falls_back_to_instruction() {
		for kind in StepKind::ALL {
			assert_eq!(replay_kind(kind.step_type()), kind);
		}
		assert_eq!(replay_kind("swipe"), StepKind::Instruction);
	}

	#[test]
	fn replay_target_defaults_to_last_step() {
		let records = [
			record(0, StepKind::OpenApp, "com.example.shop"),
			record(1, StepKind::GoHome, ""),
			record(2, StepKind::Validation, "home screen visible"),
		];

		assert_eq!(
			replay_target(&records, None).unwrap(),
			(3, StepKind::Validation, "home screen visible".to_string())
		);
		assert_eq!(replay_target(&records, Some(2)).unwrap(), (2, StepKind::GoHome, String::new()));
		assert_eq!(replay_target(&records, Some(0)).unwrap_err(), ReplayError::OutOfRange { len: 3 });
		assert_eq!(replay_target(&records, Some(4)).unwrap_err(), ReplayError::OutOfRange { len: 3 });
		assert_eq!(replay_target(&[], None).unwrap_err(), ReplayError::NoSteps);
	}

	#[test]
	fn run_plan_keeps_recorded_order() {
		let records = [record(0, StepKind::Instruction, "tap Login"), record(1, StepKind::KillApp, "com.example.shop")];
		assert_eq!(
			run_plan(&records),
			[
				(StepKind::Instruction, "tap Login".to_string()),
				(StepKind::KillApp, "com.example.shop".to_string()),
			]
		);
	}

	#[tokio::test]
	async fn run_survives_rejected_commands() {
		let session = Session::new(
			SessionConfig::new("android").with_simulation(true),
			Arc::new(StaticProvisioner::new("ws://127.0.0.1:1", None)),
			None,
		);
		let input: &[u8] = b"status\ntap something\nundo\nvalidate\nreplay\nreplay x\nrun\nclear\nlist\nquit\nnever reached\n";

		run(&session, input).await.unwrap();
		assert!(session.steps().is_empty());
	}
}
