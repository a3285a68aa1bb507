use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};
use devdrive::StepKind;

#[derive(Parser, Debug)]
#[command(name = "devdrive")]
#[command(about = "Drive remote mobile devices with natural-language steps")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to <config dir>/devdrive/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// API key used to persist recorded steps
	#[arg(long, global = true, env = "DEVDRIVE_API_KEY", hide_env_values = true)]
	pub api_key: Option<String>,

	/// Base URL of the test API
	#[arg(long, global = true, env = "DEVDRIVE_API_URL", value_name = "URL")]
	pub api_url: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Attach to a running worker and record steps interactively
	Attach(SessionArgs),

	/// Run a single step against a worker and exit
	Step {
		#[command(flatten)]
		session: SessionArgs,

		/// Step type
		#[arg(short, long, value_enum, default_value = "instruction")]
		kind: CliStepKind,

		/// Wait this many seconds for the device to initialize
		#[arg(long, default_value_t = 120, value_name = "SECS")]
		device_timeout: u64,

		/// Instruction text
		#[arg(required = true, num_args = 1.., value_name = "INSTRUCTION")]
		instruction: Vec<String>,
	},

	/// Print the resolved config file path
	ConfigPath,
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
	/// Worker WebSocket URL (http/https are mapped to ws/wss)
	#[arg(long, env = "DEVDRIVE_WORKER_URL", value_name = "URL")]
	pub worker_url: String,

	/// Run identifier of the already provisioned device
	#[arg(long, value_name = "ID")]
	pub run_id: Option<String>,

	/// Test whose step list is kept in sync
	#[arg(long, value_name = "ID")]
	pub test_id: Option<String>,

	#[arg(long, value_name = "NAME")]
	pub test_name: Option<String>,

	/// Stored test version for optimistic locking
	#[arg(long, value_name = "N")]
	pub test_version: Option<u64>,

	/// Device platform
	#[arg(short, long, value_enum)]
	pub platform: Option<Platform>,

	/// Stream the device without recording an execution
	#[arg(long)]
	pub simulation: bool,

	/// Seconds to wait for each step's result
	#[arg(long, value_name = "SECS")]
	pub step_timeout: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Platform {
	Android,
	Ios,
}

impl Platform {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Android => "android",
			Self::Ios => "ios",
		}
	}
}

/// Step types accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliStepKind {
	Instruction,
	Validation,
	Wait,
	Navigate,
	Back,
	GoHome,
	OpenApp,
	KillApp,
}

impl From<CliStepKind> for StepKind {
	fn from(kind: CliStepKind) -> Self {
		match kind {
			CliStepKind::Instruction => StepKind::Instruction,
			CliStepKind::Validation => StepKind::Validation,
			CliStepKind::Wait => StepKind::Wait,
			CliStepKind::Navigate => StepKind::Navigate,
			CliStepKind::Back => StepKind::Back,
			CliStepKind::GoHome => StepKind::GoHome,
			CliStepKind::OpenApp => StepKind::OpenApp,
			CliStepKind::KillApp => StepKind::KillApp,
		}
	}
}

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Green.on_default())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn attach_with_worker_url() {
		let cli = Cli::try_parse_from(["devdrive", "attach", "--worker-url", "wss://worker/ws", "--test-id", "t-1", "-p", "ios"]).unwrap();
		match cli.command {
			Commands::Attach(args) => {
				assert_eq!(args.worker_url, "wss://worker/ws");
				assert_eq!(args.test_id.as_deref(), Some("t-1"));
				assert_eq!(args.platform, Some(Platform::Ios));
				assert!(!args.simulation);
			}
			other => panic!("expected attach, got {other:?}"),
		}
	}

	#[test]
	fn verbosity_counts() {
		let cli = Cli::try_parse_from(["devdrive", "-vv", "config-path"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert!(matches!(cli.command, Commands::ConfigPath));
	}

	#[test]
	fn step_joins_instruction_words() {
		let cli = Cli::try_parse_from([
			"devdrive",
			"step",
			"--worker-url",
			"ws://localhost:9000",
			"--kind",
			"open-app",
			"com.example.app",
		])
		.unwrap();
		match cli.command {
			Commands::Step { kind, instruction, device_timeout, .. } => {
				assert_eq!(StepKind::from(kind), StepKind::OpenApp);
				assert_eq!(instruction, ["com.example.app"]);
				assert_eq!(device_timeout, 120);
			}
			other => panic!("expected step, got {other:?}"),
		}
	}

	#[test]
	fn step_requires_instruction() {
		assert!(Cli::try_parse_from(["devdrive", "step", "--worker-url", "ws://localhost:9000"]).is_err());
	}

	#[test]
	fn global_flags_after_subcommand() {
		let cli = Cli::try_parse_from([
			"devdrive",
			"attach",
			"--worker-url",
			"ws://w",
			"--api-key",
			"secret",
			"--api-url",
			"https://api.example.com",
		])
		.unwrap();
		assert_eq!(cli.api_key.as_deref(), Some("secret"));
		assert_eq!(cli.api_url.as_deref(), Some("https://api.example.com"));
	}
}
