use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use devdrive::{Session, StepKind, StepStore};
use tokio::io::BufReader;
use tracing::info;

use crate::cli::{Cli, Commands, SessionArgs};
use crate::config::{self, Settings};
use crate::output;
use crate::provisioner::StaticProvisioner;
use crate::repl;
use crate::store::HttpStepStore;

const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn dispatch(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::ConfigPath => {
			let path = cli.config.clone().or_else(config::default_path).context("no config directory on this platform")?;
			println!("{}", path.display());
			Ok(())
		}
		Commands::Attach(args) => {
			let settings = Settings::resolve(&cli)?;
			attach(&settings, args).await
		}
		Commands::Step {
			session,
			kind,
			device_timeout,
			instruction,
		} => {
			let settings = Settings::resolve(&cli)?;
			let instruction = instruction.join(" ");
			run_step(&settings, session, (*kind).into(), &instruction, Duration::from_secs(*device_timeout)).await
		}
	}
}

fn build_session(settings: &Settings, args: &SessionArgs) -> Result<Session> {
	let provisioner = Arc::new(StaticProvisioner::new(args.worker_url.clone(), args.run_id.clone()));
	let store = match &settings.api {
		Some(api) => Some(Arc::new(HttpStepStore::new(api)?) as Arc<dyn StepStore>),
		None => None,
	};
	// The worker URL is known up front, so there is nothing to wait for between polls.
	let config = settings.session_config(args).with_url_poll_interval(Duration::from_millis(10));
	Ok(Session::new(config, provisioner, store))
}

async fn attach(settings: &Settings, args: &SessionArgs) -> Result<()> {
	let session = build_session(settings, args)?;
	session.on_state_change(output::print_state);
	session.on_step_progress(output::print_progress);
	session.on_log(output::print_log);

	session.start().await.context("failed to attach to worker")?;
	info!(target = "devdrive", url = %args.worker_url, "attached");
	eprintln!("Attached. Type 'help' for commands.");

	let result = repl::run(&session, BufReader::new(tokio::io::stdin())).await;
	session.stop().await;
	result
}

async fn run_step(settings: &Settings, args: &SessionArgs, kind: StepKind, instruction: &str, device_timeout: Duration) -> Result<()> {
	let session = build_session(settings, args)?;
	session.on_step_progress(output::print_progress);

	let result = async {
		session.start().await.context("failed to attach to worker")?;
		wait_for_device(&session, device_timeout).await?;
		let record = session.execute_step(kind, instruction).await?;
		output::print_step(&record);
		if !record.success {
			bail!("step failed");
		}
		Ok::<(), anyhow::Error>(())
	}
	.await;

	session.stop().await;
	result
}

/// Polls until the worker reports the device initialized.
async fn wait_for_device(session: &Session, timeout: Duration) -> Result<()> {
	let wait = async {
		while !session.is_device_ready() {
			if session.state().is_terminal() {
				bail!("session ended while waiting for the device ({})", session.state());
			}
			tokio::time::sleep(DEVICE_POLL_INTERVAL).await;
		}
		Ok(())
	};
	eprintln!("Waiting for device to initialize...");
	tokio::time::timeout(timeout, wait)
		.await
		.with_context(|| format!("device not initialized after {}s", timeout.as_secs()))?
}
