//! Persistent CLI settings.
//!
//! Flags and environment variables win; the JSON file at
//! `<config dir>/devdrive/config.json` fills in whatever they leave unset.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use devdrive::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, SessionArgs};

const CONFIG_DIR: &str = "devdrive";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
	pub api_key: Option<String>,
	pub api_url: Option<String>,
	pub platform: Option<String>,
	pub step_timeout_secs: Option<u64>,
}

impl FileConfig {
	/// Reads `path`. A missing file is an empty config; a malformed one is an error.
	pub fn load(path: &Path) -> Result<Self> {
		let text = match fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
			Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
		};
		serde_json::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
	}
}

pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Credentials for persisting steps, if any were configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
	pub api_key: String,
	pub api_url: String,
}

/// Everything resolved from flags, environment and file.
#[derive(Debug, Clone)]
pub struct Settings {
	pub api: Option<ApiSettings>,
	pub platform: String,
	pub step_timeout: Option<Duration>,
}

impl Settings {
	pub fn resolve(cli: &Cli) -> Result<Self> {
		let file = match cli.config.clone().or_else(default_path) {
			Some(path) => FileConfig::load(&path)?,
			None => FileConfig::default(),
		};
		Ok(Self::merge(cli.api_key.clone(), cli.api_url.clone(), file))
	}

	fn merge(api_key: Option<String>, api_url: Option<String>, file: FileConfig) -> Self {
		let api_key = api_key.or(file.api_key).filter(|k| !k.is_empty());
		let api_url = api_url.or(file.api_url).filter(|u| !u.is_empty());
		let api = match (api_key, api_url) {
			(Some(api_key), Some(api_url)) => Some(ApiSettings { api_key, api_url }),
			_ => None,
		};
		Self {
			api,
			platform: file.platform.unwrap_or_else(|| "android".to_string()),
			step_timeout: file.step_timeout_secs.map(Duration::from_secs),
		}
	}

	/// Session config for `args`, flags taking precedence over the file.
	pub fn session_config(&self, args: &SessionArgs) -> SessionConfig {
		let platform = args.platform.map(|p| p.as_str().to_string()).unwrap_or_else(|| self.platform.clone());
		let mut config = SessionConfig::new(platform).with_simulation(args.simulation);
		if let Some(test_id) = &args.test_id {
			config = config.with_test(test_id.clone(), args.test_name.clone());
		}
		if let Some(version) = args.test_version {
			config = config.with_test_version(version);
		}
		if let Some(timeout) = args.step_timeout.map(Duration::from_secs).or(self.step_timeout) {
			config = config.with_step_timeout(timeout);
		}
		config
	}
}
