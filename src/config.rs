//! Layered configuration: a `clap`-derived CLI overlay on top of a
//! `serde_yaml`-deserialized settings file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Process-level flags. File-backed settings are layered on top of these.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcprelay", about = "Agentic tool-calling proxy for OpenAI- and Gemini-shaped upstreams")]
pub struct Cli {
	/// Address to bind the gateway facade to.
	#[arg(long, default_value = "0.0.0.0:8080")]
	pub bind: SocketAddr,

	/// Directory containing tool-server descriptor subdirectories.
	#[arg(long, default_value = "mcp_servers")]
	pub registry_dir: PathBuf,

	/// Optional settings file (YAML) layered under CLI flags.
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Log filter, e.g. "info" or "mcprelay=debug,tower_http=info".
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// The file-backed settings document.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
	/// Access keys accepted from clients; if empty, the client-provided key
	/// is forwarded to the upstream unchecked.
	#[serde(default)]
	pub access_keys: Vec<String>,

	#[serde(default)]
	pub openai: Option<UpstreamSettings>,

	#[serde(default)]
	pub gemini: Option<UpstreamSettings>,

	/// Prepended to any inbound system instruction, per §4.5.5.
	#[serde(default)]
	pub system_prompt: Option<String>,

	#[serde(default = "default_retry_count")]
	pub retry_count: u32,

	#[serde(default = "default_retry_delay_secs", with = "duration_secs")]
	pub retry_delay: Duration,

	#[serde(default = "default_max_iterations")]
	pub max_iterations: u32,

	#[serde(default = "default_upstream_timeout_secs", with = "duration_secs")]
	pub upstream_timeout: Duration,

	#[serde(default = "default_auto_start")]
	pub auto_start_servers: bool,

	/// Named but intentionally unimplemented: the spec mandates client-wins
	/// on tool-name collision unconditionally. Kept here only to document
	/// the deferred follow-up; reading any value other than "client_wins"
	/// is a config error.
	#[serde(default)]
	pub tool_collision_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpstreamSettings {
	pub base_url: String,
	#[serde(default)]
	pub server_key: Option<String>,
}

fn default_retry_count() -> u32 {
	2
}

fn default_retry_delay_secs() -> Duration {
	Duration::from_secs(5)
}

fn default_max_iterations() -> u32 {
	100
}

fn default_upstream_timeout_secs() -> Duration {
	Duration::from_secs(300)
}

fn default_auto_start() -> bool {
	true
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = u64::deserialize(d)?;
		Ok(Duration::from_secs(secs))
	}
}

impl Settings {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
		match path {
			Some(p) if p.exists() => Self::load(p),
			_ => Ok(Settings::default()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec() {
		let s = Settings::default();
		assert_eq!(s.retry_count, 2);
		assert_eq!(s.retry_delay, Duration::from_secs(5));
		assert_eq!(s.max_iterations, 100);
		assert_eq!(s.upstream_timeout, Duration::from_secs(300));
	}

	#[test]
	fn parses_minimal_yaml() {
		let yaml = r#"
accessKeys: ["abc"]
openai:
  baseUrl: "https://api.example.com/v1/chat/completions"
retryCount: 3
"#;
		let settings: Settings = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(settings.access_keys, vec!["abc".to_string()]);
		assert_eq!(settings.retry_count, 3);
		assert_eq!(settings.openai.unwrap().base_url, "https://api.example.com/v1/chat/completions");
	}
}
