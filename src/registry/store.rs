//! Scans a directory of tool-server subdirectories and tracks which are
//! enabled via a sibling `enabled` text file. Mirrors the `ArcSwap`-backed
//! hot-reloadable store pattern used elsewhere in this codebase for
//! on-disk-backed state.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{info, warn};

use super::jsonc::strip_comments;
use super::types::{Descriptor, ServerRecord};
use super::RegistryError;

const ENABLED_FILE_NAME: &str = "enabled";
const DESCRIPTOR_FILE_NAME: &str = "config.json";
const ENABLED_FILE_HEADER: &str = "# tool servers enabled here are auto-started\n# one name per line, # starts a comment\n\n";

/// Scans `root` for tool-server subdirectories and caches the current set
/// of [`ServerRecord`]s behind an [`ArcSwap`] so that readers never block a
/// concurrent `reload`.
pub struct RegistryStore {
	root: PathBuf,
	records: ArcSwap<HashMap<String, ServerRecord>>,
}

impl RegistryStore {
	pub fn new(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
		let root = root.into();
		let records = scan(&root)?;
		Ok(RegistryStore {
			root,
			records: ArcSwap::from_pointee(records),
		})
	}

	/// Re-scans the directory from scratch. Returns the new record set,
	/// which is also what the store now reflects.
	pub fn reload(&self) -> Result<Arc<HashMap<String, ServerRecord>>, RegistryError> {
		let records = scan(&self.root)?;
		let records = Arc::new(records);
		self.records.store(records.clone());
		info!(target: "mcprelay::registry", count = records.len(), "registry reloaded");
		Ok(records)
	}

	/// All discovered candidates, enabled and disabled.
	pub fn list(&self) -> Vec<ServerRecord> {
		self.records.load().values().cloned().collect()
	}

	/// Enabled servers only, keyed by name.
	pub fn effective_config(&self) -> HashMap<String, ServerRecord> {
		self.records
			.load()
			.iter()
			.filter(|(_, r)| r.enabled)
			.map(|(n, r)| (n.clone(), r.clone()))
			.collect()
	}

	pub fn enable(&self, name: &str) -> Result<(), RegistryError> {
		self.set_enabled(name, true)
	}

	pub fn disable(&self, name: &str) -> Result<(), RegistryError> {
		self.set_enabled(name, false)
	}

	fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
		let mut names = read_enabled_file(&self.enabled_path())?;
		let changed = if enabled {
			names.insert(name.to_string())
		} else {
			names.remove(name)
		};
		if changed {
			write_enabled_file(&self.enabled_path(), &names)?;
			self.reload()?;
			info!(target: "mcprelay::registry", server = name, enabled, "registry state changed");
		}
		Ok(())
	}

	fn enabled_path(&self) -> PathBuf {
		self.root.join(ENABLED_FILE_NAME)
	}
}

fn scan(root: &Path) -> Result<HashMap<String, ServerRecord>, RegistryError> {
	let enabled = read_enabled_file(&root.join(ENABLED_FILE_NAME))?;
	let mut records = HashMap::new();

	let entries = match std::fs::read_dir(root) {
		Ok(entries) => entries,
		Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(records),
		Err(source) => {
			return Err(RegistryError::ReadDir {
				path: root.to_path_buf(),
				source,
			})
		}
	};

	for entry in entries {
		let entry = match entry {
			Ok(e) => e,
			Err(source) => {
				warn!(target: "mcprelay::registry", %source, "failed to read registry entry, skipping");
				continue;
			}
		};
		let path = entry.path();
		let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
			continue;
		};
		if name.starts_with('_') || name.starts_with('.') {
			continue;
		}
		if !path.is_dir() {
			continue;
		}

		let descriptor_path = path.join(DESCRIPTOR_FILE_NAME);
		let raw = match std::fs::read_to_string(&descriptor_path) {
			Ok(raw) => raw,
			Err(source) if source.kind() == std::io::ErrorKind::NotFound => continue,
			Err(source) => {
				warn!(target: "mcprelay::registry", server = name, %source, "failed to read descriptor, skipping server");
				continue;
			}
		};
		let stripped = strip_comments(&raw);
		let descriptor: Descriptor = match serde_json::from_str(&stripped) {
			Ok(d) => d,
			Err(source) => {
				warn!(target: "mcprelay::registry", server = name, %source, "malformed descriptor, skipping server");
				continue;
			}
		};

		let is_enabled = enabled.contains(name);
		records.insert(
			name.to_string(),
			ServerRecord::from_descriptor(name.to_string(), descriptor, is_enabled),
		);
	}

	Ok(records)
}

fn read_enabled_file(path: &Path) -> Result<HashSet<String>, RegistryError> {
	let mut names = HashSet::new();
	let raw = match std::fs::read_to_string(path) {
		Ok(raw) => raw,
		Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(names),
		Err(source) => {
			return Err(RegistryError::EnabledFileRead {
				path: path.to_path_buf(),
				source,
			})
		}
	};
	for line in raw.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		names.insert(line.to_string());
	}
	Ok(names)
}

fn write_enabled_file(path: &Path, names: &HashSet<String>) -> Result<(), RegistryError> {
	let mut sorted: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
	sorted.sort_unstable();
	let mut contents = String::from(ENABLED_FILE_HEADER);
	for name in sorted {
		contents.push_str(name);
		contents.push('\n');
	}
	std::fs::write(path, contents).map_err(|source| RegistryError::EnabledFileWrite {
		path: path.to_path_buf(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn write_server(root: &Path, name: &str, json: &str) {
		let dir = root.join(name);
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join(DESCRIPTOR_FILE_NAME), json).unwrap();
	}

	#[test]
	fn list_includes_disabled_servers_too() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "search", r#"{"type": "stdio", "command": "python", "args": ["server.py"]}"#);
		let store = RegistryStore::new(dir.path()).unwrap();
		let list = store.list();
		assert_eq!(list.len(), 1);
		assert!(!list[0].enabled);
	}

	#[test]
	fn enable_then_disable_is_a_no_op_on_enabled_set() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "search", r#"{"type": "stdio", "command": "python"}"#);
		let store = RegistryStore::new(dir.path()).unwrap();

		store.enable("search").unwrap();
		assert!(store.effective_config().contains_key("search"));

		store.disable("search").unwrap();
		assert!(store.effective_config().is_empty());
	}

	#[test]
	fn enable_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "search", r#"{"type": "stdio", "command": "python"}"#);
		let store = RegistryStore::new(dir.path()).unwrap();
		store.enable("search").unwrap();
		store.enable("search").unwrap();
		let enabled = read_enabled_file(&dir.path().join(ENABLED_FILE_NAME)).unwrap();
		assert_eq!(enabled.len(), 1);
	}

	#[test]
	fn skips_dirs_starting_with_underscore_or_dot() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "_private", r#"{"type": "stdio"}"#);
		write_server(dir.path(), ".hidden", r#"{"type": "stdio"}"#);
		write_server(dir.path(), "visible", r#"{"type": "stdio"}"#);
		let store = RegistryStore::new(dir.path()).unwrap();
		assert_eq!(store.list().len(), 1);
	}

	#[test]
	fn malformed_descriptor_is_skipped_not_fatal() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "broken", "{ not json");
		write_server(dir.path(), "ok", r#"{"type": "stdio"}"#);
		let store = RegistryStore::new(dir.path()).unwrap();
		assert_eq!(store.list().len(), 1);
		assert_eq!(store.list()[0].name, "ok");
	}

	#[test]
	fn descriptor_tolerates_comments() {
		let dir = tempfile::tempdir().unwrap();
		write_server(
			dir.path(),
			"search",
			"{\n  // a comment\n  \"type\": \"stdio\", /* inline */ \"command\": \"python\"\n}",
		);
		let store = RegistryStore::new(dir.path()).unwrap();
		assert_eq!(store.list().len(), 1);
	}

	#[test]
	fn reload_is_a_pure_function_of_disk_state() {
		let dir = tempfile::tempdir().unwrap();
		write_server(dir.path(), "search", r#"{"type": "stdio"}"#);
		let store = RegistryStore::new(dir.path()).unwrap();
		assert_eq!(store.list().len(), 1);

		write_server(dir.path(), "fetch", r#"{"type": "stdio"}"#);
		store.reload().unwrap();
		assert_eq!(store.list().len(), 2);
	}
}
