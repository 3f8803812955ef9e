//! On-disk discovery of tool-server definitions and their enable/disable
//! state (§4.1 of the design). A [`RegistryStore`] owns the directory and
//! exposes `list`/`enable`/`disable`/`effective_config`.

mod jsonc;
mod store;
mod types;

pub use store::RegistryStore;
pub use types::{Descriptor, ServerRecord, TransportKind};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("failed to read registry directory {path}: {source}")]
	ReadDir {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to read enabled file {path}: {source}")]
	EnabledFileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to write enabled file {path}: {source}")]
	EnabledFileWrite {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("unknown server '{0}'")]
	UnknownServer(String),
}
