//! The on-disk tool-server record and its descriptor shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which JSON-RPC transport a tool server speaks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
	Stdio,
	#[serde(alias = "streamableHttp")]
	Http,
	Sse,
}

/// The raw descriptor as read from `config.json`. Unknown fields are kept
/// around opaquely rather than rejected, since a descriptor may carry
/// fields meaningful to the tool server itself but not to the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Descriptor {
	#[serde(rename = "type")]
	pub transport: TransportKind,
	#[serde(default)]
	pub description: String,

	// stdio fields
	#[serde(default)]
	pub command: Option<String>,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub env: Option<HashMap<String, String>>,

	// http/sse fields
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub headers: Option<HashMap<String, String>>,
}

/// An immutable, fully-resolved tool-server record: a descriptor plus its
/// name (the subdirectory name) and whether the enabled side-file lists it.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerRecord {
	pub name: String,
	pub transport: TransportKind,
	pub description: String,
	pub enabled: bool,
	pub command: Option<String>,
	pub args: Vec<String>,
	pub env: Option<HashMap<String, String>>,
	pub url: Option<String>,
	pub headers: Option<HashMap<String, String>>,
}

impl ServerRecord {
	pub fn from_descriptor(name: String, descriptor: Descriptor, enabled: bool) -> Self {
		ServerRecord {
			name,
			transport: descriptor.transport,
			description: descriptor.description,
			enabled,
			command: descriptor.command,
			args: descriptor.args,
			env: descriptor.env,
			url: descriptor.url,
			headers: descriptor.headers,
		}
	}
}
