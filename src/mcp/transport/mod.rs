//! The common contract all three transports implement, and the shared
//! `Tool` type a started adapter caches.

mod http;
mod sse;
mod stdio;

pub use http::HttpAdapter;
pub use sse::SseAdapter;
pub use stdio::StdioAdapter;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::registry::ServerRecord;

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("failed to spawn child process: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("failed to write to child stdin: {0}")]
	Write(#[source] std::io::Error),

	#[error("request timed out after {0:?}")]
	Timeout(std::time::Duration),

	#[error("connection closed before a response arrived")]
	ConnectionClosed,

	#[error("http request failed: {0}")]
	Http(#[source] reqwest::Error),

	#[error("server missing required field '{0}' for its transport")]
	MissingField(&'static str),

	#[error("malformed response: {0}")]
	MalformedResponse(String),
}

/// A tool, as exposed by a started adapter, before the Manager rewrites its
/// name into `"<server>_<local-name>"`.
#[derive(Debug, Clone)]
pub struct Tool {
	pub local_name: String,
	pub description: String,
	pub input_schema: Value,
}

/// The shape every transport adapter implements: connect, cache tools,
/// dispatch a call, and tear down.
#[async_trait]
pub trait Adapter: Send + Sync {
	/// Establishes the connection, performs the `initialize` handshake,
	/// sends `notifications/initialized`, and caches `tools/list`.
	/// Idempotent once started.
	async fn start(&self) -> Result<(), TransportError>;

	/// Terminates the connection/child process. After this, `tools()` is
	/// empty.
	async fn stop(&self);

	/// The tools cached by the most recent successful `start()`.
	fn tools(&self) -> Vec<Tool>;

	/// Sends `tools/call` with the adapter's local tool name and returns the
	/// rendered text (or formatted error text) of the reply.
	async fn call_tool(&self, local_name: &str, arguments: Value) -> Result<String, TransportError>;
}

/// Builds the concrete adapter for a server record's transport kind.
pub fn build_adapter(record: &ServerRecord) -> Result<Box<dyn Adapter>, TransportError> {
	use crate::registry::TransportKind;
	match record.transport {
		TransportKind::Stdio => Ok(Box::new(StdioAdapter::new(record)?)),
		TransportKind::Http => Ok(Box::new(HttpAdapter::new(record)?)),
		TransportKind::Sse => Ok(Box::new(SseAdapter::new(record)?)),
	}
}
