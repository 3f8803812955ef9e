//! Owns the map of live tool-server adapters and the flat qualified-name
//! tool map built from them. The single process-wide shared-state surface
//! (§4.3, §9 "Global manager state").

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::transport::{build_adapter, Adapter, Tool, TransportError};
use crate::registry::RegistryStore;

#[derive(Error, Debug)]
pub enum ManagerError {
	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Registry(#[from] crate::registry::RegistryError),

	#[error("unknown server '{0}'")]
	UnknownServer(String),
}

/// A tool as exposed to the model: its qualified name, description, and
/// JSON-Schema, plus the server that owns it.
#[derive(Debug, Clone)]
pub struct QualifiedTool {
	pub qualified_name: String,
	pub description: String,
	pub input_schema: serde_json::Value,
	pub server_name: String,
}

struct Inner {
	adapters: HashMap<String, Arc<dyn Adapter>>,
	tools: HashMap<String, QualifiedTool>,
}

/// The dispatch outcome for a qualified tool-call name.
pub enum Dispatch {
	/// The qualified name is owned by a live server; here is its rendered
	/// result text.
	Result(String),
	/// No live server owns this qualified name (§4.6: "tool does not exist").
	NotFound,
	/// The owning server is registered but the call itself failed
	/// (§4.6: "tool execution failed").
	ExecutionFailed,
}

/// Process-wide tool-server manager, reached through a single shared `Arc`
/// handle (§9).
pub struct ToolServerManager {
	registry: Arc<RegistryStore>,
	inner: RwLock<Inner>,
}

impl ToolServerManager {
	pub fn new(registry: Arc<RegistryStore>) -> Self {
		ToolServerManager {
			registry,
			inner: RwLock::new(Inner {
				adapters: HashMap::new(),
				tools: HashMap::new(),
			}),
		}
	}

	/// Starts every currently enabled server. Intended for the auto-start
	/// path at process startup.
	pub async fn start_all_enabled(&self) {
		let config = self.registry.effective_config();
		for name in config.keys() {
			if let Err(err) = self.start(name).await {
				warn!(target: "mcprelay::manager", server = %name, %err, "failed to start tool server");
			}
		}
	}

	/// Instantiates and starts the named server's adapter, inserting its
	/// tools into the flat qualified-name map.
	pub async fn start(&self, name: &str) -> Result<(), ManagerError> {
		let config = self.registry.effective_config();
		let record = config.get(name).ok_or_else(|| ManagerError::UnknownServer(name.to_string()))?;

		let adapter: Arc<dyn Adapter> = Arc::from(build_adapter(record)?);
		adapter.start().await?;

		let fetched_tools = adapter.tools();
		let mut inner = self.inner.write().await;
		inner.tools.retain(|_, t| t.server_name != name);
		for tool in &fetched_tools {
			let qualified_name = format!("{name}_{}", tool.local_name);
			inner.tools.insert(
				qualified_name.clone(),
				QualifiedTool {
					qualified_name,
					description: tool.description.clone(),
					input_schema: tool.input_schema.clone(),
					server_name: name.to_string(),
				},
			);
		}
		inner.adapters.insert(name.to_string(), adapter);

		info!(target: "mcprelay::manager", server = name, tools = fetched_tools.len(), "tool server started");
		Ok(())
	}

	/// Removes the adapter and every tool whose owning server matches.
	pub async fn stop(&self, name: &str) {
		let mut inner = self.inner.write().await;
		if let Some(adapter) = inner.adapters.remove(name) {
			adapter.stop().await;
		}
		inner.tools.retain(|_, t| t.server_name != name);
		info!(target: "mcprelay::manager", server = name, "tool server stopped");
	}

	/// Stops all servers, re-scans the registry, and restarts every
	/// enabled server, so that manager state is a pure function of the
	/// on-disk registry afterward.
	pub async fn reload(&self) -> Result<(), ManagerError> {
		let names: Vec<String> = {
			let inner = self.inner.read().await;
			inner.adapters.keys().cloned().collect()
		};
		for name in names {
			self.stop(&name).await;
		}
		self.registry.reload()?;
		self.start_all_enabled().await;
		Ok(())
	}

	/// All tools currently live across every started server, keyed by
	/// qualified name.
	pub async fn live_tools(&self) -> HashMap<String, QualifiedTool> {
		self.inner.read().await.tools.clone()
	}

	/// `true` if `qualified_name` is owned by a currently live server.
	pub async fn owns(&self, qualified_name: &str) -> bool {
		self.inner.read().await.tools.contains_key(qualified_name)
	}

	/// Strips the `"<server>_"` prefix and forwards to the owning adapter.
	pub async fn dispatch(&self, qualified_name: &str, arguments: serde_json::Value) -> Dispatch {
		let (adapter, local_name) = {
			let inner = self.inner.read().await;
			let Some(tool) = inner.tools.get(qualified_name) else {
				return Dispatch::NotFound;
			};
			let Some(adapter) = inner.adapters.get(&tool.server_name) else {
				return Dispatch::ExecutionFailed;
			};
			let local_name = qualified_name
				.strip_prefix(&format!("{}_", tool.server_name))
				.unwrap_or(qualified_name)
				.to_string();
			(adapter.clone(), local_name)
		};

		match adapter.call_tool(&local_name, arguments).await {
			Ok(text) => Dispatch::Result(text),
			Err(err) => {
				warn!(target: "mcprelay::manager", tool = %qualified_name, %err, "tool execution failed");
				Dispatch::ExecutionFailed
			}
		}
	}

	pub async fn shutdown(&self) {
		let names: Vec<String> = {
			let inner = self.inner.read().await;
			inner.adapters.keys().cloned().collect()
		};
		for name in names {
			self.stop(&name).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn qualified_name_strips_server_prefix() {
		let tool = QualifiedTool {
			qualified_name: "search_web_search".into(),
			description: String::new(),
			input_schema: serde_json::json!({}),
			server_name: "search".into(),
		};
		let local = tool
			.qualified_name
			.strip_prefix(&format!("{}_", tool.server_name))
			.unwrap();
		assert_eq!(local, "web_search");
	}

	#[tokio::test]
	async fn dispatch_to_an_unqualified_name_reports_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(RegistryStore::new(dir.path()).unwrap());
		let manager = ToolServerManager::new(registry);

		let outcome = manager.dispatch("search_web_search", serde_json::json!({})).await;
		assert!(matches!(outcome, Dispatch::NotFound));
	}
}
