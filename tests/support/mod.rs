//! Shared fixtures for the end-to-end engine tests: a disk-backed registry
//! pointing at a wiremock-faked MCP HTTP tool server, and a wiremock-faked
//! OpenAI-compatible upstream.

use std::sync::Arc;
use std::time::Duration;

use mcprelay::engine::Engine;
use mcprelay::mcp::manager::ToolServerManager;
use mcprelay::registry::RegistryStore;
use mcprelay::upstream::openai::OpenAiDialect;
use mcprelay::upstream::{RetryPolicy, UpstreamClient};
use reqwest::Client;
use serde_json::{json, Value};
use wiremock::{Mock, MockServer};

/// Writes a single enabled `http` tool-server descriptor into `root`, the
/// on-disk shape `RegistryStore::new` scans (mirrors the fixture helper in
/// `registry::store`'s own unit tests).
pub fn write_http_server(root: &std::path::Path, name: &str, url: &str) {
	let dir = root.join(name);
	std::fs::create_dir_all(&dir).unwrap();
	std::fs::write(dir.join("config.json"), json!({ "type": "http", "url": url }).to_string()).unwrap();
	std::fs::write(root.join("enabled"), format!("{name}\n")).unwrap();
}

/// Stands up a wiremock server speaking just enough MCP-over-HTTP to satisfy
/// `HttpAdapter::start`/`call_tool`: one tool named `tool_name`, and every
/// `tools/call` answered with `call_result_text`.
pub async fn mock_tool_server(tool_name: &str, call_result_text: &str) -> MockServer {
	let server = MockServer::start().await;
	let tool_name = tool_name.to_string();
	let call_result_text = call_result_text.to_string();

	Mock::given(wiremock::matchers::method("POST"))
		.respond_with(move |request: &wiremock::Request| {
			let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
			let rpc_method = body.get("method").and_then(Value::as_str).unwrap_or("");
			let result = match rpc_method {
				"tools/list" => json!({
					"tools": [{ "name": tool_name, "description": "a test tool", "inputSchema": {"type": "object"} }]
				}),
				"tools/call" => json!({
					"content": [{ "type": "text", "text": call_result_text }]
				}),
				_ => json!({}),
			};
			wiremock::ResponseTemplate::new(200).set_body_json(json!({
				"jsonrpc": "2.0",
				"id": 1,
				"result": result,
			}))
		})
		.mount(&server)
		.await;

	server
}

/// Builds a manager with one started server (from [`mock_tool_server`]) plus
/// an `Engine<OpenAiDialect>` pointed at `upstream`, with retries configured
/// from `retry_count`.
pub async fn engine_with_tool(upstream: &MockServer, tool_server: Option<&MockServer>, retry_count: u32) -> (tempfile::TempDir, Engine<OpenAiDialect>) {
	let dir = tempfile::tempdir().unwrap();
	if let Some(tool_server) = tool_server {
		write_http_server(dir.path(), "search", &tool_server.uri());
	}
	let registry = Arc::new(RegistryStore::new(dir.path()).unwrap());
	let manager = Arc::new(ToolServerManager::new(registry));
	manager.start_all_enabled().await;

	let dialect = OpenAiDialect::new(Client::new(), upstream.uri());
	let policy = RetryPolicy {
		attempts: retry_count,
		delay: Duration::from_millis(1),
	};
	let client = UpstreamClient::new(dialect, policy, Duration::from_secs(5));
	let engine = Engine::new(manager, Arc::new(client), 100, None);
	(dir, engine)
}
