//! JSON-RPC 2.0 wire types for the MCP subset this system speaks:
//! `initialize`, `notifications/initialized`, `tools/list`, `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "mcprelay";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
	pub jsonrpc: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<i64>,
	pub method: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub params: Option<Value>,
}

impl JsonRpcRequest {
	pub fn call(id: i64, method: impl Into<String>, params: Value) -> Self {
		JsonRpcRequest {
			jsonrpc: "2.0",
			id: Some(id),
			method: method.into(),
			params: Some(params),
		}
	}

	/// A notification: no id, no reply expected.
	pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
		JsonRpcRequest {
			jsonrpc: "2.0",
			id: None,
			method: method.into(),
			params,
		}
	}

	pub fn is_notification(&self) -> bool {
		self.id.is_none()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
	#[serde(default)]
	pub id: Option<Value>,
	#[serde(default)]
	pub result: Option<Value>,
	#[serde(default)]
	pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
	pub fn carries_outcome(&self) -> bool {
		self.result.is_some() || self.error.is_some()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
	pub code: i64,
	pub message: String,
	#[serde(default)]
	pub data: Option<Value>,
}

/// A tool descriptor as returned by `tools/list`, before the Manager
/// qualifies its name with the owning server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTool {
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default, rename = "inputSchema")]
	pub input_schema: Value,
}

/// A monotonically increasing id generator, one per live connection, as
/// the stdio adapter's original source increments a per-connection counter
/// rather than using a process-wide or random id.
#[derive(Debug, Default)]
pub struct RequestIdGenerator(AtomicI64);

impl RequestIdGenerator {
	pub fn next(&self) -> i64 {
		self.0.fetch_add(1, Ordering::Relaxed) + 1
	}
}

pub fn initialize_params() -> Value {
	serde_json::json!({
		"protocolVersion": PROTOCOL_VERSION,
		"capabilities": { "tools": {} },
		"clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
	})
}

/// Concatenates the `text` fragments of a `tools/call` result's `content`
/// array, or renders the JSON-RPC error into the formatted text the Engine
/// appends as a tool-result message.
pub fn render_call_result(response: &JsonRpcResponse) -> String {
	if let Some(result) = &response.result {
		let empty = Vec::new();
		let content = result.get("content").and_then(|c| c.as_array()).unwrap_or(&empty);
		let mut text_parts = Vec::new();
		for item in content {
			if item.get("type").and_then(|t| t.as_str()) == Some("text") {
				text_parts.push(item.get("text").and_then(|t| t.as_str()).unwrap_or("").to_string());
			}
		}
		if text_parts.is_empty() {
			serde_json::to_string(content).unwrap_or_default()
		} else {
			text_parts.join("\n")
		}
	} else if let Some(error) = &response.error {
		format!("error: {}", error.message)
	} else {
		String::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_concatenated_text_fragments() {
		let response = JsonRpcResponse {
			id: Some(Value::from(1)),
			result: Some(serde_json::json!({
				"content": [
					{"type": "text", "text": "a"},
					{"type": "text", "text": "b"},
				]
			})),
			error: None,
		};
		assert_eq!(render_call_result(&response), "a\nb");
	}

	#[test]
	fn renders_error_message() {
		let response = JsonRpcResponse {
			id: Some(Value::from(1)),
			result: None,
			error: Some(JsonRpcError {
				code: -32000,
				message: "boom".into(),
				data: None,
			}),
		};
		assert_eq!(render_call_result(&response), "error: boom");
	}

	#[test]
	fn request_ids_increase_monotonically() {
		let gen = RequestIdGenerator::default();
		assert_eq!(gen.next(), 1);
		assert_eq!(gen.next(), 2);
		assert_eq!(gen.next(), 3);
	}
}
