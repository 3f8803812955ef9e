//! HTTP request/response transport: POSTs each JSON-RPC frame and handles
//! all three response shapes a compliant MCP HTTP server may return.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{Adapter, Tool, TransportError};
use crate::mcp::protocol::{self, JsonRpcRequest, JsonRpcResponse, RawTool};
use crate::registry::ServerRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

pub struct HttpAdapter {
	url: String,
	headers: Option<HashMap<String, String>>,
	client: Client,
	session_id: Mutex<Option<String>>,
	tools: Mutex<Vec<Tool>>,
}

impl HttpAdapter {
	pub fn new(record: &ServerRecord) -> Result<Self, TransportError> {
		let url = record.url.clone().ok_or(TransportError::MissingField("url"))?;
		Ok(HttpAdapter {
			url,
			headers: record.headers.clone(),
			client: Client::builder()
				.timeout(REQUEST_TIMEOUT)
				.build()
				.map_err(TransportError::Http)?,
			session_id: Mutex::new(None),
			tools: Mutex::new(Vec::new()),
		})
	}

	async fn send_request(&self, method: &str, params: Value) -> Result<Option<JsonRpcResponse>, TransportError> {
		let request = JsonRpcRequest::call(1, method, params);
		let mut req = self
			.client
			.post(&self.url)
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.header(reqwest::header::ACCEPT, "application/json, text/event-stream")
			.json(&request);
		if let Some(headers) = &self.headers {
			for (k, v) in headers {
				req = req.header(k.as_str(), v.as_str());
			}
		}
		if let Some(session_id) = self.session_id.lock().clone() {
			req = req.header(SESSION_ID_HEADER, session_id);
		}

		let response = req.send().await.map_err(TransportError::Http)?;

		if let Some(session_id) = response.headers().get(SESSION_ID_HEADER) {
			if let Ok(session_id) = session_id.to_str() {
				*self.session_id.lock() = Some(session_id.to_string());
			}
		}

		let status = response.status();
		if status.as_u16() == 202 {
			return Ok(None);
		}

		let content_type = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or("")
			.to_string();

		if content_type.contains("text/event-stream") {
			let body = response.text().await.map_err(TransportError::Http)?;
			return Ok(parse_sse_body(&body));
		}

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			debug!(target: "mcprelay::transport", %status, %body, "mcp http request failed");
			return Err(TransportError::MalformedResponse(format!("status {status}: {body}")));
		}

		let parsed: JsonRpcResponse = response.json().await.map_err(TransportError::Http)?;
		Ok(Some(parsed))
	}
}

/// Parses an SSE response body and returns the last payload carrying
/// `result` or `error` (§4.2.2).
fn parse_sse_body(body: &str) -> Option<JsonRpcResponse> {
	let mut last = None;
	for line in body.lines() {
		let line = line.trim();
		if let Some(data) = line.strip_prefix("data:") {
			let data = data.trim();
			if data.is_empty() {
				continue;
			}
			if let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(data) {
				if parsed.carries_outcome() {
					last = Some(parsed);
				}
			}
		}
	}
	last
}

#[async_trait]
impl Adapter for HttpAdapter {
	async fn start(&self) -> Result<(), TransportError> {
		if !self.tools.lock().is_empty() {
			return Ok(());
		}

		let init = self.send_request("initialize", protocol::initialize_params()).await?;
		if init.as_ref().is_some_and(|r| r.carries_outcome()) {
			self.send_request("notifications/initialized", serde_json::json!({})).await.ok();
		}

		let list = self.send_request("tools/list", serde_json::json!({})).await?;
		let tools = list
			.as_ref()
			.and_then(|r| r.result.as_ref())
			.and_then(|r| r.get("tools"))
			.and_then(|t| serde_json::from_value::<Vec<RawTool>>(t.clone()).ok())
			.unwrap_or_default();
		*self.tools.lock() = tools
			.into_iter()
			.map(|t| Tool {
				local_name: t.name,
				description: t.description,
				input_schema: t.input_schema,
			})
			.collect();

		Ok(())
	}

	async fn stop(&self) {
		*self.session_id.lock() = None;
		self.tools.lock().clear();
	}

	fn tools(&self) -> Vec<Tool> {
		self.tools.lock().clone()
	}

	async fn call_tool(&self, local_name: &str, arguments: Value) -> Result<String, TransportError> {
		let response = self
			.send_request("tools/call", serde_json::json!({ "name": local_name, "arguments": arguments }))
			.await?;
		match response {
			Some(response) => Ok(protocol::render_call_result(&response)),
			None => Ok(String::new()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_last_outcome_carrying_event() {
		let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[]}}\n\ndata: {\"jsonrpc\":\"2.0\"}\n\n";
		let parsed = parse_sse_body(body).unwrap();
		assert!(parsed.result.is_some());
	}

	#[test]
	fn ignores_malformed_data_lines() {
		let body = "data: not json\n\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-1,\"message\":\"x\"}}\n\n";
		let parsed = parse_sse_body(body).unwrap();
		assert!(parsed.error.is_some());
	}
}
