//! SSE transport: the POST is always treated as returning a full SSE
//! stream, parsed per the standard event-stream framing rules rather than
//! the line-by-line shortcut the http adapter uses for its SSE branch.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;

use super::{Adapter, Tool, TransportError};
use crate::mcp::protocol::{self, JsonRpcRequest, JsonRpcResponse, RawTool};
use crate::registry::ServerRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// One parsed SSE event: its `data:` lines joined with newlines, plus the
/// `event:`/`id:`/`retry:` fields if present. Only `data` is interpreted by
/// this adapter; the others are parsed to honor the framing rules but are
/// not otherwise consumed.
#[derive(Debug, Default, Clone)]
struct SseEvent {
	#[allow(dead_code)]
	event: Option<String>,
	data: String,
	#[allow(dead_code)]
	id: Option<String>,
	#[allow(dead_code)]
	retry: Option<String>,
}

/// Splits a full SSE response body into events, a blank line delimiting
/// each one.
fn parse_events(body: &str) -> Vec<SseEvent> {
	let mut events = Vec::new();
	let mut current = SseEvent::default();
	let mut data_lines: Vec<&str> = Vec::new();
	let mut has_field = false;

	let mut flush = |current: &mut SseEvent, data_lines: &mut Vec<&str>, has_field: &mut bool, events: &mut Vec<SseEvent>| {
		if *has_field {
			current.data = data_lines.join("\n");
			events.push(std::mem::take(current));
		}
		data_lines.clear();
		*has_field = false;
	};

	for line in body.lines() {
		if line.is_empty() {
			flush(&mut current, &mut data_lines, &mut has_field, &mut events);
			continue;
		}
		has_field = true;
		if let Some(rest) = line.strip_prefix("data:") {
			data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
		} else if let Some(rest) = line.strip_prefix("event:") {
			current.event = Some(rest.trim().to_string());
		} else if let Some(rest) = line.strip_prefix("id:") {
			current.id = Some(rest.trim().to_string());
		} else if let Some(rest) = line.strip_prefix("retry:") {
			current.retry = Some(rest.trim().to_string());
		}
	}
	flush(&mut current, &mut data_lines, &mut has_field, &mut events);
	events
}

/// Parses the events and returns the last one carrying `result` or `error`.
fn last_outcome(body: &str) -> Option<JsonRpcResponse> {
	let mut last = None;
	for event in parse_events(body) {
		if event.data.is_empty() {
			continue;
		}
		if let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(&event.data) {
			if parsed.carries_outcome() {
				last = Some(parsed);
			}
		}
	}
	last
}

pub struct SseAdapter {
	url: String,
	headers: Option<HashMap<String, String>>,
	client: Client,
	session_id: Mutex<Option<String>>,
	tools: Mutex<Vec<Tool>>,
}

impl SseAdapter {
	pub fn new(record: &ServerRecord) -> Result<Self, TransportError> {
		let url = record.url.clone().ok_or(TransportError::MissingField("url"))?;
		Ok(SseAdapter {
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
			.header(reqwest::header::ACCEPT, "text/event-stream")
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
		let body = response.text().await.map_err(TransportError::Http)?;
		if !status.is_success() {
			return Err(TransportError::MalformedResponse(format!("status {status}: {body}")));
		}
		Ok(last_outcome(&body))
	}
}

#[async_trait]
impl Adapter for SseAdapter {
	async fn start(&self) -> Result<(), TransportError> {
		if !self.tools.lock().is_empty() {
			return Ok(());
		}

		self.send_request("initialize", protocol::initialize_params()).await?;
		self.send_request("notifications/initialized", serde_json::json!({})).await.ok();

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
	fn joins_multiline_data_with_newlines() {
		let body = "data: line one\ndata: line two\n\n";
		let events = parse_events(body);
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].data, "line one\nline two");
	}

	#[test]
	fn blank_line_delimits_multiple_events() {
		let body = "event: message\ndata: {\"a\":1}\n\ndata: {\"b\":2}\n\n";
		let events = parse_events(body);
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].event.as_deref(), Some("message"));
	}

	#[test]
	fn last_outcome_wins_over_earlier_ones() {
		let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"a\":1}}\n\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"a\":2}}\n\n";
		let outcome = last_outcome(body).unwrap();
		assert_eq!(outcome.result.unwrap()["a"], 2);
	}
}
