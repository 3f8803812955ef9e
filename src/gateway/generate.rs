//! The Gemini-shaped inbound surface: `POST
//! /v1beta/models/{model}:generateContent` and `:streamGenerateContent`
//! (§6, §10.4). Both actions share one route because the model id and the
//! action are packed into a single path segment the way the real API does
//! it; the handler splits on the `:` itself rather than leaning on the
//! router to do it.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::auth;
use super::sse::into_sse_response;
use super::AppState;
use crate::conversation::{AssistantMessage, Conversation, Message, ToolCall};
use crate::engine::{EngineOutcome, MAX_ITERATIONS_MARKER};
use crate::error::GatewayError;
use crate::upstream::Envelope;

#[derive(Debug, Deserialize)]
pub struct GenerateContentRequest {
	pub contents: Vec<InboundContent>,
	#[serde(default)]
	pub system_instruction: Option<InboundContent>,
	#[serde(default)]
	pub tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct InboundContent {
	#[serde(default)]
	pub role: Option<String>,
	pub parts: Vec<InboundPart>,
}

#[derive(Debug, Deserialize)]
pub struct InboundPart {
	#[serde(default)]
	pub text: Option<String>,
	#[serde(rename = "functionCall", default)]
	pub function_call: Option<InboundFunctionCall>,
	#[serde(rename = "functionResponse", default)]
	pub function_response: Option<InboundFunctionResponse>,
}

#[derive(Debug, Deserialize)]
pub struct InboundFunctionCall {
	pub name: String,
	#[serde(default)]
	pub args: Value,
}

#[derive(Debug, Deserialize)]
pub struct InboundFunctionResponse {
	pub name: String,
	#[serde(default)]
	pub response: Value,
}

impl GenerateContentRequest {
	fn into_conversation(self) -> (Conversation, Option<String>) {
		let system_instruction = self.system_instruction.map(|c| flatten_text(&c.parts));
		let mut conversation = Conversation::new();
		for content in self.contents {
			let is_model = content.role.as_deref() == Some("model");
			let has_function_response = content.parts.iter().any(|p| p.function_response.is_some());

			if has_function_response {
				for part in &content.parts {
					if let Some(response) = &part.function_response {
						conversation.push(Message::tool_result(response.name.clone(), response.response.to_string()));
					}
				}
				continue;
			}

			if is_model {
				let text = flatten_text(&content.parts);
				let tool_calls = content
					.parts
					.iter()
					.filter_map(|p| p.function_call.as_ref())
					.map(|fc| ToolCall {
						id: format!("call_{}", uuid::Uuid::new_v4()),
						name: fc.name.clone(),
						arguments: fc.args.clone(),
					})
					.collect();
				conversation.push(Message::assistant(AssistantMessage {
					content: (!text.is_empty()).then_some(text),
					tool_calls,
					..Default::default()
				}));
			} else {
				conversation.push(Message::User { content: flatten_text(&content.parts) });
			}
		}
		(conversation, system_instruction)
	}
}

fn flatten_text(parts: &[InboundPart]) -> String {
	parts.iter().filter_map(|p| p.text.as_deref()).collect::<Vec<_>>().join("")
}

pub async fn dispatch(State(state): State<AppState>, Path(model_action): Path<String>, headers: HeaderMap, Json(body): Json<GenerateContentRequest>) -> Result<Response, GatewayError> {
	let (model, action) = model_action
		.split_once(':')
		.ok_or_else(|| GatewayError::BadRequest(format!("expected '<model>:<action>', got '{model_action}'")))?;

	let engine = state.gemini.as_ref().ok_or_else(|| GatewayError::BadRequest("gemini dialect not configured".into()))?;

	let caller_key = auth::extract_caller_key(&headers)?;
	let access_keys = &state.settings.access_keys;
	let server_key = state.settings.gemini.as_ref().and_then(|s| s.server_key.as_deref());
	let api_key = auth::resolve_upstream_key(access_keys, caller_key, server_key)?;

	let tools = body.tools.clone();
	let (conversation, system_instruction) = body.into_conversation();

	match action {
		"streamGenerateContent" => {
			let engine_stream = engine.run_streaming(conversation, tools, system_instruction.as_deref(), model, api_key);
			Ok(into_sse_response(engine_stream, render_chunk))
		}
		"generateContent" => {
			let outcome = engine.run_buffered(conversation, &tools, system_instruction.as_deref(), model, &api_key).await?;
			Ok(Json(render_response(outcome)).into_response())
		}
		other => Err(GatewayError::BadRequest(format!("unsupported action '{other}'"))),
	}
}

fn render_response(outcome: EngineOutcome) -> Value {
	let (message, metadata, finish_reason) = match outcome {
		EngineOutcome::Final { message, metadata } => (message, metadata, "STOP"),
		EngineOutcome::ClientToolCalls { message, metadata } => (message, metadata, "TOOL_CALLS"),
		EngineOutcome::IterationCapExceeded => (
			AssistantMessage {
				content: Some(MAX_ITERATIONS_MARKER.to_string()),
				..Default::default()
			},
			None,
			"STOP",
		),
	};
	serde_json::json!({
		"candidates": [{ "content": render_content(&message), "finishReason": finish_reason }],
		"usageMetadata": metadata.unwrap_or(Value::Null),
	})
}

fn render_chunk(envelope: Envelope) -> Value {
	serde_json::json!({
		"candidates": [{
			"content": render_content(&envelope.assistant_delta),
			"finishReason": if envelope.finished { Some("STOP") } else { None },
		}],
	})
}

fn render_content(message: &AssistantMessage) -> Value {
	let mut parts = Vec::new();
	if let Some(text) = &message.reasoning_content {
		parts.push(serde_json::json!({ "text": text, "thought": true }));
	}
	if let Some(text) = &message.content {
		parts.push(serde_json::json!({ "text": text }));
	}
	for (index, tool_call) in message.tool_calls.iter().enumerate() {
		let mut part = serde_json::json!({ "functionCall": { "name": tool_call.name, "args": tool_call.arguments } });
		if let Some(signature) = message.reasoning_signatures.get(index).and_then(|v| v.as_str()) {
			part["thoughtSignature"] = Value::String(signature.to_string());
		}
		parts.push(part);
	}
	serde_json::json!({ "role": "model", "parts": parts })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_system_instruction_out_of_contents() {
		let request = GenerateContentRequest {
			contents: vec![InboundContent {
				role: Some("user".into()),
				parts: vec![InboundPart {
					text: Some("hi".into()),
					function_call: None,
					function_response: None,
				}],
			}],
			system_instruction: Some(InboundContent {
				role: None,
				parts: vec![InboundPart {
					text: Some("be nice".into()),
					function_call: None,
					function_response: None,
				}],
			}),
			tools: Vec::new(),
		};
		let (conversation, system) = request.into_conversation();
		assert_eq!(system.as_deref(), Some("be nice"));
		assert_eq!(conversation.len(), 1);
	}

	#[test]
	fn converts_function_response_parts_to_tool_results() {
		let request = GenerateContentRequest {
			contents: vec![InboundContent {
				role: Some("user".into()),
				parts: vec![InboundPart {
					text: None,
					function_call: None,
					function_response: Some(InboundFunctionResponse {
						name: "call_1".into(),
						response: serde_json::json!({"content": "done"}),
					}),
				}],
			}],
			system_instruction: None,
			tools: Vec::new(),
		};
		let (conversation, _) = request.into_conversation();
		let Message::Tool(tool) = &conversation[0] else { panic!("expected tool message") };
		assert_eq!(tool.tool_call_id, "call_1");
	}
}
