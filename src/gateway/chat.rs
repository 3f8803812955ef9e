//! The OpenAI-shaped inbound surface: `POST /v1/chat/completions` and
//! `GET /v1/models` (§6, §10.4).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
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
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionsRequest {
	pub model: String,
	pub messages: Vec<InboundMessage>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default)]
	pub tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum InboundMessage {
	System { content: String },
	User { content: String },
	Assistant {
		#[serde(default)]
		content: Option<String>,
		#[serde(default)]
		tool_calls: Option<Vec<InboundToolCall>>,
	},
	Tool { content: String, tool_call_id: String },
}

#[derive(Debug, Deserialize)]
pub struct InboundToolCall {
	pub id: String,
	pub function: InboundFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct InboundFunctionCall {
	pub name: String,
	pub arguments: String,
}

impl ChatCompletionsRequest {
	/// Splits inbound messages into the working conversation plus any
	/// system-role text, which travels separately as the Engine's
	/// `system_instruction` rather than living in the conversation itself
	/// (§4.5.5 composes it with the configured prompt).
	fn into_conversation(self) -> (Conversation, Option<String>) {
		let mut conversation = Conversation::new();
		let mut system = Vec::new();
		for message in self.messages {
			match message {
				InboundMessage::System { content } => system.push(content),
				InboundMessage::User { content } => conversation.push(Message::User { content }),
				InboundMessage::Assistant { content, tool_calls } => {
					let tool_calls = tool_calls
						.unwrap_or_default()
						.into_iter()
						.map(|tc| ToolCall {
							id: tc.id,
							name: tc.function.name,
							arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
						})
						.collect();
					conversation.push(Message::assistant(AssistantMessage {
						content,
						tool_calls,
						..Default::default()
					}));
				}
				InboundMessage::Tool { content, tool_call_id } => conversation.push(Message::tool_result(tool_call_id, content)),
			}
		}
		let system_instruction = (!system.is_empty()).then(|| system.join("\n\n"));
		(conversation, system_instruction)
	}
}

pub async fn completions(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<ChatCompletionsRequest>) -> Result<Response, GatewayError> {
	let engine = state.openai.as_ref().ok_or_else(|| GatewayError::BadRequest("openai dialect not configured".into()))?;

	let caller_key = auth::extract_caller_key(&headers)?;
	let access_keys = &state.settings.access_keys;
	let server_key = state.settings.openai.as_ref().and_then(|s| s.server_key.as_deref());
	let api_key = auth::resolve_upstream_key(access_keys, caller_key, server_key)?;

	let model = body.model.clone();
	let tools = body.tools.clone();
	let stream = body.stream;
	let (conversation, system_instruction) = body.into_conversation();

	if stream {
		let engine_stream = engine.run_streaming(conversation, tools, system_instruction.as_deref(), &model, api_key);
		let model_for_chunks = model.clone();
		return Ok(into_sse_response(engine_stream, move |envelope| render_chunk(&model_for_chunks, envelope)));
	}

	let outcome = engine.run_buffered(conversation, &tools, system_instruction.as_deref(), &model, &api_key).await?;
	Ok(Json(render_completion(&model, outcome)).into_response())
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
	let mut models = Vec::new();
	if let Some(openai) = &state.settings.openai {
		models.push(serde_json::json!({ "id": openai.base_url, "object": "model" }));
	}
	Json(serde_json::json!({ "object": "list", "data": models }))
}

fn render_completion(model: &str, outcome: EngineOutcome) -> Value {
	let (message, metadata, finish_reason) = match outcome {
		EngineOutcome::Final { message, metadata } => (message, metadata, "stop"),
		EngineOutcome::ClientToolCalls { message, metadata } => (message, metadata, "tool_calls"),
		EngineOutcome::IterationCapExceeded => (
			AssistantMessage {
				content: Some(MAX_ITERATIONS_MARKER.to_string()),
				..Default::default()
			},
			None,
			"stop",
		),
	};

	serde_json::json!({
		"id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
		"object": "chat.completion",
		"created": unix_now(),
		"model": model,
		"choices": [{
			"index": 0,
			"message": render_message(&message),
			"finish_reason": finish_reason,
		}],
		"usage": metadata.unwrap_or(Value::Null),
	})
}

fn render_message(message: &AssistantMessage) -> Value {
	let tool_calls: Vec<Value> = message
		.tool_calls
		.iter()
		.map(|tc| {
			serde_json::json!({
				"id": tc.id,
				"type": "function",
				"function": { "name": tc.name, "arguments": tc.arguments.to_string() },
			})
		})
		.collect();
	serde_json::json!({
		"role": "assistant",
		"content": message.content,
		"reasoning_content": message.reasoning_content,
		"tool_calls": if tool_calls.is_empty() { Value::Null } else { Value::Array(tool_calls) },
	})
}

fn render_chunk(model: &str, envelope: Envelope) -> Value {
	let delta = render_message(&envelope.assistant_delta);
	serde_json::json!({
		"id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
		"object": "chat.completion.chunk",
		"created": unix_now(),
		"model": model,
		"choices": [{
			"index": 0,
			"delta": delta,
			"finish_reason": if envelope.finished { Some("stop") } else { None },
		}],
	})
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
