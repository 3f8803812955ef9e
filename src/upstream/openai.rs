//! The OpenAI chat-completions dialect: wire shapes and the mapping to and
//! from the shared conversation/tool data model.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Dialect, Envelope, EnvelopeStream, Request, ToolCallAssembler, UpstreamError};
use crate::conversation::{AssistantMessage, Message, ToolCall};

pub struct OpenAiDialect {
	client: Client,
	base_url: String,
}

impl OpenAiDialect {
	pub fn new(client: Client, base_url: impl Into<String>) -> Self {
		OpenAiDialect {
			client,
			base_url: base_url.into(),
		}
	}

	fn build_body(&self, request: &Request<'_>, stream: bool) -> ChatCompletionRequest {
		let mut messages: Vec<ChatMessage> = Vec::new();
		if let Some(system) = request.system_instruction {
			messages.push(ChatMessage::System { content: system.to_string() });
		}
		for message in request.conversation {
			messages.push(convert_message(message));
		}

		// Client-declared tools are added first and always win on a name
		// collision: manager tools are filtered out rather than skipped,
		// so a client redeclaration of a manager tool's name shadows it.
		let mut tools: Vec<OpenAiTool> = request
			.client_tools
			.iter()
			.filter_map(|value| serde_json::from_value::<OpenAiTool>(value.clone()).ok())
			.collect();
		for manager_tool in request.tools {
			if tools.iter().any(|t| t.function.name == manager_tool.qualified_name) {
				continue;
			}
			tools.push(OpenAiTool {
				tool_type: "function",
				function: OpenAiFunction {
					name: manager_tool.qualified_name.clone(),
					description: manager_tool.description.clone(),
					parameters: manager_tool.input_schema.clone(),
				},
			});
		}

		ChatCompletionRequest {
			model: request.model.to_string(),
			messages,
			stream,
			stream_options: stream.then_some(StreamOptions { include_usage: true }),
			tools: (!tools.is_empty()).then_some(tools),
		}
	}
}

#[async_trait]
impl Dialect for OpenAiDialect {
	async fn send_buffered(&self, request: Request<'_>) -> Result<Envelope, UpstreamError> {
		let body = self.build_body(&request, false);
		let response = self
			.client
			.post(&self.base_url)
			.bearer_auth(request.api_key)
			.json(&body)
			.send()
			.await
			.map_err(|e| UpstreamError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.json::<serde_json::Value>().await.unwrap_or_default();
			return Err(UpstreamError::Status { status, body });
		}

		let parsed: ChatCompletionResponse = response.json().await.map_err(|e| UpstreamError::Network(e.to_string()))?;
		let choice = parsed.choices.into_iter().next().unwrap_or_default();
		let assistant_delta = convert_assistant(choice.message);
		Ok(Envelope {
			assistant_delta,
			metadata: Some(serde_json::json!({
				"id": parsed.id,
				"model": parsed.model,
				"usage": parsed.usage,
			})),
			finished: true,
		})
	}

	async fn send_streamed(&self, request: Request<'_>) -> Result<EnvelopeStream, UpstreamError> {
		let body = self.build_body(&request, true);
		let response = self
			.client
			.post(&self.base_url)
			.bearer_auth(request.api_key)
			.json(&body)
			.send()
			.await
			.map_err(|e| UpstreamError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.json::<serde_json::Value>().await.unwrap_or_default();
			return Err(UpstreamError::Status { status, body });
		}

		let byte_stream = response.bytes_stream();
		let event_stream = byte_stream.eventsource();

		let mapped = event_stream.scan(
			(ToolCallAssembler::new(), std::collections::HashMap::<usize, String>::new()),
			|(assembler, index_to_id), event| {
				let event = match event {
					Ok(event) => event,
					Err(err) => return std::future::ready(Some(Err(UpstreamError::Stream(err.to_string())))),
				};
				if event.data == "[DONE]" {
					return std::future::ready(None);
				}
				let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
					Ok(chunk) => chunk,
					Err(err) => return std::future::ready(Some(Err(UpstreamError::Stream(err.to_string())))),
				};
				if let Some(error) = chunk.error {
					return std::future::ready(Some(Err(UpstreamError::Stream(error))));
				}

				let Some(choice) = chunk.choices.into_iter().next() else {
					return std::future::ready(Some(Ok(Envelope::default())));
				};

				let mut assistant_delta = AssistantMessage::default();
				if let Some(content) = choice.delta.content {
					assistant_delta.content = Some(content);
				}
				if let Some(deltas) = choice.delta.tool_calls {
					for delta in deltas {
						if let Some(id) = &delta.id {
							index_to_id.insert(delta.index, id.clone());
						}
						let id = index_to_id.get(&delta.index).cloned();
						assembler.process_delta(
							delta.index,
							id.as_deref(),
							delta.function.as_ref().and_then(|f| f.name.as_deref()),
							delta.function.as_ref().and_then(|f| f.arguments.as_deref()),
						);
					}
				}

				let finished = choice.finish_reason.is_some();
				if finished && !assembler.is_empty() {
					let taken = std::mem::take(assembler);
					assistant_delta.tool_calls = taken.into_tool_calls();
				}

				std::future::ready(Some(Ok(Envelope {
					assistant_delta,
					metadata: chunk.usage.map(|u| serde_json::json!({"usage": u})),
					finished,
				})))
			},
		);

		Ok(Box::pin(mapped))
	}
}

fn convert_message(message: &Message) -> ChatMessage {
	match message {
		Message::System { content } => ChatMessage::System { content: content.clone() },
		Message::User { content } => ChatMessage::User { content: content.clone() },
		Message::Assistant(assistant) => ChatMessage::Assistant {
			content: assistant.content.clone(),
			tool_calls: (!assistant.tool_calls.is_empty()).then(|| {
				assistant
					.tool_calls
					.iter()
					.map(|tc| OpenAiToolCall {
						id: tc.id.clone(),
						tool_type: "function",
						function: OpenAiFunctionCall {
							name: tc.name.clone(),
							arguments: tc.arguments.to_string(),
						},
					})
					.collect()
			}),
		},
		Message::Tool(tool) => ChatMessage::Tool {
			content: tool.content.clone(),
			tool_call_id: tool.tool_call_id.clone(),
		},
	}
}

fn convert_assistant(message: AssistantChatMessage) -> AssistantMessage {
	AssistantMessage {
		content: message.content,
		reasoning_content: None,
		tool_calls: message
			.tool_calls
			.unwrap_or_default()
			.into_iter()
			.map(|tc| ToolCall {
				id: tc.id,
				name: tc.function.name,
				arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
			})
			.collect(),
		reasoning_signatures: Vec::new(),
	}
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
	model: String,
	messages: Vec<ChatMessage>,
	stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	stream_options: Option<StreamOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
	include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiTool {
	#[serde(rename = "type")]
	tool_type: &'static str,
	function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiFunction {
	name: String,
	description: String,
	parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage {
	System {
		content: String,
	},
	User {
		content: String,
	},
	Assistant {
		#[serde(skip_serializing_if = "Option::is_none")]
		content: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		tool_calls: Option<Vec<OpenAiToolCall>>,
	},
	Tool {
		content: String,
		tool_call_id: String,
	},
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiToolCall {
	id: String,
	#[serde(rename = "type")]
	tool_type: &'static str,
	function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiFunctionCall {
	name: String,
	arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
	id: String,
	model: String,
	choices: Vec<Choice>,
	#[serde(default)]
	usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct Choice {
	message: AssistantChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct AssistantChatMessage {
	#[serde(default)]
	content: Option<String>,
	#[serde(default)]
	tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
	id: String,
	function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
	name: String,
	arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
	#[serde(default)]
	choices: Vec<ChunkChoice>,
	#[serde(default)]
	usage: Option<serde_json::Value>,
	#[serde(default)]
	error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
	delta: Delta,
	#[serde(default)]
	finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
	#[serde(default)]
	content: Option<String>,
	#[serde(default)]
	tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
	index: usize,
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	arguments: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn converts_assistant_tool_calls_from_wire_shape() {
		let message = AssistantChatMessage {
			content: None,
			tool_calls: Some(vec![ResponseToolCall {
				id: "call_1".into(),
				function: ResponseFunctionCall {
					name: "search_web".into(),
					arguments: "{\"q\":\"x\"}".into(),
				},
			}]),
		};
		let assistant = convert_assistant(message);
		assert_eq!(assistant.tool_calls.len(), 1);
		assert_eq!(assistant.tool_calls[0].name, "search_web");
		assert_eq!(assistant.tool_calls[0].arguments, serde_json::json!({"q": "x"}));
	}

	#[test]
	fn converts_tool_result_message_to_wire_shape() {
		let message = Message::tool_result("call_1", "done");
		let wire = convert_message(&message);
		match wire {
			ChatMessage::Tool { content, tool_call_id } => {
				assert_eq!(content, "done");
				assert_eq!(tool_call_id, "call_1");
			}
			_ => panic!("expected tool message"),
		}
	}
}
