//! The Gemini generateContent dialect: wire shapes, the mapping to and
//! from the shared conversation/tool data model, and the opaque
//! `thoughtSignature` pass-through (§9 "Opaque reasoning signatures").

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Dialect, Envelope, EnvelopeStream, Request, UpstreamError};
use crate::conversation::{AssistantMessage, Message, ToolCall};

pub struct GeminiDialect {
	client: Client,
	base_url: String,
}

impl GeminiDialect {
	pub fn new(client: Client, base_url: impl Into<String>) -> Self {
		GeminiDialect {
			client,
			base_url: base_url.into(),
		}
	}

	fn build_body(&self, request: &Request<'_>) -> GenerateContentRequest {
		let mut contents = Vec::new();
		for message in request.conversation {
			if let Message::System { .. } = message {
				continue;
			}
			contents.push(convert_message(message));
		}

		let system_instruction = request.system_instruction.map(|s| GeminiContent {
			role: None,
			parts: vec![GeminiPart {
				text: Some(s.to_string()),
				..Default::default()
			}],
		});

		// Client-declared tools are added first and always win on a name
		// collision; see the OpenAI dialect for the same rule.
		let mut declarations: Vec<GeminiFunctionDeclaration> = request
			.client_tools
			.iter()
			.filter_map(|value| serde_json::from_value::<GeminiFunctionDeclaration>(value.clone()).ok())
			.collect();
		for manager_tool in request.tools {
			if declarations.iter().any(|d| d.name == manager_tool.qualified_name) {
				continue;
			}
			declarations.push(GeminiFunctionDeclaration {
				name: manager_tool.qualified_name.clone(),
				description: Some(manager_tool.description.clone()),
				parameters: manager_tool.input_schema.clone(),
			});
		}
		let tools = (!declarations.is_empty()).then_some(vec![GeminiTool {
			function_declarations: declarations,
		}]);

		GenerateContentRequest {
			contents,
			tools,
			system_instruction,
		}
	}

	fn endpoint(&self, model: &str, stream: bool) -> String {
		if stream {
			format!("{}/models/{model}:streamGenerateContent?alt=sse", self.base_url)
		} else {
			format!("{}/models/{model}:generateContent", self.base_url)
		}
	}
}

#[async_trait]
impl Dialect for GeminiDialect {
	async fn send_buffered(&self, request: Request<'_>) -> Result<Envelope, UpstreamError> {
		let url = self.endpoint(request.model, false);
		let body = self.build_body(&request);
		let response = self
			.client
			.post(&url)
			.header("x-goog-api-key", request.api_key)
			.json(&body)
			.send()
			.await
			.map_err(|e| UpstreamError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.json::<serde_json::Value>().await.unwrap_or_default();
			return Err(UpstreamError::Status { status, body });
		}

		let parsed: GenerateContentResponse = response.json().await.map_err(|e| UpstreamError::Network(e.to_string()))?;
		let candidate = parsed.candidates.unwrap_or_default().into_iter().next().unwrap_or_default();
		let assistant_delta = convert_candidate(&candidate);

		Ok(Envelope {
			assistant_delta,
			metadata: Some(serde_json::json!({ "usage": parsed.usage_metadata, "finishReason": candidate.finish_reason })),
			finished: true,
		})
	}

	async fn send_streamed(&self, request: Request<'_>) -> Result<EnvelopeStream, UpstreamError> {
		let url = self.endpoint(request.model, true);
		let body = self.build_body(&request);
		let response = self
			.client
			.post(&url)
			.header("x-goog-api-key", request.api_key)
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

		let mapped = event_stream.map(|event| {
			let event = event.map_err(|e| UpstreamError::Stream(e.to_string()))?;
			let chunk: GenerateContentResponse = serde_json::from_str(&event.data).map_err(|e| UpstreamError::Stream(e.to_string()))?;
			let candidate = chunk.candidates.unwrap_or_default().into_iter().next().unwrap_or_default();
			let finished = matches!(candidate.finish_reason.as_deref(), Some("STOP") | Some("MAX_TOKENS") | Some("TOOL_CALLS"));
			let assistant_delta = convert_candidate(&candidate);
			Ok(Envelope {
				assistant_delta,
				metadata: Some(serde_json::json!({ "usage": chunk.usage_metadata, "finishReason": candidate.finish_reason })),
				finished,
			})
		});

		Ok(Box::pin(mapped))
	}
}

fn convert_message(message: &Message) -> GeminiContent {
	match message {
		Message::System { content } => GeminiContent {
			role: Some("user".into()),
			parts: vec![GeminiPart {
				text: Some(content.clone()),
				..Default::default()
			}],
		},
		Message::User { content } => GeminiContent {
			role: Some("user".into()),
			parts: vec![GeminiPart {
				text: Some(content.clone()),
				..Default::default()
			}],
		},
		Message::Assistant(assistant) => {
			let mut parts = Vec::new();
			if let Some(content) = &assistant.content {
				parts.push(GeminiPart {
					text: Some(content.clone()),
					..Default::default()
				});
			}
			for (index, tool_call) in assistant.tool_calls.iter().enumerate() {
				// Deep-copy the opaque signature rather than alias the
				// upstream-provided `Value`, per §9.
				let signature = assistant
					.reasoning_signatures
					.get(index)
					.and_then(|v| v.as_str())
					.map(|s| s.to_string());
				parts.push(GeminiPart {
					thought_signature: signature,
					function_call: Some(GeminiFunctionCall {
						name: tool_call.name.clone(),
						args: tool_call.arguments.clone(),
					}),
					..Default::default()
				});
			}
			GeminiContent {
				role: Some("model".into()),
				parts,
			}
		}
		Message::Tool(tool) => GeminiContent {
			role: Some("user".into()),
			parts: vec![GeminiPart {
				function_response: Some(GeminiFunctionResponse {
					name: tool.tool_call_id.clone(),
					response: serde_json::json!({ "content": tool.content }),
				}),
				..Default::default()
			}],
		},
	}
}

fn convert_candidate(candidate: &GeminiCandidate) -> AssistantMessage {
	let Some(content) = &candidate.content else {
		return AssistantMessage::default();
	};

	let mut assistant = AssistantMessage::default();
	for part in &content.parts {
		if let Some(function_call) = &part.function_call {
			let signature = part.thought_signature.clone();
			assistant.reasoning_signatures.push(signature.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null));
			assistant.tool_calls.push(ToolCall {
				// Gemini has no per-call id of its own; a function response is
				// correlated back to its call by function name alone, so the
				// name doubles as the id the engine round-trips through
				// `Message::tool_result` (see `convert_message`'s `Tool` arm).
				id: function_call.name.clone(),
				name: function_call.name.clone(),
				arguments: function_call.args.clone(),
			});
			continue;
		}
		if let Some(text) = &part.text {
			if part.thought == Some(true) {
				let existing = assistant.reasoning_content.get_or_insert_with(String::new);
				existing.push_str(text);
			} else {
				let existing = assistant.content.get_or_insert_with(String::new);
				existing.push_str(text);
			}
		}
	}
	assistant
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
	contents: Vec<GeminiContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	tools: Option<Vec<GeminiTool>>,
	#[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
	system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct GeminiContent {
	#[serde(skip_serializing_if = "Option::is_none")]
	role: Option<String>,
	parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct GeminiPart {
	#[serde(rename = "thought", skip_serializing_if = "Option::is_none")]
	thought: Option<bool>,
	#[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
	thought_signature: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	text: Option<String>,
	#[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
	function_call: Option<GeminiFunctionCall>,
	#[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
	function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
	name: String,
	#[serde(default)]
	args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionResponse {
	name: String,
	response: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
	#[serde(rename = "functionDeclarations")]
	function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionDeclaration {
	name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	description: Option<String>,
	parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
	#[serde(default)]
	candidates: Option<Vec<GeminiCandidate>>,
	#[serde(rename = "usageMetadata", default)]
	usage_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct GeminiCandidate {
	#[serde(default)]
	content: Option<GeminiContent>,
	#[serde(rename = "finishReason", default)]
	finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deep_copies_thought_signature_not_aliasing() {
		let mut assistant = AssistantMessage {
			tool_calls: vec![ToolCall {
				id: "call_1".into(),
				name: "search".into(),
				arguments: serde_json::json!({}),
			}],
			..Default::default()
		};
		assistant.reasoning_signatures.push(serde_json::Value::String("sig-abc".into()));
		let content = convert_message(&Message::assistant(assistant.clone()));
		let part = &content.parts[0];
		assert_eq!(part.thought_signature.as_deref(), Some("sig-abc"));

		// Mutating the original does not affect the converted copy.
		assistant.reasoning_signatures[0] = serde_json::Value::String("mutated".into());
		assert_eq!(part.thought_signature.as_deref(), Some("sig-abc"));
	}

	#[test]
	fn tool_call_id_is_the_function_name_for_round_tripping() {
		let candidate = GeminiCandidate {
			content: Some(GeminiContent {
				role: Some("model".into()),
				parts: vec![GeminiPart {
					function_call: Some(GeminiFunctionCall {
						name: "search_search".into(),
						args: serde_json::json!({"q": "x"}),
					}),
					..Default::default()
				}],
			}),
			finish_reason: Some("TOOL_CALLS".into()),
		};
		let assistant = convert_candidate(&candidate);
		assert_eq!(assistant.tool_calls[0].id, "search_search");

		let tool_result = Message::tool_result(assistant.tool_calls[0].id.clone(), "ok".to_string());
		let content = convert_message(&tool_result);
		assert_eq!(content.parts[0].function_response.as_ref().unwrap().name, "search_search");
	}

	#[test]
	fn separates_thought_text_from_visible_text() {
		let candidate = GeminiCandidate {
			content: Some(GeminiContent {
				role: Some("model".into()),
				parts: vec![
					GeminiPart {
						thought: Some(true),
						text: Some("thinking...".into()),
						..Default::default()
					},
					GeminiPart {
						text: Some("final answer".into()),
						..Default::default()
					},
				],
			}),
			finish_reason: Some("STOP".into()),
		};
		let assistant = convert_candidate(&candidate);
		assert_eq!(assistant.reasoning_content.as_deref(), Some("thinking..."));
		assert_eq!(assistant.content.as_deref(), Some("final answer"));
	}
}
