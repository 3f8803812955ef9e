//! The shared conversation/message data model that both upstream dialects
//! map into and out of, and that the Iteration Engine rewrites in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in a conversation, in role order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
	System { content: String },
	User { content: String },
	Assistant(AssistantMessage),
	Tool(ToolResultMessage),
}

impl Message {
	pub fn assistant(msg: AssistantMessage) -> Self {
		Message::Assistant(msg)
	}

	pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
		Message::Tool(ToolResultMessage {
			tool_call_id: tool_call_id.into(),
			content: content.into(),
		})
	}

	/// `Some` when this message is a tool-result message, yielding its id and content.
	pub fn as_tool_result_mut(&mut self) -> Option<&mut ToolResultMessage> {
		match self {
			Message::Tool(t) => Some(t),
			_ => None,
		}
	}

	pub fn as_tool_result(&self) -> Option<&ToolResultMessage> {
		match self {
			Message::Tool(t) => Some(t),
			_ => None,
		}
	}
}

/// An assistant turn: visible text, hidden reasoning text, tool calls, and
/// per-part opaque reasoning signatures, all optional/empty depending on
/// what the upstream dialect actually returned.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
	/// Opaque per-part reasoning-signature blobs (Gemini `thoughtSignature`).
	/// Never interpreted, only deep-copied when re-emitted.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub reasoning_signatures: Vec<Value>,
}

impl AssistantMessage {
	pub fn has_tool_calls(&self) -> bool {
		!self.tool_calls.is_empty()
	}
}

/// A single tool call, assistant-scoped id plus its name and JSON arguments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	pub arguments: Value,
}

/// A tool-result message, keyed by the id of the originating tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
	pub tool_call_id: String,
	pub content: String,
}

/// Placeholder text substituted for all but the most recent tool-result
/// message in the working range of a conversation. See history rewriting.
pub const TOOL_RESULT_PLACEHOLDER: &str = "call complete";

/// A full conversation: an ordered message list.
pub type Conversation = Vec<Message>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tool_call_roundtrips_through_json() {
		let call = ToolCall {
			id: "call_1".into(),
			name: "search_web".into(),
			arguments: serde_json::json!({"q": "x"}),
		};
		let json = serde_json::to_string(&call).unwrap();
		let back: ToolCall = serde_json::from_str(&json).unwrap();
		assert_eq!(call, back);
	}

	#[test]
	fn assistant_message_omits_empty_fields() {
		let msg = AssistantMessage {
			content: Some("hi".into()),
			..Default::default()
		};
		let json = serde_json::to_value(&msg).unwrap();
		assert!(json.get("tool_calls").is_none());
		assert!(json.get("reasoning_content").is_none());
	}
}
