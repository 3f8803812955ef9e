//! Reasoning-trace accumulation (§4.5.4): across one request's iterations,
//! every reasoning-text fragment and every tool-call placeholder is kept in
//! issue order so the final reply carries a single, sequential trace.

use crate::conversation::ToolCall;

/// The placeholder format decided for both dialects uniformly (§9, open
/// question resolved): `「tool: <qualified-name>|args: <compact-json>」`.
pub fn render_tool_call_placeholder(tool_call: &ToolCall) -> String {
	let args = serde_json::to_string(&tool_call.arguments).unwrap_or_else(|_| "{}".to_string());
	format!("「tool: {}|args: {args}」", tool_call.name)
}

/// The synthetic envelope text for a batch of tool calls in streaming mode
/// (§4.5.3): each placeholder on its own line, the whole block surrounded
/// by blank lines so it reads as a single aside in the visible stream.
pub fn render_tool_call_block(tool_calls: &[ToolCall]) -> String {
	let lines: Vec<String> = tool_calls.iter().map(render_tool_call_placeholder).collect();
	format!("\n{}\n\n", lines.join("\n"))
}

#[derive(Debug, Default)]
pub struct ReasoningAccumulator {
	entries: Vec<String>,
}

impl ReasoningAccumulator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_reasoning(&mut self, text: &str) {
		if !text.is_empty() {
			self.entries.push(text.to_string());
		}
	}

	pub fn push_tool_calls(&mut self, tool_calls: &[ToolCall]) {
		for tool_call in tool_calls {
			self.entries.push(render_tool_call_placeholder(tool_call));
		}
	}

	/// `None` when nothing has been accumulated, so callers can leave the
	/// final reply's `reasoning_content` untouched rather than emitting an
	/// empty string.
	pub fn render(&self) -> Option<String> {
		if self.entries.is_empty() {
			None
		} else {
			Some(self.entries.join("\n"))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
		ToolCall {
			id: "call_1".into(),
			name: name.into(),
			arguments: args,
		}
	}

	#[test]
	fn placeholder_uses_the_decided_format() {
		let tc = tool_call("search_web_search", serde_json::json!({"q": "x"}));
		assert_eq!(render_tool_call_placeholder(&tc), "「tool: search_web_search|args: {\"q\":\"x\"}」");
	}

	#[test]
	fn accumulates_reasoning_and_placeholders_in_issue_order() {
		let mut accumulator = ReasoningAccumulator::new();
		accumulator.push_reasoning("thinking about it");
		accumulator.push_tool_calls(&[tool_call("search_web_search", serde_json::json!({"q": "x"}))]);
		accumulator.push_reasoning("now considering the result");

		let rendered = accumulator.render().unwrap();
		let thinking_at = rendered.find("thinking about it").unwrap();
		let tool_at = rendered.find("「tool:").unwrap();
		let considering_at = rendered.find("now considering the result").unwrap();
		assert!(thinking_at < tool_at);
		assert!(tool_at < considering_at);
	}

	#[test]
	fn empty_accumulator_renders_none() {
		assert_eq!(ReasoningAccumulator::new().render(), None);
	}
}
