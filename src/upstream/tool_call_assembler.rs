//! Assembles streamed tool-call fragments into complete tool calls.
//! Fragments arrive keyed by a per-call index; name and arguments are
//! concatenated in arrival order, and the id may land in any one fragment
//! for that index (§9 "Incremental tool-call assembly").

use indexmap::IndexMap;

use crate::conversation::ToolCall;

#[derive(Debug, Default)]
struct Partial {
	id: Option<String>,
	name: String,
	arguments: String,
}

/// An `IndexMap` keyed by the dialect's per-call index, preserving arrival
/// order so the assembled list can be materialized in index order at
/// stream end regardless of insertion order quirks in either dialect.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
	calls: IndexMap<usize, Partial>,
}

impl ToolCallAssembler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn process_delta(&mut self, index: usize, id: Option<&str>, name: Option<&str>, arguments_delta: Option<&str>) {
		let partial = self.calls.entry(index).or_default();
		if let Some(id) = id {
			partial.id = Some(id.to_string());
		}
		if let Some(name) = name {
			partial.name.push_str(name);
		}
		if let Some(delta) = arguments_delta {
			partial.arguments.push_str(delta);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}

	/// Materializes the assembled calls in index order. Arguments that
	/// fail to parse as JSON become an empty object rather than dropping
	/// the call, since a partial/garbled arguments buffer is still a tool
	/// call the model intended to make.
	pub fn into_tool_calls(self) -> Vec<ToolCall> {
		let mut entries: Vec<_> = self.calls.into_iter().collect();
		entries.sort_by_key(|(index, _)| *index);
		entries
			.into_iter()
			.map(|(_, partial)| ToolCall {
				id: partial.id.unwrap_or_default(),
				name: partial.name,
				arguments: serde_json::from_str(&partial.arguments).unwrap_or(serde_json::json!({})),
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn concatenates_fragments_in_arrival_order() {
		let mut assembler = ToolCallAssembler::new();
		assembler.process_delta(0, Some("call_1"), Some("search"), Some("{\"q\":"));
		assembler.process_delta(0, None, None, Some("\"x\"}"));
		let calls = assembler.into_tool_calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].id, "call_1");
		assert_eq!(calls[0].name, "search");
		assert_eq!(calls[0].arguments, serde_json::json!({"q": "x"}));
	}

	#[test]
	fn preserves_index_order_across_interleaved_fragments() {
		let mut assembler = ToolCallAssembler::new();
		assembler.process_delta(1, Some("call_2"), Some("b"), Some("{}"));
		assembler.process_delta(0, Some("call_1"), Some("a"), Some("{}"));
		let calls = assembler.into_tool_calls();
		assert_eq!(calls[0].id, "call_1");
		assert_eq!(calls[1].id, "call_2");
	}

	#[test]
	fn garbled_arguments_become_empty_object() {
		let mut assembler = ToolCallAssembler::new();
		assembler.process_delta(0, Some("call_1"), Some("x"), Some("not json"));
		let calls = assembler.into_tool_calls();
		assert_eq!(calls[0].arguments, serde_json::json!({}));
	}
}
