//! History rewriting (§4.5.1): before each upstream call, every tool-result
//! message in the working range except the single most recent one is
//! replaced with a fixed placeholder. The caller-provided prefix is never
//! touched.

use crate::conversation::{Conversation, TOOL_RESULT_PLACEHOLDER};

/// Rewrites `conversation[n0..]` in place. `n0` is the conversation length
/// on entry to the request, i.e. the end of the caller-provided history.
pub fn rewrite_history(conversation: &mut Conversation, n0: usize) {
	let last_tool_result_index = conversation[n0..]
		.iter()
		.enumerate()
		.filter(|(_, message)| message.as_tool_result().is_some())
		.map(|(offset, _)| n0 + offset)
		.last();

	let Some(last_index) = last_tool_result_index else {
		return;
	};

	for (index, message) in conversation.iter_mut().enumerate().skip(n0) {
		if index == last_index {
			continue;
		}
		if let Some(tool_result) = message.as_tool_result_mut() {
			tool_result.content = TOOL_RESULT_PLACEHOLDER.to_string();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::conversation::Message;

	#[test]
	fn preserves_prefix_byte_for_byte() {
		let mut conversation = vec![
			Message::User { content: "hi".into() },
			Message::tool_result("call_1", "first result"),
		];
		let prefix = conversation.clone();
		rewrite_history(&mut conversation, 2);
		assert_eq!(conversation, prefix);
	}

	#[test]
	fn keeps_only_the_most_recent_tool_result_in_the_working_range() {
		let n0 = 1;
		let mut conversation = vec![
			Message::User { content: "hi".into() },
			Message::tool_result("call_1", "first result"),
			Message::tool_result("call_2", "second result"),
			Message::tool_result("call_3", "third result"),
		];
		rewrite_history(&mut conversation, n0);

		assert_eq!(conversation[1].as_tool_result().unwrap().content, TOOL_RESULT_PLACEHOLDER);
		assert_eq!(conversation[2].as_tool_result().unwrap().content, TOOL_RESULT_PLACEHOLDER);
		assert_eq!(conversation[3].as_tool_result().unwrap().content, "third result");
	}

	#[test]
	fn no_tool_results_in_range_is_a_no_op() {
		let mut conversation = vec![Message::User { content: "hi".into() }];
		let before = conversation.clone();
		rewrite_history(&mut conversation, 0);
		assert_eq!(conversation, before);
	}
}
