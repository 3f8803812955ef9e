//! The buffered control loop (§4.5.2).

use serde_json::Value;

use super::history;
use super::reasoning::ReasoningAccumulator;
use super::{EngineError, EngineOutcome};
use crate::conversation::{AssistantMessage, Conversation, Message};
use crate::mcp::manager::{Dispatch, ToolServerManager};
use crate::upstream::{Dialect, Request, UpstreamClient};

pub async fn run_buffered<D: Dialect>(
	manager: &ToolServerManager,
	upstream: &UpstreamClient<D>,
	max_iterations: u32,
	mut conversation: Conversation,
	client_tools: &[Value],
	system_instruction: Option<&str>,
	model: &str,
	api_key: &str,
) -> Result<EngineOutcome, EngineError> {
	let n0 = conversation.len();
	let mut accumulator = ReasoningAccumulator::new();

	for iteration in 0..max_iterations {
		history::rewrite_history(&mut conversation, n0);
		let manager_tools: Vec<_> = manager.live_tools().await.into_values().collect();

		let request = Request {
			conversation: &conversation,
			tools: &manager_tools,
			client_tools,
			system_instruction,
			model,
			api_key,
		};
		let envelope = upstream.call_buffered(iteration, request).await?;
		let assistant = envelope.assistant_delta;

		if let Some(reasoning) = &assistant.reasoning_content {
			accumulator.push_reasoning(reasoning);
		}

		if !assistant.has_tool_calls() {
			let message = AssistantMessage {
				reasoning_content: accumulator.render(),
				..assistant
			};
			return Ok(EngineOutcome::Final {
				message,
				metadata: envelope.metadata,
			});
		}

		accumulator.push_tool_calls(&assistant.tool_calls);

		let (manager_owned, client_owned): (Vec<_>, Vec<_>) = assistant
			.tool_calls
			.iter()
			.cloned()
			.partition(|tc| manager_tools.iter().any(|t| t.qualified_name == tc.name));

		conversation.push(Message::assistant(assistant.clone()));

		for tool_call in &manager_owned {
			let text = match manager.dispatch(&tool_call.name, tool_call.arguments.clone()).await {
				Dispatch::Result(text) => text,
				Dispatch::NotFound => "tool does not exist".to_string(),
				Dispatch::ExecutionFailed => "tool execution failed".to_string(),
			};
			conversation.push(Message::tool_result(tool_call.id.clone(), text));
		}

		if !client_owned.is_empty() {
			let message = AssistantMessage {
				content: None,
				reasoning_content: accumulator.render(),
				tool_calls: client_owned,
				reasoning_signatures: assistant.reasoning_signatures,
			};
			return Ok(EngineOutcome::ClientToolCalls {
				message,
				metadata: envelope.metadata,
			});
		}
	}

	Ok(EngineOutcome::IterationCapExceeded)
}
