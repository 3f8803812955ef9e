//! The streaming control loop (§4.5.3): envelopes are forwarded to the
//! client in near-real time, except that tool-call envelopes are replaced
//! by a synthetic placeholder block and errors arriving before any bytes
//! have been forwarded this iteration trigger a retry.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::history;
use super::reasoning::render_tool_call_block;
use super::{EngineError, EngineStream, MAX_ITERATIONS_MARKER};
use crate::conversation::{AssistantMessage, Conversation, Message, ToolCall};
use crate::mcp::manager::{Dispatch, ToolServerManager};
use crate::upstream::{Dialect, Envelope, EnvelopeStream, Request, UpstreamClient, UpstreamError};

const CHANNEL_CAPACITY: usize = 32;

pub fn run_streaming<D: Dialect + 'static>(
	manager: Arc<ToolServerManager>,
	upstream: Arc<UpstreamClient<D>>,
	max_iterations: u32,
	conversation: Conversation,
	client_tools: Vec<Value>,
	system_instruction: Option<String>,
	model: String,
	api_key: String,
) -> EngineStream {
	let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
	tokio::spawn(async move {
		if let Err(err) = drive(manager, upstream, max_iterations, conversation, client_tools, system_instruction, model, api_key, tx.clone()).await {
			let _ = tx.send(Err(err)).await;
		}
	});
	Box::pin(ReceiverStream::new(rx))
}

/// What happened while draining a single connection attempt for one
/// iteration.
enum DrainOutcome {
	/// The upstream finished this iteration's reply without error.
	Completed,
	/// An error arrived after content had already reached the client; it
	/// is forwarded verbatim and the whole request ends.
	FatalAfterBytes(UpstreamError),
	/// An error arrived before any content reached the client; the caller
	/// may retry.
	FatalBeforeBytes(UpstreamError),
}

#[derive(Default)]
struct IterationAccumulator {
	bytes_forwarded: bool,
	tool_calls: Vec<ToolCall>,
	signatures: Vec<Value>,
	metadata: Option<Value>,
}

async fn drive<D: Dialect>(
	manager: Arc<ToolServerManager>,
	upstream: Arc<UpstreamClient<D>>,
	max_iterations: u32,
	mut conversation: Conversation,
	client_tools: Vec<Value>,
	system_instruction: Option<String>,
	model: String,
	api_key: String,
	tx: mpsc::Sender<Result<Envelope, EngineError>>,
) -> Result<(), EngineError> {
	let n0 = conversation.len();

	for iteration in 0..max_iterations {
		history::rewrite_history(&mut conversation, n0);
		let manager_tools: Vec<_> = manager.live_tools().await.into_values().collect();

		let mut accumulator = IterationAccumulator::default();
		let mut attempt = 0;

		loop {
			let request = Request {
				conversation: &conversation,
				tools: &manager_tools,
				client_tools: &client_tools,
				system_instruction: system_instruction.as_deref(),
				model: &model,
				api_key: &api_key,
			};
			let stream = upstream.call_streamed(iteration, request).await?;

			// Races the drain against the client having gone away: if `tx`'s
			// receiver is dropped, `stream` (and the HTTP response body it
			// wraps) is dropped right here instead of being drained to
			// completion for no one.
			let outcome = tokio::select! {
				outcome = drain_once(stream, &tx, &mut accumulator) => outcome,
				_ = tx.closed() => return Ok(()),
			};

			match outcome {
				DrainOutcome::Completed => break,
				DrainOutcome::FatalAfterBytes(err) => {
					let _ = tx.send(Err(EngineError::from(err))).await;
					return Ok(());
				}
				DrainOutcome::FatalBeforeBytes(err) if iteration >= 1 && err.is_retryable() && attempt < upstream.retry_attempts() => {
					attempt += 1;
					tracing::warn!(target: "mcprelay::engine", %err, attempt, "retrying upstream stream");
					tokio::time::sleep(upstream.retry_delay()).await;
				}
				DrainOutcome::FatalBeforeBytes(err) => return Err(EngineError::from(err)),
			}
		}

		if accumulator.tool_calls.is_empty() {
			return Ok(());
		}

		conversation.push(Message::assistant(AssistantMessage {
			content: None,
			reasoning_content: None,
			tool_calls: accumulator.tool_calls.clone(),
			reasoning_signatures: accumulator.signatures,
		}));

		let placeholder_block = render_tool_call_block(&accumulator.tool_calls);
		let _ = tx
			.send(Ok(Envelope {
				assistant_delta: AssistantMessage {
					reasoning_content: Some(placeholder_block),
					..Default::default()
				},
				metadata: None,
				finished: false,
			}))
			.await;

		let (manager_owned, client_owned): (Vec<ToolCall>, Vec<ToolCall>) = accumulator
			.tool_calls
			.into_iter()
			.partition(|tc| manager_tools.iter().any(|t| t.qualified_name == tc.name));

		for tool_call in &manager_owned {
			let text = match manager.dispatch(&tool_call.name, tool_call.arguments.clone()).await {
				Dispatch::Result(text) => text,
				Dispatch::NotFound => "tool does not exist".to_string(),
				Dispatch::ExecutionFailed => "tool execution failed".to_string(),
			};
			conversation.push(Message::tool_result(tool_call.id.clone(), text));
		}

		if !client_owned.is_empty() {
			return Ok(());
		}
	}

	let _ = tx
		.send(Ok(Envelope {
			assistant_delta: AssistantMessage {
				content: Some(MAX_ITERATIONS_MARKER.to_string()),
				..Default::default()
			},
			metadata: None,
			finished: true,
		}))
		.await;
	Ok(())
}

async fn drain_once(mut stream: EnvelopeStream, tx: &mpsc::Sender<Result<Envelope, EngineError>>, accumulator: &mut IterationAccumulator) -> DrainOutcome {
	while let Some(item) = stream.next().await {
		match item {
			Ok(envelope) => {
				if forward_non_tool_parts(&envelope, tx).await {
					accumulator.bytes_forwarded = true;
				}
				if envelope.assistant_delta.has_tool_calls() {
					accumulator.tool_calls.extend(envelope.assistant_delta.tool_calls.clone());
					accumulator.signatures.extend(envelope.assistant_delta.reasoning_signatures.clone());
				}
				if envelope.finished {
					accumulator.metadata = envelope.metadata;
				}
			}
			Err(err) => {
				return if accumulator.bytes_forwarded {
					DrainOutcome::FatalAfterBytes(err)
				} else {
					DrainOutcome::FatalBeforeBytes(err)
				};
			}
		}
	}
	DrainOutcome::Completed
}

/// Forwards an envelope as-is unless it carries a tool call (those are
/// accumulated and replaced with a synthetic placeholder block instead).
/// Returns whether anything was actually sent to the client.
async fn forward_non_tool_parts(envelope: &Envelope, tx: &mpsc::Sender<Result<Envelope, EngineError>>) -> bool {
	if envelope.assistant_delta.has_tool_calls() {
		return false;
	}
	let has_payload = envelope.assistant_delta.content.is_some() || envelope.assistant_delta.reasoning_content.is_some();
	if has_payload {
		let _ = tx.send(Ok(envelope.clone())).await;
	}
	has_payload
}
