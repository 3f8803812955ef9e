//! The Agentic Iteration Engine: drives the request -> tool-call ->
//! tool-result -> request loop against an upstream dialect in either
//! buffered or streaming mode (§4.5).

mod buffered;
mod history;
mod reasoning;
mod streaming;

use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::conversation::{AssistantMessage, Conversation};
use crate::mcp::manager::ToolServerManager;
use crate::upstream::{Dialect, Envelope, UpstreamClient, UpstreamError};

pub use reasoning::render_tool_call_placeholder;

/// Synthetic content substituted for the final assistant reply when the
/// iteration cap (§4.5, default 100) is reached without a final answer.
pub const MAX_ITERATIONS_MARKER: &str = "max iterations reached";

#[derive(Error, Debug)]
pub enum EngineError {
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
}

/// What the buffered loop produced for one request.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
	/// No tool calls remain; `message` is the final reply.
	Final { message: AssistantMessage, metadata: Option<Value> },
	/// Client-owned tool calls remain; the caller must execute them and
	/// resubmit.
	ClientToolCalls { message: AssistantMessage, metadata: Option<Value> },
	/// The iteration cap was reached without a final answer.
	IterationCapExceeded,
}

pub type EngineStream = Pin<Box<dyn Stream<Item = Result<Envelope, EngineError>> + Send>>;

/// Bundles a tool-server manager and an upstream client behind the two
/// entry points a gateway handler calls into (§4.5: "The Engine exposes
/// two entry points: buffered and streaming").
pub struct Engine<D: Dialect> {
	manager: Arc<ToolServerManager>,
	upstream: Arc<UpstreamClient<D>>,
	max_iterations: u32,
	system_prompt: Option<String>,
}

impl<D: Dialect + 'static> Engine<D> {
	pub fn new(manager: Arc<ToolServerManager>, upstream: Arc<UpstreamClient<D>>, max_iterations: u32, system_prompt: Option<String>) -> Self {
		Engine {
			manager,
			upstream,
			max_iterations,
			system_prompt,
		}
	}

	pub async fn run_buffered(
		&self,
		conversation: Conversation,
		client_tools: &[Value],
		system_instruction: Option<&str>,
		model: &str,
		api_key: &str,
	) -> Result<EngineOutcome, EngineError> {
		let instruction = self.effective_system_instruction(system_instruction);
		buffered::run_buffered(
			&self.manager,
			&self.upstream,
			self.max_iterations,
			conversation,
			client_tools,
			instruction.as_deref(),
			model,
			api_key,
		)
		.await
	}

	pub fn run_streaming(&self, conversation: Conversation, client_tools: Vec<Value>, system_instruction: Option<&str>, model: &str, api_key: String) -> EngineStream {
		let instruction = self.effective_system_instruction(system_instruction);
		streaming::run_streaming(
			self.manager.clone(),
			self.upstream.clone(),
			self.max_iterations,
			conversation,
			client_tools,
			instruction,
			model.to_string(),
			api_key,
		)
	}

	/// §4.5.5: configured prompt wins the ordering, inbound prompt is
	/// appended after a blank-line separator; either side alone is used
	/// verbatim; neither yields no system instruction at all.
	fn effective_system_instruction(&self, inbound: Option<&str>) -> Option<String> {
		let inbound = inbound.filter(|s| !s.is_empty());
		match (&self.system_prompt, inbound) {
			(Some(configured), Some(inbound)) => Some(format!("{configured}\n\n{inbound}")),
			(Some(configured), None) => Some(configured.clone()),
			(None, Some(inbound)) => Some(inbound.to_string()),
			(None, None) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NoopDialect;

	#[async_trait::async_trait]
	impl Dialect for NoopDialect {
		async fn send_buffered(&self, _request: crate::upstream::Request<'_>) -> Result<Envelope, UpstreamError> {
			unimplemented!()
		}
		async fn send_streamed(&self, _request: crate::upstream::Request<'_>) -> Result<crate::upstream::EnvelopeStream, UpstreamError> {
			unimplemented!()
		}
	}

	fn make_engine(system_prompt: Option<&str>) -> Engine<NoopDialect> {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(crate::registry::RegistryStore::new(dir.path()).unwrap());
		let manager = Arc::new(ToolServerManager::new(registry));
		let upstream = Arc::new(UpstreamClient::new(NoopDialect, crate::upstream::RetryPolicy::default(), std::time::Duration::from_secs(1)));
		Engine::new(manager, upstream, 100, system_prompt.map(String::from))
	}

	#[test]
	fn composes_configured_and_inbound_system_prompts() {
		let engine = make_engine(Some("configured"));
		let combined = engine.effective_system_instruction(Some("inbound"));
		assert_eq!(combined.as_deref(), Some("configured\n\ninbound"));
	}

	#[test]
	fn falls_back_to_whichever_side_is_present() {
		let configured_only = make_engine(Some("configured"));
		assert_eq!(configured_only.effective_system_instruction(None).as_deref(), Some("configured"));

		let inbound_only = make_engine(None);
		assert_eq!(inbound_only.effective_system_instruction(Some("inbound")).as_deref(), Some("inbound"));

		let neither = make_engine(None);
		assert_eq!(neither.effective_system_instruction(None), None);
	}
}
