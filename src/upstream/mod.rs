//! Builds upstream requests, parses buffered and streamed replies, and
//! applies the iteration-aware retry policy (§4.4).

pub mod gemini;
pub mod openai;
mod retry;
mod tool_call_assembler;

pub use retry::Policy as RetryPolicy;
pub use tool_call_assembler::ToolCallAssembler;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

use crate::conversation::{AssistantMessage, Conversation};

#[derive(Error, Debug)]
pub enum UpstreamError {
	#[error("upstream returned status {status}")]
	Status {
		status: reqwest::StatusCode,
		body: serde_json::Value,
	},

	#[error("upstream request timed out")]
	Timeout,

	#[error("upstream network error: {0}")]
	Network(String),

	#[error("upstream stream error: {0}")]
	Stream(String),
}

impl UpstreamError {
	pub fn is_retryable(&self) -> bool {
		matches!(self, UpstreamError::Status { .. } | UpstreamError::Stream(_))
	}
}

/// One parsed reply envelope: buffered mode has exactly one; streamed mode
/// is a sequence of these. Dialect-specific fields the Engine doesn't need
/// to interpret are forwarded via `raw`.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
	pub assistant_delta: AssistantMessage,
	/// Present on the terminal envelope of a buffered reply, or the final
	/// envelope of a stream (token usage, model id, response id, etc).
	pub metadata: Option<serde_json::Value>,
	pub finished: bool,
}

/// Parameters shared by both the buffered and streamed upstream calls.
/// `api_key` is resolved per request by the Gateway Facade (§6: the
/// configured server key when an access-key list is enforced, otherwise the
/// caller's own key forwarded verbatim), not fixed at dialect construction.
pub struct Request<'a> {
	pub conversation: &'a Conversation,
	pub tools: &'a [crate::mcp::manager::QualifiedTool],
	pub client_tools: &'a [serde_json::Value],
	pub system_instruction: Option<&'a str>,
	pub model: &'a str,
	pub api_key: &'a str,
}

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, UpstreamError>> + Send>>;

/// The dialect-specific half of the Upstream Client: request construction
/// and reply parsing. Retry, timeout, and the buffered/streamed split live
/// in the shared `UpstreamClient` wrapper below, not in each dialect.
#[async_trait]
pub trait Dialect: Send + Sync {
	async fn send_buffered(&self, request: Request<'_>) -> Result<Envelope, UpstreamError>;
	async fn send_streamed(&self, request: Request<'_>) -> Result<EnvelopeStream, UpstreamError>;
}

/// Wraps a [`Dialect`] with the timeout/retry policy from §4.4. `iteration`
/// is 0 for the first upstream call of a conversation and increases by one
/// per subsequent call; retry only applies for `iteration >= 1`.
pub struct UpstreamClient<D> {
	dialect: D,
	policy: RetryPolicy,
	timeout: Duration,
}

impl<D: Dialect> UpstreamClient<D> {
	pub fn new(dialect: D, policy: RetryPolicy, timeout: Duration) -> Self {
		UpstreamClient { dialect, policy, timeout }
	}

	/// The configured retry count, for callers (the streaming Engine loop)
	/// that must apply the same policy to errors surfacing mid-stream
	/// rather than at the initial request.
	pub fn retry_attempts(&self) -> u32 {
		self.policy.attempts
	}

	pub fn retry_delay(&self) -> Duration {
		self.policy.delay
	}

	pub async fn call_buffered(&self, iteration: u32, request: Request<'_>) -> Result<Envelope, UpstreamError> {
		if iteration == 0 {
			return self.with_timeout(self.dialect.send_buffered(request)).await;
		}

		let mut attempt = 0;
		loop {
			let built = self.build_request(&request);
			match self.with_timeout(self.dialect.send_buffered(built)).await {
				Ok(envelope) => return Ok(envelope),
				Err(err) if err.is_retryable() && attempt < self.policy.attempts => {
					attempt += 1;
					tracing::warn!(target: "mcprelay::upstream", %err, attempt, "retrying upstream call");
					tokio::time::sleep(self.policy.delay).await;
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// Streaming entry point used when no bytes have been forwarded to the
	/// client yet for this iteration; see the Engine's streaming loop for
	/// the "already forwarded bytes" exception to this policy.
	pub async fn call_streamed(&self, iteration: u32, request: Request<'_>) -> Result<EnvelopeStream, UpstreamError> {
		if iteration == 0 {
			return self.with_timeout(self.dialect.send_streamed(request)).await;
		}

		let mut attempt = 0;
		loop {
			let built = self.build_request(&request);
			match self.with_timeout(self.dialect.send_streamed(built)).await {
				Ok(stream) => return Ok(stream),
				Err(err) if err.is_retryable() && attempt < self.policy.attempts => {
					attempt += 1;
					tracing::warn!(target: "mcprelay::upstream", %err, attempt, "retrying upstream stream");
					tokio::time::sleep(self.policy.delay).await;
				}
				Err(err) => return Err(err),
			}
		}
	}

	async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = Result<T, UpstreamError>>) -> Result<T, UpstreamError> {
		match tokio::time::timeout(self.timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(UpstreamError::Timeout),
		}
	}

	/// `Request` borrows the conversation, so building a "fresh" request for
	/// a retry attempt is just re-borrowing the same fields; nothing here
	/// mutates, this exists only to make the per-attempt borrow explicit at
	/// call sites.
	fn build_request<'a>(&self, request: &Request<'a>) -> Request<'a> {
		Request {
			conversation: request.conversation,
			tools: request.tools,
			client_tools: request.client_tools,
			system_instruction: request.system_instruction,
			model: request.model,
			api_key: request.api_key,
		}
	}
}
