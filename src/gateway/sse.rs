//! Builds the outbound SSE response shared by both inbound dialects (§6:
//! exact header set, `data: <json>\n\n` framing, `data: [DONE]\n\n`
//! terminator).

use std::convert::Infallible;

use axum::http::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::Value;

use crate::engine::{EngineError, EngineStream};
use crate::upstream::{Envelope, UpstreamError};

/// Renders each successful envelope to its dialect-specific wire chunk via
/// `render`; a fatal engine error becomes one terminal error chunk rather
/// than silently dropping the connection.
pub fn into_sse_response<F>(stream: EngineStream, mut render: F) -> Response
where
	F: FnMut(Envelope) -> Value + Send + 'static,
{
	let body = stream.map(move |item| {
		let event = match item {
			Ok(envelope) => Event::default().data(render(envelope).to_string()),
			Err(EngineError::Upstream(err)) => Event::default().data(error_chunk(&err).to_string()),
		};
		Ok::<_, Infallible>(event)
	});
	let done = futures::stream::once(async { Ok::<_, Infallible>(Event::default().data("[DONE]")) });

	let sse = Sse::new(body.chain(done)).keep_alive(KeepAlive::default());
	let mut response = sse.into_response();
	let headers = response.headers_mut();
	headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
	headers.insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
	headers.insert(axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
	response
}

fn error_chunk(err: &UpstreamError) -> Value {
	serde_json::json!({ "error": { "message": err.to_string() } })
}
