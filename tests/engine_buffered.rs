//! End-to-end coverage of the buffered control loop against a faked
//! OpenAI-compatible upstream and a faked MCP HTTP tool server.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use mcprelay::conversation::Message;
use mcprelay::engine::EngineError;
use mcprelay::engine::EngineOutcome;
use mcprelay::upstream::UpstreamError;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_completion(content: Option<&str>, tool_calls: Option<serde_json::Value>) -> serde_json::Value {
	json!({
		"id": "chatcmpl-1",
		"model": "gpt-test",
		"choices": [{ "message": { "content": content, "tool_calls": tool_calls } }],
	})
}

fn tool_call_json(id: &str, name: &str, arguments: &str) -> serde_json::Value {
	json!([{ "id": id, "type": "function", "function": { "name": name, "arguments": arguments } }])
}

#[tokio::test]
async fn simple_reply_with_no_tool_calls_makes_exactly_one_upstream_call() {
	let upstream = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(Some("hello"), None)))
		.expect(1)
		.mount(&upstream)
		.await;

	let (_dir, engine) = support::engine_with_tool(&upstream, None, 0).await;
	let conversation = vec![Message::User { content: "hi".into() }];

	let outcome = engine.run_buffered(conversation, &[], None, "gpt-test", "sk-test").await.unwrap();

	let EngineOutcome::Final { message, .. } = outcome else {
		panic!("expected a final reply");
	};
	assert_eq!(message.content.as_deref(), Some("hello"));
	assert!(message.reasoning_content.is_none());
}

#[tokio::test]
async fn three_tool_calls_across_three_iterations_then_a_final_answer() {
	let tool_server = support::mock_tool_server("search", "ok").await;
	let upstream = MockServer::start().await;

	let calls = Arc::new(AtomicUsize::new(0));
	let responder = {
		let calls = calls.clone();
		move |_req: &wiremock::Request| {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			if n < 3 {
				ResponseTemplate::new(200).set_body_json(chat_completion(None, Some(tool_call_json("call_1", "search_search", "{\"q\":\"x\"}"))))
			} else {
				ResponseTemplate::new(200).set_body_json(chat_completion(Some("done"), None))
			}
		}
	};
	Mock::given(method("POST")).respond_with(responder).expect(4).mount(&upstream).await;

	let (_dir, engine) = support::engine_with_tool(&upstream, Some(&tool_server), 0).await;
	let conversation = vec![Message::User { content: "search three times".into() }];

	let outcome = engine.run_buffered(conversation, &[], None, "gpt-test", "sk-test").await.unwrap();

	let EngineOutcome::Final { message, .. } = outcome else {
		panic!("expected a final reply");
	};
	assert_eq!(message.content.as_deref(), Some("done"));
	let reasoning = message.reasoning_content.expect("three placeholders should have accumulated");
	assert_eq!(reasoning.matches("「tool: search_search|").count(), 3);
}

#[tokio::test]
async fn retries_transient_second_iteration_failures_then_succeeds() {
	let tool_server = support::mock_tool_server("search", "ok").await;
	let upstream = MockServer::start().await;

	let calls = Arc::new(AtomicUsize::new(0));
	let responder = {
		let calls = calls.clone();
		move |_req: &wiremock::Request| {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			match n {
				0 => ResponseTemplate::new(200).set_body_json(chat_completion(None, Some(tool_call_json("call_1", "search_search", "{}")))),
				1 | 2 => ResponseTemplate::new(502).set_body_json(json!({"error": "bad gateway"})),
				_ => ResponseTemplate::new(200).set_body_json(chat_completion(Some("recovered"), None)),
			}
		}
	};
	Mock::given(method("POST")).respond_with(responder).expect(4).mount(&upstream).await;

	let (_dir, engine) = support::engine_with_tool(&upstream, Some(&tool_server), 2).await;
	let conversation = vec![Message::User { content: "go".into() }];

	let outcome = engine.run_buffered(conversation, &[], None, "gpt-test", "sk-test").await.unwrap();

	let EngineOutcome::Final { message, .. } = outcome else {
		panic!("expected a final reply after the retries succeeded");
	};
	assert_eq!(message.content.as_deref(), Some("recovered"));
}

#[tokio::test]
async fn exhausted_retries_surface_the_final_502_verbatim() {
	let tool_server = support::mock_tool_server("search", "ok").await;
	let upstream = MockServer::start().await;

	let calls = Arc::new(AtomicUsize::new(0));
	let responder = {
		let calls = calls.clone();
		move |_req: &wiremock::Request| {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			if n == 0 {
				ResponseTemplate::new(200).set_body_json(chat_completion(None, Some(tool_call_json("call_1", "search_search", "{}"))))
			} else {
				ResponseTemplate::new(502).set_body_json(json!({"error": "bad gateway"}))
			}
		}
	};
	// 1 first-iteration call + 3 total attempts (1 try + 2 retries) on the second iteration.
	Mock::given(method("POST")).respond_with(responder).expect(4).mount(&upstream).await;

	let (_dir, engine) = support::engine_with_tool(&upstream, Some(&tool_server), 2).await;
	let conversation = vec![Message::User { content: "go".into() }];

	let err = engine.run_buffered(conversation, &[], None, "gpt-test", "sk-test").await.unwrap_err();

	assert_matches!(err, EngineError::Upstream(UpstreamError::Status { status, .. }) if status == 502);
}
