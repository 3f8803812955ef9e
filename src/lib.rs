//! Agentic tool-calling proxy: drives a request -> tool-call -> tool-result
//! loop against an OpenAI- or Gemini-shaped upstream, dispatching
//! manager-owned tool calls to out-of-process MCP tool servers.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod registry;
pub mod telemetry;
pub mod upstream;
