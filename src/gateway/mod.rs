//! The Gateway Facade (§10.4): a thin Axum router translating the two
//! inbound dialects into Engine calls and admin endpoints onto the Tool
//! Registry / Tool Server Manager.

mod admin;
mod auth;
mod chat;
mod generate;
mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::Settings;
use crate::engine::Engine;
use crate::mcp::manager::ToolServerManager;
use crate::registry::RegistryStore;
use crate::upstream::gemini::GeminiDialect;
use crate::upstream::openai::OpenAiDialect;

/// Shared, cheaply-cloned handle passed to every Axum handler via
/// `State<AppState>`. Either engine is `None` when its dialect has no
/// configured upstream (§10.3: `openai`/`gemini` are each optional).
#[derive(Clone)]
pub struct AppState {
	pub manager: Arc<ToolServerManager>,
	pub registry: Arc<RegistryStore>,
	pub settings: Arc<Settings>,
	pub openai: Option<Arc<Engine<OpenAiDialect>>>,
	pub gemini: Option<Arc<Engine<GeminiDialect>>>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/v1/chat/completions", post(chat::completions))
		.route("/v1/models", get(chat::list_models))
		.route("/v1beta/models/{model_action}", post(generate::dispatch))
		.route("/admin/tools", get(admin::list_tools))
		.route("/admin/tools/{name}/enable", post(admin::enable_tool))
		.route("/admin/tools/{name}/disable", post(admin::disable_tool))
		.route("/admin/reload", post(admin::reload))
		.with_state(state)
}
