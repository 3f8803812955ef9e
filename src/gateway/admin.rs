//! Admin endpoints reflecting the Tool Registry and Tool Server Manager
//! (§10.4): `GET /admin/tools`, `POST /admin/tools/{name}/enable`,
//! `POST /admin/tools/{name}/disable`, `POST /admin/reload`.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use super::AppState;
use crate::error::GatewayError;

pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
	let servers: Vec<Value> = state
		.registry
		.list()
		.into_iter()
		.map(|record| {
			serde_json::json!({
				"name": record.name,
				"transport": record.transport,
				"description": record.description,
				"enabled": record.enabled,
			})
		})
		.collect();
	Json(serde_json::json!({ "servers": servers }))
}

pub async fn enable_tool(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, GatewayError> {
	state.registry.enable(&name)?;
	state.manager.start(&name).await?;
	Ok(Json(serde_json::json!({ "name": name, "enabled": true })))
}

pub async fn disable_tool(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, GatewayError> {
	state.registry.disable(&name)?;
	state.manager.stop(&name).await;
	Ok(Json(serde_json::json!({ "name": name, "enabled": false })))
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<Value>, GatewayError> {
	state.manager.reload().await?;
	let tools = state.manager.live_tools().await;
	Ok(Json(serde_json::json!({ "reloaded": true, "live_tool_count": tools.len() })))
}
