//! Top-level error type surfaced at the gateway boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::mcp::manager::ManagerError;
use crate::mcp::transport::TransportError;
use crate::registry::RegistryError;
use crate::upstream::UpstreamError;

/// Errors that can cross the gateway boundary and must become an HTTP response.
#[derive(Error, Debug)]
pub enum GatewayError {
	#[error("authentication failed")]
	AuthError,

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("upstream returned status {status}")]
	UpstreamStatus {
		status: StatusCode,
		body: serde_json::Value,
	},

	#[error("upstream timed out")]
	UpstreamTimeout,

	#[error("upstream network error: {0}")]
	UpstreamNetwork(String),

	#[error("iteration cap exceeded")]
	IterationCapExceeded,

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Manager(#[from] ManagerError),

	#[error("internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

/// Unwraps an `EngineError` into the specific `GatewayError` variant its
/// inner `UpstreamError` maps to (§4.6/§7), rather than going through the
/// catch-all `#[from] UpstreamError` impl below by way of a transparent
/// `Engine(EngineError)` wrapper that would lose the distinction.
impl From<EngineError> for GatewayError {
	fn from(err: EngineError) -> Self {
		match err {
			EngineError::Upstream(err) => GatewayError::from(err),
		}
	}
}

impl From<UpstreamError> for GatewayError {
	fn from(err: UpstreamError) -> Self {
		match err {
			UpstreamError::Status { status, body } => GatewayError::UpstreamStatus { status, body },
			UpstreamError::Timeout => GatewayError::UpstreamTimeout,
			UpstreamError::Network(msg) => GatewayError::UpstreamNetwork(msg),
			UpstreamError::Stream(msg) => GatewayError::UpstreamNetwork(msg),
		}
	}
}

impl GatewayError {
	fn status(&self) -> StatusCode {
		match self {
			GatewayError::AuthError => StatusCode::UNAUTHORIZED,
			GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
			GatewayError::UpstreamStatus { status, .. } => *status,
			GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
			GatewayError::UpstreamNetwork(_) => StatusCode::SERVICE_UNAVAILABLE,
			GatewayError::IterationCapExceeded => StatusCode::OK,
			GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::Manager(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		let status = self.status();
		if let GatewayError::UpstreamStatus { body, .. } = &self {
			return (status, Json(body.clone())).into_response();
		}
		tracing::error!(target: "mcprelay::gateway", error = %self, "request failed");
		let body = json!({
			"error": {
				"kind": error_kind(&self),
				"message": self.to_string(),
			}
		});
		(status, Json(body)).into_response()
	}
}

fn error_kind(err: &GatewayError) -> &'static str {
	match err {
		GatewayError::AuthError => "auth_error",
		GatewayError::BadRequest(_) => "bad_request",
		GatewayError::UpstreamStatus { .. } => "upstream_status_error",
		GatewayError::UpstreamTimeout => "upstream_timeout",
		GatewayError::UpstreamNetwork(_) => "upstream_network",
		GatewayError::IterationCapExceeded => "iteration_cap_exceeded",
		GatewayError::Config(_) => "config_error",
		GatewayError::Registry(_) => "registry_error",
		GatewayError::Transport(_) => "transport_error",
		GatewayError::Manager(_) => "manager_error",
		GatewayError::Internal(_) => "internal_error",
	}
}
