//! Inbound key extraction and the access-key/server-key resolution rule
//! (§6: "if an access-key list is configured, only those keys are accepted
//! and the upstream is contacted with a configured server key; if not, the
//! user-provided key is forwarded").

use axum::http::HeaderMap;

use crate::error::GatewayError;

/// Pulls the caller's key out of either `Authorization: Bearer <key>` or
/// `x-goog-api-key: <key>`, whichever the inbound dialect uses.
pub fn extract_caller_key(headers: &HeaderMap) -> Result<&str, GatewayError> {
	if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
		let value = value.to_str().map_err(|_| GatewayError::AuthError)?;
		return value.strip_prefix("Bearer ").ok_or(GatewayError::AuthError);
	}
	if let Some(value) = headers.get("x-goog-api-key") {
		return value.to_str().map_err(|_| GatewayError::AuthError);
	}
	Err(GatewayError::AuthError)
}

/// Resolves the key to forward upstream: the configured server key when an
/// access-key allowlist is enforced (rejecting unlisted caller keys first),
/// otherwise the caller's own key verbatim.
pub fn resolve_upstream_key(access_keys: &[String], caller_key: &str, server_key: Option<&str>) -> Result<String, GatewayError> {
	if access_keys.is_empty() {
		return Ok(caller_key.to_string());
	}
	if !access_keys.iter().any(|k| k == caller_key) {
		return Err(GatewayError::AuthError);
	}
	Ok(server_key.unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_allowlist_forwards_caller_key_verbatim() {
		let resolved = resolve_upstream_key(&[], "caller-key", Some("server-key")).unwrap();
		assert_eq!(resolved, "caller-key");
	}

	#[test]
	fn allowlist_swaps_in_the_server_key() {
		let access_keys = vec!["caller-key".to_string()];
		let resolved = resolve_upstream_key(&access_keys, "caller-key", Some("server-key")).unwrap();
		assert_eq!(resolved, "server-key");
	}

	#[test]
	fn allowlist_rejects_unlisted_key() {
		let access_keys = vec!["other-key".to_string()];
		let err = resolve_upstream_key(&access_keys, "caller-key", Some("server-key"));
		assert!(matches!(err, Err(GatewayError::AuthError)));
	}

	#[test]
	fn extract_prefers_bearer_header() {
		let mut headers = HeaderMap::new();
		headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
		assert_eq!(extract_caller_key(&headers).unwrap(), "abc123");
	}

	#[test]
	fn extract_falls_back_to_goog_header() {
		let mut headers = HeaderMap::new();
		headers.insert("x-goog-api-key", "abc123".parse().unwrap());
		assert_eq!(extract_caller_key(&headers).unwrap(), "abc123");
	}
}
