//! Request Context
//!
//! Resolves who is calling and which list they address from request
//! headers, and rejects callers with an unknown auth token.
//!
//! - `x-auth-token`: looked up in the [`Users`] map
//! - `x-namespace-prefix`: `g` (shared, default) or `my` (personal)
//! - `x-namespace`: list name, default `default`
//! - `x-ws-client-id`: push-channel identity of the caller, so its own
//!   mutations are not echoed back to it

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::config::ConfigError;
use crate::store::{Scope, DEFAULT_NAMESPACE, GLOBAL_PREFIX};

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";
pub const NAMESPACE_HEADER: &str = "x-namespace";
pub const NAMESPACE_PREFIX_HEADER: &str = "x-namespace-prefix";
pub const WS_CLIENT_ID_HEADER: &str = "x-ws-client-id";

/// A known user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub username: String,
}

/// Auth token to user map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Users {
    by_token: HashMap<String, User>,
}

impl Default for Users {
    /// Only the token `admin`, mapped to user `admin`
    fn default() -> Self {
        let mut by_token = HashMap::new();
        by_token.insert(
            "admin".to_string(),
            User {
                username: "admin".to_string(),
            },
        );
        Self { by_token }
    }
}

impl Users {
    /// Parse `{"<token>": {"username": "..."}}`
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let by_token: HashMap<String, User> = serde_json::from_str(content)?;
        Ok(Self { by_token })
    }

    /// Load a users file. Its entries replace the default map entirely.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_json(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Look up a token; entries without a username never authorize
    pub fn get(&self, token: &str) -> Option<&User> {
        if token.is_empty() {
            return None;
        }
        self.by_token
            .get(token)
            .filter(|user| !user.username.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

/// Resolved caller of an items request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user: User,
    pub scope: Scope,
    /// Push-channel identity of the caller, empty when not sent
    pub client_id: String,
}

impl RequestContext {
    /// Build the context from headers; `None` when the token is unknown
    pub fn from_headers(headers: &HeaderMap, users: &Users) -> Option<Self> {
        let user = users.get(header(headers, AUTH_TOKEN_HEADER))?.clone();

        let prefix = non_empty_or(header(headers, NAMESPACE_PREFIX_HEADER), GLOBAL_PREFIX);
        let namespace = non_empty_or(header(headers, NAMESPACE_HEADER), DEFAULT_NAMESPACE);
        let scope = Scope::new(prefix, user.username.clone(), namespace);

        Some(Self {
            user,
            scope,
            client_id: header(headers, WS_CLIENT_ID_HEADER).to_string(),
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

/// Middleware for the items routes: resolve the caller or answer 401
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = RequestContext::from_headers(request.headers(), &state.users)
        .ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tempfile::tempdir;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_default_users() {
        let users = Users::default();
        assert_eq!(users.len(), 1);
        assert_eq!(users.get("admin").unwrap().username, "admin");
        assert!(users.get("").is_none());
        assert!(users.get("guest").is_none());
    }

    #[test]
    fn test_users_file_replaces_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"s3cret": {"username": "alice"}}"#).unwrap();

        let users = Users::load(&path).unwrap();
        assert_eq!(users.get("s3cret").unwrap().username, "alice");
        assert!(users.get("admin").is_none());
    }

    #[test]
    fn test_blank_username_is_not_authorized() {
        let users = Users::from_json(r#"{"t1": {"username": ""}, "t2": {"username": "bob"}}"#).unwrap();
        assert!(users.get("t1").is_none());
        assert_eq!(users.get("t2").unwrap().username, "bob");
        assert!(RequestContext::from_headers(&headers(&[(AUTH_TOKEN_HEADER, "t1")]), &users).is_none());
    }

    #[test]
    fn test_bad_users_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(Users::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_context_defaults_to_global_default_list() {
        let ctx = RequestContext::from_headers(&headers(&[(AUTH_TOKEN_HEADER, "admin")]), &Users::default())
            .unwrap();
        assert_eq!(ctx.user.username, "admin");
        assert_eq!(ctx.scope, Scope::new("g", "admin", "default"));
        assert_eq!(ctx.scope.item_key("1"), "item:g:default:1");
        assert_eq!(ctx.client_id, "");
    }

    #[test]
    fn test_context_personal_namespace() {
        let ctx = RequestContext::from_headers(
            &headers(&[
                (AUTH_TOKEN_HEADER, "admin"),
                (NAMESPACE_PREFIX_HEADER, "my"),
                (NAMESPACE_HEADER, "work"),
                (WS_CLIENT_ID_HEADER, "123456"),
            ]),
            &Users::default(),
        )
        .unwrap();
        assert_eq!(ctx.scope.item_key("1"), "item:my:admin:work:1");
        assert_eq!(ctx.client_id, "123456");
    }

    #[test]
    fn test_context_requires_known_token() {
        assert!(RequestContext::from_headers(&HeaderMap::new(), &Users::default()).is_none());
        assert!(RequestContext::from_headers(
            &headers(&[(AUTH_TOKEN_HEADER, "nobody")]),
            &Users::default()
        )
        .is_none());
    }
}
