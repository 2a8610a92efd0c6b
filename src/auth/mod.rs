pub mod jwt;

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use tracing::warn;

use crate::config::{AuthConfig, AuthMode};

pub use jwt::JwtValidator;

/// Header carrying the authenticated user id in `header` mode
pub const REMOTE_USER_HEADER: &str = "x-remote-user";
/// Header carrying comma-separated group names in `header` mode
pub const REMOTE_GROUPS_HEADER: &str = "x-remote-groups";

/// Who is visiting, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visitor {
    Anonymous,
    Authenticated { user_id: String, groups: Vec<String> },
}

impl Visitor {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Visitor::Authenticated { .. })
    }
}

pub struct AuthService {
    mode: AuthMode,
    jwt: Option<JwtValidator>,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let jwt = match config.mode {
            AuthMode::Jwt => {
                let secret = config
                    .jwt_secret
                    .as_deref()
                    .context("JWT secret must be configured when AUTH_MODE=jwt")?;
                Some(JwtValidator::new(secret))
            }
            AuthMode::None | AuthMode::Header => None,
        };

        Ok(Self {
            mode: config.mode.clone(),
            jwt,
        })
    }

    /// Resolve the visitor identity from request headers.
    ///
    /// Identity lookup failures never fail the request: the visitor is
    /// treated as anonymous instead.
    pub fn resolve(&self, headers: &HeaderMap) -> Visitor {
        match self.mode {
            AuthMode::None => Visitor::Anonymous,
            AuthMode::Header => visitor_from_headers(headers),
            AuthMode::Jwt => {
                let Some(validator) = self.jwt.as_ref() else {
                    return Visitor::Anonymous;
                };
                let Some(token) = bearer_token(headers) else {
                    return Visitor::Anonymous;
                };

                match validator.validate(token) {
                    Ok(claims) => Visitor::Authenticated {
                        user_id: claims.sub,
                        groups: claims.groups,
                    },
                    Err(e) => {
                        warn!(error = %e, "Rejected bearer token, treating visitor as anonymous");
                        Visitor::Anonymous
                    }
                }
            }
        }
    }
}

fn visitor_from_headers(headers: &HeaderMap) -> Visitor {
    let user_id = headers
        .get(REMOTE_USER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let Some(user_id) = user_id else {
        return Visitor::Anonymous;
    };

    let groups = headers
        .get(REMOTE_GROUPS_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Visitor::Authenticated {
        user_id: user_id.to_string(),
        groups,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
