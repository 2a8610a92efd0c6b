use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{
        header::{HOST, USER_AGENT},
        request::Parts,
    },
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::ip_extractor::extract_client_ip;
use super::session::SessionSigner;
use crate::api::{ApiError, AppState};
use crate::auth::Visitor;
use crate::models::hit::truncate_user_agent;

/// The visitor-facing side of a request, as seen by the hit counter.
#[derive(Debug, Clone)]
pub struct Visit {
    pub visitor: Visitor,
    pub ip: String,
    pub host: String,
    /// Truncated to 255 characters
    pub user_agent: String,
    session_key: Option<String>,
    session_created: bool,
}

impl Visit {
    pub fn new(
        visitor: Visitor,
        ip: impl Into<String>,
        host: impl Into<String>,
        user_agent: &str,
    ) -> Self {
        Self {
            visitor,
            ip: ip.into(),
            host: host.into(),
            user_agent: truncate_user_agent(user_agent),
            session_key: None,
            session_created: false,
        }
    }

    /// Attach an already persisted session key
    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    /// Whether a session was created while handling this request
    pub fn session_created(&self) -> bool {
        self.session_created
    }

    pub(crate) fn attach_new_session(&mut self, session_key: String) {
        self.session_key = Some(session_key);
        self.session_created = true;
    }

    /// Cookie jar carrying the session cookie if a session was created for this visit
    pub fn session_cookie_jar(
        &self,
        signer: &SessionSigner,
        cookie_name: &str,
    ) -> anyhow::Result<CookieJar> {
        let jar = CookieJar::new();
        if !self.session_created {
            return Ok(jar);
        }

        let Some(session_key) = self.session_key.as_deref() else {
            return Ok(jar);
        };

        let cookie = Cookie::build((cookie_name.to_string(), signer.sign(session_key)?))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();

        Ok(jar.add(cookie))
    }
}

impl FromRequestParts<Arc<AppState>> for Visit {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let socket_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or_else(|| anyhow!("connection info missing from request"))?;

        let ip = extract_client_ip(&parts.headers, socket_ip, &state.proxy);

        let host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        let visitor = state.auth.resolve(&parts.headers);
        let mut visit = Visit::new(visitor, ip.to_string(), host, user_agent);

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(&state.session_cookie_name) {
            match state.sessions.verify(cookie.value()) {
                Ok(session_key) => {
                    if state.storage.session_exists(&session_key).await? {
                        visit.session_key = Some(session_key);
                    } else {
                        debug!("Ignoring session cookie for unknown session");
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring invalid session cookie"),
            }
        }

        Ok(visit)
    }
}
