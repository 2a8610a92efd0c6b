use anyhow::Result;
use axum::{
    extract::{rejection::FormRejection, Form, Path, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use crate::auth::AuthService;
use crate::blog::views::{post_detail_context, PostCountHitDetailView, PostDetailView};
use crate::config::{Config, ProxyConfig};
use crate::hitcount::{HitCountService, HitCounting};
use crate::request::{SessionSigner, Visit};
use crate::storage::Storage;

/// Returned for an unusable `hitcountPK`
const BAD_PK_MESSAGE: &str = "HitCount object_pk not working";

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub hitcount: Arc<HitCountService>,
    pub auth: Arc<AuthService>,
    pub sessions: SessionSigner,
    pub session_cookie_name: String,
    pub proxy: ProxyConfig,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        Ok(Self {
            hitcount: Arc::new(HitCountService::new(
                Arc::clone(&storage),
                config.hitcount.clone(),
            )),
            auth: Arc::new(AuthService::new(&config.auth)?),
            sessions: SessionSigner::new(config.session.secret.as_deref()),
            session_cookie_name: config.session.cookie_name.clone(),
            proxy: config.proxy.clone(),
            storage,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct HitCountForm {
    #[serde(rename = "hitcountPK")]
    pub hitcount_pk: Option<String>,
}

#[derive(Serialize)]
pub struct PostOnlyResponse {
    pub success: bool,
    pub error_message: String,
}

fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest")
}

/// Count a hit for the counter named by the `hitcountPK` form field
pub async fn hit_count_json(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    mut visit: Visit,
    form: Result<Form<HitCountForm>, FormRejection>,
) -> Result<Response, ApiError> {
    if !is_ajax(&headers) {
        return Err(ApiError::NotFound);
    }

    match method {
        Method::POST => {}
        Method::GET => {
            return Ok(Json(PostOnlyResponse {
                success: false,
                error_message: "Hits counted via POST only.".to_string(),
            })
            .into_response())
        }
        _ => return Err(ApiError::NotFound),
    }

    let pk = form
        .ok()
        .and_then(|Form(form)| form.hitcount_pk)
        .and_then(|pk| pk.trim().parse::<i64>().ok())
        .ok_or(ApiError::BadRequest(BAD_PK_MESSAGE))?;

    let counter = state
        .storage
        .get_hit_counter(pk)
        .await?
        .ok_or(ApiError::BadRequest(BAD_PK_MESSAGE))?;

    let response = state.hitcount.hit_count(&mut visit, &counter).await?;
    let jar = visit.session_cookie_jar(&state.sessions, &state.session_cookie_name)?;

    Ok((jar, Json(response)).into_response())
}

#[deprecated(since = "0.1.0", note = "use `hit_count_json` instead")]
pub async fn update_hit_count_ajax(
    state: State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    visit: Visit,
    form: Result<Form<HitCountForm>, FormRejection>,
) -> Result<Response, ApiError> {
    warn!("update_hit_count_ajax is deprecated, use the /hitcount/hit/ajax/ endpoint instead");
    hit_count_json(state, method, headers, visit, form).await
}

/// Post detail; the page is expected to count its hit through the JSON endpoint
pub async fn post_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    visit: Visit,
) -> Result<Response, ApiError> {
    render_post(&PostDetailView, &state, visit, id).await
}

/// Post detail that counts a hit while rendering
pub async fn post_detail_count_hit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    visit: Visit,
) -> Result<Response, ApiError> {
    render_post(&PostCountHitDetailView, &state, visit, id).await
}

async fn render_post<V: HitCounting>(
    view: &V,
    state: &AppState,
    mut visit: Visit,
    id: i64,
) -> Result<Response, ApiError> {
    let context = post_detail_context(view, &state.hitcount, &mut visit, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let jar = visit.session_cookie_jar(&state.sessions, &state.session_cookie_name)?;

    Ok((jar, Json(context)).into_response())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
