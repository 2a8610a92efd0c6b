//! JSON endpoint and detail view integration tests
//!
//! These tests drive the full router: request boundary (IP, identity,
//! session cookie), the hit count evaluator and the response shapes.

use axum::{
    body::Body,
    http::{header::SET_COOKIE, Request, Response, StatusCode},
    Router,
};
use hitcount::api::{create_router, AppState};
use hitcount::auth::AuthService;
use hitcount::config::{AuthConfig, AuthMode, HitCountConfig, ProxyConfig, TrustedProxyMode};
use hitcount::hitcount::HitCountService;
use hitcount::request::SessionSigner;
use hitcount::storage::{SqliteStorage, Storage};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

const COOKIE_NAME: &str = "hitcount_session";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn create_app(storage: Arc<dyn Storage>, config: HitCountConfig) -> Router {
    let state = AppState {
        hitcount: Arc::new(HitCountService::new(Arc::clone(&storage), config)),
        auth: Arc::new(
            AuthService::new(&AuthConfig {
                mode: AuthMode::Header,
                jwt_secret: None,
            })
            .unwrap(),
        ),
        sessions: SessionSigner::new(Some("integration-test-secret")),
        session_cookie_name: COOKIE_NAME.to_string(),
        proxy: ProxyConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            ..ProxyConfig::default()
        },
        storage,
    };

    create_router(Arc::new(state)).layer(TestConnectInfoLayer)
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));

        self.inner.call(req)
    }
}

/// Visitor-side request options
#[derive(Default)]
struct As<'a> {
    ip: Option<&'a str>,
    cookie: Option<&'a str>,
    user: Option<&'a str>,
    groups: Option<&'a str>,
}

fn hit_request(path: &str, body: &str, visitor: As<'_>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("host", "blog.example.com")
        .header("user-agent", "Mozilla/5.0 (integration)")
        .header("x-requested-with", "XMLHttpRequest")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-forwarded-for", visitor.ip.unwrap_or("1.2.3.4"));

    if let Some(cookie) = visitor.cookie {
        builder = builder.header("cookie", cookie);
    }
    if let Some(user) = visitor.user {
        builder = builder.header("x-remote-user", user);
    }
    if let Some(groups) = visitor.groups {
        builder = builder.header("x-remote-groups", groups);
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(path)
        .header("host", "blog.example.com")
        .header("x-forwarded-for", "1.2.3.4");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// `name=value` pair of the session cookie set by a response, if any
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(COOKIE_NAME))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn counter_pk(storage: &Arc<dyn Storage>, object_pk: &str) -> i64 {
    storage
        .get_or_create_hit_counter("blog.post", object_pk)
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_non_ajax_request_is_not_found() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "1").await;
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());

    let request = Request::builder()
        .method("POST")
        .uri("/hitcount/hit/ajax/")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!("hitcountPK={pk}")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(storage.list_hits(pk).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ajax_get_reports_post_only() {
    let storage = create_test_storage().await;
    let app = create_app(storage, HitCountConfig::default());

    let request = Request::builder()
        .uri("/hitcount/hit/ajax/")
        .header("x-requested-with", "XMLHttpRequest")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"success": false, "error_message": "Hits counted via POST only."})
    );
}

#[tokio::test]
async fn test_unusable_counter_pk_is_bad_request() {
    let storage = create_test_storage().await;
    let app = create_app(storage, HitCountConfig::default());

    for body in ["hitcountPK=abc", "hitcountPK=999", "other=1", ""] {
        let response = app
            .clone()
            .oneshot(hit_request("/hitcount/hit/ajax/", body, As::default()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
        assert_eq!(body_text(response).await, "HitCount object_pk not working");
    }
}

#[tokio::test]
async fn test_session_hit_counted_once() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());
    let body = format!("hitcountPK={pk}");

    let response = app
        .clone()
        .oneshot(hit_request("/hitcount/hit/ajax/", &body, As::default()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("new session should set a cookie");
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": true, "hit_message": "Hit counted: session key"})
    );

    let response = app
        .clone()
        .oneshot(hit_request(
            "/hitcount/hit/ajax/",
            &body,
            As {
                cookie: Some(&cookie),
                ..As::default()
            },
        ))
        .await
        .unwrap();
    assert!(session_cookie(&response).is_none());
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": false, "hit_message": "Not counted: session key has active hit"})
    );

    let hits = storage.list_hits(pk).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].ip, "1.2.3.4");
    assert_eq!(hits[0].domain, "blog.example.com");
    assert_eq!(hits[0].user_agent, "Mozilla/5.0 (integration)");
}

#[tokio::test]
async fn test_tampered_session_cookie_starts_new_session() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());
    let body = format!("hitcountPK={pk}");

    let response = app
        .clone()
        .oneshot(hit_request("/hitcount/hit/ajax/", &body, As::default()))
        .await
        .unwrap();
    let cookie = session_cookie(&response).unwrap();
    let tampered = format!("{}x", cookie);

    let response = app
        .clone()
        .oneshot(hit_request(
            "/hitcount/hit/ajax/",
            &body,
            As {
                cookie: Some(&tampered),
                ..As::default()
            },
        ))
        .await
        .unwrap();

    let new_cookie = session_cookie(&response).expect("tampered cookie should be replaced");
    assert_ne!(new_cookie, cookie);
    assert_eq!(body_json(response).await["hit_counted"], true);
    assert_eq!(storage.list_hits(pk).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_authenticated_user_counted_once_across_sessions() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());
    let body = format!("hitcountPK={pk}");

    let alice = || As {
        user: Some("alice"),
        ..As::default()
    };

    let response = app
        .clone()
        .oneshot(hit_request("/hitcount/hit/ajax/", &body, alice()))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": true, "hit_message": "Hit counted: user authentication"})
    );

    let response = app
        .clone()
        .oneshot(hit_request("/hitcount/hit/ajax/", &body, alice()))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": false, "hit_message": "Not counted: authenticated user has active hit"})
    );

    let hits = storage.list_hits(pk).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].user_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_excluded_group_not_counted() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let config = HitCountConfig {
        exclude_user_groups: vec!["staff".to_string()],
        ..HitCountConfig::default()
    };
    let app = create_app(Arc::clone(&storage), config);

    let response = app
        .oneshot(hit_request(
            "/hitcount/hit/ajax/",
            &format!("hitcountPK={pk}"),
            As {
                user: Some("alice"),
                groups: Some("writers,staff"),
                ..As::default()
            },
        ))
        .await
        .unwrap();

    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": false, "hit_message": "Not counted: user excluded by group"})
    );
    assert!(storage.list_hits(pk).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blacklisted_ip_not_counted() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    storage.add_blacklisted_ip("203.0.113.9").await.unwrap();
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());

    let response = app
        .oneshot(hit_request(
            "/hitcount/hit/ajax/",
            &format!("hitcountPK={pk}"),
            As {
                ip: Some("203.0.113.9"),
                ..As::default()
            },
        ))
        .await
        .unwrap();

    assert_eq!(
        body_json(response).await,
        serde_json::json!({"hit_counted": false, "hit_message": "Not counted: user IP has been blacklisted"})
    );
    assert!(storage.list_hits(pk).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ip_limit_applies_across_sessions() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let config = HitCountConfig {
        hits_per_ip_limit: 3,
        ..HitCountConfig::default()
    };
    let app = create_app(Arc::clone(&storage), config);
    let body = format!("hitcountPK={pk}");

    // Fresh session every time: only the IP ties the requests together
    let mut results = Vec::new();
    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(hit_request("/hitcount/hit/ajax/", &body, As::default()))
            .await
            .unwrap();
        results.push(body_json(response).await);
    }

    assert!(results[..3].iter().all(|r| r["hit_counted"] == true));
    assert_eq!(results[3]["hit_counted"], false);
    assert_eq!(
        results[3]["hit_message"],
        "Not counted: hits per IP address limit reached"
    );
}

#[tokio::test]
async fn test_legacy_endpoint_forwards() {
    let storage = create_test_storage().await;
    let pk = counter_pk(&storage, "42").await;
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());

    let response = app
        .clone()
        .oneshot(hit_request(
            "/hitcount/hit/ajax/legacy/",
            &format!("hitcountPK={pk}"),
            As::default(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["hit_counted"], true);

    let request = Request::builder()
        .method("POST")
        .uri("/hitcount/hit/ajax/legacy/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_detail_without_counting() {
    let storage = create_test_storage().await;
    let post = storage.create_post("Hello", "First post").await.unwrap();
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());

    let response = app
        .oneshot(get_request(&format!("/posts/{}", post.id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());

    let json = body_json(response).await;
    assert_eq!(json["post"]["title"], "Hello");
    assert_eq!(json["hitcount"]["total_hits"], 0);
    assert!(json["hitcount"].get("hit_counted").is_none());
    assert!(json["hitcount"].get("hit_message").is_none());

    let pk = json["hitcount"]["pk"].as_i64().unwrap();
    assert_eq!(pk, counter_pk(&storage, &post.id.to_string()).await);
}

#[tokio::test]
async fn test_post_detail_counting_reports_running_total() {
    let storage = create_test_storage().await;
    let post = storage.create_post("Hello", "First post").await.unwrap();
    let app = create_app(Arc::clone(&storage), HitCountConfig::default());
    let path = format!("/posts/{}/count-hit", post.id);

    let response = app.clone().oneshot(get_request(&path, None)).await.unwrap();
    let cookie = session_cookie(&response).unwrap();
    let json = body_json(response).await;
    assert_eq!(json["hitcount"]["hit_counted"], true);
    assert_eq!(json["hitcount"]["hit_message"], "Hit counted: session key");
    assert_eq!(json["hitcount"]["total_hits"], 1);

    // Same session: stored total, no increment
    let response = app
        .clone()
        .oneshot(get_request(&path, Some(&cookie)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["hitcount"]["hit_counted"], false);
    assert_eq!(json["hitcount"]["total_hits"], 1);

    // New session
    let response = app.clone().oneshot(get_request(&path, None)).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["hitcount"]["hit_counted"], true);
    assert_eq!(json["hitcount"]["total_hits"], 2);

    // The JSON endpoint shares the counter and the session
    let pk = json["hitcount"]["pk"].as_i64().unwrap();
    let response = app
        .oneshot(hit_request(
            "/hitcount/hit/ajax/",
            &format!("hitcountPK={pk}"),
            As {
                cookie: Some(&cookie),
                ..As::default()
            },
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["hit_counted"], false);
}

#[tokio::test]
async fn test_unknown_post_is_not_found() {
    let storage = create_test_storage().await;
    let app = create_app(storage, HitCountConfig::default());

    let response = app
        .oneshot(get_request("/posts/404/count-hit", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let storage = create_test_storage().await;
    let app = create_app(storage, HitCountConfig::default());

    let response = app.oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"status": "OK"}));
}
