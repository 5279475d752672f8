use askama::Template;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::REFERER},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::app::App;
use crate::core::catalog::TimeWindow;
use crate::core::guard::{Navigation, ROOT_PATH, Route, guard};
use crate::core::lists::{AddOutcome, ListError, ListKind};
use crate::core::metadata::MetadataClient;
use crate::core::models::{MediaItem, User};

// ── Server bootstrap ─────────────────────────────────────────

pub fn router(app: App) -> Router {
    let api = Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/user", get(current_user))
        .route("/api/auth/status", get(auth_status))
        .route("/api/trending/movies", get(trending_movies))
        .route("/api/trending/tv", get(trending_tv))
        .route("/api/movie/{id}", get(movie_details))
        .route("/api/tv/{id}", get(tv_details))
        .route("/api/favorites", get(favorites).post(add_favorite))
        .route("/api/watchlist", get(watchlist).post(add_to_watchlist))
        .with_state(app.clone());

    // Page navigations go through the route guard; API calls do not.
    let pages = Router::new()
        .fallback(page_shell)
        .layer(middleware::from_fn_with_state(app.clone(), guard_pages))
        .with_state(app);

    api.fallback_service(pages)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(app: App, port: u16) -> std::io::Result<()> {
    let router = router(app).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(url = %format!("http://localhost:{port}"), "Marquee listening");

    axum::serve(listener, router).await
}

fn error_body(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

// ── Route guard ──────────────────────────────────────────────

/// Path part of an absolute `Referer` URL.
fn referer_path(raw: &str) -> &str {
    let rest = match raw.split_once("://") {
        Some((_, rest)) => rest,
        None => raw,
    };
    let path = match rest.find('/') {
        Some(i) => &rest[i..],
        None => ROOT_PATH,
    };
    path.split(['?', '#']).next().unwrap_or(ROOT_PATH)
}

async fn guard_pages(State(app): State<App>, req: Request, next: Next) -> Response {
    let to = req.uri().path().to_string();
    let from = req
        .headers()
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(|r| referer_path(r).to_string())
        .unwrap_or_else(|| ROOT_PATH.to_string());

    let user = app.session.user();
    match guard(&Route::new(&to), &Route::new(&from), user.as_ref()) {
        Navigation::Proceed => next.run(req).await,
        Navigation::Redirect { to: target, .. } => {
            info!(path = %to, redirect = %target, "anonymous visit to protected page");
            Redirect::to(&target).into_response()
        }
    }
}

/// Client-rendered page; `path` is auto-escaped by the template.
#[derive(Template)]
#[template(path = "page_shell.html")]
struct PageShell<'a> {
    path: &'a str,
}

async fn page_shell(req: Request) -> Response {
    let shell = PageShell {
        path: req.uri().path(),
    };
    match shell.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// ── Auth ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CredentialsBody {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpBody {
    user: Option<User>,
    needs_email_confirmation: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStatusBody {
    user: Option<User>,
    authenticated: bool,
    loading: bool,
    error: Option<String>,
}

async fn sign_up(State(app): State<App>, Json(body): Json<CredentialsBody>) -> Response {
    match app.session.sign_up(&body.email, &body.password).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(SignUpBody {
                user: outcome.user,
                needs_email_confirmation: outcome.needs_email_confirmation,
            }),
        )
            .into_response(),
        Err(e) => error_body(StatusCode::BAD_REQUEST, e),
    }
}

async fn sign_in(State(app): State<App>, Json(body): Json<CredentialsBody>) -> Response {
    match app.session.sign_in(&body.email, &body.password).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => error_body(StatusCode::UNAUTHORIZED, e),
    }
}

async fn sign_out(State(app): State<App>) -> Response {
    match app.session.sign_out().await {
        Ok(Navigation::Redirect { to, .. }) => Redirect::to(&to).into_response(),
        Ok(Navigation::Proceed) => Redirect::to(ROOT_PATH).into_response(),
        Err(e) => error_body(StatusCode::BAD_GATEWAY, e),
    }
}

async fn current_user(State(app): State<App>) -> Response {
    match app.session.get_user().await {
        Ok(user) => Json(json!({ "user": user })).into_response(),
        Err(e) => error_body(StatusCode::BAD_GATEWAY, e),
    }
}

async fn auth_status(State(app): State<App>) -> Response {
    let status = app.session.status();
    let user = app.session.user();
    Json(AuthStatusBody {
        authenticated: user.is_some(),
        user,
        loading: status.loading(),
        error: status.error().map(|e| e.to_string()),
    })
    .into_response()
}

// ── Catalog ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct TrendingQuery {
    #[serde(default)]
    window: TimeWindow,
    page: Option<u32>,
}

fn catalog(app: &App) -> Result<Arc<MetadataClient>, Response> {
    app.metadata.clone().ok_or_else(|| {
        error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "movie/TV browsing is not configured",
        )
    })
}

async fn trending_movies(State(app): State<App>, Query(q): Query<TrendingQuery>) -> Response {
    let metadata = match catalog(&app) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    Json(metadata.trending_movies(q.window, q.page.unwrap_or(1)).await).into_response()
}

async fn trending_tv(State(app): State<App>, Query(q): Query<TrendingQuery>) -> Response {
    let metadata = match catalog(&app) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    Json(metadata.trending_tv(q.window, q.page.unwrap_or(1)).await).into_response()
}

async fn movie_details(State(app): State<App>, Path(id): Path<i64>) -> Response {
    let metadata = match catalog(&app) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match metadata.movie_details(id).await {
        Some(movie) => Json(movie).into_response(),
        None => error_body(StatusCode::BAD_GATEWAY, catalog_error(&metadata)),
    }
}

async fn tv_details(State(app): State<App>, Path(id): Path<i64>) -> Response {
    let metadata = match catalog(&app) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match metadata.tv_details(id).await {
        Some(show) => Json(show).into_response(),
        None => error_body(StatusCode::BAD_GATEWAY, catalog_error(&metadata)),
    }
}

fn catalog_error(metadata: &MetadataClient) -> String {
    metadata
        .error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "catalog unavailable".into())
}

// ── Lists ────────────────────────────────────────────────────

fn list_error(e: ListError) -> Response {
    match e {
        ListError::NotAuthenticated => error_body(StatusCode::UNAUTHORIZED, e),
        ListError::Backend(_) => error_body(StatusCode::BAD_GATEWAY, e),
    }
}

async fn list_response(app: &App, kind: ListKind) -> Response {
    match app.lists.list(kind).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => list_error(e),
    }
}

async fn add_response(app: &App, kind: ListKind, item: &MediaItem) -> Response {
    match app.lists.add(kind, item).await {
        Ok(AddOutcome::Added(record)) => (StatusCode::CREATED, Json(record)).into_response(),
        Ok(AddOutcome::AlreadyExists(record)) => Json(record).into_response(),
        Err(e) => list_error(e),
    }
}

async fn favorites(State(app): State<App>) -> Response {
    list_response(&app, ListKind::Favorites).await
}

async fn add_favorite(State(app): State<App>, Json(item): Json<MediaItem>) -> Response {
    add_response(&app, ListKind::Favorites, &item).await
}

async fn watchlist(State(app): State<App>) -> Response {
    list_response(&app, ListKind::Watchlist).await
}

async fn add_to_watchlist(State(app): State<App>, Json(item): Json<MediaItem>) -> Response {
    add_response(&app, ListKind::Watchlist, &item).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fake::FakeBackend;
    use crate::core::session::SessionOptions;
    use axum::body::Body;
    use axum::http;
    use axum::http::header::{CONTENT_TYPE, LOCATION};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app_with(backend: Arc<FakeBackend>) -> Router {
        router(App::start(backend, None, SessionOptions::default()).await)
    }

    fn get_req(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_referer_path() {
        assert_eq!(referer_path("http://localhost:3001/watchlist?x=1"), "/watchlist");
        assert_eq!(referer_path("https://example.com"), "/");
        assert_eq!(referer_path("/login#top"), "/login");
    }

    #[tokio::test]
    async fn test_anonymous_page_visit_redirects_to_login() {
        let app = app_with(Arc::new(FakeBackend::new())).await;

        let resp = app.clone().oneshot(get_req("/favorites")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], "/login");

        let resp = app.oneshot(get_req("/login")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_restored_session_opens_protected_pages() {
        let backend = Arc::new(FakeBackend::new());
        let user = backend.register("ada@example.com", "pw");
        backend.restore_session(&user);
        let app = app_with(backend).await;

        let resp = app.oneshot(get_req("/watchlist")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_page_shell_escapes_path() {
        let backend = Arc::new(FakeBackend::new());
        let user = backend.register("ada@example.com", "pw");
        backend.restore_session(&user);
        let app = app_with(backend).await;

        let resp = app
            .oneshot(get_req("/x\"onmouseover=\"alert(1)"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("data-path=\"/x&"));
        assert!(!body.contains("\"onmouseover="));
    }

    #[tokio::test]
    async fn test_anonymous_list_read_is_unauthorized() {
        let backend = Arc::new(FakeBackend::new());
        let app = app_with(backend.clone()).await;

        let resp = app.oneshot(get_req("/api/favorites")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(backend.rows("favorites").is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_then_add_favorite_twice() {
        let backend = Arc::new(FakeBackend::new());
        backend.register("ada@example.com", "pw");
        let app = app_with(backend.clone()).await;

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/auth/signin",
                json!({ "email": "ada@example.com", "password": "pw" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let item = json!({ "movieId": 550, "movieType": "movie", "title": "Fight Club" });
        let first = app
            .clone()
            .oneshot(post_json("/api/favorites", item.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .clone()
            .oneshot(post_json("/api/favorites", item))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(backend.rows("favorites").len(), 1);

        let listed = json_body(app.oneshot(get_req("/api/favorites")).await.unwrap()).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
        assert_eq!(listed[0]["title"], "Fight Club");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let backend = Arc::new(FakeBackend::new());
        backend.register("ada@example.com", "pw");
        let app = app_with(backend).await;

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/auth/signin",
                json!({ "email": "ada@example.com", "password": "wrong" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let status = json_body(app.oneshot(get_req("/api/auth/status")).await.unwrap()).await;
        assert_eq!(status["authenticated"], false);
        assert!(status["error"].is_string());
    }

    #[tokio::test]
    async fn test_sign_out_redirects_home() {
        let backend = Arc::new(FakeBackend::new());
        let user = backend.register("ada@example.com", "pw");
        backend.restore_session(&user);
        let app = app_with(backend).await;

        let resp = app
            .clone()
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/api/auth/signout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], "/");

        let status = json_body(app.oneshot(get_req("/api/auth/status")).await.unwrap()).await;
        assert_eq!(status["authenticated"], false);
    }

    #[tokio::test]
    async fn test_catalog_routes_unavailable_without_key() {
        let app = app_with(Arc::new(FakeBackend::new())).await;

        let resp = app.oneshot(get_req("/api/trending/movies")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
