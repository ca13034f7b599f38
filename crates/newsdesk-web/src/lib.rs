//! Axum JSON facade over the article store: the retrieval API the
//! presentation layer consumes.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use newsdesk_core::{
    Article, DEFAULT_PAGE_SIZE, DEFAULT_RECENT_LIMIT, RECENT_ARTICLE_WINDOW_DAYS,
    TASK_SYNC_ARTICLES,
};
use newsdesk_store::{ArticleStore, HealthCheck, Store, StoreError, TaskRunLog};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub const CRATE_NAME: &str = "newsdesk-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Handler error mapped onto an HTTP response with a JSON body. Storage
/// problems are explicit 503s: an empty page always means "no matching
/// rows", never a swallowed failure.
#[derive(Debug)]
pub enum ApiError {
    /// 400 — malformed cursor or out-of-range page size.
    InvalidQueryParameter(String),
    /// 503 — the store could not serve the query.
    StorageUnavailable(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidQueryParameter(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::StorageUnavailable(err) => {
                tracing::error!(error = %err, "storage error during read request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage unavailable".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::StorageUnavailable(err)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ArticlesQuery {
    q: Option<String>,
    before: Option<String>,
    page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecentQuery {
    window_days: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticlePageBody {
    items: Vec<Article>,
    has_more: bool,
    next_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCheck {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub status: String,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncFreshness {
    completed_at: Option<DateTime<Utc>>,
    is_recent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    checks: Vec<StatusCheck>,
    last_sync: SyncFreshness,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/articles", get(list_articles))
        .route("/api/articles/recent", get(list_recent))
        .route("/api/status", get(status_report))
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(state))
}

pub fn port_from_env() -> u16 {
    std::env::var("NEWSDESK_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "serving retrieval api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    tracing::info!(%method, %uri, status = response.status().as_u16(), "request");
    response
}

/// Missing cursor defaults to now; anything non-RFC3339 is rejected before
/// it reaches the store.
fn parse_before(raw: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
    match raw {
        None | Some("") => Ok(Utc::now()),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                ApiError::InvalidQueryParameter(format!("malformed 'before' cursor: {value}"))
            }),
    }
}

fn parse_page_size(raw: Option<i64>) -> Result<u32, ApiError> {
    match raw {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(v) if (1..=100).contains(&v) => Ok(v as u32),
        Some(v) => Err(ApiError::InvalidQueryParameter(format!(
            "page_size must be between 1 and 100, got {v}"
        ))),
    }
}

fn parse_window_days(raw: Option<i64>) -> Result<i64, ApiError> {
    match raw {
        None => Ok(RECENT_ARTICLE_WINDOW_DAYS),
        Some(v) if (1..=365).contains(&v) => Ok(v),
        Some(v) => Err(ApiError::InvalidQueryParameter(format!(
            "window_days must be between 1 and 365, got {v}"
        ))),
    }
}

fn parse_limit(raw: Option<i64>) -> Result<u32, ApiError> {
    match raw {
        None => Ok(DEFAULT_RECENT_LIMIT),
        Some(v) if (1..=100).contains(&v) => Ok(v as u32),
        Some(v) => Err(ApiError::InvalidQueryParameter(format!(
            "limit must be between 1 and 100, got {v}"
        ))),
    }
}

async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticlesQuery>,
) -> Result<Json<ArticlePageBody>, ApiError> {
    let before = parse_before(params.before.as_deref())?;
    let page_size = parse_page_size(params.page_size)?;
    let query = params.q.unwrap_or_default();

    let page = state.store.search_articles(&query, before, page_size).await?;
    let next_before = page.next_before();
    Ok(Json(ArticlePageBody {
        items: page.items,
        has_more: page.has_more,
        next_before,
    }))
}

async fn list_recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let window_days = parse_window_days(params.window_days)?;
    let limit = parse_limit(params.limit)?;
    let articles = state.store.recent_articles(window_days, limit).await?;
    Ok(Json(articles))
}

/// Status page data. Always 200: a broken store is reported as a degraded
/// check, not an error response.
async fn status_report(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    let web_check = StatusCheck {
        name: "Website".to_string(),
        info: None,
        status: "Operational".to_string(),
        ok: true,
    };

    let mut db_check = StatusCheck {
        name: "Database".to_string(),
        info: None,
        status: "Operational".to_string(),
        ok: true,
    };
    if let Err(err) = state.store.check_health().await {
        tracing::warn!(error = %err, "database health check failed");
        db_check.status = "Unresponsive".to_string();
        db_check.ok = false;
    }

    let (last_sync, sync_check) = match state
        .store
        .most_recent_automatic_run(TASK_SYNC_ARTICLES)
        .await
    {
        Ok(Some(run)) => {
            let is_recent = run.is_recent(Utc::now());
            let check = StatusCheck {
                name: "Last Sync".to_string(),
                info: Some(run.completed_at.format("%B %d, %Y").to_string()),
                status: if is_recent { "Timely" } else { "Outdated" }.to_string(),
                ok: is_recent,
            };
            (
                SyncFreshness {
                    completed_at: Some(run.completed_at),
                    is_recent,
                },
                check,
            )
        }
        Ok(None) => (
            SyncFreshness {
                completed_at: None,
                is_recent: false,
            },
            StatusCheck {
                name: "Last Sync".to_string(),
                info: None,
                status: "Never".to_string(),
                ok: false,
            },
        ),
        Err(err) => {
            tracing::warn!(error = %err, "could not read task run log");
            (
                SyncFreshness {
                    completed_at: None,
                    is_recent: false,
                },
                StatusCheck {
                    name: "Last Sync".to_string(),
                    info: None,
                    status: "Unknown".to_string(),
                    ok: false,
                },
            )
        }
    };

    Json(StatusBody {
        checks: vec![web_check, db_check, sync_check],
        last_sync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::{Duration, TimeZone};
    use http_body_util::BodyExt;
    use newsdesk_core::NewArticle;
    use newsdesk_store::MemoryStore;
    use tower::ServiceExt;

    fn new_article(url: &str, title: &str, source: &str, published_at: DateTime<Utc>) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: title.to_string(),
            description: None,
            source: source.to_string(),
            author: None,
            lede_image: None,
            published_at,
            created_at: Utc::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn seeded_state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let base = Utc.with_ymd_and_hms(2020, 7, 17, 12, 0, 0).single().unwrap();
        for (i, (url, title, source)) in [
            ("https://cnn.com/one", "Court sets a date", "cnn"),
            ("https://cnn.com/two", "Hearing recap", "cnn"),
            ("https://msnbc.com/one", "Ruling expected", "msnbc"),
        ]
        .into_iter()
        .enumerate()
        {
            store
                .insert_article(&new_article(url, title, source, base - Duration::days(i as i64)))
                .await
                .expect("seed");
        }
        let state = AppState::new(store.clone());
        (store, state)
    }

    #[tokio::test]
    async fn articles_listing_paginates_with_cursor() {
        let (_store, state) = seeded_state().await;

        let (status, body) = get_json(
            app(state.clone()),
            "/api/articles?before=2020-07-18T00:00:00Z&page_size=2",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["hasMore"], serde_json::json!(true));
        assert_eq!(body["items"][0]["url"], "https://cnn.com/one");
        assert!(body["nextBefore"].is_string());

        // Second page via the 2020-07-16 cursor of the last first-page item.
        let (status, body) = get_json(
            app(state),
            "/api/articles?before=2020-07-16T12:00:00Z&page_size=2",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["hasMore"], serde_json::json!(false));
        assert_eq!(body["items"][0]["url"], "https://msnbc.com/one");
    }

    #[tokio::test]
    async fn articles_listing_filters_by_query() {
        let (_store, state) = seeded_state().await;
        let (status, body) = get_json(
            app(state),
            "/api/articles?q=msnbc&before=2020-07-18T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["source"], "msnbc");
    }

    #[tokio::test]
    async fn malformed_cursor_and_page_size_are_rejected() {
        let (_store, state) = seeded_state().await;

        let (status, body) = get_json(app(state.clone()), "/api/articles?before=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("before"));

        let (status, _) = get_json(app(state.clone()), "/api/articles?page_size=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(state), "/api/articles?page_size=101").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recent_listing_honors_window() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_article(&new_article(
                "https://cnn.com/fresh",
                "Fresh",
                "cnn",
                Utc::now() - Duration::days(2),
            ))
            .await
            .expect("seed");
        store
            .insert_article(&new_article(
                "https://cnn.com/stale",
                "Stale",
                "cnn",
                Utc::now() - Duration::days(4),
            ))
            .await
            .expect("seed");

        let (status, body) = get_json(app(AppState::new(store)), "/api/articles/recent").await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["url"], "https://cnn.com/fresh");
    }

    #[tokio::test]
    async fn storage_outage_is_an_explicit_error_not_an_empty_page() {
        let (store, state) = seeded_state().await;
        store.set_unavailable(true);

        let (status, body) = get_json(app(state), "/api/articles").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "storage unavailable");
    }

    #[tokio::test]
    async fn status_reports_fresh_sync() {
        let (store, state) = seeded_state().await;
        store
            .record_task_run(TASK_SYNC_ARTICLES, false)
            .await
            .expect("record");

        let (status, body) = get_json(app(state), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lastSync"]["isRecent"], serde_json::json!(true));
        assert!(body["lastSync"]["completedAt"].is_string());

        let checks = body["checks"].as_array().unwrap();
        assert!(checks
            .iter()
            .all(|c| c["ok"] == serde_json::json!(true)));
    }

    #[tokio::test]
    async fn status_degrades_without_crashing_when_store_is_down() {
        let (store, state) = seeded_state().await;
        store.set_unavailable(true);

        let (status, body) = get_json(app(state), "/api/status").await;
        assert_eq!(status, StatusCode::OK);

        let checks = body["checks"].as_array().unwrap();
        let db = checks.iter().find(|c| c["name"] == "Database").unwrap();
        assert_eq!(db["ok"], serde_json::json!(false));
        assert_eq!(db["status"], "Unresponsive");
        assert_eq!(body["lastSync"]["isRecent"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn manual_only_history_reads_as_never_synced() {
        let (store, state) = seeded_state().await;
        store
            .record_task_run(TASK_SYNC_ARTICLES, true)
            .await
            .expect("record");

        let (_, body) = get_json(app(state), "/api/status").await;
        assert_eq!(body["lastSync"]["completedAt"], serde_json::Value::Null);
        let checks = body["checks"].as_array().unwrap();
        let sync = checks.iter().find(|c| c["name"] == "Last Sync").unwrap();
        assert_eq!(sync["status"], "Never");
    }
}
