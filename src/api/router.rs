//! API router.
//!
//! Returns a composable `Router`. A request trace layer wraps every route;
//! CORS allows read access from any origin so dashboards can poll status.

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router over shared state.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/reports/:discussion_id",
            post(endpoints::reports::generate)
                .get(endpoints::reports::status)
                .delete(endpoints::reports::cancel),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::AppConfig;
    use crate::db::Database;
    use crate::models::enums::{Category, DiscussionTemplate};
    use crate::models::Discussion;
    use crate::pipeline::consensus::testing::{echo_client, seed};

    fn test_core(read_only: bool, delay_ms: u64) -> Arc<CoreState> {
        let mut config = AppConfig::default();
        config.read_only = read_only;
        config.extraction_concurrency = 1;
        let client = echo_client(Category::BinaryProposal).with_delay(Duration::from_millis(delay_ms));
        Arc::new(CoreState::new(
            config,
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(client),
        ))
    }

    fn seeded(core: &CoreState, texts: &[&str]) -> Discussion {
        seed(&core.db, Some(DiscussionTemplate::FeaturePrioritization), texts)
    }

    async fn send(app: Router, method: &str, uri: String) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Poll status until the job leaves the in-progress states.
    async fn wait_for_terminal(core: &Arc<CoreState>, id: Uuid) -> serde_json::Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let (_, json) = send(api_router(core.clone()), "GET", format!("/reports/{id}")).await;
            let state = json["state"].as_str().unwrap_or_default().to_string();
            if state == "COMPLETE" || state == "FAILED" || Instant::now() > deadline {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn health_reports_policy() {
        let core = test_core(true, 0);
        let (status, json) = send(api_router(core), "GET", "/health".into()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["read_only"], true);
        assert_eq!(json["llm"], "mock");
    }

    #[tokio::test]
    async fn trigger_then_poll_to_complete() {
        let core = test_core(false, 0);
        let d = seeded(&core, &["Search first", "Search matters", "Dark mode later"]);

        let (status, _) = send(
            api_router(core.clone()),
            "POST",
            format!("/reports/{}?owner_id={}", d.id, d.owner_id),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let json = wait_for_terminal(&core, d.id).await;
        assert_eq!(json["state"], "COMPLETE");
        assert_eq!(json["report_progress"], 1.0);
        assert_eq!(json["category"], "PRIORITIZATION_RANKING");
        assert!(json["report"]["theme_board"].is_array());
        assert!(json["report"]["summary"]["main_summary"].is_string());
    }

    #[tokio::test]
    async fn status_before_any_job_is_empty() {
        let core = test_core(false, 0);
        let d = seeded(&core, &["a"]);
        let (status, json) = send(api_router(core), "GET", format!("/reports/{}", d.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["state"].is_null());
        assert!(json["report_progress"].is_null());
    }

    #[tokio::test]
    async fn read_only_trigger_conflicts() {
        let core = test_core(true, 0);
        let d = seeded(&core, &["a"]);
        let (status, json) = send(
            api_router(core),
            "POST",
            format!("/reports/{}?owner_id={}", d.id, d.owner_id),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn unknown_discussion_is_404() {
        let core = test_core(false, 0);
        let (status, json) = send(
            api_router(core),
            "POST",
            format!("/reports/{}?owner_id={}", Uuid::new_v4(), Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn non_owner_is_403() {
        let core = test_core(false, 0);
        let d = seeded(&core, &["a"]);
        let (status, _) = send(
            api_router(core),
            "POST",
            format!("/reports/{}?owner_id={}", d.id, Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_owner_is_client_error() {
        let core = test_core(false, 0);
        let d = seeded(&core, &["a"]);
        let (status, _) = send(api_router(core), "POST", format!("/reports/{}", d.id)).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn double_trigger_conflicts_then_cancel() {
        let core = test_core(false, 100);
        let d = seeded(&core, &["a", "b", "c", "d"]);
        let uri = format!("/reports/{}?owner_id={}", d.id, d.owner_id);

        let (first, _) = send(api_router(core.clone()), "POST", uri.clone()).await;
        let (second, _) = send(api_router(core.clone()), "POST", uri.clone()).await;
        assert_eq!(first, StatusCode::NO_CONTENT);
        assert_eq!(second, StatusCode::CONFLICT);

        let (cancel, _) = send(api_router(core.clone()), "DELETE", uri.clone()).await;
        assert_eq!(cancel, StatusCode::NO_CONTENT);

        let json = wait_for_terminal(&core, d.id).await;
        assert_eq!(json["state"], "FAILED");
        assert_eq!(json["error"], "cancelled");
        assert!(json["report_progress"].is_null());

        // Nothing left to cancel once the job has stopped.
        let deadline = Instant::now() + Duration::from_secs(5);
        while core.reports.jobs().running_job(&d.id).is_some() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (again, _) = send(api_router(core), "DELETE", uri).await;
        assert_eq!(again, StatusCode::CONFLICT);
    }
}
