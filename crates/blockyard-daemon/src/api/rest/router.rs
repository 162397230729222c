//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects/:id", get(handlers::get_project))
        .route(
            "/projects/:id/builds",
            get(handlers::list_project_builds).post(handlers::create_build),
        )
        .route(
            "/projects/:id/runs",
            get(handlers::list_project_runs).post(handlers::create_run),
        )
        // Builds
        .route("/builds", get(handlers::list_builds))
        .route("/builds/:id", get(handlers::get_build))
        // Runs
        .route("/runs", get(handlers::list_runs))
        .route("/runs/stream", get(handlers::stream_runs))
        .route("/runs/:id", get(handlers::get_run))
        .route("/runs/:id/stop", post(handlers::stop_run))
        .route("/runs/:id/command", post(handlers::send_command));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use futures_util::StreamExt;
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method("POST").uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let f = Fixture::new().await;
        let app = create_router(f.app_state(), true);

        let response = app.oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_build_enqueue_and_fetch() {
        let f = Fixture::new().await;
        let state = f.app_state();
        let app = create_router(state.clone(), false);

        let response = app
            .clone()
            .oneshot(post("/api/v1/projects/lobby/builds", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job = json_body(response).await;
        assert_eq!(job["projectId"], "lobby");
        assert_eq!(job["status"], "pending");

        let id = job["id"].as_str().unwrap().to_string();
        let build_id = blockyard_types::BuildId::parse(&id).unwrap();
        state.builds.wait_for(&build_id).await.unwrap();

        let response = app
            .oneshot(get(&format!("/api/v1/builds/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "succeeded");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let f = Fixture::new().await;
        let app = create_router(f.app_state(), false);

        let missing = app
            .clone()
            .oneshot(post("/api/v1/projects/nether/builds", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["code"], "NOT_FOUND");

        let no_build = app
            .clone()
            .oneshot(post("/api/v1/projects/lobby/runs", None))
            .await
            .unwrap();
        assert_eq!(no_build.status(), StatusCode::CONFLICT);

        let bad_id = app.clone().oneshot(get("/api/v1/runs/not-a-uuid")).await.unwrap();
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);

        let unknown_run = app
            .oneshot(post(
                &format!("/api/v1/runs/{}/command", blockyard_types::RunId::generate()),
                Some(serde_json::json!({ "command": "list" })),
            ))
            .await
            .unwrap();
        assert_eq!(unknown_run.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_stream_starts_with_init() {
        let f = Fixture::new().await;
        let app = create_router(f.app_state(), false);

        let response = app.oneshot(get("/api/v1/runs/stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&first);
        assert!(text.contains("event: init"));
        assert!(text.contains("data: []"));
    }
}
