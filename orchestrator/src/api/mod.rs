//! API module for the Dockside orchestrator
//!
//! Provides endpoints for:
//! - Session launch, inspection and shutdown
//! - Command execution
//! - Commit/publish
//! - Terminal and event WebSockets
//! - Health checks

mod error;
pub mod extract;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::AppState;

pub use error::ApiError;
pub use extract::SessionKey;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Liveness and health (no session)
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        // Prometheus metrics (no session for scraping)
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/socket/config", get(handlers::health::socket_config))
        // Session lifecycle
        .route("/launch", post(handlers::session::launch))
        .route("/session", get(handlers::session::get_session))
        .route(
            "/shutdown/container",
            delete(handlers::session::shutdown_session),
        )
        .route(
            "/shutdown/container/:id",
            delete(handlers::session::shutdown_container),
        )
        // Containers
        .route("/containers", get(handlers::containers::list_containers))
        .route("/changes", get(handlers::containers::list_changes))
        // Execution
        .route("/exec/container", post(handlers::execute::exec_session))
        .route("/exec/container/:id", post(handlers::execute::exec_container))
        // Publishing
        .route("/commit", put(handlers::publish::commit))
        // Realtime channels
        .route("/terminal", get(handlers::terminal::terminal_handler))
        .route("/events", get(handlers::events::events_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::ContainerEngine;
    use crate::models::{
        ChangeKind, CommitResponse, ExecResponse, FsChange, LaunchResponse, PublishEvent,
        ShutdownResponse,
    };
    use crate::testing::{FakeConnector, FakeEngine};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use pretty_assertions::assert_eq;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    use super::extract::SESSION_HEADER;

    fn test_app(engine: FakeEngine) -> (Router, Arc<AppState>) {
        let mut config = AppConfig::default();
        config.exec.poll_interval_ms = 5;
        let state = Arc::new(AppState::new(
            config,
            Arc::new(engine),
            Arc::new(FakeConnector::default()),
        ));
        (create_router(state.clone()), state)
    }

    fn request(method: Method, uri: &str, session: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn launch(app: &Router, name: &str) -> LaunchResponse {
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/launch", None, Some(json!({ "name": name }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let launched: LaunchResponse = json_body(response).await;
        assert!(cookie.starts_with(&format!("dockside_session={}", launched.session_id)));
        launched
    }

    #[tokio::test]
    async fn test_root_is_ok() {
        let (app, _) = test_app(FakeEngine::new());
        let response = app
            .oneshot(request(Method::GET, "/", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_launch_exec_shutdown_flow() {
        let (app, _) = test_app(FakeEngine::new());
        let launched = launch(&app, "alpha").await;
        let session = launched.session_id.to_string();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/exec/container",
                Some(&session),
                Some(json!({ "cmd": ["echo", "hello"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let exec: ExecResponse = json_body(response).await;
        assert_eq!(exec.exit_code, 0);
        assert_eq!(exec.container_id, launched.container_id);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/exec/container",
                Some(&session),
                Some(json!({ "cmd": ["false"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let exec: ExecResponse = json_body(response).await;
        assert_eq!(exec.exit_code, 1);

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/shutdown/container", Some(&session), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        let shutdown: ShutdownResponse = json_body(response).await;
        assert!(!shutdown.already_gone);

        // The container is gone; exec against it fails
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/exec/container/{}", launched.container_id),
                None,
                Some(json!({ "cmd": ["true"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request(
                Method::POST,
                "/exec/container",
                Some(&session),
                Some(json!({ "cmd": ["true"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_by_id_twice_is_success() {
        let (app, _) = test_app(FakeEngine::new());
        let launched = launch(&app, "alpha").await;
        let uri = format!("/shutdown/container/{}", launched.container_id);

        let first: ShutdownResponse = json_body(
            app.clone()
                .oneshot(request(Method::DELETE, &uri, None, None))
                .await
                .unwrap(),
        )
        .await;
        assert!(!first.already_gone);

        let response = app
            .oneshot(request(Method::DELETE, &uri, None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second: ShutdownResponse = json_body(response).await;
        assert!(second.already_gone);
    }

    #[tokio::test]
    async fn test_session_required() {
        let (app, _) = test_app(FakeEngine::new());
        let response = app
            .oneshot(request(
                Method::POST,
                "/exec/container",
                None,
                Some(json!({ "cmd": ["true"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_info_and_changes() {
        let engine = FakeEngine::new().with_changes(vec![
            FsChange {
                path: "/home/clouseau/notes.md".into(),
                kind: ChangeKind::Modified,
            },
            FsChange {
                path: "/home/clouseau/.git/index".into(),
                kind: ChangeKind::Modified,
            },
        ]);
        let (app, _) = test_app(engine);
        let launched = launch(&app, "alpha").await;
        let session = launched.session_id.to_string();

        let info: serde_json::Value = json_body(
            app.clone()
                .oneshot(request(Method::GET, "/session", Some(&session), None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(info["status"], "running");
        assert_eq!(info["name"], "alpha");

        let changes: Vec<FsChange> = json_body(
            app.oneshot(request(Method::GET, "/changes", Some(&session), None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "/home/clouseau/notes.md");
    }

    #[tokio::test]
    async fn test_commit_broadcasts_publish_events() {
        let (app, state) = test_app(FakeEngine::new());
        let mut notices = state.events.subscribe();
        let launched = launch(&app, "myname").await;

        let response = app
            .oneshot(request(
                Method::PUT,
                "/commit",
                Some(&launched.session_id.to_string()),
                Some(json!({ "cwd": "/home/x", "entrypoint": ["/bin/run.sh"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let commit: CommitResponse = json_body(response).await;
        assert_eq!(commit.image, "jataware/clouseau:myname-latest");

        let last = loop {
            let notice = notices.recv().await.unwrap();
            assert_eq!(notice.channel, "docker_publish");
            assert_eq!(notice.container_id, launched.container_id);
            if notice.event.is_terminal() {
                break notice.event;
            }
        };
        assert_eq!(
            last,
            PublishEvent::Finished {
                image: "jataware/clouseau:myname-latest".into()
            }
        );
    }

    #[tokio::test]
    async fn test_socket_config_and_health() {
        let (app, _) = test_app(FakeEngine::new());

        let config: serde_json::Value = json_body(
            app.clone()
                .oneshot(request(Method::GET, "/socket/config", None, None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(config["address"], "ws://127.0.0.1:6010");

        let health: serde_json::Value = json_body(
            app.oneshot(request(Method::GET, "/health", None, None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["engine_version"], "fake-24.0");
    }

    #[tokio::test]
    async fn test_invalid_launch_name() {
        let (app, _) = test_app(FakeEngine::new());
        let response = app
            .oneshot(request(
                Method::POST,
                "/launch",
                None,
                Some(json!({ "name": "no spaces allowed" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn terminal_request(session: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri("/terminal")
            .header(SESSION_HEADER, session)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminal_requires_running_container() {
        let (app, state) = test_app(FakeEngine::new());

        // Pending: registered but never launched
        let pending = state.sessions.open("beta").await.unwrap();
        let response = app
            .clone()
            .oneshot(terminal_request(&pending.session_id.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Running: passes the session check and only fails the upgrade itself
        let launched = launch(&app, "alpha").await;
        let session = launched.session_id.to_string();
        let response = app.clone().oneshot(terminal_request(&session)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);

        // Removed outside the orchestrator
        state.engine.stop_container(&launched.container_id).await.unwrap();
        let response = app.clone().oneshot(terminal_request(&session)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);

        // The stopped session is forgotten afterwards
        let response = app.oneshot(terminal_request(&session)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
