pub mod admin;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use chatmate_shared::middleware::metrics_middleware;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Admin
        .route("/users/:id/completion", get(admin::get_completion))
        .route("/users/:id/session", get(admin::get_active_session))
        .route("/sessions/:id/end", post(admin::end_session))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::models::{Gender, LookingFor, UserPatch};
    use crate::store::{MemoryStore, ProfileStore};
    use crate::transport::recording::RecordingTransport;

    fn app() -> (Arc<MemoryStore>, Arc<RecordingTransport>, Arc<AppState>) {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(RecordingTransport::default());
        let state = Arc::new(AppState::new(
            AppConfig::default(),
            store.clone(),
            store.clone(),
            transport.clone(),
            None,
        ));
        (store, transport, state)
    }

    async fn call(state: Arc<AppState>, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn health_reports_storage() {
        let (_, _, state) = app();
        let (status, body) = call(state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"][0]["name"], "storage");
    }

    #[tokio::test]
    async fn completion_lists_missing_fields() {
        let (store, _, state) = app();
        store
            .upsert_user(1, &UserPatch { age: Some(30), ..UserPatch::default() })
            .unwrap();

        let (status, body) = call(state, "GET", "/users/1/completion").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["complete"], false);
        assert_eq!(
            body["data"]["missing"],
            serde_json::json!(["gender", "looking_for", "city", "bio", "interests"])
        );
    }

    #[tokio::test]
    async fn session_lookup_and_admin_end() {
        let (store, transport, state) = app();
        for id in 1..=2 {
            store
                .upsert_user(
                    id,
                    &UserPatch {
                        age: Some(30),
                        gender: Some(Gender::Other),
                        looking_for: Some(LookingFor::Anyone),
                        ..UserPatch::default()
                    },
                )
                .unwrap();
        }

        let (status, body) = call(state.clone(), "GET", "/users/1/session").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E3004");

        let session = state.sessions.start(1, 2).unwrap();
        let (status, body) = call(state.clone(), "GET", "/users/2/session").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], session.id);

        let uri = format!("/sessions/{}/end", session.id);
        let (status, body) = call(state.clone(), "POST", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ended");
        assert_eq!(body["data"]["end_reason"], "admin");
        assert_eq!(transport.sent().len(), 2);

        let (status, _) = call(state.clone(), "POST", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transport.sent().len(), 2);

        let (status, body) = call(state, "POST", "/sessions/999/end").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E3004");
    }
}
