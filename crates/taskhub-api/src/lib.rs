//! HTTP surface of the messaging core.

pub mod error;
pub mod messages;
pub mod middleware;
pub mod search;
pub mod state;
pub mod threads;
pub mod unread;
pub mod views;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All routes. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/threads", get(threads::list_threads).post(threads::create_thread))
        .route("/threads/{thread_id}", get(threads::get_thread))
        .route(
            "/threads/{thread_id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/threads/{thread_id}/messages/ack", post(messages::ack_messages))
        .route("/threads/{thread_id}/ack", post(unread::ack_thread))
        .route("/threads/{thread_id}/unread", get(unread::unread_count))
        .route("/projects/{project_id}/messages", post(messages::post_to_project))
        .route("/tasks/{task_id}/messages", post(messages::post_to_task))
        .route(
            "/direct-threads",
            get(threads::list_direct_threads).post(threads::create_direct_thread),
        )
        .route("/unread/threads", get(unread::unread_threads))
        .route("/unread/users", get(unread::unread_by_user))
        .route("/users/{user_id}/threads", get(unread::threads_with_user))
        .route("/messages/search", get(search::search_messages))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
