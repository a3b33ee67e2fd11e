use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use taskhub_db::messages::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MessagePage};
use taskhub_db::models::PostedMessage;
use taskhub_gateway::publish_message;
use taskhub_types::api::{AckMessagesRequest, AckResponse, Claims, PostMessageRequest};
use taskhub_types::models::ContextTarget;

use crate::error::ApiError;
use crate::state::AppState;
use crate::views::{MessageView, RequestKind};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `created_at` of the oldest message already seen; returns older ones.
    pub before: Option<DateTime<Utc>>,
    /// Id of that message, so others sharing its timestamp are kept.
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
        return Err(ApiError::bad_request(
            "limit",
            format!("must be between 1 and {}", MAX_PAGE_SIZE),
        ));
    }
    if query.before_id.is_some() && query.before.is_none() {
        return Err(ApiError::bad_request("before_id", "requires before"));
    }
    let page = MessagePage {
        limit: query.limit,
        before: query.before,
        before_id: query.before_id,
    };

    let rows = state
        .db(move |db| db.list_messages(thread_id, claims.sub, page))
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| MessageView::new(RequestKind::Read, row))
            .collect(),
    ))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<MessageView, ApiError> {
    let posted = state
        .db(move |db| db.post_message(thread_id, claims.sub, &req.content))
        .await?;
    Ok(announce(&state, posted))
}

/// Post on a project's thread, opening it if this is the first message.
pub async fn post_to_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<MessageView, ApiError> {
    post_to_target(state, claims, ContextTarget::Project(project_id), req).await
}

/// Post on a task's thread, opening it if this is the first message.
pub async fn post_to_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<MessageView, ApiError> {
    post_to_target(state, claims, ContextTarget::Task(task_id), req).await
}

async fn post_to_target(
    state: AppState,
    claims: Claims,
    target: ContextTarget,
    req: PostMessageRequest,
) -> Result<MessageView, ApiError> {
    // Reject blank content before a thread gets created for it.
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content", "must not be empty"));
    }
    let viewer = claims.sub;
    let posted = state
        .db(move |db| {
            let thread = db.get_or_create_context_thread(viewer, target)?;
            db.post_message(thread.id, viewer, &req.content)
        })
        .await?;
    Ok(announce(&state, posted))
}

fn announce(state: &AppState, posted: PostedMessage) -> MessageView {
    debug!(
        "Publishing message {} on thread {}",
        posted.message.id, posted.message.thread_id
    );
    publish_message(state.notifier.as_ref(), &posted);
    MessageView::new(RequestKind::Write, posted.message)
}

pub async fn ack_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<AckMessagesRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let acked = state
        .db(move |db| db.ack_thread_messages(claims.sub, thread_id, &req.message_ids))
        .await?;
    Ok(Json(AckResponse { acked }))
}
