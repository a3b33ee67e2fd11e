use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use taskhub_types::api::{
    AckThreadRequest, Claims, CounterpartUnread, UnreadCountResponse, UnreadThread, WatermarkResponse,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::views::{RequestKind, ThreadView, counterpart_unread, unread_thread};

/// Move the caller's read watermark. An empty body means "read up to now".
pub async fn ack_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
    body: Option<Json<AckThreadRequest>>,
) -> Result<Json<WatermarkResponse>, ApiError> {
    let seen_at = body.and_then(|Json(req)| req.seen_at);
    let watermark = state
        .db(move |db| db.ack_thread(claims.sub, thread_id, seen_at))
        .await?;
    Ok(Json(WatermarkResponse {
        thread_id: watermark.thread_id,
        seen_at: watermark.seen_at,
        unread_count: watermark.unread_count,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state
        .db(move |db| db.unread_count(thread_id, claims.sub))
        .await?;
    Ok(Json(UnreadCountResponse {
        thread_id,
        unread_count,
    }))
}

pub async fn unread_threads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UnreadThread>>, ApiError> {
    let rows = state.db(move |db| db.unread_threads(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(unread_thread).collect()))
}

pub async fn unread_by_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<CounterpartUnread>>, ApiError> {
    let rows = state
        .db(move |db| db.per_counterpart_unread(claims.sub))
        .await?;
    Ok(Json(rows.into_iter().map(counterpart_unread).collect()))
}

pub async fn threads_with_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ThreadView>>, ApiError> {
    let listings = state
        .db(move |db| db.threads_with_user(claims.sub, user_id))
        .await?;
    Ok(Json(
        listings
            .into_iter()
            .map(|listing| ThreadView::new(RequestKind::Read, listing))
            .collect(),
    ))
}
