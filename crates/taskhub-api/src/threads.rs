use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use taskhub_db::threads::ThreadFilter;
use taskhub_types::api::{Claims, CreateDirectThreadRequest, CreateThreadRequest};
use taskhub_types::models::ThreadKind;

use crate::error::ApiError;
use crate::state::AppState;
use crate::views::{RequestKind, ThreadView};

#[derive(Debug, Deserialize)]
pub struct ThreadListQuery {
    pub kind: Option<String>,
}

impl ThreadListQuery {
    fn filter(&self) -> Result<ThreadFilter, ApiError> {
        match self.kind.as_deref() {
            None | Some("") | Some("all") => Ok(ThreadFilter::All),
            Some(raw) => match raw.parse::<ThreadKind>() {
                Ok(ThreadKind::Context) => Ok(ThreadFilter::Context),
                Ok(ThreadKind::Direct) => Ok(ThreadFilter::Direct),
                Err(e) => Err(ApiError::bad_request("kind", e)),
            },
        }
    }
}

pub async fn list_threads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ThreadListQuery>,
) -> Result<Json<Vec<ThreadView>>, ApiError> {
    let filter = query.filter()?;
    let listings = state.db(move |db| db.list_threads(claims.sub, filter)).await?;
    Ok(Json(
        listings
            .into_iter()
            .map(|listing| ThreadView::new(RequestKind::Read, listing))
            .collect(),
    ))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<ThreadView, ApiError> {
    let viewer = claims.sub;
    let listing = state
        .db(move |db| {
            let thread = db.create_context_thread(viewer, req.project_id, req.task_id)?;
            db.thread_for_viewer(viewer, thread.id)
        })
        .await?;

    info!("{} opened thread {}", claims.username, listing.thread.id);
    Ok(ThreadView::new(RequestKind::Write, listing))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> Result<ThreadView, ApiError> {
    let listing = state
        .db(move |db| db.thread_for_viewer(claims.sub, thread_id))
        .await?;
    Ok(ThreadView::new(RequestKind::Read, listing))
}

pub async fn list_direct_threads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ThreadView>>, ApiError> {
    let listings = state
        .db(move |db| db.list_threads(claims.sub, ThreadFilter::Direct))
        .await?;
    Ok(Json(
        listings
            .into_iter()
            .map(|listing| ThreadView::new(RequestKind::Read, listing))
            .collect(),
    ))
}

pub async fn create_direct_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDirectThreadRequest>,
) -> Result<ThreadView, ApiError> {
    let viewer = claims.sub;
    let listing = state
        .db(move |db| {
            let thread = db.create_direct_thread(viewer, &req.member_ids)?;
            db.thread_for_viewer(viewer, thread.id)
        })
        .await?;

    info!(
        "{} opened direct thread {} with {} members",
        claims.username,
        listing.thread.id,
        listing.members.len()
    );
    Ok(ThreadView::new(RequestKind::Write, listing))
}
