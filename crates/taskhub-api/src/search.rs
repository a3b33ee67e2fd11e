use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use taskhub_types::api::{Claims, SearchHit};

use crate::error::ApiError;
use crate::state::AppState;
use crate::views::search_hit;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let rows = state
        .db(move |db| db.search_messages(claims.sub, &query.q))
        .await?;
    Ok(Json(rows.into_iter().map(search_hit).collect()))
}
