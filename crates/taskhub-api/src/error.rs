use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use taskhub_db::DbError;
use taskhub_types::api::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid {field}: {message}")]
    BadRequest { field: &'static str, message: String },

    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(field: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Db(DbError::Validation { .. }) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Db(DbError::PermissionDenied) | Self::Unauthenticated => StatusCode::FORBIDDEN,
            Self::Db(DbError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Db(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Db(DbError::Validation { field, message })
            | Self::BadRequest { field, message } => ErrorBody {
                error: message.clone(),
                field: Some(field.to_string()),
            },
            Self::Db(DbError::PermissionDenied) | Self::Unauthenticated => ErrorBody {
                error: "forbidden".into(),
                field: None,
            },
            Self::Db(DbError::NotFound { entity, .. }) => ErrorBody {
                error: format!("{} not found", entity),
                field: None,
            },
            Self::Db(_) | Self::Internal(_) => {
                error!("Request failed: {}", self);
                ErrorBody {
                    error: "internal server error".into(),
                    field: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_status_codes() {
        assert_eq!(
            ApiError::from(DbError::validation("content", "empty")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(DbError::PermissionDenied).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(DbError::not_found("thread", "x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(DbError::Corrupt("bad row".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::FORBIDDEN);
    }
}
