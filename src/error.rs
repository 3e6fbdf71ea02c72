use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Validation(vec![
                "Duplicate field value. Please use another value".to_string(),
            ]),
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                AppError::BadRequest("Referenced document does not exist".to_string())
            }
            _ => match err {
                DbErr::RecordNotFound(_) => {
                    AppError::NotFound("No document found with that ID".to_string())
                }
                other => AppError::Internal(other.to_string()),
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization failure: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Operational errors carry their message to the client; anything else
        // is logged in full and answered with an opaque envelope.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "unhandled internal error");
            "Something went wrong!".to_string()
        } else {
            self.to_string()
        };

        let label = if status.is_client_error() { "fail" } else { "error" };

        (status, Json(json!({ "status": label, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation(vec!["x".into()]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_messages_are_joined() {
        let err = AppError::Validation(vec![
            "A tour must have a name".to_string(),
            "Rating must be below 5.0".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid input data. A tour must have a name. Rating must be below 5.0"
        );
    }

    #[test]
    fn opaque_db_errors_become_internal() {
        let err: AppError = DbErr::Custom("connection reset".to_string()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn missing_record_maps_to_not_found() {
        let err: AppError = DbErr::RecordNotFound("tour".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
