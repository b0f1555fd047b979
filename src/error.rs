//! HTTP-facing error type
//!
//! Handlers return `Result<_, PortalError>`; the `IntoResponse` impl renders the
//! same `{success, data, error, details}` envelope as successful responses.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db;
use crate::models::ApiResponse;
use crate::storage::StorageError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid input")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

pub type PortalResult<T> = Result<T, PortalError>;

impl PortalError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        PortalError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortalError::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PortalError::Validation(_) | PortalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PortalError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::Conflict(_) => StatusCode::CONFLICT,
            PortalError::Storage(StorageError::NotFound) => StatusCode::NOT_FOUND,
            PortalError::Storage(StorageError::InvalidPath) => StatusCode::BAD_REQUEST,
            PortalError::Database(_) | PortalError::Storage(_) | PortalError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        if db::is_unique_violation(&err) {
            PortalError::Conflict("Resource already exists".to_string())
        } else if db::is_foreign_key_violation(&err) {
            PortalError::Validation(ValidationError::Invalid {
                field: "reference".to_string(),
                message: "referenced record does not exist".to_string(),
            })
        } else {
            PortalError::Database(err)
        }
    }
}

/// Field path named in a serde error such as `attendances[0].status: unknown variant`
fn rejected_field(text: &str) -> Option<&str> {
    let detail = text.split_once("target type: ").map_or(text, |(_, rest)| rest);
    let (path, _) = detail.split_once(": ")?;
    let looks_like_path = !path.is_empty() && path != "." && !path.contains(char::is_whitespace);
    looks_like_path.then_some(path)
}

fn rejected_input(default_field: &str, message: String) -> PortalError {
    let field = rejected_field(&message).unwrap_or(default_field).to_string();
    PortalError::Validation(ValidationError::Invalid { field, message })
}

impl From<JsonRejection> for PortalError {
    fn from(rejection: JsonRejection) -> Self {
        rejected_input("body", rejection.body_text())
    }
}

impl From<QueryRejection> for PortalError {
    fn from(rejection: QueryRejection) -> Self {
        rejected_input("query", rejection.body_text())
    }
}

impl From<PathRejection> for PortalError {
    fn from(rejection: PathRejection) -> Self {
        rejected_input("path", rejection.body_text())
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            PortalError::Validation(err) => {
                ApiResponse::<()>::error_with_details(err.to_string(), err.details())
            }
            PortalError::InvalidInput(errors) => {
                let fields: Vec<_> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let message = errs
                            .first()
                            .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                            .unwrap_or_else(|| errs.first().map(|e| e.code.to_string()).unwrap_or_default());
                        json!({ "field": field, "message": message })
                    })
                    .collect();
                ApiResponse::<()>::error_with_details("Invalid input", json!({ "fields": fields }))
            }
            PortalError::Database(err) => {
                tracing::error!("Database error: {}", err);
                ApiResponse::error("An internal error occurred")
            }
            PortalError::Storage(err) if status.is_server_error() => {
                tracing::error!("Storage error: {}", err);
                ApiResponse::error("Failed to access file storage")
            }
            PortalError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                ApiResponse::error("An internal error occurred")
            }
            other => ApiResponse::error(other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: PortalError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_errors_carry_details() {
        let (status, body) = body_json(PortalError::from(ValidationError::InvalidReferences {
            indexes: vec![3],
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["details"]["invalidEntries"][0], 3);
    }

    #[tokio::test]
    async fn test_cross_tenant_is_a_bad_request() {
        let (status, body) = body_json(ValidationError::CrossTenant.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["field"], "courseEditionId");
    }

    #[tokio::test]
    async fn test_database_errors_are_not_leaked() {
        let (status, body) = body_json(PortalError::from(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "An internal error occurred");
    }

    #[test]
    fn test_rejected_field_from_serde_path() {
        assert_eq!(
            rejected_field(
                "Failed to deserialize the JSON body into the target type: \
                 attendances[0].status: unknown variant `late`, expected one of \
                 `present`, `absent`, `absent_justified` at line 1 column 90"
            ),
            Some("attendances[0].status")
        );
        assert_eq!(
            rejected_field("Failed to parse the request body as JSON: expected value at line 1 column 1"),
            None
        );
        assert_eq!(rejected_field("Expected request with `Content-Type: application/json`"), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PortalError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(PortalError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(PortalError::NotFound("Edition").status(), StatusCode::NOT_FOUND);
        assert_eq!(PortalError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(PortalError::NotFound("Edition").to_string(), "Edition not found");
    }
}
