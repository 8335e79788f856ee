use axum::{http::StatusCode, Json};
use dealdesk_core::errors::{ApplicationError, InterfaceError};
use dealdesk_db::repositories::RepositoryError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

pub type ApiRejection = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<T, ApiRejection>;

/// Maps a service failure to an HTTP status and a user-safe body. Client
/// errors keep their detail; server errors only expose the generic message.
pub fn reject(error: ApplicationError) -> ApiRejection {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = error.into_interface(correlation_id.clone());

    let (status, detail) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, Some(message)),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, Some(message)),
        InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %interface,
            "request failed"
        );
    } else {
        warn!(
            event_name = "api.request.rejected",
            correlation_id = %correlation_id,
            error = %interface,
            "request rejected"
        );
    }

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail: detail.cloned(),
            correlation_id,
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiRejection {
    reject(ApplicationError::Domain(dealdesk_core::DomainError::InvariantViolation(
        message.into(),
    )))
}

pub fn not_found(resource: &'static str, id: impl Into<String>) -> ApiRejection {
    reject(ApplicationError::NotFound { resource, id: id.into() })
}

pub fn storage(error: RepositoryError) -> ApiRejection {
    reject(ApplicationError::Persistence(error.to_string()))
}

pub fn upstream(error: impl std::fmt::Display) -> ApiRejection {
    reject(ApplicationError::Integration(error.to_string()))
}
