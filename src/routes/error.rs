use axum::{http::StatusCode, Json};

use crate::error::DomainError;

#[derive(serde::Serialize, utoipa::ToSchema)]
pub(crate) struct ApiError {
    error: String,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub(crate) fn err(status: StatusCode, msg: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: msg.to_string(),
        }),
    )
}

pub(crate) fn status_for(e: &DomainError) -> StatusCode {
    match e {
        DomainError::DeviceNotFound(_) | DomainError::CommandNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidSecurityKey { .. }
        | DomainError::MissingSecurityKey
        | DomainError::ConfirmationRequired(_)
        | DomainError::InvalidTimestamp(_) => StatusCode::BAD_REQUEST,
        DomainError::AlreadyBlocked(_)
        | DomainError::NotBlocked(_)
        | DomainError::DispatchInFlight(_)
        | DomainError::InvalidTransition { .. } => StatusCode::CONFLICT,
        DomainError::EventTypeNotAllowed(_) => StatusCode::FORBIDDEN,
        DomainError::WriteFailed { .. } | DomainError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Store failures are reported generically; the detail goes to the log.
pub(crate) fn domain_err(e: DomainError) -> (StatusCode, Json<ApiError>) {
    let status = status_for(&e);
    match &e {
        DomainError::WriteFailed { stage, .. } => err(
            status,
            &format!("Failed to save {stage}, please try again"),
        ),
        DomainError::Store(detail) => {
            tracing::error!("Store error: {}", detail);
            err(status, "Storage unavailable, please try again")
        }
        _ => {
            if e.is_validation() {
                tracing::debug!("Request rejected: {}", e);
            }
            err(status, &e.to_string())
        }
    }
}
