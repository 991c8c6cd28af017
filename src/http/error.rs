use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::assignment_service::AssignmentError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AssignmentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::PreconditionFailed { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AssignmentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal errors were already logged where they were created.
        if !matches!(self, Self::Internal { .. }) {
            debug!(status = status.as_u16(), message = %self, "Request rejected");
        }

        let details = match &self {
            Self::Internal { details, .. } if cfg!(debug_assertions) => Some(details.clone()),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
