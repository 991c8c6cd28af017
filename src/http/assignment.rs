use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    assignment_service::{validation_err, AssignmentError},
    models::UserId,
};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub success: bool,
    pub message: &'static str,
    pub assignment: AssignmentBody,
}

#[derive(Debug, Serialize)]
pub struct AssignmentBody {
    pub id: String,
    pub assignment_number: u64,
    pub extension_name: String,
    pub due_date: String,
}

#[tracing::instrument(skip_all)]
pub async fn assign_extension(
    State(state): State<AppState>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<Json<AssignResponse>, AssignmentError> {
    let Json(request) = payload
        .map_err(|rejection| validation_err(format!("Invalid request: {}", rejection.body_text())))?;

    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|user_id| !user_id.is_empty())
        .ok_or_else(|| validation_err("User ID is required"))?
        .parse::<UserId>()
        .map_err(|_| validation_err("User ID is not valid"))?;

    let outcome = state.assignment_service.request_assignment(user_id).await?;

    Ok(Json(AssignResponse {
        success: true,
        message: "Extension assigned successfully",
        assignment: AssignmentBody {
            id: outcome.assignment_id.to_string(),
            assignment_number: outcome.assignment_number,
            extension_name: outcome.extension_name,
            due_date: outcome.due_date,
        },
    }))
}
