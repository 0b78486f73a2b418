use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::{
    dto::respond_dto::{ActingQuery, SubmitAnswersRequest, StartAttemptResponse},
    error::Result,
    models::role::Principal,
    AppState,
};

#[axum::debug_handler]
pub async fn list_available(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let available = state
        .attempt_service
        .available_for_user(user_id, &principal)
        .await?;
    Ok(Json(available))
}

#[axum::debug_handler]
pub async fn respond(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, class_id)): Path<(Uuid, Uuid)>,
    Query(acting): Query<ActingQuery>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .respond_view(id, class_id, &principal, acting.on_behalf_of)
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn start(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, class_id)): Path<(Uuid, Uuid)>,
    Query(acting): Query<ActingQuery>,
) -> Result<impl IntoResponse> {
    let (attempt, resumed) = state
        .attempt_service
        .start(id, class_id, &principal, acting.on_behalf_of)
        .await?;
    let status = if resumed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(StartAttemptResponse { attempt, resumed })))
}

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, class_id)): Path<(Uuid, Uuid)>,
    Query(acting): Query<ActingQuery>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate_all()?;
    let result = state
        .attempt_service
        .submit(id, class_id, &principal, acting.on_behalf_of, &payload.answers)
        .await?;
    Ok(Json(result))
}

#[axum::debug_handler]
pub async fn my_attempt(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, class_id)): Path<(Uuid, Uuid)>,
    Query(acting): Query<ActingQuery>,
) -> Result<impl IntoResponse> {
    let attempt = state
        .attempt_service
        .my_attempt(id, class_id, &principal, acting.on_behalf_of)
        .await?;
    Ok(Json(attempt))
}
