use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::questionnaire_dto::{AlternativePayload, QuestionPayload, UpdateQuestionnairePayload},
    error::{Error, Result},
    models::role::Principal,
    AppState,
};

#[axum::debug_handler]
pub async fn create_draft(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (questionnaire, created) = state
        .questionnaire_service
        .get_or_create_draft(event_id, &principal)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(questionnaire)))
}

#[axum::debug_handler]
pub async fn get_for_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state
        .questionnaire_service
        .detail_for_event(event_id, &principal)
        .await?;
    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn update_questionnaire(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionnairePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let questionnaire = state
        .questionnaire_service
        .update_metadata(id, payload, &principal)
        .await?;
    Ok(Json(questionnaire))
}

#[axum::debug_handler]
pub async fn add_question(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state
        .questionnaire_service
        .add_question(id, payload, &principal)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<QuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state
        .questionnaire_service
        .update_question(id, question_id, payload, &principal)
        .await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .questionnaire_service
        .delete_question(id, question_id, &principal)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn add_alternative(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(question_id): Path<Uuid>,
    Json(payload): Json<AlternativePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let alternative = state
        .questionnaire_service
        .add_alternative(question_id, payload, &principal)
        .await?;
    Ok((StatusCode::CREATED, Json(alternative)))
}

pub async fn update_alternative(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((question_id, alternative_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AlternativePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let alternative = state
        .questionnaire_service
        .update_alternative(question_id, alternative_id, payload, &principal)
        .await?;
    Ok(Json(alternative))
}

pub async fn delete_alternative(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((question_id, alternative_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .questionnaire_service
        .delete_alternative(question_id, alternative_id, &principal)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn publish(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let questionnaire = state.questionnaire_service.publish(id, &principal).await?;
    Ok(Json(questionnaire))
}

/// Audit rows for a questionnaire, administrators only.
pub async fn audit_trail(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if !principal.role.is_administrator() {
        return Err(Error::Forbidden("Only administrators may read the audit trail".to_string()));
    }
    state.questionnaire_service.find(id).await?;
    let entries = state.audit_service.list_for_entity("questionnaire", id).await?;
    Ok(Json(entries))
}
