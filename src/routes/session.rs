use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use validator::Validate;

use crate::dto::session_dto::{
    InitSessionRequest, LoadAssignmentRequest, NavigateRequest, RestoreDraftsResponse,
    SaveCodingAnswerRequest, SaveMcqAnswerRequest, SetStateRequest, SubmitResponse,
    ToggleReviewResponse, ViolationRequest,
};
use crate::error::{Error, Result};
use crate::models::session::TestSession;
use crate::services::session_service::SubmitTrigger;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_session(State(state): State<AppState>) -> Result<Response> {
    let session = state.session_service.require_session()?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn init_session(
    State(state): State<AppState>,
    Json(payload): Json<InitSessionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.session_service.init_session(&payload)?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

#[axum::debug_handler]
pub async fn reset_session(State(state): State<AppState>) -> impl IntoResponse {
    let discarded = state.session_service.reset_session();
    Json(json!({
        "status": "reset",
        "discarded": discarded.map(|s| s.assignment_id),
    }))
}

#[axum::debug_handler]
pub async fn load_snapshot(
    State(state): State<AppState>,
    Json(snapshot): Json<TestSession>,
) -> Result<Response> {
    if snapshot.assignment_id.trim().is_empty() {
        return Err(Error::BadRequest("assignment_id is required".into()));
    }
    let session = state.session_service.load_saved_session(snapshot)?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn load_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<LoadAssignmentRequest>,
) -> Result<Response> {
    tracing::info!(%assignment_id, "Loading assignment");
    let session = state
        .session_service
        .load_assignment_and_init(&assignment_id, payload.candidate_id, payload.force)
        .await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

#[axum::debug_handler]
pub async fn restore_drafts(State(state): State<AppState>) -> Result<Response> {
    let restored = state.session_service.restore_drafts().await?;
    Ok(Json(RestoreDraftsResponse { restored }).into_response())
}

#[axum::debug_handler]
pub async fn set_state(
    State(state): State<AppState>,
    Json(payload): Json<SetStateRequest>,
) -> Result<Response> {
    let session = state.session_service.set_state(payload.state)?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Response> {
    let service = &state.session_service;
    let session = match payload {
        NavigateRequest::Next => service.next_question()?,
        NavigateRequest::Prev => service.prev_question()?,
        NavigateRequest::Goto { index } => service.set_current_question(index)?,
    };
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn save_mcq_answer(
    State(state): State<AppState>,
    Path(question_id): Path<String>,
    Json(payload): Json<SaveMcqAnswerRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state
        .session_service
        .save_mcq_answer(&question_id, payload.selected_option)?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn save_coding_answer(
    State(state): State<AppState>,
    Path(question_id): Path<String>,
    Json(payload): Json<SaveCodingAnswerRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state
        .session_service
        .save_coding_answer(&question_id, &payload.code)?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn toggle_review(
    State(state): State<AppState>,
    Path(question_id): Path<String>,
) -> Result<Response> {
    let is_marked_for_review = state.session_service.toggle_mark_for_review(&question_id)?;
    Ok(Json(ToggleReviewResponse {
        question_id,
        is_marked_for_review,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn mark_visited(
    State(state): State<AppState>,
    Path(question_id): Path<String>,
) -> Result<Response> {
    let session = state.session_service.mark_question_visited(&question_id)?;
    Ok(Json(session).into_response())
}

#[axum::debug_handler]
pub async fn get_summary(State(state): State<AppState>) -> Result<Response> {
    let summary = state.session_service.summary()?;
    Ok(Json(summary).into_response())
}

#[axum::debug_handler]
pub async fn submit_test(State(state): State<AppState>) -> Result<Response> {
    let session = state
        .session_service
        .submit_test(SubmitTrigger::UserConfirmed)?
        .ok_or(Error::NoSession)?;

    let response = SubmitResponse {
        summary: session.summary(),
        assignment_id: session.assignment_id,
        state: session.state,
        message: "Test submitted".to_string(),
    };
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn report_violation(
    State(state): State<AppState>,
    Json(payload): Json<ViolationRequest>,
) -> Result<Response> {
    let violations = state.session_service.record_violation(payload.kind)?;
    Ok(Json(json!({ "success": true, "violations": violations })).into_response())
}

#[axum::debug_handler]
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session_service.status())
}
