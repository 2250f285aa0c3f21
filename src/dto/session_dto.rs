use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{CodingQuestion, McqQuestion};
use crate::models::session::{SessionState, SessionSummary};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitSessionRequest {
    #[validate(length(min = 1))]
    pub assignment_id: String,
    #[validate(length(min = 1))]
    pub test_id: String,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u32,
    #[serde(default)]
    pub mcq_questions: Vec<McqQuestion>,
    #[serde(default)]
    pub coding_questions: Vec<CodingQuestion>,
    #[validate(length(min = 1))]
    pub candidate_id: Option<String>,
    /// Replace an attempt that is still in progress (retake flows).
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadAssignmentRequest {
    #[serde(default)]
    pub candidate_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigateRequest {
    Next,
    Prev,
    Goto { index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveMcqAnswerRequest {
    #[validate(range(max = 25))]
    pub selected_option: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveCodingAnswerRequest {
    #[validate(length(max = 200000))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReviewResponse {
    pub question_id: String,
    pub is_marked_for_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabHidden,
    FullscreenExit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRequest {
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub tab_hidden: u32,
    pub fullscreen_exit: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreDraftsResponse {
    pub restored: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub assignment_id: String,
    pub state: SessionState,
    pub summary: SessionSummary,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub state: Option<SessionState>,
    pub remaining_time: Option<u32>,
    pub last_autosave: Option<DateTime<Utc>>,
    pub autosave_status: AutosaveStatus,
    pub autosave_error: Option<String>,
    pub violations: ViolationCounts,
    pub drivers_running: bool,
}
