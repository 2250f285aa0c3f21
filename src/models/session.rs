use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::question::{CodingQuestion, McqQuestion};

/// Lifecycle of a single test attempt.
///
/// ```text
/// IDLE -> INSTRUCTIONS -> ACTIVE <-> SUBMIT_CONFIRM
///              |            |             |
///              v            +--> SUBMITTED <--+
///             IDLE                  |
///                                   v
///                              REPORT_VIEW
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Instructions,
    Active,
    SubmitConfirm,
    Submitted,
    ReportView,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Instructions)
                | (Instructions, Active)
                | (Instructions, Idle)
                | (Active, SubmitConfirm)
                | (Active, Submitted)
                | (SubmitConfirm, Active)
                | (SubmitConfirm, Submitted)
                | (Submitted, ReportView)
        )
    }

    /// Answers may no longer change once the attempt has been handed in.
    pub fn is_locked(self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::ReportView)
    }

    pub fn is_submittable(self) -> bool {
        matches!(self, SessionState::Active | SessionState::SubmitConfirm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Instructions => "INSTRUCTIONS",
            SessionState::Active => "ACTIVE",
            SessionState::SubmitConfirm => "SUBMIT_CONFIRM",
            SessionState::Submitted => "SUBMITTED",
            SessionState::ReportView => "REPORT_VIEW",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqAnswer {
    pub question_id: String,
    pub selected_option: Option<u32>,
    pub is_visited: bool,
    pub is_marked_for_review: bool,
}

impl McqAnswer {
    pub fn is_answered(&self) -> bool {
        self.selected_option.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingAnswer {
    pub question_id: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub starter_code: String,
    pub is_visited: bool,
    pub is_marked_for_review: bool,
}

impl CodingAnswer {
    pub fn is_answered(&self) -> bool {
        self.code != self.starter_code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub assignment_id: String,
    pub test_id: String,
    pub state: SessionState,
    pub current_question_index: usize,
    pub mcq_answers: Vec<McqAnswer>,
    pub coding_answers: Vec<CodingAnswer>,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining_time: u32,
    pub last_autosave: Option<DateTime<Utc>>,
}

impl TestSession {
    pub fn new(
        assignment_id: String,
        test_id: String,
        duration_minutes: u32,
        mcqs: &[McqQuestion],
        codings: &[CodingQuestion],
    ) -> Self {
        let mcq_answers = mcqs
            .iter()
            .map(|q| McqAnswer {
                question_id: q.id.clone(),
                selected_option: None,
                is_visited: false,
                is_marked_for_review: false,
            })
            .collect();

        let coding_answers = codings
            .iter()
            .map(|q| CodingAnswer {
                question_id: q.id.clone(),
                code: q.starter_code.clone(),
                language: q.language.clone(),
                starter_code: q.starter_code.clone(),
                is_visited: false,
                is_marked_for_review: false,
            })
            .collect();

        Self {
            assignment_id,
            test_id,
            state: SessionState::Instructions,
            current_question_index: 0,
            mcq_answers,
            coding_answers,
            started_at: None,
            remaining_time: duration_minutes.saturating_mul(60),
            last_autosave: None,
        }
    }

    pub fn total_questions(&self) -> usize {
        self.mcq_answers.len() + self.coding_answers.len()
    }

    /// Question id at a position of the MCQ-then-coding ordering.
    /// The cursor points at a question, or sits at 0 when there are none.
    pub fn has_valid_cursor(&self) -> bool {
        match self.total_questions() {
            0 => self.current_question_index == 0,
            total => self.current_question_index < total,
        }
    }

    pub fn question_id_at(&self, index: usize) -> Option<&str> {
        let mcq_count = self.mcq_answers.len();
        if index < mcq_count {
            Some(self.mcq_answers[index].question_id.as_str())
        } else {
            self.coding_answers
                .get(index - mcq_count)
                .map(|a| a.question_id.as_str())
        }
    }

    pub fn mcq_answer(&self, question_id: &str) -> Option<&McqAnswer> {
        self.mcq_answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn coding_answer(&self, question_id: &str) -> Option<&CodingAnswer> {
        self.coding_answers
            .iter()
            .find(|a| a.question_id == question_id)
    }

    pub fn summary(&self) -> SessionSummary {
        let answered = self.mcq_answers.iter().filter(|a| a.is_answered()).count()
            + self
                .coding_answers
                .iter()
                .filter(|a| a.is_answered())
                .count();
        let marked = self
            .mcq_answers
            .iter()
            .filter(|a| a.is_marked_for_review)
            .count()
            + self
                .coding_answers
                .iter()
                .filter(|a| a.is_marked_for_review)
                .count();
        let visited = self.mcq_answers.iter().filter(|a| a.is_visited).count()
            + self.coding_answers.iter().filter(|a| a.is_visited).count();
        let total = self.total_questions();

        SessionSummary {
            total,
            answered,
            marked_for_review: marked,
            unanswered: total - answered,
            visited,
            remaining_time: self.remaining_time,
        }
    }
}

/// Counts shown in the submit confirmation dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub answered: usize,
    pub marked_for_review: usize,
    pub unanswered: usize,
    pub visited: usize,
    pub remaining_time: u32,
}
