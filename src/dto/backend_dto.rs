use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::assignment::AssignmentStatus;
use crate::models::question::{CodingQuestion, Difficulty, McqQuestion, TestCase};

/// Envelope used by the assessment backend: `{success, data, error, message}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftPayload {
    pub candidate_id: String,
    pub problem_id: String,
    pub language: String,
    pub code: String,
    pub cursor_position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDraft {
    pub problem_id: String,
    #[serde(default)]
    pub language: Option<String>,
    pub code: String,
    #[serde(default)]
    pub last_saved: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestAnswerPayload {
    pub candidate_id: String,
    pub assignment_id: String,
    pub question_id: String,
    pub problem_id: String,
    pub language: String,
    pub code: String,
    pub stdin: String,
    pub stdout: String,
    pub output: String,
    pub code_status: String,
    pub code_passed: bool,
    pub time_spent_seconds: u32,
}

impl TestAnswerPayload {
    pub fn pending(
        candidate_id: &str,
        assignment_id: &str,
        question_id: &str,
        language: &str,
        code: &str,
    ) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            assignment_id: assignment_id.to_string(),
            question_id: question_id.to_string(),
            problem_id: question_id.to_string(),
            language: language.to_string(),
            code: code.to_string(),
            stdin: String::new(),
            stdout: String::new(),
            output: String::new(),
            code_status: "pending".to_string(),
            code_passed: false,
            time_spent_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McqAnswerPayload {
    pub candidate_id: String,
    pub assignment_id: String,
    pub question_id: String,
    /// Sent as a string, the submission service stores it verbatim.
    pub selected_option: String,
    /// Always null, grading happens server side.
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentUpdatePayload {
    pub status: AssignmentStatus,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendTest {
    pub test_id: String,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub mcq_questions: Vec<BackendMcqQuestion>,
    #[serde(default)]
    pub coding_questions: Vec<BackendCodingQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendMcqQuestion {
    pub question_id: String,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub option_a: Option<String>,
    #[serde(default)]
    pub option_b: Option<String>,
    #[serde(default)]
    pub option_c: Option<String>,
    #[serde(default)]
    pub option_d: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub marks: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendCodingQuestion {
    pub question_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "starterCode")]
    pub starter_code: Option<String>,
    pub language: String,
    #[serde(default)]
    pub marks: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<BackendTestCase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendTestCase {
    #[serde(default, alias = "input")]
    pub input_data: String,
    #[serde(default)]
    pub expected_output: String,
}

/// Maps the backend's `'A'..'D'` letter to an option index.
fn option_letter_to_index(letter: &str) -> Option<u32> {
    match letter.trim().to_ascii_uppercase().as_str() {
        "A" => Some(0),
        "B" => Some(1),
        "C" => Some(2),
        "D" => Some(3),
        other => other.parse().ok(),
    }
}

impl From<BackendMcqQuestion> for McqQuestion {
    fn from(q: BackendMcqQuestion) -> Self {
        let options = [q.option_a, q.option_b, q.option_c, q.option_d]
            .into_iter()
            .flatten()
            .filter(|o| !o.is_empty())
            .collect();

        McqQuestion {
            id: q.question_id,
            question: q.question_text.or(q.question).unwrap_or_default(),
            options,
            correct_answer: q.correct_answer.as_deref().and_then(option_letter_to_index),
            difficulty: q.difficulty.unwrap_or_default(),
            tags: q.tags,
            points: q.marks.unwrap_or(0),
        }
    }
}

impl From<BackendCodingQuestion> for CodingQuestion {
    fn from(q: BackendCodingQuestion) -> Self {
        CodingQuestion {
            id: q.question_id,
            title: q.title,
            description: q.description,
            starter_code: q.starter_code.unwrap_or_default(),
            test_cases: q
                .test_cases
                .into_iter()
                .map(|tc| TestCase {
                    input: tc.input_data,
                    expected_output: tc.expected_output,
                })
                .collect(),
            difficulty: q.difficulty.unwrap_or_default(),
            tags: q.tags,
            points: q.marks.unwrap_or(0),
            language: q.language,
        }
    }
}
