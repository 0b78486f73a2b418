use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::question::QuestionKind;
use crate::services::eligibility_service::EligibilityReport;
use crate::services::grading_service::WeightedTotals;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActingQuery {
    pub on_behalf_of: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmittedAnswer {
    pub question_id: Uuid,
    pub alternative_id: Option<Uuid>,
    #[validate(length(max = 20000))]
    pub free_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswersRequest {
    #[validate(length(max = 500))]
    pub answers: Vec<SubmittedAnswer>,
}

impl SubmitAnswersRequest {
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        for answer in &self.answers {
            answer.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentedAlternative {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentedQuestion {
    pub id: Uuid,
    pub kind: QuestionKind,
    pub prompt: String,
    pub weight: Decimal,
    pub alternatives: Vec<PresentedAlternative>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondView {
    pub questionnaire_id: Uuid,
    pub class_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub mandatory: bool,
    pub min_score: Option<Decimal>,
    pub max_attempts: Option<i32>,
    pub questions: Vec<PresentedQuestion>,
    pub eligibility: EligibilityReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub score: Option<Decimal>,
    pub passed: bool,
    pub weighted_totals: WeightedTotals,
    /// True when the call found the attempt already submitted and returned
    /// the stored result.
    pub already_submitted: bool,
    pub dropped_answers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyAttemptResponse {
    pub attempt: Option<Attempt>,
    pub passed: bool,
    pub attempts_submitted: i64,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableQuestionnaire {
    pub class_id: Uuid,
    pub class_title: String,
    pub class_end: Option<NaiveDateTime>,
    pub questionnaire_id: Uuid,
    pub title: String,
    pub mandatory: bool,
    pub attendance_ratio: f64,
    pub attempts_submitted: i64,
    pub max_attempts: Option<i32>,
    pub blocked_by_attempt_limit: bool,
}
