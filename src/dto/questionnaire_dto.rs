use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{QuestionKind, QuestionWithAlternatives};
use crate::models::questionnaire::Questionnaire;
use crate::utils::validation::{validate_min_score, validate_not_blank, validate_weight};

/// Full replacement of the questionnaire metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateQuestionnairePayload {
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    #[validate(custom(function = "validate_min_score"))]
    pub min_score: Option<Decimal>,
    #[validate(range(min = 1, max = 50, message = "max_attempts must be between 1 and 50"))]
    pub max_attempts: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionPayload {
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 5000), custom(function = "validate_not_blank"))]
    pub prompt: String,
    #[validate(custom(function = "validate_weight"))]
    pub weight: Decimal,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlternativePayload {
    #[validate(length(min = 1, max = 2000), custom(function = "validate_not_blank"))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
}

/// Editable view: the questionnaire with its full question tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireDetail {
    #[serde(flatten)]
    pub questionnaire: Questionnaire,
    pub questions: Vec<QuestionWithAlternatives>,
    pub weight_sum: Decimal,
    pub has_submissions: bool,
}
