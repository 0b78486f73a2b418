use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::models::question::QuestionWithAlternatives;
use crate::utils::time::format_civil;

/// Weights of a published questionnaire must add up to this value.
pub const REQUIRED_WEIGHT_SUM: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishViolation {
    NoQuestions,
    WeightSum { total: Decimal },
    TooFewAlternatives { question_id: Uuid, count: usize },
    CorrectAlternativeCount { question_id: Uuid, count: usize },
    DeadlinePassed { deadline: NaiveDateTime },
}

impl PublishViolation {
    pub fn code(&self) -> &'static str {
        match self {
            PublishViolation::NoQuestions => "no_questions",
            PublishViolation::WeightSum { .. } => "weight_sum",
            PublishViolation::TooFewAlternatives { .. } => "too_few_alternatives",
            PublishViolation::CorrectAlternativeCount { .. } => "correct_alternative_count",
            PublishViolation::DeadlinePassed { .. } => "deadline_passed",
        }
    }
}

impl fmt::Display for PublishViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishViolation::NoQuestions => write!(f, "The questionnaire has no questions"),
            PublishViolation::WeightSum { total } => write!(
                f,
                "Question weights add up to {} but must add up to {}",
                total, REQUIRED_WEIGHT_SUM
            ),
            PublishViolation::TooFewAlternatives { question_id, count } => write!(
                f,
                "Multiple choice question {} has {} alternative(s); at least 2 are required",
                question_id, count
            ),
            PublishViolation::CorrectAlternativeCount { question_id, count } => write!(
                f,
                "Multiple choice question {} has {} correct alternative(s); exactly 1 is required",
                question_id, count
            ),
            PublishViolation::DeadlinePassed { deadline } => write!(
                f,
                "Publishing closed at {} when the first class of the event ended",
                format_civil(*deadline)
            ),
        }
    }
}

/// Inputs to the deadline rule.
#[derive(Debug, Clone, Copy)]
pub struct PublishWindow {
    pub now: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub may_override: bool,
}

pub fn weight_sum(questions: &[QuestionWithAlternatives]) -> Decimal {
    questions
        .iter()
        .map(|q| q.question.weight)
        .sum::<Decimal>()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Checks every publish rule and returns all of the unmet ones, in rule order.
pub fn validate(questions: &[QuestionWithAlternatives], window: PublishWindow) -> Vec<PublishViolation> {
    let mut violations = Vec::new();

    if questions.is_empty() {
        violations.push(PublishViolation::NoQuestions);
    }

    let total = weight_sum(questions);
    if !questions.is_empty() && total != REQUIRED_WEIGHT_SUM {
        violations.push(PublishViolation::WeightSum { total: total.normalize() });
    }

    for q in questions.iter().filter(|q| q.is_multiple_choice()) {
        let count = q.alternatives.len();
        if count < 2 {
            violations.push(PublishViolation::TooFewAlternatives {
                question_id: q.question.id,
                count,
            });
        }
        let correct = q.correct_count();
        if correct != 1 {
            violations.push(PublishViolation::CorrectAlternativeCount {
                question_id: q.question.id,
                count: correct,
            });
        }
    }

    if let Some(deadline) = window.deadline {
        if window.now > deadline && !window.may_override {
            violations.push(PublishViolation::DeadlinePassed { deadline });
        }
    }

    violations
}
