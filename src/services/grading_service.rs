use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::respond_dto::SubmittedAnswer;
use crate::models::question::{QuestionKind, QuestionWithAlternatives};

/// An answer that survived sanitizing: its question belongs to the
/// questionnaire and, for multiple choice, its alternative belongs to that
/// question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedAnswer {
    pub question_id: Uuid,
    pub alternative_id: Option<Uuid>,
    pub free_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub alternative_id: Option<Uuid>,
    pub free_text: Option<String>,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTotals {
    pub total_points: Decimal,
    pub total_weight: Decimal,
}

#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub score: Option<Decimal>,
    pub totals: WeightedTotals,
    pub answers: Vec<GradedAnswer>,
}

pub struct GradingService;

impl GradingService {
    /// Drops answers pointing outside the questionnaire and multiple choice
    /// answers whose alternative belongs to another question. The first answer
    /// per question wins.
    pub fn sanitize(
        questions: &[QuestionWithAlternatives],
        submitted: &[SubmittedAnswer],
    ) -> (Vec<SanitizedAnswer>, usize) {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(submitted.len());

        for answer in submitted {
            let Some(question) = questions.iter().find(|q| q.question.id == answer.question_id) else {
                continue;
            };
            if seen.contains(&answer.question_id) {
                continue;
            }

            let sanitized = match question.question.kind {
                QuestionKind::MultipleChoice => {
                    let Some(alternative_id) = answer.alternative_id else {
                        continue;
                    };
                    if question.alternative(alternative_id).is_none() {
                        continue;
                    }
                    SanitizedAnswer {
                        question_id: answer.question_id,
                        alternative_id: Some(alternative_id),
                        free_text: None,
                    }
                }
                QuestionKind::Essay => SanitizedAnswer {
                    question_id: answer.question_id,
                    alternative_id: None,
                    free_text: answer
                        .free_text
                        .as_ref()
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty()),
                },
            };
            seen.insert(answer.question_id);
            kept.push(sanitized);
        }

        let dropped = submitted.len() - kept.len();
        (kept, dropped)
    }

    /// Weighted score over the multiple choice answers. Essay answers are kept
    /// ungraded. Without any multiple choice answer there is no score.
    pub fn grade(questions: &[QuestionWithAlternatives], answers: &[SanitizedAnswer]) -> GradeOutcome {
        let mut total_points = Decimal::ZERO;
        let mut total_weight = Decimal::ZERO;
        let mut graded = Vec::with_capacity(answers.len());

        for answer in answers {
            let Some(question) = questions.iter().find(|q| q.question.id == answer.question_id) else {
                continue;
            };

            let (is_correct, points_awarded) = match question.question.kind {
                QuestionKind::MultipleChoice => {
                    let correct = answer
                        .alternative_id
                        .and_then(|id| question.alternative(id))
                        .map(|a| a.is_correct)
                        .unwrap_or(false);
                    let points = if correct { question.question.weight } else { Decimal::ZERO };
                    total_weight += question.question.weight;
                    total_points += points;
                    (Some(correct), Some(points))
                }
                QuestionKind::Essay => (None, None),
            };

            graded.push(GradedAnswer {
                question_id: answer.question_id,
                alternative_id: answer.alternative_id,
                free_text: answer.free_text.clone(),
                is_correct,
                points_awarded,
            });
        }

        let score = if total_weight > Decimal::ZERO {
            Some(
                (total_points / total_weight * Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            )
        } else {
            None
        };

        GradeOutcome {
            score,
            totals: WeightedTotals {
                total_points,
                total_weight,
            },
            answers: graded,
        }
    }

    pub fn passed(score: Option<Decimal>, min_score: Option<Decimal>) -> bool {
        match (score, min_score) {
            (Some(score), Some(min)) => score >= min,
            _ => false,
        }
    }
}
