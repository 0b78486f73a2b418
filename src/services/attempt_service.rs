use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::dto::respond_dto::{
    AvailableQuestionnaire, MyAttemptResponse, RespondView, SubmissionResult, SubmittedAnswer,
};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::class::ClassInfo;
use crate::models::questionnaire::Questionnaire;
use crate::models::role::{Capability, Principal};
use crate::services::audit_service::AuditService;
use crate::services::course_directory::CourseDirectory;
use crate::services::eligibility_service::{EligibilityReport, EligibilityService};
use crate::services::grading_service::{GradingService, WeightedTotals};
use crate::services::presentation_service::PresentationService;
use crate::services::questionnaire_service::{load_question_tree, QuestionnaireService};

const ATTEMPT_COLUMNS: &str =
    "id, questionnaire_id, user_id, class_id, status, started_at, submitted_at, score, total_points, total_weight";

/// Everything checked before a learner may see, start or submit a questionnaire.
struct RespondContext {
    questionnaire: Questionnaire,
    class: ClassInfo,
    eligibility: EligibilityReport,
    learner_id: Uuid,
}

/// Rejects once the learner has used up every allowed submission.
pub fn ensure_attempts_remaining(submitted: i64, max_attempts: Option<i32>) -> Result<()> {
    match max_attempts {
        Some(max) if submitted >= i64::from(max) => Err(Error::Conflict(format!(
            "Attempt limit reached: {} of {} attempts already submitted",
            submitted, max
        ))),
        _ => Ok(()),
    }
}

async fn count_submitted<'e, E>(executor: E, questionnaire_id: Uuid, user_id: Uuid, class_id: Uuid) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM questionnaire_attempts
        WHERE questionnaire_id = $1 AND user_id = $2 AND class_id = $3 AND status = 'submitted'
        "#,
    )
    .bind(questionnaire_id)
    .bind(user_id)
    .bind(class_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

fn stored_result(attempt: &Attempt, min_score: Option<Decimal>, already_submitted: bool, dropped: usize) -> SubmissionResult {
    SubmissionResult {
        attempt_id: attempt.id,
        status: attempt.status,
        score: attempt.score,
        passed: GradingService::passed(attempt.score, min_score),
        weighted_totals: WeightedTotals {
            total_points: attempt.total_points.unwrap_or(Decimal::ZERO),
            total_weight: attempt.total_weight.unwrap_or(Decimal::ZERO),
        },
        already_submitted,
        dropped_answers: dropped,
    }
}

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
    directory: Arc<dyn CourseDirectory>,
    eligibility: EligibilityService,
    questionnaires: QuestionnaireService,
}

impl AttemptService {
    pub fn new(
        pool: PgPool,
        directory: Arc<dyn CourseDirectory>,
        eligibility: EligibilityService,
        questionnaires: QuestionnaireService,
    ) -> Self {
        Self {
            pool,
            directory,
            eligibility,
            questionnaires,
        }
    }

    async fn authorize_response(
        &self,
        questionnaire_id: Uuid,
        class_id: Uuid,
        principal: &Principal,
        on_behalf_of: Option<Uuid>,
    ) -> Result<RespondContext> {
        let learner_id = principal.acting_for(on_behalf_of)?;
        let questionnaire = self.questionnaires.find(questionnaire_id).await?;
        let class = self
            .directory
            .find_class(class_id)
            .await?
            .ok_or_else(|| Error::NotFound("Class not found".to_string()))?;
        if class.event_id != questionnaire.event_id {
            return Err(Error::NotFound(
                "Questionnaire is not linked to this class".to_string(),
            ));
        }

        if !principal.role.is_administrator() && !self.directory.is_enrolled(class_id, learner_id).await? {
            return Err(Error::Forbidden("Learner is not enrolled in this class".to_string()));
        }

        let eligibility = self
            .eligibility
            .evaluate_class(learner_id, &class, principal.can(Capability::BypassEligibility))
            .await?;
        if !eligibility.eligible {
            return Err(Error::Ineligible(eligibility));
        }

        if !questionnaire.is_published() && !principal.can(Capability::PreviewUnpublished) {
            return Err(Error::Conflict("Questionnaire is not published".to_string()));
        }

        Ok(RespondContext {
            questionnaire,
            class,
            eligibility,
            learner_id,
        })
    }

    pub async fn respond_view(
        &self,
        questionnaire_id: Uuid,
        class_id: Uuid,
        principal: &Principal,
        on_behalf_of: Option<Uuid>,
    ) -> Result<RespondView> {
        let ctx = self
            .authorize_response(questionnaire_id, class_id, principal, on_behalf_of)
            .await?;
        let tree = self.questionnaires.question_tree(ctx.questionnaire.id).await?;

        Ok(RespondView {
            questionnaire_id: ctx.questionnaire.id,
            class_id: ctx.class.id,
            title: ctx.questionnaire.title,
            description: ctx.questionnaire.description,
            mandatory: ctx.questionnaire.mandatory,
            min_score: ctx.questionnaire.min_score,
            max_attempts: ctx.questionnaire.max_attempts,
            questions: PresentationService::present(tree),
            eligibility: ctx.eligibility,
        })
    }

    async fn latest_started(&self, questionnaire_id: Uuid, user_id: Uuid, class_id: Uuid) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            r#"
            SELECT {} FROM questionnaire_attempts
            WHERE questionnaire_id = $1 AND user_id = $2 AND class_id = $3 AND status = 'started'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(questionnaire_id)
        .bind(user_id)
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn latest_attempt(&self, questionnaire_id: Uuid, user_id: Uuid, class_id: Uuid) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            r#"
            SELECT {} FROM questionnaire_attempts
            WHERE questionnaire_id = $1 AND user_id = $2 AND class_id = $3
            ORDER BY started_at DESC, submitted_at DESC NULLS FIRST
            LIMIT 1
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(questionnaire_id)
        .bind(user_id)
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    /// Opens an attempt, or hands back the one already in progress. The flag
    /// is true when an existing attempt was resumed.
    pub async fn start(
        &self,
        questionnaire_id: Uuid,
        class_id: Uuid,
        principal: &Principal,
        on_behalf_of: Option<Uuid>,
    ) -> Result<(Attempt, bool)> {
        let ctx = self
            .authorize_response(questionnaire_id, class_id, principal, on_behalf_of)
            .await?;
        let learner_id = ctx.learner_id;

        let submitted = count_submitted(&self.pool, questionnaire_id, learner_id, class_id).await?;
        ensure_attempts_remaining(submitted, ctx.questionnaire.max_attempts)?;

        if let Some(existing) = self.latest_started(questionnaire_id, learner_id, class_id).await? {
            return Ok((existing, true));
        }

        let inserted = sqlx::query_as::<_, Attempt>(&format!(
            r#"
            INSERT INTO questionnaire_attempts (questionnaire_id, user_id, class_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (questionnaire_id, user_id, class_id) WHERE status = 'started' DO NOTHING
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(questionnaire_id)
        .bind(learner_id)
        .bind(class_id)
        .bind(AttemptStatus::Started.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    %questionnaire_id,
                    user_id = %learner_id,
                    %class_id,
                    bypassed = ctx.eligibility.bypassed,
                    "attempt started"
                );
                Ok((attempt, false))
            }
            None => {
                let existing = self
                    .latest_started(questionnaire_id, learner_id, class_id)
                    .await?
                    .ok_or_else(|| Error::Internal("Started attempt vanished after conflict".to_string()))?;
                Ok((existing, true))
            }
        }
    }

    /// Scores and closes the latest attempt. Concurrent calls for the same
    /// learner and class serialize on the attempt row; later ones get the
    /// stored result back.
    pub async fn submit(
        &self,
        questionnaire_id: Uuid,
        class_id: Uuid,
        principal: &Principal,
        on_behalf_of: Option<Uuid>,
        answers: &[SubmittedAnswer],
    ) -> Result<SubmissionResult> {
        let ctx = self
            .authorize_response(questionnaire_id, class_id, principal, on_behalf_of)
            .await?;
        let learner_id = ctx.learner_id;
        let min_score = ctx.questionnaire.min_score;

        let mut tx = self.pool.begin().await?;
        // Structural edits hold FOR UPDATE on this row while they check for submissions.
        sqlx::query(r#"SELECT id FROM questionnaires WHERE id = $1 FOR SHARE"#)
            .bind(questionnaire_id)
            .execute(&mut *tx)
            .await?;
        let latest = sqlx::query_as::<_, Attempt>(&format!(
            r#"
            SELECT {} FROM questionnaire_attempts
            WHERE questionnaire_id = $1 AND user_id = $2 AND class_id = $3
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            FOR UPDATE
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(questionnaire_id)
        .bind(learner_id)
        .bind(class_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempt) = latest else {
            return Err(Error::Conflict(
                "No attempt has been started for this questionnaire and class".to_string(),
            ));
        };

        if attempt.is_submitted() {
            tx.rollback().await?;
            tracing::info!(attempt_id = %attempt.id, "attempt already submitted, returning stored result");
            return Ok(stored_result(&attempt, min_score, true, 0));
        }

        let submitted = count_submitted(&mut *tx, questionnaire_id, learner_id, class_id).await?;
        ensure_attempts_remaining(submitted, ctx.questionnaire.max_attempts)?;

        let questions = load_question_tree(&mut tx, questionnaire_id).await?;
        let (sanitized, dropped) = GradingService::sanitize(&questions, answers);
        if dropped > 0 {
            tracing::warn!(attempt_id = %attempt.id, dropped, "dropped answers outside the questionnaire");
        }
        let outcome = GradingService::grade(&questions, &sanitized);

        sqlx::query(r#"DELETE FROM questionnaire_answers WHERE attempt_id = $1"#)
            .bind(attempt.id)
            .execute(&mut *tx)
            .await?;

        if !outcome.answers.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO questionnaire_answers \
                 (attempt_id, question_id, alternative_id, free_text, is_correct, points_awarded) ",
            );
            builder.push_values(&outcome.answers, |mut row, answer| {
                row.push_bind(attempt.id)
                    .push_bind(answer.question_id)
                    .push_bind(answer.alternative_id)
                    .push_bind(answer.free_text.clone())
                    .push_bind(answer.is_correct)
                    .push_bind(answer.points_awarded);
            });
            builder.build().execute(&mut *tx).await?;
        }

        let scored = sqlx::query_as::<_, Attempt>(&format!(
            r#"
            UPDATE questionnaire_attempts
            SET status = $1, submitted_at = NOW(), score = $2, total_points = $3, total_weight = $4
            WHERE id = $5
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(AttemptStatus::Submitted.as_str())
        .bind(outcome.score)
        .bind(outcome.totals.total_points)
        .bind(outcome.totals.total_weight)
        .bind(attempt.id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            Some(principal.user_id),
            "attempt.submitted",
            "questionnaire",
            questionnaire_id,
            Some(json!({
                "attempt_id": scored.id,
                "class_id": class_id,
                "learner_id": learner_id,
                "score": outcome.score,
                "answers": outcome.answers.len(),
                "dropped_answers": dropped,
            })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            attempt_id = %scored.id,
            %questionnaire_id,
            user_id = %learner_id,
            score = ?scored.score,
            "attempt submitted"
        );
        Ok(stored_result(&scored, min_score, false, dropped))
    }

    pub async fn my_attempt(
        &self,
        questionnaire_id: Uuid,
        class_id: Uuid,
        principal: &Principal,
        on_behalf_of: Option<Uuid>,
    ) -> Result<MyAttemptResponse> {
        let learner_id = principal.acting_for(on_behalf_of)?;
        let questionnaire = self.questionnaires.find(questionnaire_id).await?;

        let attempt = self.latest_attempt(questionnaire_id, learner_id, class_id).await?;
        let attempts_submitted = count_submitted(&self.pool, questionnaire_id, learner_id, class_id).await?;

        let answers = match &attempt {
            Some(a) if a.is_submitted() => {
                sqlx::query_as::<_, Answer>(
                    r#"
                    SELECT id, attempt_id, question_id, alternative_id, free_text, is_correct, points_awarded, created_at
                    FROM questionnaire_answers
                    WHERE attempt_id = $1
                    ORDER BY created_at, id
                    "#,
                )
                .bind(a.id)
                .fetch_all(&self.pool)
                .await?
            }
            _ => Vec::new(),
        };

        Ok(MyAttemptResponse {
            passed: attempt
                .as_ref()
                .is_some_and(|a| GradingService::passed(a.score, questionnaire.min_score)),
            attempt,
            attempts_submitted,
            answers,
        })
    }

    /// Published questionnaires the learner can answer right now, one entry
    /// per enrolled class.
    pub async fn available_for_user(&self, user_id: Uuid, principal: &Principal) -> Result<Vec<AvailableQuestionnaire>> {
        if user_id != principal.user_id && !principal.can(Capability::ActForLearner) {
            return Err(Error::Forbidden(
                "Cannot list questionnaires for another learner".to_string(),
            ));
        }

        let mut available = Vec::new();
        for class in self.directory.enrolled_classes(user_id).await? {
            let Some(questionnaire) = self.questionnaires.find_by_event(class.event_id).await? else {
                continue;
            };
            if !questionnaire.is_published() {
                continue;
            }

            let report = self.eligibility.evaluate_class(user_id, &class, false).await?;
            if !report.eligible {
                continue;
            }

            let attempts_submitted = count_submitted(&self.pool, questionnaire.id, user_id, class.id).await?;
            available.push(AvailableQuestionnaire {
                class_id: class.id,
                class_title: class.title,
                class_end: report.class_end,
                questionnaire_id: questionnaire.id,
                title: questionnaire.title,
                mandatory: questionnaire.mandatory,
                attendance_ratio: report.attendance_ratio,
                attempts_submitted,
                max_attempts: questionnaire.max_attempts,
                blocked_by_attempt_limit: ensure_attempts_remaining(attempts_submitted, questionnaire.max_attempts)
                    .is_err(),
            });
        }
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn attempts_remaining_without_limit() {
        assert_ok!(ensure_attempts_remaining(0, None));
        assert_ok!(ensure_attempts_remaining(99, None));
    }

    #[test]
    fn attempts_limit_is_inclusive() {
        assert_ok!(ensure_attempts_remaining(1, Some(2)));
        assert_err!(ensure_attempts_remaining(2, Some(2)));
        assert!(matches!(ensure_attempts_remaining(3, Some(2)), Err(Error::Conflict(_))));
    }

    #[test]
    fn stored_result_derives_passed() {
        let attempt = Attempt {
            id: Uuid::new_v4(),
            questionnaire_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            status: AttemptStatus::Submitted,
            started_at: chrono::Utc::now(),
            submitted_at: Some(chrono::Utc::now()),
            score: Some("75.00".parse().unwrap()),
            total_points: Some("7.5".parse().unwrap()),
            total_weight: Some("10".parse().unwrap()),
        };
        let result = stored_result(&attempt, Some("70".parse().unwrap()), true, 0);
        assert!(result.passed);
        assert!(result.already_submitted);
        assert_eq!(result.weighted_totals.total_weight, Decimal::TEN);

        let failed = stored_result(&attempt, Some("80".parse().unwrap()), true, 0);
        assert!(!failed.passed);
    }
}
