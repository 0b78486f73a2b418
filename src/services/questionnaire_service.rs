use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::dto::questionnaire_dto::{
    AlternativePayload, QuestionPayload, QuestionnaireDetail, UpdateQuestionnairePayload,
};
use crate::error::{Error, Result};
use crate::models::question::{Alternative, Question, QuestionKind, QuestionWithAlternatives};
use crate::models::questionnaire::{Questionnaire, QuestionnaireStatus};
use crate::models::role::{Capability, Principal, Role};
use crate::services::audit_service::AuditService;
use crate::services::course_directory::CourseDirectory;
use crate::services::eligibility_service::EligibilityService;
use crate::services::publish_validator::{self, PublishWindow};

pub(crate) const QUESTIONNAIRE_COLUMNS: &str = "id, event_id, title, description, mandatory, min_score, \
     max_attempts, status, created_by, published_at, created_at, updated_at";
const QUESTION_COLUMNS: &str = "id, questionnaire_id, kind, prompt, position, weight, created_at, updated_at";
const ALTERNATIVE_COLUMNS: &str = "id, question_id, body, is_correct, position, created_at, updated_at";

/// Loads a questionnaire's questions with their alternatives, both ordered.
pub async fn load_question_tree(
    conn: &mut PgConnection,
    questionnaire_id: Uuid,
) -> Result<Vec<QuestionWithAlternatives>> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questionnaire_questions WHERE questionnaire_id = $1 ORDER BY position, created_at",
        QUESTION_COLUMNS
    ))
    .bind(questionnaire_id)
    .fetch_all(&mut *conn)
    .await?;

    if questions.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
    let alternatives = sqlx::query_as::<_, Alternative>(&format!(
        "SELECT {} FROM questionnaire_alternatives WHERE question_id = ANY($1) ORDER BY position, created_at",
        ALTERNATIVE_COLUMNS
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<Uuid, Vec<Alternative>> = HashMap::new();
    for alternative in alternatives {
        by_question.entry(alternative.question_id).or_default().push(alternative);
    }

    Ok(questions
        .into_iter()
        .map(|question| {
            let alternatives = by_question.remove(&question.id).unwrap_or_default();
            QuestionWithAlternatives { question, alternatives }
        })
        .collect())
}

async fn submissions_exist<'e, E: PgExecutor<'e>>(executor: E, questionnaire_id: Uuid) -> Result<bool> {
    let submitted: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM questionnaire_attempts WHERE questionnaire_id = $1 AND status = 'submitted')"#,
    )
    .bind(questionnaire_id)
    .fetch_one(executor)
    .await?;
    Ok(submitted)
}

/// Takes the questionnaire row lock for a structural edit. Submissions hold
/// a share lock on the same row, so the check below cannot go stale before
/// the edit commits.
async fn lock_structure(conn: &mut PgConnection, questionnaire_id: Uuid) -> Result<()> {
    sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM questionnaires WHERE id = $1 FOR UPDATE"#)
        .bind(questionnaire_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound("Questionnaire not found".to_string()))?;
    if submissions_exist(&mut *conn, questionnaire_id).await? {
        return Err(Error::Conflict(
            "Questions cannot change once learners have submitted answers".to_string(),
        ));
    }
    Ok(())
}

async fn find_question(conn: &mut PgConnection, questionnaire_id: Uuid, question_id: Uuid) -> Result<Question> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questionnaire_questions WHERE id = $1 AND questionnaire_id = $2",
        QUESTION_COLUMNS
    ))
    .bind(question_id)
    .bind(questionnaire_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound("Question not found in this questionnaire".to_string()))
}

#[derive(Clone)]
pub struct QuestionnaireService {
    pool: PgPool,
    directory: Arc<dyn CourseDirectory>,
    eligibility: EligibilityService,
}

impl QuestionnaireService {
    pub fn new(pool: PgPool, directory: Arc<dyn CourseDirectory>, eligibility: EligibilityService) -> Self {
        Self {
            pool,
            directory,
            eligibility,
        }
    }

    fn ensure_author_role(principal: &Principal) -> Result<()> {
        if principal.can(Capability::AuthorQuestionnaire) {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "Only instructors or administrators may author questionnaires".to_string(),
            ))
        }
    }

    async fn ensure_author(&self, principal: &Principal, event_id: Uuid) -> Result<()> {
        Self::ensure_author_role(principal)?;
        if principal.role == Role::Instructor
            && !self.directory.is_event_instructor(event_id, principal.user_id).await?
        {
            return Err(Error::Forbidden(
                "Instructor is not assigned to this event".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn find(&self, id: Uuid) -> Result<Questionnaire> {
        sqlx::query_as::<_, Questionnaire>(&format!(
            "SELECT {} FROM questionnaires WHERE id = $1",
            QUESTIONNAIRE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Questionnaire not found".to_string()))
    }

    pub async fn find_by_event(&self, event_id: Uuid) -> Result<Option<Questionnaire>> {
        let questionnaire = sqlx::query_as::<_, Questionnaire>(&format!(
            "SELECT {} FROM questionnaires WHERE event_id = $1",
            QUESTIONNAIRE_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(questionnaire)
    }

    pub async fn question_tree(&self, questionnaire_id: Uuid) -> Result<Vec<QuestionWithAlternatives>> {
        let mut conn = self.pool.acquire().await?;
        load_question_tree(&mut conn, questionnaire_id).await
    }

    pub async fn has_submissions(&self, questionnaire_id: Uuid) -> Result<bool> {
        submissions_exist(&self.pool, questionnaire_id).await
    }

    /// Returns the event's questionnaire, creating an empty draft the first
    /// time. The flag is true when this call created it.
    pub async fn get_or_create_draft(&self, event_id: Uuid, principal: &Principal) -> Result<(Questionnaire, bool)> {
        Self::ensure_author_role(principal)?;
        let Some(event_title) = self.directory.event_title(event_id).await? else {
            return Err(Error::NotFound("Event not found".to_string()));
        };
        self.ensure_author(principal, event_id).await?;

        let mut tx = self.pool.begin().await?;
        let created = sqlx::query_as::<_, Questionnaire>(&format!(
            r#"
            INSERT INTO questionnaires (event_id, title, created_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING {}
            "#,
            QUESTIONNAIRE_COLUMNS
        ))
        .bind(event_id)
        .bind(format!("Assessment: {}", event_title))
        .bind(principal.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        match created {
            Some(questionnaire) => {
                AuditService::record(
                    &mut *tx,
                    Some(principal.user_id),
                    "questionnaire.created",
                    "questionnaire",
                    questionnaire.id,
                    Some(json!({ "event_id": event_id })),
                )
                .await?;
                tx.commit().await?;
                tracing::info!(questionnaire_id = %questionnaire.id, %event_id, "questionnaire draft created");
                Ok((questionnaire, true))
            }
            None => {
                tx.rollback().await?;
                let existing = self
                    .find_by_event(event_id)
                    .await?
                    .ok_or_else(|| Error::Internal("Questionnaire vanished after conflict".to_string()))?;
                Ok((existing, false))
            }
        }
    }

    pub async fn detail_for_event(&self, event_id: Uuid, principal: &Principal) -> Result<QuestionnaireDetail> {
        Self::ensure_author_role(principal)?;
        let questionnaire = self
            .find_by_event(event_id)
            .await?
            .ok_or_else(|| Error::NotFound("No questionnaire exists for this event".to_string()))?;
        self.ensure_author(principal, questionnaire.event_id).await?;

        let questions = self.question_tree(questionnaire.id).await?;
        let has_submissions = self.has_submissions(questionnaire.id).await?;
        Ok(QuestionnaireDetail {
            weight_sum: publish_validator::weight_sum(&questions),
            questionnaire,
            questions,
            has_submissions,
        })
    }

    pub async fn update_metadata(
        &self,
        id: Uuid,
        payload: UpdateQuestionnairePayload,
        principal: &Principal,
    ) -> Result<Questionnaire> {
        Self::ensure_author_role(principal)?;
        let current = self.find(id).await?;
        self.ensure_author(principal, current.event_id).await?;

        let updated = sqlx::query_as::<_, Questionnaire>(&format!(
            r#"
            UPDATE questionnaires
            SET title = $1, description = $2, mandatory = $3, min_score = $4, max_attempts = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING {}
            "#,
            QUESTIONNAIRE_COLUMNS
        ))
        .bind(payload.title.trim())
        .bind(payload.description)
        .bind(payload.mandatory)
        .bind(payload.min_score)
        .bind(payload.max_attempts)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    pub async fn add_question(
        &self,
        questionnaire_id: Uuid,
        payload: QuestionPayload,
        principal: &Principal,
    ) -> Result<Question> {
        Self::ensure_author_role(principal)?;
        let questionnaire = self.find(questionnaire_id).await?;
        self.ensure_author(principal, questionnaire.event_id).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        let question = sqlx::query_as::<_, Question>(&format!(
            r#"
            INSERT INTO questionnaire_questions (questionnaire_id, kind, prompt, weight, position)
            VALUES ($1, $2, $3, $4, COALESCE($5, (
                SELECT COALESCE(MAX(position), 0) + 1 FROM questionnaire_questions WHERE questionnaire_id = $1
            )))
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(questionnaire_id)
        .bind(payload.kind.as_str())
        .bind(payload.prompt.trim())
        .bind(payload.weight)
        .bind(payload.order)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(question)
    }

    pub async fn update_question(
        &self,
        questionnaire_id: Uuid,
        question_id: Uuid,
        payload: QuestionPayload,
        principal: &Principal,
    ) -> Result<Question> {
        Self::ensure_author_role(principal)?;
        let questionnaire = self.find(questionnaire_id).await?;
        self.ensure_author(principal, questionnaire.event_id).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        let current = find_question(&mut tx, questionnaire_id, question_id).await?;

        if payload.kind == QuestionKind::Essay && current.kind == QuestionKind::MultipleChoice {
            let alternatives: i64 = sqlx::query_scalar(
                r#"SELECT COUNT(*) FROM questionnaire_alternatives WHERE question_id = $1"#,
            )
            .bind(question_id)
            .fetch_one(&mut *tx)
            .await?;
            if alternatives > 0 {
                return Err(Error::BadRequest(
                    "Remove the alternatives before turning a question into an essay".to_string(),
                ));
            }
        }

        let question = sqlx::query_as::<_, Question>(&format!(
            r#"
            UPDATE questionnaire_questions
            SET kind = $1, prompt = $2, weight = $3, position = COALESCE($4, position), updated_at = NOW()
            WHERE id = $5
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(payload.kind.as_str())
        .bind(payload.prompt.trim())
        .bind(payload.weight)
        .bind(payload.order)
        .bind(question_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(question)
    }

    pub async fn delete_question(&self, questionnaire_id: Uuid, question_id: Uuid, principal: &Principal) -> Result<()> {
        Self::ensure_author_role(principal)?;
        let questionnaire = self.find(questionnaire_id).await?;
        self.ensure_author(principal, questionnaire.event_id).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        find_question(&mut tx, questionnaire_id, question_id).await?;

        sqlx::query(r#"DELETE FROM questionnaire_questions WHERE id = $1"#)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Resolves a question to its questionnaire id and checks the caller may edit it.
    async fn owning_questionnaire(&self, question_id: Uuid, principal: &Principal) -> Result<Uuid> {
        Self::ensure_author_role(principal)?;
        let questionnaire_id: Uuid = sqlx::query_scalar(
            r#"SELECT questionnaire_id FROM questionnaire_questions WHERE id = $1"#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;
        let questionnaire = self.find(questionnaire_id).await?;
        self.ensure_author(principal, questionnaire.event_id).await?;
        Ok(questionnaire_id)
    }

    pub async fn add_alternative(
        &self,
        question_id: Uuid,
        payload: AlternativePayload,
        principal: &Principal,
    ) -> Result<Alternative> {
        let questionnaire_id = self.owning_questionnaire(question_id, principal).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        let question = find_question(&mut tx, questionnaire_id, question_id).await?;
        if question.kind != QuestionKind::MultipleChoice {
            return Err(Error::BadRequest(
                "Alternatives can only be added to multiple choice questions".to_string(),
            ));
        }

        let alternative = sqlx::query_as::<_, Alternative>(&format!(
            r#"
            INSERT INTO questionnaire_alternatives (question_id, body, is_correct, position)
            VALUES ($1, $2, $3, COALESCE($4, (
                SELECT COALESCE(MAX(position), 0) + 1 FROM questionnaire_alternatives WHERE question_id = $1
            )))
            RETURNING {}
            "#,
            ALTERNATIVE_COLUMNS
        ))
        .bind(question_id)
        .bind(payload.text.trim())
        .bind(payload.is_correct)
        .bind(payload.order)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(alternative)
    }

    pub async fn update_alternative(
        &self,
        question_id: Uuid,
        alternative_id: Uuid,
        payload: AlternativePayload,
        principal: &Principal,
    ) -> Result<Alternative> {
        let questionnaire_id = self.owning_questionnaire(question_id, principal).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        let alternative = sqlx::query_as::<_, Alternative>(&format!(
            r#"
            UPDATE questionnaire_alternatives
            SET body = $1, is_correct = $2, position = COALESCE($3, position), updated_at = NOW()
            WHERE id = $4 AND question_id = $5
            RETURNING {}
            "#,
            ALTERNATIVE_COLUMNS
        ))
        .bind(payload.text.trim())
        .bind(payload.is_correct)
        .bind(payload.order)
        .bind(alternative_id)
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Alternative not found for this question".to_string()))?;
        tx.commit().await?;
        Ok(alternative)
    }

    pub async fn delete_alternative(&self, question_id: Uuid, alternative_id: Uuid, principal: &Principal) -> Result<()> {
        let questionnaire_id = self.owning_questionnaire(question_id, principal).await?;

        let mut tx = self.pool.begin().await?;
        lock_structure(&mut tx, questionnaire_id).await?;
        let result = sqlx::query(r#"DELETE FROM questionnaire_alternatives WHERE id = $1 AND question_id = $2"#)
            .bind(alternative_id)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Alternative not found for this question".to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Validates the whole questionnaire and flips it to published. Nothing
    /// is written unless every rule holds.
    pub async fn publish(&self, id: Uuid, principal: &Principal) -> Result<Questionnaire> {
        Self::ensure_author_role(principal)?;
        let questionnaire = self.find(id).await?;
        self.ensure_author(principal, questionnaire.event_id).await?;
        let deadline = self.eligibility.earliest_class_end(questionnaire.event_id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM questionnaires WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Questionnaire not found".to_string()))?;

        let questions = load_question_tree(&mut tx, id).await?;
        let window = PublishWindow {
            now: self.eligibility.now(),
            deadline,
            may_override: principal.can(Capability::OverridePublishDeadline),
        };
        let violations = publish_validator::validate(&questions, window);
        if !violations.is_empty() {
            tx.rollback().await?;
            tracing::warn!(
                questionnaire_id = %id,
                violations = ?violations.iter().map(|v| v.code()).collect::<Vec<_>>(),
                "publish rejected"
            );
            return Err(Error::PublishRejected(violations));
        }

        let published = sqlx::query_as::<_, Questionnaire>(&format!(
            r#"
            UPDATE questionnaires
            SET status = $1, published_at = COALESCE(published_at, NOW()), updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            QUESTIONNAIRE_COLUMNS
        ))
        .bind(QuestionnaireStatus::Published.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            Some(principal.user_id),
            "questionnaire.published",
            "questionnaire",
            id,
            Some(json!({
                "questions": questions.len(),
                "weight_sum": publish_validator::weight_sum(&questions),
                "deadline_overridden": deadline.is_some_and(|d| window.now > d),
            })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(questionnaire_id = %id, by = %principal.user_id, "questionnaire published");
        Ok(published)
    }
}
