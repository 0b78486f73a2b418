use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::class::{ClassInfo, ScheduledSession};

/// Read-only view over the enrollment, attendance and scheduling data owned
/// by other parts of the platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    /// Title of the event, `None` when it does not exist.
    async fn event_title(&self, event_id: Uuid) -> Result<Option<String>>;

    async fn is_event_instructor(&self, event_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn find_class(&self, class_id: Uuid) -> Result<Option<ClassInfo>>;

    async fn classes_for_event(&self, event_id: Uuid) -> Result<Vec<ClassInfo>>;

    /// Explicit per-date entries, oldest first.
    async fn schedule_for_class(&self, class_id: Uuid) -> Result<Vec<ScheduledSession>>;

    /// Distinct dates on which the learner was marked present.
    async fn attended_dates(&self, class_id: Uuid, user_id: Uuid) -> Result<Vec<NaiveDate>>;

    async fn is_enrolled(&self, class_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn enrolled_classes(&self, user_id: Uuid) -> Result<Vec<ClassInfo>>;
}

#[derive(Clone)]
pub struct PgCourseDirectory {
    pool: PgPool,
}

impl PgCourseDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CLASS_COLUMNS: &str =
    "c.id, c.event_id, c.title, c.start_date, c.end_date, c.start_time, c.end_time";

#[async_trait]
impl CourseDirectory for PgCourseDirectory {
    async fn event_title(&self, event_id: Uuid) -> Result<Option<String>> {
        let title: Option<String> = sqlx::query_scalar(r#"SELECT title FROM events WHERE id = $1"#)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(title)
    }

    async fn is_event_instructor(&self, event_id: Uuid, user_id: Uuid) -> Result<bool> {
        let assigned: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM event_instructors WHERE event_id = $1 AND user_id = $2)"#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(assigned)
    }

    async fn find_class(&self, class_id: Uuid) -> Result<Option<ClassInfo>> {
        let class = sqlx::query_as::<_, ClassInfo>(&format!(
            "SELECT {} FROM classes c WHERE c.id = $1",
            CLASS_COLUMNS
        ))
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(class)
    }

    async fn classes_for_event(&self, event_id: Uuid) -> Result<Vec<ClassInfo>> {
        let classes = sqlx::query_as::<_, ClassInfo>(&format!(
            "SELECT {} FROM classes c WHERE c.event_id = $1 ORDER BY c.start_date NULLS LAST, c.id",
            CLASS_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(classes)
    }

    async fn schedule_for_class(&self, class_id: Uuid) -> Result<Vec<ScheduledSession>> {
        let sessions = sqlx::query_as::<_, ScheduledSession>(
            r#"
            SELECT session_date, start_time, end_time
            FROM class_sessions
            WHERE class_id = $1
            ORDER BY session_date ASC, end_time ASC NULLS FIRST
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn attended_dates(&self, class_id: Uuid, user_id: Uuid) -> Result<Vec<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT session_date
            FROM attendance
            WHERE class_id = $1 AND user_id = $2 AND present = TRUE
            ORDER BY session_date
            "#,
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }

    async fn is_enrolled(&self, class_id: Uuid, user_id: Uuid) -> Result<bool> {
        let enrolled: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM enrollments WHERE class_id = $1 AND user_id = $2 AND status = 'active')"#,
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(enrolled)
    }

    async fn enrolled_classes(&self, user_id: Uuid) -> Result<Vec<ClassInfo>> {
        let classes = sqlx::query_as::<_, ClassInfo>(&format!(
            r#"
            SELECT {}
            FROM classes c
            JOIN enrollments e ON e.class_id = c.id
            WHERE e.user_id = $1 AND e.status = 'active'
            ORDER BY c.end_date NULLS LAST, c.id
            "#,
            CLASS_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(classes)
    }
}
