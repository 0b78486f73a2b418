use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub alternative_id: Option<Uuid>,
    pub free_text: Option<String>,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
