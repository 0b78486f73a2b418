use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Started,
    Submitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Started => "started",
            AttemptStatus::Submitted => "submitted",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(AttemptStatus::Started),
            "submitted" => Ok(AttemptStatus::Submitted),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

text_enum!(AttemptStatus);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<Decimal>,
    pub total_points: Option<Decimal>,
    pub total_weight: Option<Decimal>,
}

impl Attempt {
    pub fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }
}
