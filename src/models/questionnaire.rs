use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionnaireStatus {
    Draft,
    Published,
}

impl QuestionnaireStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionnaireStatus::Draft => "draft",
            QuestionnaireStatus::Published => "published",
        }
    }
}

impl std::str::FromStr for QuestionnaireStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(QuestionnaireStatus::Draft),
            "published" => Ok(QuestionnaireStatus::Published),
            other => Err(format!("unknown questionnaire status '{}'", other)),
        }
    }
}

text_enum!(QuestionnaireStatus);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Questionnaire {
    pub id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub mandatory: bool,
    pub min_score: Option<Decimal>,
    pub max_attempts: Option<i32>,
    pub status: QuestionnaireStatus,
    pub created_by: Uuid,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Questionnaire {
    pub fn is_published(&self) -> bool {
        self.status == QuestionnaireStatus::Published
    }
}
