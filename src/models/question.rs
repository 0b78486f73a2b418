use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    Essay,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::Essay => "essay",
        }
    }
}

impl std::str::FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionKind::MultipleChoice),
            "essay" => Ok(QuestionKind::Essay),
            other => Err(format!("unknown question kind '{}'", other)),
        }
    }
}

text_enum!(QuestionKind);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(rename = "order")]
    pub position: i32,
    pub weight: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alternative {
    pub id: Uuid,
    pub question_id: Uuid,
    #[serde(rename = "text")]
    pub body: String,
    pub is_correct: bool,
    #[serde(rename = "order")]
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question together with its alternatives, both in authoring order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithAlternatives {
    #[serde(flatten)]
    pub question: Question,
    pub alternatives: Vec<Alternative>,
}

impl QuestionWithAlternatives {
    pub fn is_multiple_choice(&self) -> bool {
        self.question.kind == QuestionKind::MultipleChoice
    }

    pub fn alternative(&self, alternative_id: Uuid) -> Option<&Alternative> {
        self.alternatives.iter().find(|a| a.id == alternative_id)
    }

    pub fn correct_count(&self) -> usize {
        self.alternatives.iter().filter(|a| a.is_correct).count()
    }
}
