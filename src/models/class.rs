use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A class as exposed by the scheduling collaborator. Dates and times are
/// civil values in the configured zone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassInfo {
    pub id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// One explicit per-date schedule entry of a class.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledSession {
    pub session_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}
