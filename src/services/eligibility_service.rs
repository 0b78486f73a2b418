use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::class::{ClassInfo, ScheduledSession};
use crate::services::course_directory::CourseDirectory;
use crate::utils::time::{format_civil, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    ClassNotEnded,
    InsufficientAttendance,
    InvalidClass,
    NoScheduledSessions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub reason: Option<IneligibilityReason>,
    pub attendance_ratio: f64,
    pub total_sessions: i64,
    pub present_sessions: i64,
    pub class_end: Option<NaiveDateTime>,
    pub required_percent: u32,
    /// Set when the caller's role let them through despite a failing gate.
    pub bypassed: bool,
}

impl EligibilityReport {
    fn blocked(reason: IneligibilityReason, required_percent: u32) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
            attendance_ratio: 0.0,
            total_sessions: 0,
            present_sessions: 0,
            class_end: None,
            required_percent,
            bypassed: false,
        }
    }

    pub fn attendance_percent(&self) -> i64 {
        (self.attendance_ratio * 100.0).floor() as i64
    }

    pub fn describe(&self) -> String {
        match self.reason {
            None => "Eligible".to_string(),
            Some(IneligibilityReason::ClassNotEnded) => match self.class_end {
                Some(end) => format!("Class has not ended yet (ends {})", format_civil(end)),
                None => "Class has not ended yet".to_string(),
            },
            Some(IneligibilityReason::InsufficientAttendance) => format!(
                "{} of {} sessions attended, {}% < {}% required",
                self.present_sessions,
                self.total_sessions,
                self.attendance_percent(),
                self.required_percent
            ),
            Some(IneligibilityReason::InvalidClass) => {
                "Class is missing or has no usable schedule dates".to_string()
            }
            Some(IneligibilityReason::NoScheduledSessions) => {
                "Class has no scheduled sessions".to_string()
            }
        }
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default()
}

/// Real end of a class as a civil instant. The latest explicit schedule entry
/// wins over the class-level end date; a missing end time means 23:59.
pub fn class_end(class: &ClassInfo, sessions: &[ScheduledSession]) -> Option<NaiveDateTime> {
    if let Some(last) = sessions.iter().max_by_key(|s| (s.session_date, s.end_time)) {
        let time = last.end_time.or(class.end_time).unwrap_or_else(end_of_day);
        return Some(last.session_date.and_time(time));
    }
    class
        .end_date
        .map(|date| date.and_time(class.end_time.unwrap_or_else(end_of_day)))
}

/// Explicit entries when present, otherwise the inclusive day span of the class.
pub fn scheduled_session_count(class: &ClassInfo, sessions: &[ScheduledSession]) -> Option<i64> {
    if !sessions.is_empty() {
        return Some(sessions.len() as i64);
    }
    match (class.start_date, class.end_date) {
        (Some(start), Some(end)) => Some(((end - start).num_days() + 1).max(0)),
        _ => None,
    }
}

pub fn assess(
    class: &ClassInfo,
    sessions: &[ScheduledSession],
    attended: &[NaiveDate],
    now: NaiveDateTime,
    required_percent: u32,
) -> EligibilityReport {
    let (Some(end), Some(total)) = (class_end(class, sessions), scheduled_session_count(class, sessions))
    else {
        return EligibilityReport::blocked(IneligibilityReason::InvalidClass, required_percent);
    };

    let present = attended.iter().collect::<BTreeSet<_>>().len() as i64;
    let mut report = EligibilityReport {
        eligible: false,
        reason: None,
        attendance_ratio: 0.0,
        total_sessions: total,
        present_sessions: present,
        class_end: Some(end),
        required_percent,
        bypassed: false,
    };

    if total == 0 {
        report.reason = Some(IneligibilityReason::NoScheduledSessions);
        return report;
    }
    report.attendance_ratio = present as f64 / total as f64;

    if now < end {
        report.reason = Some(IneligibilityReason::ClassNotEnded);
    } else if present * 100 < total * i64::from(required_percent) {
        report.reason = Some(IneligibilityReason::InsufficientAttendance);
    } else {
        report.eligible = true;
    }
    report
}

#[derive(Clone)]
pub struct EligibilityService {
    directory: Arc<dyn CourseDirectory>,
    clock: Arc<dyn Clock>,
    required_percent: u32,
}

impl EligibilityService {
    pub fn new(directory: Arc<dyn CourseDirectory>, clock: Arc<dyn Clock>, required_percent: u32) -> Self {
        Self {
            directory,
            clock,
            required_percent,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub async fn evaluate(&self, user_id: Uuid, class_id: Uuid, bypass: bool) -> Result<EligibilityReport> {
        match self.directory.find_class(class_id).await? {
            Some(class) => self.evaluate_class(user_id, &class, bypass).await,
            None => {
                let mut report =
                    EligibilityReport::blocked(IneligibilityReason::InvalidClass, self.required_percent);
                if bypass {
                    report.eligible = true;
                    report.bypassed = true;
                }
                Ok(report)
            }
        }
    }

    pub async fn evaluate_class(&self, user_id: Uuid, class: &ClassInfo, bypass: bool) -> Result<EligibilityReport> {
        let sessions = self.directory.schedule_for_class(class.id).await?;
        let attended = self.directory.attended_dates(class.id, user_id).await?;
        let mut report = assess(class, &sessions, &attended, self.clock.now(), self.required_percent);

        if bypass && !report.eligible {
            report.eligible = true;
            report.bypassed = true;
        }
        tracing::debug!(
            %user_id,
            class_id = %class.id,
            eligible = report.eligible,
            reason = ?report.reason,
            present = report.present_sessions,
            total = report.total_sessions,
            "eligibility evaluated"
        );
        Ok(report)
    }

    pub async fn class_end(&self, class: &ClassInfo) -> Result<Option<NaiveDateTime>> {
        let sessions = self.directory.schedule_for_class(class.id).await?;
        Ok(class_end(class, &sessions))
    }

    /// End of the event's earliest-ending class, the authoring deadline.
    pub async fn earliest_class_end(&self, event_id: Uuid) -> Result<Option<NaiveDateTime>> {
        let mut earliest: Option<NaiveDateTime> = None;
        for class in self.directory.classes_for_event(event_id).await? {
            if let Some(end) = self.class_end(&class).await? {
                earliest = Some(earliest.map_or(end, |current| current.min(end)));
            }
        }
        Ok(earliest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::course_directory::MockCourseDirectory;
    use crate::utils::time::{parse_civil, FixedClock};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn class(start: Option<&str>, end: Option<&str>, end_time: Option<&str>) -> ClassInfo {
        ClassInfo {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            title: "Welding 101".into(),
            start_date: start.map(date),
            end_date: end.map(date),
            start_time: None,
            end_time: end_time.map(time),
        }
    }

    fn session(d: &str, end: Option<&str>) -> ScheduledSession {
        ScheduledSession {
            session_date: date(d),
            start_time: None,
            end_time: end.map(time),
        }
    }

    #[test]
    fn latest_schedule_entry_beats_class_fallback() {
        let c = class(Some("2024-03-01"), Some("2024-03-20"), Some("18:00"));
        let sessions = vec![session("2024-03-08", Some("12:00")), session("2024-03-10", Some("17:00"))];
        assert_eq!(class_end(&c, &sessions), Some(parse_civil("2024-03-10 17:00").unwrap()));
    }

    #[test]
    fn fallback_end_defaults_to_2359() {
        let c = class(Some("2024-03-01"), Some("2024-03-05"), None);
        assert_eq!(class_end(&c, &[]), Some(parse_civil("2024-03-05 23:59").unwrap()));
        assert_eq!(scheduled_session_count(&c, &[]), Some(5));
    }

    #[test]
    fn boundary_minute_decides_class_ended() {
        let c = class(None, None, None);
        let sessions = vec![session("2024-03-09", Some("17:00")), session("2024-03-10", Some("17:00"))];
        let attended = vec![date("2024-03-09"), date("2024-03-10")];

        let before = assess(&c, &sessions, &attended, parse_civil("2024-03-10 16:59").unwrap(), 75);
        assert!(!before.eligible);
        assert_eq!(before.reason, Some(IneligibilityReason::ClassNotEnded));

        let at = assess(&c, &sessions, &attended, parse_civil("2024-03-10 17:00").unwrap(), 75);
        assert!(at.eligible);
        assert_eq!(at.reason, None);
        assert_eq!(at.attendance_ratio, 1.0);
    }

    #[test]
    fn insufficient_attendance_reports_measured_ratio() {
        let c = class(Some("2024-03-01"), Some("2024-03-08"), Some("17:00"));
        let attended = vec![date("2024-03-01"), date("2024-03-02"), date("2024-03-02")];
        let report = assess(&c, &[], &attended, parse_civil("2024-04-01 09:00").unwrap(), 75);
        assert_eq!(report.reason, Some(IneligibilityReason::InsufficientAttendance));
        assert_eq!(report.present_sessions, 2);
        assert_eq!(report.total_sessions, 8);
        assert_eq!(report.describe(), "2 of 8 sessions attended, 25% < 75% required");
    }

    #[test]
    fn exactly_three_quarters_is_enough() {
        let c = class(Some("2024-03-01"), Some("2024-03-04"), Some("10:00"));
        let attended = vec![date("2024-03-01"), date("2024-03-02"), date("2024-03-03")];
        let report = assess(&c, &[], &attended, parse_civil("2024-03-04 10:00").unwrap(), 75);
        assert!(report.eligible);
    }

    #[test]
    fn classes_without_dates_are_invalid() {
        let c = class(Some("2024-03-01"), None, None);
        let report = assess(&c, &[], &[], parse_civil("2024-03-04 10:00").unwrap(), 75);
        assert_eq!(report.reason, Some(IneligibilityReason::InvalidClass));
    }

    #[test]
    fn inverted_span_has_no_sessions() {
        let c = class(Some("2024-03-05"), Some("2024-03-01"), None);
        let report = assess(&c, &[], &[], parse_civil("2024-04-01 10:00").unwrap(), 75);
        assert_eq!(report.reason, Some(IneligibilityReason::NoScheduledSessions));
    }

    fn service_with(class_info: ClassInfo, attended: Vec<NaiveDate>, now: &str) -> EligibilityService {
        let mut directory = MockCourseDirectory::new();
        let found = class_info.clone();
        directory
            .expect_find_class()
            .returning(move |_| Ok(Some(found.clone())));
        directory.expect_schedule_for_class().returning(|_| Ok(vec![]));
        directory
            .expect_attended_dates()
            .returning(move |_, _| Ok(attended.clone()));
        let clock = FixedClock::parse(now, chrono_tz::America::Sao_Paulo).unwrap();
        EligibilityService::new(Arc::new(directory), Arc::new(clock), 75)
    }

    #[tokio::test]
    async fn administrators_bypass_but_see_figures() {
        let c = class(Some("2024-03-01"), Some("2024-03-04"), Some("17:00"));
        let svc = service_with(c.clone(), vec![date("2024-03-01")], "2024-03-02 09:00");

        let learner = svc.evaluate(Uuid::new_v4(), c.id, false).await.unwrap();
        assert!(!learner.eligible);
        assert!(!learner.bypassed);

        let admin = svc.evaluate(Uuid::new_v4(), c.id, true).await.unwrap();
        assert!(admin.eligible);
        assert!(admin.bypassed);
        assert_eq!(admin.reason, Some(IneligibilityReason::ClassNotEnded));
        assert_eq!(admin.present_sessions, 1);
        assert_eq!(admin.total_sessions, 4);
    }

    #[tokio::test]
    async fn missing_class_is_invalid() {
        let mut directory = MockCourseDirectory::new();
        directory.expect_find_class().returning(|_| Ok(None));
        let clock = FixedClock::parse("2024-03-02 09:00", chrono_tz::UTC).unwrap();
        let svc = EligibilityService::new(Arc::new(directory), Arc::new(clock), 75);

        let report = svc.evaluate(Uuid::new_v4(), Uuid::new_v4(), false).await.unwrap();
        assert_eq!(report.reason, Some(IneligibilityReason::InvalidClass));
    }

    #[tokio::test]
    async fn earliest_class_end_picks_minimum() {
        let event_id = Uuid::new_v4();
        let mut early = class(Some("2024-03-01"), Some("2024-03-04"), Some("12:00"));
        let mut late = class(Some("2024-03-01"), Some("2024-03-09"), Some("12:00"));
        early.event_id = event_id;
        late.event_id = event_id;

        let mut directory = MockCourseDirectory::new();
        let classes = vec![late, early];
        directory
            .expect_classes_for_event()
            .returning(move |_| Ok(classes.clone()));
        directory.expect_schedule_for_class().returning(|_| Ok(vec![]));
        let clock = FixedClock::parse("2024-03-02 09:00", chrono_tz::UTC).unwrap();
        let svc = EligibilityService::new(Arc::new(directory), Arc::new(clock), 75);

        let end = svc.earliest_class_end(event_id).await.unwrap();
        assert_eq!(end, Some(parse_civil("2024-03-04 12:00").unwrap()));
    }
}
