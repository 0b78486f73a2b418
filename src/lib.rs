pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::{
    attempt_service::AttemptService,
    audit_service::AuditService,
    course_directory::{CourseDirectory, PgCourseDirectory},
    eligibility_service::EligibilityService,
    questionnaire_service::QuestionnaireService,
};
use crate::utils::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<dyn CourseDirectory>,
    pub eligibility_service: EligibilityService,
    pub questionnaire_service: QuestionnaireService,
    pub attempt_service: AttemptService,
    pub audit_service: AuditService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        Self::with_clock(
            pool,
            Arc::new(SystemClock::new(config.timezone)),
            config.min_attendance_percent,
        )
    }

    /// Same wiring as `new` with an explicit clock and attendance threshold.
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>, min_attendance_percent: u32) -> Self {
        let directory: Arc<dyn CourseDirectory> = Arc::new(PgCourseDirectory::new(pool.clone()));
        let eligibility_service =
            EligibilityService::new(directory.clone(), clock.clone(), min_attendance_percent);
        let questionnaire_service =
            QuestionnaireService::new(pool.clone(), directory.clone(), eligibility_service.clone());
        let attempt_service = AttemptService::new(
            pool.clone(),
            directory.clone(),
            eligibility_service.clone(),
            questionnaire_service.clone(),
        );
        let audit_service = AuditService::new(pool.clone());

        Self {
            pool,
            clock,
            directory,
            eligibility_service,
            questionnaire_service,
            attempt_service,
            audit_service,
        }
    }
}
