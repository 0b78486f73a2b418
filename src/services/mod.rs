pub mod attempt_service;
pub mod audit_service;
pub mod course_directory;
pub mod eligibility_service;
pub mod grading_service;
pub mod presentation_service;
pub mod publish_validator;
pub mod questionnaire_service;
