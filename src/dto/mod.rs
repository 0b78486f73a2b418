pub mod questionnaire_dto;
pub mod respond_dto;
