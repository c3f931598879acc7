pub mod accounting;
pub mod chat_report;
pub mod config;
pub mod database_validator;
pub mod documents;
pub mod formation_dates;
pub mod leads;
pub mod llm;
pub mod messaging;
pub mod planning;
pub mod planning_maintenance;
pub mod reporting;
