pub mod accounting_entry;
pub mod activity_log;
pub mod comment;
pub mod lead;
pub mod message_log;
pub mod planning;
pub mod user;
