//! Chat-assisted reporting: answers questions about the business from a
//! snapshot of current figures.

use thiserror::Error;
use tracing::info;

use super::{
    config::SchoolProfile,
    llm::{LlmClient, LlmError, Message, Role},
    reporting::{ReportSnapshot, ReportingService},
};

/// Longest conversation forwarded to the model, in messages
pub const MAX_HISTORY: usize = 40;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat assistant is not configured")]
    NotConfigured,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
}

/// The history must end with a user turn and contain no blank messages.
pub fn validate_history(history: &[Message]) -> Result<(), ChatError> {
    let Some(last) = history.last() else {
        return Err(ChatError::Validation("conversation is empty".to_string()));
    };
    if last.role != Role::User {
        return Err(ChatError::Validation(
            "the last message must come from the user".to_string(),
        ));
    }
    if history.iter().any(|m| m.content.trim().is_empty()) {
        return Err(ChatError::Validation("messages must not be blank".to_string()));
    }
    Ok(())
}

/// The newest `MAX_HISTORY` messages, starting on a user turn.
pub fn recent_history(history: &[Message]) -> &[Message] {
    let window = &history[history.len().saturating_sub(MAX_HISTORY)..];
    let first_user = window
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(window.len());
    &window[first_user..]
}

pub fn build_system_prompt(school: &SchoolProfile, snapshot: &ReportSnapshot) -> Result<String, ChatError> {
    let figures = serde_json::to_string_pretty(snapshot)
        .map_err(|e| ChatError::Validation(format!("could not encode report: {e}")))?;
    Ok(format!(
        "You are the reporting assistant of {name}, a training school. \
         Answer questions about leads, payments and sessions using only the figures below, \
         dated {date}. Amounts are in euro cents; convert them to euros in answers. \
         If the figures do not answer the question, say so.\n\n\
         <figures>\n{figures}\n</figures>",
        name = school.name,
        date = snapshot.generated_on,
    ))
}

pub struct ChatReportService {
    llm: Option<LlmClient>,
    reporting: ReportingService,
    school: SchoolProfile,
}

impl ChatReportService {
    pub fn new(llm: Option<LlmClient>, reporting: ReportingService, school: SchoolProfile) -> Self {
        Self {
            llm,
            reporting,
            school,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn ask(&self, history: &[Message]) -> Result<String, ChatError> {
        let llm = self.llm.as_ref().ok_or(ChatError::NotConfigured)?;
        validate_history(history)?;

        let history = recent_history(history);
        let snapshot = self.reporting.snapshot().await?;
        let system = build_system_prompt(&self.school, &snapshot)?;

        let answer = llm
            .complete(history, Some(&system))
            .await?
            .text()
            .ok_or(LlmError::EmptyResponse)?;

        info!(
            model = llm.model(),
            turns = history.len(),
            answer_len = answer.len(),
            "Chat report answered"
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use db::{DBService, models::accounting_entry::EntryTotals};

    use super::*;

    fn snapshot() -> ReportSnapshot {
        ReportSnapshot {
            generated_on: NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
            total_leads: 7,
            leads_by_status: vec![],
            conversion_rate: Some(50.0),
            revenue: EntryTotals {
                paid_cents: 120_000,
                pending_cents: 30_000,
            },
            closers: vec![],
            upcoming_sessions: vec![],
        }
    }

    #[test]
    fn system_prompt_embeds_figures() {
        let school = SchoolProfile {
            name: "Institut Lumière".to_string(),
            ..Default::default()
        };
        let prompt = build_system_prompt(&school, &snapshot()).unwrap();
        assert!(prompt.contains("Institut Lumière"));
        assert!(prompt.contains("2025-05-12"));
        assert!(prompt.contains("\"paid_cents\": 120000"));
    }

    #[test]
    fn history_must_end_with_user_turn() {
        assert!(matches!(validate_history(&[]), Err(ChatError::Validation(_))));
        assert!(validate_history(&[Message::user("Chiffre du mois ?")]).is_ok());
        assert!(matches!(
            validate_history(&[Message::user("Salut"), Message::assistant("Bonjour")]),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            validate_history(&[Message::user("  ")]),
            Err(ChatError::Validation(_))
        ));
    }

    fn conversation(turns: usize) -> Vec<Message> {
        (0..turns)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i}"))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn long_history_is_cut_on_a_user_turn() {
        let history = conversation(41);
        let kept = recent_history(&history);
        assert_eq!(kept.len(), MAX_HISTORY - 1);
        assert_eq!(kept[0].role, Role::User);
        assert_eq!(kept[0].content, "question 2");
        assert_eq!(kept.last().map(|m| m.content.as_str()), Some("question 40"));

        let short = conversation(5);
        assert_eq!(recent_history(&short).len(), 5);

        let exact = conversation(MAX_HISTORY + 2);
        let kept = recent_history(&exact);
        assert_eq!(kept.len(), MAX_HISTORY);
        assert_eq!(kept[0].role, Role::User);
    }

    #[tokio::test]
    async fn unconfigured_service_refuses() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = ChatReportService::new(
            None,
            ReportingService::new(db.pool.clone()),
            SchoolProfile::default(),
        );
        assert!(!service.is_configured());
        let err = service.ask(&[Message::user("Combien ?")]).await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured));
    }
}
