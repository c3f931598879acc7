use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    chat_report::ChatReportService,
    config::AppConfig,
    database_validator::DatabaseValidator,
    documents::DocumentService,
    llm::LlmClient,
    messaging::{EmailSender, MessageSender, MessagingService, WhatsAppSender},
    planning_maintenance::PlanningMaintenanceService,
    reporting::ReportingService,
};
use tracing::info;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<AppConfig>,
    db: DBService,
    messaging: MessagingService,
    chat: Arc<ChatReportService>,
    documents: DocumentService,
}

impl LocalDeployment {
    /// Wires the services around an already opened database. Background jobs
    /// are not started.
    pub fn from_parts(config: AppConfig, db: DBService) -> Result<Self, DeploymentError> {
        let mut senders: Vec<Arc<dyn MessageSender>> = Vec::new();
        if let Some(email) = config.email.clone() {
            senders.push(Arc::new(EmailSender::new(email)?));
        }
        if let Some(whatsapp) = config.whatsapp.clone() {
            senders.push(Arc::new(WhatsAppSender::new(whatsapp)?));
        }
        let llm = config.llm.as_ref().map(LlmClient::new).transpose()?;

        info!(
            email = config.email.is_some(),
            whatsapp = config.whatsapp.is_some(),
            chat = llm.is_some(),
            "Integrations configured"
        );

        Ok(Self {
            messaging: MessagingService::new(db.pool.clone(), senders),
            chat: Arc::new(ChatReportService::new(
                llm,
                ReportingService::new(db.pool.clone()),
                config.school.clone(),
            )),
            documents: DocumentService::new(db.pool.clone(), config.school.clone()),
            config: Arc::new(config),
            db,
        })
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new(config: AppConfig) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let validation = DatabaseValidator::new(db.pool.clone()).ensure_ready().await?;
        info!("{}", validation.summary());

        if let Some(interval) = config.planning_dedup_interval {
            PlanningMaintenanceService::spawn(db.clone(), interval);
        }

        Self::from_parts(config, db)
    }

    fn config(&self) -> &AppConfig {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn messaging(&self) -> &MessagingService {
        &self.messaging
    }

    fn chat(&self) -> &ChatReportService {
        &self.chat
    }

    fn documents(&self) -> &DocumentService {
        &self.documents
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use db::models::{
        activity_log::{ActivityEntity, ActivityLog},
        message_log::MessageChannel,
    };
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    async fn deployment(vars: &[(&str, &str)]) -> LocalDeployment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        let db = DBService::new_in_memory().await.unwrap();
        LocalDeployment::from_parts(config, db).unwrap()
    }

    #[tokio::test]
    async fn integrations_follow_configuration() {
        let bare = deployment(&[]).await;
        assert!(!bare.chat().is_configured());
        assert!(!bare.messaging().is_enabled(MessageChannel::Email));

        let full = deployment(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("WHATSAPP_ACCESS_TOKEN", "token"),
            ("WHATSAPP_PHONE_NUMBER_ID", "1234"),
        ])
        .await;
        assert!(full.chat().is_configured());
        assert!(full.messaging().is_enabled(MessageChannel::Whatsapp));
        assert!(!full.messaging().is_enabled(MessageChannel::Email));
    }

    #[tokio::test]
    async fn record_activity_writes_audit_trail() {
        let deployment = deployment(&[]).await;
        let lead_id = Uuid::new_v4();
        deployment
            .record_activity(
                ActivityEntity::Lead,
                Some(lead_id),
                "created",
                json!({ "formation": "Onglerie" }),
            )
            .await;

        let recent = ActivityLog::recent(&deployment.db().pool, None, 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].entity_id, Some(lead_id));
        assert_eq!(recent[0].details.0["formation"], "Onglerie");
    }
}
