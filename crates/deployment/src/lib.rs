use async_trait::async_trait;
use db::{
    DBService,
    models::activity_log::{ActivityEntity, ActivityLog},
};
use serde_json::Value;
use services::services::{
    accounting::AccountingService,
    chat_report::ChatReportService,
    config::{AppConfig, ConfigError},
    database_validator::DatabaseValidationError,
    documents::DocumentService,
    leads::LeadService,
    llm::LlmError,
    messaging::{DeliveryError, MessagingService},
    planning::PlanningService,
    reporting::ReportingService,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Everything a route handler can reach. Pool-only services are built on
/// demand; services holding clients or config are owned by the deployment.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new(config: AppConfig) -> Result<Self, DeploymentError>;

    fn config(&self) -> &AppConfig;

    fn db(&self) -> &DBService;

    fn messaging(&self) -> &MessagingService;

    fn chat(&self) -> &ChatReportService;

    fn documents(&self) -> &DocumentService;

    fn leads(&self) -> LeadService {
        LeadService::new(self.db().pool.clone())
    }

    fn accounting(&self) -> AccountingService {
        AccountingService::new(self.db().pool.clone())
    }

    fn planning(&self) -> PlanningService {
        PlanningService::new(self.db().pool.clone())
    }

    fn reporting(&self) -> ReportingService {
        ReportingService::new(self.db().pool.clone())
    }

    /// Appends to the audit trail. Failures are logged and swallowed.
    async fn record_activity(
        &self,
        entity: ActivityEntity,
        entity_id: Option<Uuid>,
        action: &str,
        details: Value,
    ) {
        if let Err(e) =
            ActivityLog::create(&self.db().pool, entity, entity_id, action, &details).await
        {
            tracing::warn!(
                entity = %entity,
                entity_id = ?entity_id,
                action,
                error = %e,
                "Failed to record activity"
            );
        }
    }
}
