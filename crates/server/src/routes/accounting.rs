//! Payments recorded against a lead.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    accounting_entry::{AccountingEntry, CreateAccountingEntry, UpdateAccountingEntry},
    activity_log::ActivityEntity,
};
use deployment::Deployment;
use serde_json::json;
use services::services::accounting::{LeadAccountSummary, MarkPaidOutcome};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

pub async fn list_entries(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<AccountingEntry>>>, ApiError> {
    let entries = deployment.accounting().entries(lead_id).await?;
    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub async fn create_entry(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateAccountingEntry>,
) -> Result<ResponseJson<ApiResponse<AccountingEntry>>, ApiError> {
    let entry = deployment.accounting().create_entry(lead_id, &payload).await?;

    deployment
        .record_activity(
            ActivityEntity::AccountingEntry,
            Some(entry.id),
            "created",
            json!({
                "lead_id": lead_id,
                "kind": entry.kind.to_string(),
                "amount_cents": entry.amount_cents,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub async fn lead_summary(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<LeadAccountSummary>>, ApiError> {
    let summary = deployment.accounting().summary(lead_id).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub async fn update_entry(
    State(deployment): State<DeploymentImpl>,
    Path(entry_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateAccountingEntry>,
) -> Result<ResponseJson<ApiResponse<AccountingEntry>>, ApiError> {
    let entry = deployment.accounting().update_entry(entry_id, &payload).await?;

    deployment
        .record_activity(
            ActivityEntity::AccountingEntry,
            Some(entry.id),
            "updated",
            json!({ "amount_cents": entry.amount_cents }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub async fn delete_entry(
    State(deployment): State<DeploymentImpl>,
    Path(entry_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.accounting().delete_entry(entry_id).await?;

    deployment
        .record_activity(
            ActivityEntity::AccountingEntry,
            Some(entry_id),
            "deleted",
            json!({}),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn mark_paid(
    State(deployment): State<DeploymentImpl>,
    Path(entry_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<MarkPaidOutcome>>, ApiError> {
    let outcome = deployment.accounting().mark_paid(entry_id).await?;

    deployment
        .record_activity(
            ActivityEntity::AccountingEntry,
            Some(entry_id),
            "marked_paid",
            json!({
                "lead_id": outcome.entry.lead_id,
                "amount_cents": outcome.entry.amount_cents,
                "lead_status": outcome.lead_status.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(outcome)))
}

pub async fn mark_unpaid(
    State(deployment): State<DeploymentImpl>,
    Path(entry_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AccountingEntry>>, ApiError> {
    let entry = deployment.accounting().mark_unpaid(entry_id).await?;

    deployment
        .record_activity(
            ActivityEntity::AccountingEntry,
            Some(entry_id),
            "marked_unpaid",
            json!({ "lead_id": entry.lead_id }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/leads/{lead_id}/accounting",
            get(list_entries).post(create_entry),
        )
        .route("/leads/{lead_id}/accounting/summary", get(lead_summary))
        .nest(
            "/accounting/{entry_id}",
            Router::new()
                .route("/", put(update_entry).delete(delete_entry))
                .route("/paid", post(mark_paid))
                .route("/unpaid", post(mark_unpaid)),
        )
}
