use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    activity_log::ActivityEntity,
    lead::{CreateLead, Lead, LeadFilter, LeadStatus, LeadWithCloser, UpdateLead},
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AssignCloserRequest {
    /// `null` unassigns the lead
    pub closer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SetStatusRequest {
    pub status: LeadStatus,
}

async fn with_closer(deployment: &DeploymentImpl, lead: Lead) -> Result<LeadWithCloser, ApiError> {
    let closer = lead.closer(&deployment.db().pool).await?;
    Ok(LeadWithCloser { lead, closer })
}

pub async fn list_leads(
    State(deployment): State<DeploymentImpl>,
    Query(filter): Query<LeadFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<LeadWithCloser>>>, ApiError> {
    let leads = Lead::list_with_closers(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(leads)))
}

pub async fn create_lead(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<CreateLead>,
) -> Result<ResponseJson<ApiResponse<LeadWithCloser>>, ApiError> {
    let lead = deployment.leads().create(&payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Lead,
            Some(lead.id),
            "created",
            json!({
                "formation": lead.formation,
                "source": lead.source,
                "closer_id": lead.closer_id,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(with_closer(&deployment, lead).await?)))
}

pub async fn get_lead(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<LeadWithCloser>>, ApiError> {
    let lead = Lead::find_by_id(&deployment.db().pool, lead_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("lead not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(with_closer(&deployment, lead).await?)))
}

pub async fn update_lead(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateLead>,
) -> Result<ResponseJson<ApiResponse<LeadWithCloser>>, ApiError> {
    let lead = deployment.leads().update(lead_id, &payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Lead,
            Some(lead.id),
            "updated",
            json!({ "fixed_price_cents": payload.fixed_price_cents }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(with_closer(&deployment, lead).await?)))
}

pub async fn delete_lead(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.leads().delete(lead_id).await?;

    deployment
        .record_activity(ActivityEntity::Lead, Some(lead_id), "deleted", json!({}))
        .await;

    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn assign_closer(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<AssignCloserRequest>,
) -> Result<ResponseJson<ApiResponse<LeadWithCloser>>, ApiError> {
    let lead = deployment
        .leads()
        .assign_closer(lead_id, payload.closer_id)
        .await?;

    deployment
        .record_activity(
            ActivityEntity::Lead,
            Some(lead.id),
            "closer_assigned",
            json!({ "closer_id": payload.closer_id }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(with_closer(&deployment, lead).await?)))
}

pub async fn set_status(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<SetStatusRequest>,
) -> Result<ResponseJson<ApiResponse<LeadWithCloser>>, ApiError> {
    let lead = deployment.leads().set_status(lead_id, payload.status).await?;

    deployment
        .record_activity(
            ActivityEntity::Lead,
            Some(lead.id),
            "status_changed",
            json!({ "status": payload.status.to_string() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(with_closer(&deployment, lead).await?)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    // Other modules also serve paths under /leads/{lead_id}, so no nesting here
    Router::new()
        .route("/leads", get(list_leads).post(create_lead))
        .route(
            "/leads/{lead_id}",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/leads/{lead_id}/closer", post(assign_closer))
        .route("/leads/{lead_id}/status", post(set_status))
}
