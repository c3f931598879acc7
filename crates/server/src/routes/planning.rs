use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use db::models::{
    activity_log::ActivityEntity,
    lead::Lead,
    planning::{
        CreatePlanning, FormationFormat, Planning, PlanningSchedule, PlanningWindow,
        PlanningWithParticipants, UpdatePlanning,
    },
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::services::{
    formation_dates,
    planning::{DedupReport, EnrollLead, EnrollmentOutcome},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub start_date: NaiveDate,
    pub format: FormationFormat,
    pub weekday: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddParticipantRequest {
    pub lead_id: Uuid,
}

pub async fn list_plannings(
    State(deployment): State<DeploymentImpl>,
    Query(window): Query<PlanningWindow>,
) -> Result<ResponseJson<ApiResponse<Vec<Planning>>>, ApiError> {
    let plannings = deployment.planning().list(&window).await?;
    Ok(ResponseJson(ApiResponse::success(plannings)))
}

pub async fn create_planning(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<CreatePlanning>,
) -> Result<ResponseJson<ApiResponse<Planning>>, ApiError> {
    let planning = deployment.planning().create(&payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Planning,
            Some(planning.id),
            "created",
            json!({
                "formation": planning.formation,
                "start_date": planning.start_date,
                "end_date": planning.end_date,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(planning)))
}

pub async fn get_planning(
    State(deployment): State<DeploymentImpl>,
    Path(planning_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<PlanningWithParticipants>>, ApiError> {
    let planning = deployment.planning().get(planning_id).await?;
    Ok(ResponseJson(ApiResponse::success(planning)))
}

pub async fn update_planning(
    State(deployment): State<DeploymentImpl>,
    Path(planning_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdatePlanning>,
) -> Result<ResponseJson<ApiResponse<Planning>>, ApiError> {
    let planning = deployment.planning().update(planning_id, &payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Planning,
            Some(planning.id),
            "updated",
            json!({
                "start_date": planning.start_date,
                "end_date": planning.end_date,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(planning)))
}

pub async fn delete_planning(
    State(deployment): State<DeploymentImpl>,
    Path(planning_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.planning().delete(planning_id).await?;

    deployment
        .record_activity(ActivityEntity::Planning, Some(planning_id), "deleted", json!({}))
        .await;

    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn list_participants(
    State(deployment): State<DeploymentImpl>,
    Path(planning_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Lead>>>, ApiError> {
    let participants = deployment.planning().participants(planning_id).await?;
    Ok(ResponseJson(ApiResponse::success(participants)))
}

/// Returns the participant list after the change. Adding an enrolled lead
/// again is a no-op.
pub async fn add_participant(
    State(deployment): State<DeploymentImpl>,
    Path(planning_id): Path<Uuid>,
    axum::Json(payload): axum::Json<AddParticipantRequest>,
) -> Result<ResponseJson<ApiResponse<Vec<Lead>>>, ApiError> {
    let planning = deployment.planning();
    let added = planning.add_participant(planning_id, payload.lead_id).await?;

    if added {
        deployment
            .record_activity(
                ActivityEntity::Planning,
                Some(planning_id),
                "participant_added",
                json!({ "lead_id": payload.lead_id }),
            )
            .await;
    }

    let participants = planning.participants(planning_id).await?;
    Ok(ResponseJson(ApiResponse::success(participants)))
}

pub async fn remove_participant(
    State(deployment): State<DeploymentImpl>,
    Path((planning_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .planning()
        .remove_participant(planning_id, lead_id)
        .await?;

    deployment
        .record_activity(
            ActivityEntity::Planning,
            Some(planning_id),
            "participant_removed",
            json!({ "lead_id": lead_id }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn enroll_lead(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<EnrollLead>,
) -> Result<ResponseJson<ApiResponse<EnrollmentOutcome>>, ApiError> {
    let outcome = deployment.planning().enroll_lead(&payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Planning,
            Some(outcome.planning.id),
            "lead_enrolled",
            json!({
                "lead_id": payload.lead_id,
                "created": outcome.created,
                "linked": outcome.linked,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(outcome)))
}

pub async fn deduplicate(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<DedupReport>>, ApiError> {
    let report = deployment.planning().deduplicate_sessions().await?;

    deployment
        .record_activity(
            ActivityEntity::Planning,
            None,
            "deduplicated",
            json!({
                "groups_merged": report.groups_merged,
                "sessions_deleted": report.sessions_deleted,
                "participants_moved": report.participants_moved,
                "groups_failed": report.groups_failed,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(report)))
}

/// Preview of the session dates a planning would get, without saving it
pub async fn preview_dates(
    Query(query): Query<ScheduleQuery>,
) -> Result<ResponseJson<ApiResponse<PlanningSchedule>>, ApiError> {
    let schedule = formation_dates::schedule(query.start_date, query.format, query.weekday)?;
    Ok(ResponseJson(ApiResponse::success(schedule)))
}

pub async fn lead_plannings(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Planning>>>, ApiError> {
    let plannings = deployment.planning().for_lead(lead_id).await?;
    Ok(ResponseJson(ApiResponse::success(plannings)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let planning_id_router = Router::new()
        .route(
            "/",
            get(get_planning).put(update_planning).delete(delete_planning),
        )
        .route(
            "/participants",
            get(list_participants).post(add_participant),
        )
        .route("/participants/{lead_id}", delete(remove_participant));

    let inner = Router::new()
        .route("/", get(list_plannings).post(create_planning))
        .route("/enroll", post(enroll_lead))
        .route("/deduplicate", post(deduplicate))
        .route("/dates", get(preview_dates))
        .nest("/{planning_id}", planning_id_router);

    Router::new()
        .nest("/plannings", inner)
        .route("/leads/{lead_id}/plannings", get(lead_plannings))
}
