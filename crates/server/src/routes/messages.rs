//! Outbound email and WhatsApp messages sent to a lead.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{activity_log::ActivityEntity, message_log::MessageLog};
use deployment::Deployment;
use serde_json::json;
use services::services::messaging::SendMessage;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

pub async fn message_history(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<MessageLog>>>, ApiError> {
    let history = deployment.messaging().history(lead_id).await?;
    Ok(ResponseJson(ApiResponse::success(history)))
}

pub async fn send_message(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<SendMessage>,
) -> Result<ResponseJson<ApiResponse<MessageLog>>, ApiError> {
    let log = deployment.messaging().send(lead_id, &payload).await?;

    deployment
        .record_activity(
            ActivityEntity::Message,
            Some(log.id),
            "sent",
            json!({ "lead_id": lead_id, "channel": log.channel.to_string() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(log)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route(
        "/leads/{lead_id}/messages",
        get(message_history).post(send_message),
    )
}
