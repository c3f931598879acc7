use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use db::models::activity_log::ActivityEntity;
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::services::llm::Message;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChatRequest {
    /// Whole conversation so far, oldest first
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChatReply {
    pub answer: String,
}

pub async fn ask(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<ChatRequest>,
) -> Result<ResponseJson<ApiResponse<ChatReply>>, ApiError> {
    let answer = deployment.chat().ask(&payload.messages).await?;

    deployment
        .record_activity(
            ActivityEntity::Chat,
            None,
            "answered",
            json!({ "turns": payload.messages.len() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(ChatReply { answer })))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/chat", post(ask))
}
