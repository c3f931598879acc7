use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HealthStatus {
    pub version: String,
    pub database: bool,
    pub chat: bool,
}

pub async fn health(State(deployment): State<DeploymentImpl>) -> ResponseJson<ApiResponse<HealthStatus>> {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&deployment.db().pool)
        .await
        .is_ok();

    ResponseJson(ApiResponse::success(HealthStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        chat: deployment.chat().is_configured(),
    }))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/health", get(health))
}
