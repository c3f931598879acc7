use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::activity_log::{ActivityEntity, ActivityLog};
use deployment::Deployment;
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityQuery {
    pub entity: Option<ActivityEntity>,
    pub limit: Option<i64>,
}

impl ActivityQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub async fn recent_activity(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ActivityQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ActivityLog>>>, ApiError> {
    let entries = ActivityLog::recent(&deployment.db().pool, query.entity, query.limit()).await?;
    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/activity", get(recent_activity))
}
