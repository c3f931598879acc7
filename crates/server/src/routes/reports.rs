use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::reporting::ReportSnapshot;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

pub async fn summary(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ReportSnapshot>>, ApiError> {
    let snapshot = deployment.reporting().snapshot().await?;
    Ok(ResponseJson(ApiResponse::success(snapshot)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/reports/summary", get(summary))
}
