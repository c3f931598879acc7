use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::models::{
    activity_log::ActivityEntity,
    comment::{Comment, CreateComment},
    lead::Lead,
    user::User,
};
use deployment::Deployment;
use serde_json::json;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

async fn require_lead(deployment: &DeploymentImpl, lead_id: Uuid) -> Result<Lead, ApiError> {
    Lead::find_by_id(&deployment.db().pool, lead_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("lead not found".to_string()))
}

/// Newest first
pub async fn list_comments(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Comment>>>, ApiError> {
    require_lead(&deployment, lead_id).await?;
    let comments = Comment::find_by_lead_id(&deployment.db().pool, lead_id).await?;
    Ok(ResponseJson(ApiResponse::success(comments)))
}

pub async fn create_comment(
    State(deployment): State<DeploymentImpl>,
    Path(lead_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateComment>,
) -> Result<ResponseJson<ApiResponse<Comment>>, ApiError> {
    if payload.body.trim().is_empty() {
        return Err(ApiError::BadRequest("comment body must not be empty".to_string()));
    }
    require_lead(&deployment, lead_id).await?;
    if let Some(author_id) = payload.author_id {
        User::find_by_id(&deployment.db().pool, author_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("unknown author {author_id}")))?;
    }

    let comment = Comment::create(&deployment.db().pool, lead_id, &payload, Uuid::new_v4()).await?;

    deployment
        .record_activity(
            ActivityEntity::Comment,
            Some(comment.id),
            "created",
            json!({ "lead_id": lead_id, "author_id": comment.author_id }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(comment)))
}

pub async fn delete_comment(
    State(deployment): State<DeploymentImpl>,
    Path(comment_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let deleted = Comment::delete(&deployment.db().pool, comment_id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("comment not found".to_string()));
    }

    deployment
        .record_activity(ActivityEntity::Comment, Some(comment_id), "deleted", json!({}))
        .await;

    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/leads/{lead_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{comment_id}", delete(delete_comment))
}
