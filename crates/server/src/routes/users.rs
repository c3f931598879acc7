//! Back-office accounts: admins, closers and trainers.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    activity_log::ActivityEntity,
    user::{CreateUser, UpdateUser, User, UserFilter},
};
use deployment::Deployment;
use serde_json::json;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::BadRequest(format!("invalid email address: {email}"))),
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("full_name must not be empty".to_string()));
    }
    Ok(())
}

pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    Query(filter): Query<UserFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    let users = User::list(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn create_user(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<CreateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    validate_email(&payload.email)?;
    validate_name(&payload.full_name)?;

    let user = User::create(&deployment.db().pool, &payload, Uuid::new_v4()).await?;

    deployment
        .record_activity(
            ActivityEntity::User,
            Some(user.id),
            "created",
            json!({ "role": user.role.to_string() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn get_user(
    State(deployment): State<DeploymentImpl>,
    Path(user_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::find_by_id(&deployment.db().pool, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn update_user(
    State(deployment): State<DeploymentImpl>,
    Path(user_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    if let Some(email) = &payload.email {
        validate_email(email)?;
    }
    if let Some(name) = &payload.full_name {
        validate_name(name)?;
    }

    let user = User::update(&deployment.db().pool, user_id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    deployment
        .record_activity(ActivityEntity::User, Some(user.id), "updated", json!({}))
        .await;

    Ok(ResponseJson(ApiResponse::success(user)))
}

/// Deactivated users keep their history but can no longer be assigned leads
pub async fn deactivate_user(
    State(deployment): State<DeploymentImpl>,
    Path(user_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::set_active(&deployment.db().pool, user_id, false)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    deployment
        .record_activity(ActivityEntity::User, Some(user.id), "deactivated", json!({}))
        .await;

    Ok(ResponseJson(ApiResponse::success(user)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/users",
        Router::new()
            .route("/", get(list_users).post(create_user))
            .route("/{user_id}", get(get_user).put(update_user))
            .route("/{user_id}/deactivate", post(deactivate_user)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("marie@school.fr").is_ok());
        assert!(validate_email(" marie@school.fr ").is_ok());
        assert!(validate_email("marie").is_err());
        assert!(validate_email("@school.fr").is_err());
        assert!(validate_email("marie@localhost").is_err());
    }
}
