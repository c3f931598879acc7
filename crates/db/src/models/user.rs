use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    Admin,
    /// Salesperson that leads are assigned to
    #[default]
    Closer,
    Trainer,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateUser {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Emails are compared case-insensitively; they are stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    pub fn is_closer(&self) -> bool {
        self.role == UserRole::Closer
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, email, full_name, phone, role, active, created_at, updated_at
               FROM users
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, email, full_name, phone, role, active, created_at, updated_at
               FROM users
               WHERE email = $1"#,
        )
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &SqlitePool, filter: &UserFilter) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, email, full_name, phone, role, active, created_at, updated_at
               FROM users
               WHERE ($1 IS NULL OR role = $1)
                 AND ($2 OR active = 1)
               ORDER BY full_name ASC"#,
        )
        .bind(filter.role)
        .bind(filter.include_inactive)
        .fetch_all(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateUser, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, email, full_name, phone, role)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, email, full_name, phone, role, active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(normalize_email(&data.email))
        .bind(data.full_name.trim())
        .bind(data.phone.as_deref())
        .bind(data.role.unwrap_or_default())
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users
               SET email = COALESCE($2, email),
                   full_name = COALESCE($3, full_name),
                   phone = COALESCE($4, phone),
                   role = COALESCE($5, role),
                   updated_at = CURRENT_TIMESTAMP
               WHERE id = $1
               RETURNING id, email, full_name, phone, role, active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.email.as_deref().map(normalize_email))
        .bind(data.full_name.as_deref().map(str::trim))
        .bind(data.phone.as_deref())
        .bind(data.role)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_active(
        pool: &SqlitePool,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users
               SET active = $2, updated_at = CURRENT_TIMESTAMP
               WHERE id = $1
               RETURNING id, email, full_name, phone, role, active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(pool)
        .await
    }
}
