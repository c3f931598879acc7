use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Kind of record an activity entry refers to
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "activity_entity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityEntity {
    Lead,
    AccountingEntry,
    Planning,
    User,
    Comment,
    Document,
    Message,
    Chat,
}

/// Audit trail entry written by route handlers after a successful change
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ActivityLog {
    pub id: Uuid,
    pub entity: ActivityEntity,
    pub entity_id: Option<Uuid>,
    pub action: String,
    #[ts(type = "unknown")]
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub async fn create(
        pool: &SqlitePool,
        entity: ActivityEntity,
        entity_id: Option<Uuid>,
        action: &str,
        details: &Value,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"INSERT INTO activity_logs (id, entity, entity_id, action, details)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, entity, entity_id, action, details, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(entity)
        .bind(entity_id)
        .bind(action)
        .bind(Json(details))
        .fetch_one(pool)
        .await
    }

    pub async fn recent(
        pool: &SqlitePool,
        entity: Option<ActivityEntity>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"SELECT id, entity, entity_id, action, details, created_at
               FROM activity_logs
               WHERE ($1 IS NULL OR entity = $1)
               ORDER BY created_at DESC, rowid DESC
               LIMIT $2"#,
        )
        .bind(entity)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn recent_filters_by_entity() {
        let db = DBService::new_in_memory().await.unwrap();
        let lead_id = Uuid::new_v4();
        ActivityLog::create(
            &db.pool,
            ActivityEntity::Lead,
            Some(lead_id),
            "created",
            &serde_json::json!({ "formation": "Onglerie" }),
        )
        .await
        .unwrap();
        ActivityLog::create(&db.pool, ActivityEntity::Chat, None, "asked", &Value::Null)
            .await
            .unwrap();

        let leads = ActivityLog::recent(&db.pool, Some(ActivityEntity::Lead), 10)
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].entity_id, Some(lead_id));
        assert_eq!(leads[0].details.0["formation"], "Onglerie");

        let all = ActivityLog::recent(&db.pool, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
