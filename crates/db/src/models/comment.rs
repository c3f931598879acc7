use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Comment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateComment {
    pub author_id: Option<Uuid>,
    pub body: String,
}

impl Comment {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, lead_id, author_id, body, created_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Newest first
    pub async fn find_by_lead_id(pool: &SqlitePool, lead_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"SELECT id, lead_id, author_id, body, created_at
               FROM comments
               WHERE lead_id = $1
               ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(lead_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        lead_id: Uuid,
        data: &CreateComment,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"INSERT INTO comments (id, lead_id, author_id, body)
               VALUES ($1, $2, $3, $4)
               RETURNING id, lead_id, author_id, body, created_at"#,
        )
        .bind(id)
        .bind(lead_id)
        .bind(data.author_id)
        .bind(data.body.trim())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::lead::{Lead, tests::new_lead},
    };

    #[tokio::test]
    async fn comments_are_listed_newest_first() {
        let db = DBService::new_in_memory().await.unwrap();
        let lead = Lead::create(&db.pool, &new_lead("A", "B", "C"), Uuid::new_v4())
            .await
            .unwrap();
        for body in ["first call", "second call"] {
            Comment::create(
                &db.pool,
                lead.id,
                &CreateComment {
                    author_id: None,
                    body: body.to_string(),
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        }

        let comments = Comment::find_by_lead_id(&db.pool, lead.id).await.unwrap();
        let bodies: Vec<_> = comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["second call", "first call"]);

        assert_eq!(Comment::delete(&db.pool, comments[0].id).await.unwrap(), 1);
        assert_eq!(Comment::find_by_lead_id(&db.pool, lead.id).await.unwrap().len(), 1);
    }
}
