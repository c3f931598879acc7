use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "message_channel", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageChannel {
    Email,
    Whatsapp,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Failed,
}

/// Outbound message sent to a lead, kept for the lead's history
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct MessageLog {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: MessageChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessageLog<'a> {
    pub lead_id: Uuid,
    pub channel: MessageChannel,
    pub recipient: &'a str,
    pub subject: Option<&'a str>,
    pub body: &'a str,
    pub status: MessageStatus,
    pub provider_message_id: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

impl MessageLog {
    pub async fn create(pool: &SqlitePool, data: &NewMessageLog<'_>) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, MessageLog>(
            r#"INSERT INTO message_logs
                 (id, lead_id, channel, recipient, subject, body, status, provider_message_id, error_message)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING id, lead_id, channel, recipient, subject, body, status,
                         provider_message_id, error_message, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.lead_id)
        .bind(data.channel)
        .bind(data.recipient)
        .bind(data.subject)
        .bind(data.body)
        .bind(data.status)
        .bind(data.provider_message_id)
        .bind(data.error_message)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_lead_id(pool: &SqlitePool, lead_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MessageLog>(
            r#"SELECT id, lead_id, channel, recipient, subject, body, status,
                      provider_message_id, error_message, created_at
               FROM message_logs
               WHERE lead_id = $1
               ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(lead_id)
        .fetch_all(pool)
        .await
    }
}
