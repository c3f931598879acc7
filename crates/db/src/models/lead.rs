use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::user::User;

/// Position of a lead in the sales pipeline
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "lead_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    /// Enrolled: a deposit or full payment has been received
    Won,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Won,
        LeadStatus::Lost,
    ];
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub formation: String,
    pub source: Option<String>,
    pub status: LeadStatus,
    pub closer_id: Option<Uuid>, // Foreign key to User
    pub fixed_price_cents: Option<i64>, // Agreed price; required before deposits can be cashed
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateLead {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub formation: String,
    pub source: Option<String>,
    pub status: Option<LeadStatus>,
    pub closer_id: Option<Uuid>,
    pub fixed_price_cents: Option<i64>,
    pub notes: Option<String>,
}

/// Partial update. For the nullable columns an absent key keeps the stored
/// value and an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateLead {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub email: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub phone: Option<Option<String>>,
    pub formation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub source: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<i64>")]
    pub fixed_price_cents: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub closer_id: Option<Uuid>,
    /// Case-insensitive match on name, email, phone or formation
    pub q: Option<String>,
}

/// Lead joined with its assigned closer, as shown in list views
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LeadWithCloser {
    #[serde(flatten)]
    #[ts(flatten)]
    pub lead: Lead,
    pub closer: Option<User>,
}

impl std::ops::Deref for LeadWithCloser {
    type Target = Lead;
    fn deref(&self) -> &Self::Target {
        &self.lead
    }
}

const LEAD_COLUMNS: &str = "id, first_name, last_name, email, phone, formation, source, status, \
     closer_id, fixed_price_cents, notes, created_at, updated_at";

impl Lead {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// `needle` must already be lowercased
    fn matches(&self, needle: &str) -> bool {
        [
            Some(self.first_name.as_str()),
            Some(self.last_name.as_str()),
            self.email.as_deref(),
            self.phone.as_deref(),
            Some(self.formation.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(needle))
    }

    pub async fn closer(&self, pool: &SqlitePool) -> Result<Option<User>, sqlx::Error> {
        match self.closer_id {
            Some(closer_id) => User::find_by_id(pool, closer_id).await,
            None => Ok(None),
        }
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool, filter: &LeadFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1 = 1"));

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(closer_id) = filter.closer_id {
            builder.push(" AND closer_id = ").push_bind(closer_id);
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");

        let leads = builder.build_query_as::<Lead>().fetch_all(pool).await?;

        // SQLite only folds ASCII case, so the text search runs here
        match filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let needle = q.to_lowercase();
                Ok(leads.into_iter().filter(|lead| lead.matches(&needle)).collect())
            }
            None => Ok(leads),
        }
    }

    pub async fn list_with_closers(
        pool: &SqlitePool,
        filter: &LeadFilter,
    ) -> Result<Vec<LeadWithCloser>, sqlx::Error> {
        let leads = Self::list(pool, filter).await?;
        let closers = User::list(
            pool,
            &super::user::UserFilter {
                role: None,
                include_inactive: true,
            },
        )
        .await?;

        Ok(leads
            .into_iter()
            .map(|lead| {
                let closer = lead
                    .closer_id
                    .and_then(|id| closers.iter().find(|c| c.id == id).cloned());
                LeadWithCloser { lead, closer }
            })
            .collect())
    }

    pub async fn create(pool: &SqlitePool, data: &CreateLead, id: Uuid) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO leads (id, first_name, last_name, email, phone, formation, source, status, \
             closer_id, fixed_price_cents, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {LEAD_COLUMNS}"
        );
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(data.first_name.trim())
            .bind(data.last_name.trim())
            .bind(data.email.as_deref().map(str::trim))
            .bind(data.phone.as_deref().map(str::trim))
            .bind(data.formation.trim())
            .bind(data.source.as_deref())
            .bind(data.status.unwrap_or_default())
            .bind(data.closer_id)
            .bind(data.fixed_price_cents)
            .bind(data.notes.as_deref())
            .fetch_one(pool)
            .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateLead,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE leads \
             SET first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 email = CASE WHEN $4 THEN $5 ELSE email END, \
                 phone = CASE WHEN $6 THEN $7 ELSE phone END, \
                 formation = COALESCE($8, formation), \
                 source = CASE WHEN $9 THEN $10 ELSE source END, \
                 fixed_price_cents = CASE WHEN $11 THEN $12 ELSE fixed_price_cents END, \
                 notes = CASE WHEN $13 THEN $14 ELSE notes END, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 \
             RETURNING {LEAD_COLUMNS}"
        );
        let trimmed = |value: &Option<Option<String>>| {
            value
                .as_ref()
                .and_then(|v| v.as_deref())
                .map(|v| v.trim().to_string())
        };
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(data.first_name.as_deref().map(str::trim))
            .bind(data.last_name.as_deref().map(str::trim))
            .bind(data.email.is_some())
            .bind(trimmed(&data.email))
            .bind(data.phone.is_some())
            .bind(trimmed(&data.phone))
            .bind(data.formation.as_deref().map(str::trim))
            .bind(data.source.is_some())
            .bind(data.source.clone().flatten())
            .bind(data.fixed_price_cents.is_some())
            .bind(data.fixed_price_cents.flatten())
            .bind(data.notes.is_some())
            .bind(data.notes.clone().flatten())
            .fetch_optional(pool)
            .await
    }

    pub async fn update_status<'e, E>(
        executor: E,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE leads SET status = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn assign_closer(
        pool: &SqlitePool,
        id: Uuid,
        closer_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE leads SET closer_id = $2, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(closer_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(LeadStatus, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (LeadStatus, i64)>(
            "SELECT status, COUNT(*) FROM leads GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        DBService,
        models::user::{CreateUser, UserRole},
    };

    pub(crate) fn new_lead(first: &str, last: &str, formation: &str) -> CreateLead {
        CreateLead {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: None,
            phone: None,
            formation: formation.to_string(),
            source: None,
            status: None,
            closer_id: None,
            fixed_price_cents: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_and_update_keep_unset_fields() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut data = new_lead(" Léa ", "Martin", "Prothésiste ongulaire");
        data.email = Some("lea@example.fr".to_string());
        let lead = Lead::create(&db.pool, &data, Uuid::new_v4()).await.unwrap();
        assert_eq!(lead.first_name, "Léa");
        assert_eq!(lead.status, LeadStatus::New);

        let updated = Lead::update(
            &db.pool,
            lead.id,
            &UpdateLead {
                fixed_price_cents: Some(Some(150_000)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.fixed_price_cents, Some(150_000));
        assert_eq!(updated.email.as_deref(), Some("lea@example.fr"));
        assert_eq!(updated.full_name(), "Léa Martin");
    }

    #[tokio::test]
    async fn list_applies_filters() {
        let db = DBService::new_in_memory().await.unwrap();
        let closer = User::create(
            &db.pool,
            &CreateUser {
                email: "closer@school.fr".to_string(),
                full_name: "Closer".to_string(),
                phone: None,
                role: Some(UserRole::Closer),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let mut assigned = new_lead("Paul", "Durand", "Maquillage");
        assigned.closer_id = Some(closer.id);
        assigned.status = Some(LeadStatus::Qualified);
        Lead::create(&db.pool, &assigned, Uuid::new_v4()).await.unwrap();
        Lead::create(&db.pool, &new_lead("Emma", "Petit", "Onglerie"), Uuid::new_v4())
            .await
            .unwrap();

        let by_closer = Lead::list(
            &db.pool,
            &LeadFilter {
                closer_id: Some(closer.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_closer.len(), 1);
        assert_eq!(by_closer[0].first_name, "Paul");

        let by_status = Lead::list(
            &db.pool,
            &LeadFilter {
                status: Some(LeadStatus::New),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].first_name, "Emma");

        let by_text = Lead::list(
            &db.pool,
            &LeadFilter {
                q: Some("ONGLE".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_text.len(), 1);

        let with_closers = Lead::list_with_closers(&db.pool, &LeadFilter::default())
            .await
            .unwrap();
        let paul = with_closers.iter().find(|l| l.first_name == "Paul").unwrap();
        assert_eq!(paul.closer.as_ref().map(|c| c.id), Some(closer.id));
    }

    #[tokio::test]
    async fn text_search_folds_accented_capitals() {
        let db = DBService::new_in_memory().await.unwrap();
        Lead::create(&db.pool, &new_lead("Élodie", "Dupont", "Onglerie"), Uuid::new_v4())
            .await
            .unwrap();
        Lead::create(&db.pool, &new_lead("Marc", "Éric", "Maquillage"), Uuid::new_v4())
            .await
            .unwrap();

        for q in ["élodie", "Élodie", "ÉLODIE", "lodie dup"] {
            let found = Lead::list(
                &db.pool,
                &LeadFilter {
                    q: Some(q.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            let expected = usize::from(q != "lodie dup");
            assert_eq!(found.len(), expected, "query {q:?}");
        }

        let by_last_name = Lead::list(
            &db.pool,
            &LeadFilter {
                q: Some("éric".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_last_name.len(), 1);
        assert_eq!(by_last_name[0].first_name, "Marc");
    }

    #[tokio::test]
    async fn explicit_null_clears_optional_columns() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut data = new_lead("Sofia", "Roux", "Onglerie");
        data.email = Some("sofia@example.fr".to_string());
        data.fixed_price_cents = Some(90_000);
        let lead = Lead::create(&db.pool, &data, Uuid::new_v4()).await.unwrap();

        let payload: UpdateLead =
            serde_json::from_str(r#"{"email": null, "notes": "rappeler lundi"}"#).unwrap();
        assert_eq!(payload.email, Some(None));
        assert_eq!(payload.fixed_price_cents, None);

        let updated = Lead::update(&db.pool, lead.id, &payload).await.unwrap().unwrap();
        assert_eq!(updated.email, None);
        assert_eq!(updated.fixed_price_cents, Some(90_000));
        assert_eq!(updated.notes.as_deref(), Some("rappeler lundi"));
    }

    #[tokio::test]
    async fn count_by_status_groups_rows() {
        let db = DBService::new_in_memory().await.unwrap();
        for _ in 0..2 {
            Lead::create(&db.pool, &new_lead("A", "B", "C"), Uuid::new_v4())
                .await
                .unwrap();
        }
        let lead = Lead::create(&db.pool, &new_lead("D", "E", "F"), Uuid::new_v4())
            .await
            .unwrap();
        Lead::update_status(&db.pool, lead.id, LeadStatus::Lost)
            .await
            .unwrap();

        let counts = Lead::count_by_status(&db.pool).await.unwrap();
        assert!(counts.contains(&(LeadStatus::New, 2)));
        assert!(counts.contains(&(LeadStatus::Lost, 1)));
    }
}
