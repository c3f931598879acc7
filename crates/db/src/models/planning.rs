use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::lead::Lead;

/// How the sessions of a training are laid out in the calendar
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "formation_format", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FormationFormat {
    /// One session day in a single week
    SingleWeek,
    /// Four weekly occurrences on the same weekday
    Monthly,
    /// Two consecutive days
    TwoDays,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Planning {
    pub id: Uuid,
    pub formation: String,
    pub format: FormationFormat,
    pub weekday: i64, // 0 = Monday .. 6 = Sunday
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[ts(type = "Array<string>")]
    pub session_dates: Json<Vec<NaiveDate>>,
    pub location: Option<String>,
    pub trainer_id: Option<Uuid>, // Foreign key to User
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePlanning {
    pub formation: String,
    pub start_date: NaiveDate,
    pub format: FormationFormat,
    pub weekday: u8,
    pub location: Option<String>,
    pub trainer_id: Option<Uuid>,
}

/// Partial update. `location` and `trainer_id` are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdatePlanning {
    pub formation: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub format: Option<FormationFormat>,
    pub weekday: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub location: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<Uuid>")]
    pub trainer_id: Option<Option<Uuid>>,
}

/// Resolved calendar of a planning row, derived from start date, format and weekday
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct PlanningSchedule {
    pub format: FormationFormat,
    pub weekday: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub session_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PlanningWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PlanningWithParticipants {
    #[serde(flatten)]
    #[ts(flatten)]
    pub planning: Planning,
    pub participants: Vec<Lead>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PlanningParticipant {
    pub planning_id: Uuid,
    pub lead_id: Uuid,
    pub created_at: DateTime<Utc>,
}

const PLANNING_COLUMNS: &str = "id, formation, format, weekday, start_date, end_date, \
     session_dates, location, trainer_id, created_at, updated_at";

impl Planning {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {PLANNING_COLUMNS} FROM plannings WHERE id = $1");
        sqlx::query_as::<_, Planning>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Plannings overlapping the window, ordered by start date
    pub async fn list(pool: &SqlitePool, window: &PlanningWindow) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PLANNING_COLUMNS} FROM plannings \
             WHERE ($1 IS NULL OR end_date >= $1) \
               AND ($2 IS NULL OR start_date <= $2) \
             ORDER BY start_date ASC, end_date ASC, id ASC"
        );
        sqlx::query_as::<_, Planning>(&sql)
            .bind(window.from)
            .bind(window.to)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_span(
        pool: &SqlitePool,
        formation: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PLANNING_COLUMNS} FROM plannings \
             WHERE lower(formation) = lower($1) AND start_date = $2 AND end_date = $3 \
             ORDER BY id ASC LIMIT 1"
        );
        sqlx::query_as::<_, Planning>(&sql)
            .bind(formation.trim())
            .bind(start_date)
            .bind(end_date)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_lead_id(pool: &SqlitePool, lead_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Planning>(
            r#"SELECT p.id, p.formation, p.format, p.weekday, p.start_date, p.end_date,
                      p.session_dates, p.location, p.trainer_id, p.created_at, p.updated_at
               FROM plannings p
               JOIN planning_participants pp ON pp.planning_id = p.id
               WHERE pp.lead_id = $1
               ORDER BY p.start_date ASC"#,
        )
        .bind(lead_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        formation: &str,
        schedule: &PlanningSchedule,
        location: Option<&str>,
        trainer_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO plannings (id, formation, format, weekday, start_date, end_date, \
             session_dates, location, trainer_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PLANNING_COLUMNS}"
        );
        sqlx::query_as::<_, Planning>(&sql)
            .bind(id)
            .bind(formation.trim())
            .bind(schedule.format)
            .bind(i64::from(schedule.weekday))
            .bind(schedule.start_date)
            .bind(schedule.end_date)
            .bind(Json(&schedule.session_dates))
            .bind(location)
            .bind(trainer_id)
            .fetch_one(pool)
            .await
    }

    /// Overwrites every editable column; callers resolve partial updates first.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        formation: &str,
        schedule: &PlanningSchedule,
        location: Option<&str>,
        trainer_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE plannings \
             SET formation = $2, format = $3, weekday = $4, start_date = $5, end_date = $6, \
                 session_dates = $7, location = $8, trainer_id = $9, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 \
             RETURNING {PLANNING_COLUMNS}"
        );
        sqlx::query_as::<_, Planning>(&sql)
            .bind(id)
            .bind(formation.trim())
            .bind(schedule.format)
            .bind(i64::from(schedule.weekday))
            .bind(schedule.start_date)
            .bind(schedule.end_date)
            .bind(Json(&schedule.session_dates))
            .bind(location)
            .bind(trainer_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM plannings WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn upcoming(
        pool: &SqlitePool,
        from: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {PLANNING_COLUMNS} FROM plannings \
             WHERE end_date >= $1 \
             ORDER BY start_date ASC, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Planning>(&sql)
            .bind(from)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

impl PlanningParticipant {
    /// Links a lead to a planning. Returns false when the link already existed.
    pub async fn add<'e, E>(executor: E, planning_id: Uuid, lead_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO planning_participants (planning_id, lead_id) VALUES ($1, $2)",
        )
        .bind(planning_id)
        .bind(lead_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(pool: &SqlitePool, planning_id: Uuid, lead_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM planning_participants WHERE planning_id = $1 AND lead_id = $2",
        )
        .bind(planning_id)
        .bind(lead_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Re-points every link of `from` to `to`. Links `to` already has are left
    /// behind and disappear when `from` is deleted.
    pub async fn reassign<'e, E>(executor: E, from: Uuid, to: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE OR IGNORE planning_participants SET planning_id = $2 WHERE planning_id = $1",
        )
        .bind(from)
        .bind(to)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_leads(pool: &SqlitePool, planning_id: Uuid) -> Result<Vec<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"SELECT l.id, l.first_name, l.last_name, l.email, l.phone, l.formation, l.source,
                      l.status, l.closer_id, l.fixed_price_cents, l.notes, l.created_at, l.updated_at
               FROM leads l
               JOIN planning_participants pp ON pp.lead_id = l.id
               WHERE pp.planning_id = $1
               ORDER BY l.last_name ASC, l.first_name ASC"#,
        )
        .bind(planning_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_planning_id(
        pool: &SqlitePool,
        planning_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlanningParticipant>(
            r#"SELECT planning_id, lead_id, created_at
               FROM planning_participants
               WHERE planning_id = $1"#,
        )
        .bind(planning_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::lead::{Lead, tests::new_lead},
    };

    #[test]
    fn format_round_trips_through_its_text_form() {
        let parsed: FormationFormat = "two_days".parse().unwrap();
        assert_eq!(parsed, FormationFormat::TwoDays);
        assert_eq!(FormationFormat::SingleWeek.to_string(), "single_week");
        assert!("weekly".parse::<FormationFormat>().is_err());
    }

    fn schedule(start: NaiveDate, end: NaiveDate) -> PlanningSchedule {
        PlanningSchedule {
            format: FormationFormat::TwoDays,
            weekday: 0,
            start_date: start,
            end_date: end,
            session_dates: vec![start, end],
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn session_dates_round_trip_as_json() {
        let db = DBService::new_in_memory().await.unwrap();
        let sched = schedule(date(2025, 3, 3), date(2025, 3, 4));
        let planning = Planning::create(&db.pool, Uuid::new_v4(), "Onglerie", &sched, Some("Lyon"), None)
            .await
            .unwrap();

        assert_eq!(planning.session_dates.0, vec![date(2025, 3, 3), date(2025, 3, 4)]);
        let found = Planning::find_by_span(&db.pool, "onglerie", date(2025, 3, 3), date(2025, 3, 4))
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(planning.id));
    }

    #[tokio::test]
    async fn list_honours_window() {
        let db = DBService::new_in_memory().await.unwrap();
        let march = schedule(date(2025, 3, 3), date(2025, 3, 4));
        let may = schedule(date(2025, 5, 5), date(2025, 5, 6));
        Planning::create(&db.pool, Uuid::new_v4(), "A", &march, None, None)
            .await
            .unwrap();
        Planning::create(&db.pool, Uuid::new_v4(), "A", &may, None, None)
            .await
            .unwrap();

        let window = PlanningWindow {
            from: Some(date(2025, 4, 1)),
            to: None,
        };
        let listed = Planning::list(&db.pool, &window).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].start_date, date(2025, 5, 5));

        let all = Planning::list(&db.pool, &PlanningWindow::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn reassign_skips_links_already_present() {
        let db = DBService::new_in_memory().await.unwrap();
        let sched = schedule(date(2025, 3, 3), date(2025, 3, 4));
        let keep = Planning::create(&db.pool, Uuid::new_v4(), "A", &sched, None, None)
            .await
            .unwrap();
        let dup = Planning::create(&db.pool, Uuid::new_v4(), "A", &sched, None, None)
            .await
            .unwrap();
        let shared = Lead::create(&db.pool, &new_lead("S", "S", "A"), Uuid::new_v4())
            .await
            .unwrap();
        let only_dup = Lead::create(&db.pool, &new_lead("D", "D", "A"), Uuid::new_v4())
            .await
            .unwrap();

        assert!(PlanningParticipant::add(&db.pool, keep.id, shared.id).await.unwrap());
        assert!(!PlanningParticipant::add(&db.pool, keep.id, shared.id).await.unwrap());
        PlanningParticipant::add(&db.pool, dup.id, shared.id).await.unwrap();
        PlanningParticipant::add(&db.pool, dup.id, only_dup.id).await.unwrap();

        let moved = PlanningParticipant::reassign(&db.pool, dup.id, keep.id).await.unwrap();
        assert_eq!(moved, 1);
        Planning::delete(&db.pool, dup.id).await.unwrap();

        let leads = PlanningParticipant::find_leads(&db.pool, keep.id).await.unwrap();
        assert_eq!(leads.len(), 2);
        let remaining = PlanningParticipant::find_by_planning_id(&db.pool, dup.id)
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }
}
