//! Aggregated business figures, served as-is and embedded in chat prompts.

use chrono::{NaiveDate, Utc};
use db::models::{
    accounting_entry::{AccountingEntry, EntryTotals},
    lead::{Lead, LeadStatus},
    planning::{FormationFormat, Planning},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

const UPCOMING_SESSIONS_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct StatusCount {
    pub status: LeadStatus,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CloserStats {
    pub closer_id: Uuid,
    pub full_name: String,
    pub leads: i64,
    pub won: i64,
    pub paid_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpcomingSession {
    pub planning_id: Uuid,
    pub formation: String,
    pub format: FormationFormat,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location: Option<String>,
    pub participants: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ReportSnapshot {
    pub generated_on: NaiveDate,
    pub total_leads: i64,
    /// Every status is listed, including those with no lead
    pub leads_by_status: Vec<StatusCount>,
    /// Won leads over leads that reached a final status, in percent
    pub conversion_rate: Option<f64>,
    pub revenue: EntryTotals,
    pub closers: Vec<CloserStats>,
    pub upcoming_sessions: Vec<UpcomingSession>,
}

/// Fills in zero counts and keeps the pipeline order.
pub fn status_breakdown(counts: &[(LeadStatus, i64)]) -> Vec<StatusCount> {
    LeadStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: counts
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0),
        })
        .collect()
}

pub fn conversion_rate(breakdown: &[StatusCount]) -> Option<f64> {
    let count = |wanted: LeadStatus| {
        breakdown
            .iter()
            .find(|c| c.status == wanted)
            .map(|c| c.count)
            .unwrap_or(0)
    };
    let won = count(LeadStatus::Won);
    let closed = won + count(LeadStatus::Lost);
    (closed > 0).then(|| (won as f64 * 1000.0 / closed as f64).round() / 10.0)
}

#[derive(Clone)]
pub struct ReportingService {
    pool: SqlitePool,
}

impl ReportingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn snapshot(&self) -> Result<ReportSnapshot, sqlx::Error> {
        self.snapshot_on(Utc::now().date_naive()).await
    }

    pub async fn snapshot_on(&self, today: NaiveDate) -> Result<ReportSnapshot, sqlx::Error> {
        let leads_by_status = status_breakdown(&Lead::count_by_status(&self.pool).await?);
        let total_leads = leads_by_status.iter().map(|c| c.count).sum();

        Ok(ReportSnapshot {
            generated_on: today,
            total_leads,
            conversion_rate: conversion_rate(&leads_by_status),
            leads_by_status,
            revenue: AccountingEntry::totals(&self.pool).await?,
            closers: self.closer_stats().await?,
            upcoming_sessions: self.upcoming_sessions(today).await?,
        })
    }

    async fn closer_stats(&self) -> Result<Vec<CloserStats>, sqlx::Error> {
        sqlx::query_as::<_, CloserStats>(
            r#"SELECT u.id AS closer_id,
                      u.full_name AS full_name,
                      COUNT(DISTINCT l.id) AS leads,
                      COUNT(DISTINCT CASE WHEN l.status = 'won' THEN l.id END) AS won,
                      COALESCE(SUM(CASE WHEN e.paid = 1 THEN e.amount_cents ELSE 0 END), 0) AS paid_cents
               FROM users u
               LEFT JOIN leads l ON l.closer_id = u.id
               LEFT JOIN accounting_entries e ON e.lead_id = l.id
               WHERE u.role = 'closer' AND u.active = 1
               GROUP BY u.id, u.full_name
               ORDER BY paid_cents DESC, u.full_name ASC"#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn upcoming_sessions(&self, today: NaiveDate) -> Result<Vec<UpcomingSession>, sqlx::Error> {
        let plannings = Planning::upcoming(&self.pool, today, UPCOMING_SESSIONS_LIMIT).await?;
        let mut sessions = Vec::with_capacity(plannings.len());
        for planning in plannings {
            let participants = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM planning_participants WHERE planning_id = $1",
            )
            .bind(planning.id)
            .fetch_one(&self.pool)
            .await?;
            sessions.push(UpcomingSession {
                planning_id: planning.id,
                formation: planning.formation,
                format: planning.format,
                start_date: planning.start_date,
                end_date: planning.end_date,
                location: planning.location,
                participants,
            });
        }
        Ok(sessions)
    }
}
