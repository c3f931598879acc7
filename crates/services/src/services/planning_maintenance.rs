//! Background job that periodically merges duplicate training sessions.

use std::time::Duration;

use db::{
    DBService,
    models::activity_log::{ActivityEntity, ActivityLog},
};
use serde_json::json;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use super::planning::{DedupReport, PlanningError, PlanningService};

pub struct PlanningMaintenanceService {
    db: DBService,
    planning: PlanningService,
    poll_interval: Duration,
}

impl PlanningMaintenanceService {
    /// Spawn the background deduplication loop
    pub fn spawn(db: DBService, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self {
            planning: PlanningService::new(db.pool.clone()),
            db,
            poll_interval,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting planning maintenance service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                error!("Error deduplicating planning sessions: {}", e);
            }
        }
    }

    /// One deduplication pass; merges are recorded in the activity log.
    pub async fn run_once(&self) -> Result<DedupReport, PlanningError> {
        let report = self.planning.deduplicate_sessions().await?;
        if report.groups_merged > 0 || report.groups_failed > 0 {
            ActivityLog::create(
                &self.db.pool,
                ActivityEntity::Planning,
                None,
                "deduplicated",
                &json!({
                    "groups_merged": report.groups_merged,
                    "sessions_deleted": report.sessions_deleted,
                    "participants_moved": report.participants_moved,
                    "groups_failed": report.groups_failed,
                    "trigger": "scheduled",
                }),
            )
            .await?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use db::models::planning::{FormationFormat, Planning, PlanningSchedule, PlanningWindow};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn run_once_merges_and_records_activity() {
        let db = DBService::new_in_memory().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let schedule = PlanningSchedule {
            format: FormationFormat::SingleWeek,
            weekday: 0,
            start_date: day,
            end_date: day,
            session_dates: vec![day],
        };
        for _ in 0..2 {
            Planning::create(&db.pool, Uuid::new_v4(), "Onglerie", &schedule, None, None)
                .await
                .unwrap();
        }

        let service = PlanningMaintenanceService {
            planning: PlanningService::new(db.pool.clone()),
            db: db.clone(),
            poll_interval: Duration::from_secs(60),
        };
        let report = service.run_once().await.unwrap();
        assert_eq!(report.sessions_deleted, 1);

        let remaining = Planning::list(&db.pool, &PlanningWindow::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        let activity = ActivityLog::recent(&db.pool, Some(ActivityEntity::Planning), 10)
            .await
            .unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].action, "deduplicated");
    }
}
