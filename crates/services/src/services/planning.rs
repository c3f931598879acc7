//! Training sessions: scheduling, participants, enrolment and deduplication.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use db::models::{
    lead::Lead,
    planning::{
        CreatePlanning, FormationFormat, Planning, PlanningParticipant, PlanningWindow,
        PlanningWithParticipants, UpdatePlanning,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::formation_dates::{self, FormationDateError};

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    InvalidDates(#[from] FormationDateError),
    #[error("planning not found")]
    NotFound,
    #[error("lead not found")]
    LeadNotFound,
    #[error("{0}")]
    Validation(String),
}

/// Request to put a lead on the session matching its chosen dates
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct EnrollLead {
    pub lead_id: Uuid,
    /// Defaults to the lead's formation
    pub formation: Option<String>,
    pub start_date: NaiveDate,
    pub format: FormationFormat,
    pub weekday: u8,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct EnrollmentOutcome {
    pub planning: Planning,
    /// A new planning row had to be created
    pub created: bool,
    /// The lead was not linked yet
    pub linked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct DedupReport {
    pub groups_merged: usize,
    pub sessions_deleted: usize,
    pub participants_moved: u64,
    pub groups_failed: usize,
}

/// Rows sharing one (start date, end date) span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub keep: Uuid,
    pub remove: Vec<Uuid>,
}

/// Groups plannings by span; the smallest id of each group survives.
pub fn find_duplicate_groups(plannings: &[Planning]) -> Vec<DuplicateGroup> {
    let mut spans: BTreeMap<(NaiveDate, NaiveDate), Vec<Uuid>> = BTreeMap::new();
    for planning in plannings {
        spans
            .entry((planning.start_date, planning.end_date))
            .or_default()
            .push(planning.id);
    }

    spans
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((start_date, end_date), mut ids)| {
            ids.sort();
            let keep = ids.remove(0);
            DuplicateGroup {
                start_date,
                end_date,
                keep,
                remove: ids,
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct PlanningService {
    pool: SqlitePool,
}

impl PlanningService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: &CreatePlanning) -> Result<Planning, PlanningError> {
        let formation = require_formation(&data.formation)?;
        let schedule = formation_dates::schedule(data.start_date, data.format, data.weekday)?;
        let planning = Planning::create(
            &self.pool,
            Uuid::new_v4(),
            formation,
            &schedule,
            data.location.as_deref(),
            data.trainer_id,
        )
        .await?;

        info!(
            planning_id = %planning.id,
            formation = %planning.formation,
            start_date = %planning.start_date,
            end_date = %planning.end_date,
            "Planning created"
        );
        Ok(planning)
    }

    pub async fn get(&self, id: Uuid) -> Result<PlanningWithParticipants, PlanningError> {
        let planning = self.planning(id).await?;
        let participants = PlanningParticipant::find_leads(&self.pool, id).await?;
        Ok(PlanningWithParticipants {
            planning,
            participants,
        })
    }

    pub async fn list(&self, window: &PlanningWindow) -> Result<Vec<Planning>, PlanningError> {
        if let (Some(from), Some(to)) = (window.from, window.to) {
            if from > to {
                return Err(PlanningError::Validation(
                    "`from` must not be after `to`".to_string(),
                ));
            }
        }
        Ok(Planning::list(&self.pool, window).await?)
    }

    /// Applies a partial update; the calendar is derived again from the
    /// resulting start date, format and weekday.
    pub async fn update(&self, id: Uuid, data: &UpdatePlanning) -> Result<Planning, PlanningError> {
        let existing = self.planning(id).await?;

        let formation = match data.formation.as_deref() {
            Some(formation) => require_formation(formation)?.to_string(),
            None => existing.formation.clone(),
        };
        let weekday = match data.weekday {
            Some(weekday) => weekday,
            None => u8::try_from(existing.weekday)
                .map_err(|_| FormationDateError::InvalidWeekday(u8::MAX))?,
        };
        let schedule = formation_dates::schedule(
            data.start_date.unwrap_or(existing.start_date),
            data.format.unwrap_or(existing.format),
            weekday,
        )?;
        let location = data.location.clone().unwrap_or(existing.location);
        let trainer_id = data.trainer_id.unwrap_or(existing.trainer_id);

        Planning::update(
            &self.pool,
            id,
            &formation,
            &schedule,
            location.as_deref(),
            trainer_id,
        )
        .await?
        .ok_or(PlanningError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PlanningError> {
        match Planning::delete(&self.pool, id).await? {
            0 => Err(PlanningError::NotFound),
            _ => Ok(()),
        }
    }

    pub async fn add_participant(&self, planning_id: Uuid, lead_id: Uuid) -> Result<bool, PlanningError> {
        self.planning(planning_id).await?;
        self.lead(lead_id).await?;
        Ok(PlanningParticipant::add(&self.pool, planning_id, lead_id).await?)
    }

    pub async fn remove_participant(&self, planning_id: Uuid, lead_id: Uuid) -> Result<(), PlanningError> {
        match PlanningParticipant::remove(&self.pool, planning_id, lead_id).await? {
            0 => Err(PlanningError::NotFound),
            _ => Ok(()),
        }
    }

    pub async fn participants(&self, planning_id: Uuid) -> Result<Vec<Lead>, PlanningError> {
        self.planning(planning_id).await?;
        Ok(PlanningParticipant::find_leads(&self.pool, planning_id).await?)
    }

    pub async fn for_lead(&self, lead_id: Uuid) -> Result<Vec<Planning>, PlanningError> {
        self.lead(lead_id).await?;
        Ok(Planning::find_by_lead_id(&self.pool, lead_id).await?)
    }

    /// Puts the lead on the session for its dates, reusing a planning with
    /// the same formation and span when one exists.
    pub async fn enroll_lead(&self, request: &EnrollLead) -> Result<EnrollmentOutcome, PlanningError> {
        let lead = self.lead(request.lead_id).await?;
        let formation = match request.formation.as_deref() {
            Some(formation) => require_formation(formation)?.to_string(),
            None => lead.formation.clone(),
        };
        let schedule =
            formation_dates::schedule(request.start_date, request.format, request.weekday)?;

        let existing =
            Planning::find_by_span(&self.pool, &formation, schedule.start_date, schedule.end_date)
                .await?;
        let (planning, created) = match existing {
            Some(planning) => (planning, false),
            None => {
                let planning = Planning::create(
                    &self.pool,
                    Uuid::new_v4(),
                    &formation,
                    &schedule,
                    request.location.as_deref(),
                    None,
                )
                .await?;
                (planning, true)
            }
        };

        let linked = PlanningParticipant::add(&self.pool, planning.id, lead.id).await?;
        info!(
            lead_id = %lead.id,
            planning_id = %planning.id,
            created,
            linked,
            "Lead enrolled on planning"
        );

        Ok(EnrollmentOutcome {
            planning,
            created,
            linked,
        })
    }

    /// Merges plannings that share a (start date, end date) span into the one
    /// with the smallest id. Each group is merged in its own transaction; a
    /// failing group is logged and left as is.
    pub async fn deduplicate_sessions(&self) -> Result<DedupReport, PlanningError> {
        let plannings = Planning::list(&self.pool, &PlanningWindow::default()).await?;
        let groups = find_duplicate_groups(&plannings);
        let mut report = DedupReport::default();

        if groups.is_empty() {
            debug!("Planning deduplication: no duplicate sessions");
            return Ok(report);
        }

        for group in groups {
            match self.merge_group(&group).await {
                Ok(moved) => {
                    report.groups_merged += 1;
                    report.sessions_deleted += group.remove.len();
                    report.participants_moved += moved;
                    info!(
                        kept = %group.keep,
                        removed = group.remove.len(),
                        participants_moved = moved,
                        start_date = %group.start_date,
                        end_date = %group.end_date,
                        "Merged duplicate sessions"
                    );
                }
                Err(e) => {
                    report.groups_failed += 1;
                    warn!(
                        kept = %group.keep,
                        start_date = %group.start_date,
                        end_date = %group.end_date,
                        error = %e,
                        "Failed to merge duplicate sessions"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn merge_group(&self, group: &DuplicateGroup) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut moved = 0;
        for duplicate in &group.remove {
            moved += PlanningParticipant::reassign(&mut *tx, *duplicate, group.keep).await?;
            Planning::delete(&mut *tx, *duplicate).await?;
        }
        tx.commit().await?;
        Ok(moved)
    }

    async fn planning(&self, id: Uuid) -> Result<Planning, PlanningError> {
        Planning::find_by_id(&self.pool, id)
            .await?
            .ok_or(PlanningError::NotFound)
    }

    async fn lead(&self, id: Uuid) -> Result<Lead, PlanningError> {
        Lead::find_by_id(&self.pool, id)
            .await?
            .ok_or(PlanningError::LeadNotFound)
    }
}

fn require_formation(formation: &str) -> Result<&str, PlanningError> {
    let formation = formation.trim();
    if formation.is_empty() {
        return Err(PlanningError::Validation(
            "formation must not be empty".to_string(),
        ));
    }
    Ok(formation)
}
