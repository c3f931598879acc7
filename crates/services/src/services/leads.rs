//! Validation around lead writes: names, prices and closer assignment.

use db::models::{
    accounting_entry::AccountingEntry,
    lead::{CreateLead, Lead, LeadStatus, UpdateLead},
    user::User,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lead not found")]
    NotFound,
    #[error("closer not found")]
    CloserNotFound,
    #[error("user {0} is not an active closer")]
    NotACloser(Uuid),
    #[error("fixed price {price_cents} is below the {paid_cents} already paid")]
    PriceBelowPaid { price_cents: i64, paid_cents: i64 },
    #[error("{0}")]
    Validation(String),
}

pub struct LeadService {
    pool: SqlitePool,
}

impl LeadService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: &CreateLead) -> Result<Lead, LeadError> {
        require_text("first_name", &data.first_name)?;
        require_text("last_name", &data.last_name)?;
        require_text("formation", &data.formation)?;
        validate_price(data.fixed_price_cents)?;
        if let Some(closer_id) = data.closer_id {
            self.require_closer(closer_id).await?;
        }

        let lead = Lead::create(&self.pool, data, Uuid::new_v4()).await?;
        info!(lead_id = %lead.id, formation = %lead.formation, "Lead created");
        Ok(lead)
    }

    pub async fn update(&self, id: Uuid, data: &UpdateLead) -> Result<Lead, LeadError> {
        for (field, value) in [
            ("first_name", &data.first_name),
            ("last_name", &data.last_name),
            ("formation", &data.formation),
        ] {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }
        if let Some(Some(price_cents)) = data.fixed_price_cents {
            validate_price(Some(price_cents))?;
            let paid_cents = AccountingEntry::sum_paid(&self.pool, id).await?;
            if price_cents < paid_cents {
                return Err(LeadError::PriceBelowPaid {
                    price_cents,
                    paid_cents,
                });
            }
        }

        Lead::update(&self.pool, id, data)
            .await?
            .ok_or(LeadError::NotFound)
    }

    pub async fn set_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, LeadError> {
        let lead = Lead::find_by_id(&self.pool, id)
            .await?
            .ok_or(LeadError::NotFound)?;
        if lead.status != status {
            Lead::update_status(&self.pool, id, status).await?;
            info!(lead_id = %id, from = %lead.status, to = %status, "Lead status changed");
        }
        Lead::find_by_id(&self.pool, id)
            .await?
            .ok_or(LeadError::NotFound)
    }

    /// `None` unassigns the lead.
    pub async fn assign_closer(&self, id: Uuid, closer_id: Option<Uuid>) -> Result<Lead, LeadError> {
        if let Some(closer_id) = closer_id {
            self.require_closer(closer_id).await?;
        }
        Lead::assign_closer(&self.pool, id, closer_id)
            .await?
            .ok_or(LeadError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), LeadError> {
        match Lead::delete(&self.pool, id).await? {
            0 => Err(LeadError::NotFound),
            _ => Ok(()),
        }
    }

    async fn require_closer(&self, closer_id: Uuid) -> Result<User, LeadError> {
        let user = User::find_by_id(&self.pool, closer_id)
            .await?
            .ok_or(LeadError::CloserNotFound)?;
        if !user.is_closer() || !user.active {
            return Err(LeadError::NotACloser(closer_id));
        }
        Ok(user)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), LeadError> {
    if value.trim().is_empty() {
        return Err(LeadError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_price(price: Option<i64>) -> Result<(), LeadError> {
    match price {
        Some(cents) if cents < 0 => Err(LeadError::Validation(
            "fixed_price_cents must not be negative".to_string(),
        )),
        _ => Ok(()),
    }
}
