//! Payment rules for accounting entries and the per-lead balance.

use db::models::{
    accounting_entry::{AccountingEntry, CreateAccountingEntry, EntryKind, UpdateAccountingEntry},
    lead::{Lead, LeadStatus},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lead not found")]
    LeadNotFound,
    #[error("accounting entry not found")]
    EntryNotFound,
    #[error("a {0} payment requires the lead's fixed price to be set")]
    FixedPriceRequired(EntryKind),
    #[error("payments would total {total_cents} cents, above the fixed price of {fixed_price_cents} cents")]
    ExceedsFixedPrice {
        fixed_price_cents: i64,
        total_cents: i64,
    },
    #[error("paid entries cannot be modified or deleted")]
    EntryLocked,
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LeadAccountSummary {
    pub lead_id: Uuid,
    pub fixed_price_cents: Option<i64>,
    pub paid_cents: i64,
    pub pending_cents: i64,
    /// Fixed price minus what was paid; unknown without a fixed price
    pub balance_due_cents: Option<i64>,
    pub entries: Vec<AccountingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct MarkPaidOutcome {
    pub entry: AccountingEntry,
    pub lead_status: LeadStatus,
}

/// Checks whether `entry` may be cashed given what the lead already paid.
pub fn check_payment(
    lead: &Lead,
    entry: &AccountingEntry,
    already_paid_cents: i64,
) -> Result<(), AccountingError> {
    match lead.fixed_price_cents {
        None if entry.kind.requires_fixed_price() => {
            Err(AccountingError::FixedPriceRequired(entry.kind))
        }
        Some(fixed_price_cents) => {
            match already_paid_cents.checked_add(entry.amount_cents) {
                Some(total_cents) if total_cents <= fixed_price_cents => Ok(()),
                total_cents => Err(AccountingError::ExceedsFixedPrice {
                    fixed_price_cents,
                    total_cents: total_cents.unwrap_or(i64::MAX),
                }),
            }
        }
        None => Ok(()),
    }
}

pub fn summarize(lead: &Lead, entries: Vec<AccountingEntry>) -> LeadAccountSummary {
    let (paid, pending): (Vec<&AccountingEntry>, Vec<&AccountingEntry>) =
        entries.iter().partition(|e| e.paid);
    let total = |entries: &[&AccountingEntry]| {
        entries
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.amount_cents))
    };
    let paid_cents = total(&paid);
    let pending_cents = total(&pending);

    LeadAccountSummary {
        lead_id: lead.id,
        fixed_price_cents: lead.fixed_price_cents,
        paid_cents,
        pending_cents,
        balance_due_cents: lead.fixed_price_cents.map(|price| price - paid_cents),
        entries,
    }
}

pub struct AccountingService {
    pool: SqlitePool,
}

impl AccountingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_entry(
        &self,
        lead_id: Uuid,
        data: &CreateAccountingEntry,
    ) -> Result<AccountingEntry, AccountingError> {
        if data.amount_cents <= 0 {
            return Err(AccountingError::InvalidAmount(data.amount_cents));
        }
        self.lead(lead_id).await?;
        let entry = AccountingEntry::create(&self.pool, lead_id, data, Uuid::new_v4()).await?;
        info!(
            lead_id = %lead_id,
            entry_id = %entry.id,
            kind = %entry.kind,
            amount_cents = entry.amount_cents,
            "Accounting entry created"
        );
        Ok(entry)
    }

    pub async fn entries(&self, lead_id: Uuid) -> Result<Vec<AccountingEntry>, AccountingError> {
        self.lead(lead_id).await?;
        Ok(AccountingEntry::find_by_lead_id(&self.pool, lead_id).await?)
    }

    pub async fn update_entry(
        &self,
        id: Uuid,
        data: &UpdateAccountingEntry,
    ) -> Result<AccountingEntry, AccountingError> {
        if let Some(amount) = data.amount_cents.filter(|a| *a <= 0) {
            return Err(AccountingError::InvalidAmount(amount));
        }
        let entry = self.entry(id).await?;
        if entry.paid {
            return Err(AccountingError::EntryLocked);
        }
        AccountingEntry::update(&self.pool, id, data)
            .await?
            .ok_or(AccountingError::EntryNotFound)
    }

    pub async fn delete_entry(&self, id: Uuid) -> Result<(), AccountingError> {
        let entry = self.entry(id).await?;
        if entry.paid {
            return Err(AccountingError::EntryLocked);
        }
        AccountingEntry::delete(&self.pool, id).await?;
        Ok(())
    }

    /// Cashes an entry. Deposits and full payments confirm the enrolment, so
    /// the lead moves to `won` when it is not there yet.
    pub async fn mark_paid(&self, id: Uuid) -> Result<MarkPaidOutcome, AccountingError> {
        let entry = self.entry(id).await?;
        let lead = self.lead(entry.lead_id).await?;
        if entry.paid {
            return Ok(MarkPaidOutcome {
                entry,
                lead_status: lead.status,
            });
        }

        let already_paid = AccountingEntry::sum_paid(&self.pool, lead.id).await?;
        check_payment(&lead, &entry, already_paid)?;

        let entry = AccountingEntry::set_paid(&self.pool, id, true)
            .await?
            .ok_or(AccountingError::EntryNotFound)?;

        let mut lead_status = lead.status;
        if entry.kind.confirms_enrolment() && lead.status != LeadStatus::Won {
            Lead::update_status(&self.pool, lead.id, LeadStatus::Won).await?;
            lead_status = LeadStatus::Won;
            info!(lead_id = %lead.id, "Lead enrolled after payment");
        }

        info!(
            entry_id = %entry.id,
            lead_id = %lead.id,
            kind = %entry.kind,
            amount_cents = entry.amount_cents,
            "Accounting entry marked paid"
        );

        Ok(MarkPaidOutcome { entry, lead_status })
    }

    pub async fn mark_unpaid(&self, id: Uuid) -> Result<AccountingEntry, AccountingError> {
        self.entry(id).await?;
        AccountingEntry::set_paid(&self.pool, id, false)
            .await?
            .ok_or(AccountingError::EntryNotFound)
    }

    pub async fn summary(&self, lead_id: Uuid) -> Result<LeadAccountSummary, AccountingError> {
        let lead = self.lead(lead_id).await?;
        let entries = AccountingEntry::find_by_lead_id(&self.pool, lead_id).await?;
        Ok(summarize(&lead, entries))
    }

    async fn lead(&self, id: Uuid) -> Result<Lead, AccountingError> {
        Lead::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountingError::LeadNotFound)
    }

    async fn entry(&self, id: Uuid) -> Result<AccountingEntry, AccountingError> {
        AccountingEntry::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountingError::EntryNotFound)
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            accounting_entry::PaymentMethod,
            lead::{CreateLead, UpdateLead},
        },
    };

    use super::*;

    async fn setup(fixed_price_cents: Option<i64>) -> (DBService, AccountingService, Lead) {
        let db = DBService::new_in_memory().await.unwrap();
        let lead = Lead::create(
            &db.pool,
            &CreateLead {
                first_name: "Camille".to_string(),
                last_name: "Roux".to_string(),
                email: None,
                phone: None,
                formation: "Microblading".to_string(),
                source: None,
                status: None,
                closer_id: None,
                fixed_price_cents,
                notes: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let service = AccountingService::new(db.pool.clone());
        (db, service, lead)
    }

    fn entry(kind: EntryKind, amount_cents: i64) -> CreateAccountingEntry {
        CreateAccountingEntry {
            kind,
            amount_cents,
            method: Some(PaymentMethod::Transfer),
            note: None,
        }
    }

    #[tokio::test]
    async fn deposit_cannot_be_paid_without_fixed_price() {
        let (db, service, lead) = setup(None).await;
        let deposit = service
            .create_entry(lead.id, &entry(EntryKind::Deposit, 50_000))
            .await
            .unwrap();

        let err = service.mark_paid(deposit.id).await.unwrap_err();
        assert!(matches!(err, AccountingError::FixedPriceRequired(EntryKind::Deposit)));

        Lead::update(
            &db.pool,
            lead.id,
            &UpdateLead {
                fixed_price_cents: Some(Some(200_000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let outcome = service.mark_paid(deposit.id).await.unwrap();
        assert!(outcome.entry.paid);
        assert_eq!(outcome.lead_status, LeadStatus::Won);
    }

    #[tokio::test]
    async fn full_payment_without_price_is_accepted() {
        let (_db, service, lead) = setup(None).await;
        let full = service
            .create_entry(lead.id, &entry(EntryKind::FullPayment, 120_000))
            .await
            .unwrap();
        let outcome = service.mark_paid(full.id).await.unwrap();
        assert_eq!(outcome.lead_status, LeadStatus::Won);
    }

    #[tokio::test]
    async fn payments_cannot_exceed_fixed_price() {
        let (_db, service, lead) = setup(Some(100_000)).await;
        let deposit = service
            .create_entry(lead.id, &entry(EntryKind::Deposit, 30_000))
            .await
            .unwrap();
        let balance = service
            .create_entry(lead.id, &entry(EntryKind::Balance, 80_000))
            .await
            .unwrap();

        service.mark_paid(deposit.id).await.unwrap();
        let err = service.mark_paid(balance.id).await.unwrap_err();
        assert!(matches!(
            err,
            AccountingError::ExceedsFixedPrice {
                fixed_price_cents: 100_000,
                total_cents: 110_000
            }
        ));

        let balance = service
            .update_entry(
                balance.id,
                &UpdateAccountingEntry {
                    amount_cents: Some(70_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.mark_paid(balance.id).await.unwrap();

        let summary = service.summary(lead.id).await.unwrap();
        assert_eq!(summary.paid_cents, 100_000);
        assert_eq!(summary.pending_cents, 0);
        assert_eq!(summary.balance_due_cents, Some(0));
    }

    #[tokio::test]
    async fn huge_amount_is_rejected_instead_of_overflowing() {
        let (_db, service, lead) = setup(Some(100_000)).await;
        let deposit = service
            .create_entry(lead.id, &entry(EntryKind::Deposit, 30_000))
            .await
            .unwrap();
        service.mark_paid(deposit.id).await.unwrap();

        let huge = service
            .create_entry(lead.id, &entry(EntryKind::Balance, i64::MAX))
            .await
            .unwrap();
        let err = service.mark_paid(huge.id).await.unwrap_err();
        assert!(matches!(
            err,
            AccountingError::ExceedsFixedPrice {
                fixed_price_cents: 100_000,
                total_cents: i64::MAX
            }
        ));
    }

    #[tokio::test]
    async fn paid_entries_are_locked_until_unpaid() {
        let (_db, service, lead) = setup(Some(100_000)).await;
        let full = service
            .create_entry(lead.id, &entry(EntryKind::FullPayment, 100_000))
            .await
            .unwrap();
        service.mark_paid(full.id).await.unwrap();

        assert!(matches!(
            service.delete_entry(full.id).await.unwrap_err(),
            AccountingError::EntryLocked
        ));

        service.mark_unpaid(full.id).await.unwrap();
        service.delete_entry(full.id).await.unwrap();
        assert!(service.entries(lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let (_db, service, lead) = setup(None).await;
        let err = service
            .create_entry(lead.id, &entry(EntryKind::Deposit, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::InvalidAmount(0)));
    }

    #[tokio::test]
    async fn summary_without_price_has_no_balance() {
        let (_db, service, lead) = setup(None).await;
        service
            .create_entry(lead.id, &entry(EntryKind::FullPayment, 10_000))
            .await
            .unwrap();
        let summary = service.summary(lead.id).await.unwrap();
        assert_eq!(summary.pending_cents, 10_000);
        assert_eq!(summary.balance_due_cents, None);
    }
}
