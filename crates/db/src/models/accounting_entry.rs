use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// What a payment stands for in the lead's enrolment
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "entry_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryKind {
    /// Down payment ("acompte") that secures a seat
    Deposit,
    /// Remainder of the fixed price once the deposit is in
    Balance,
    /// Single payment covering the whole price
    FullPayment,
}

impl EntryKind {
    /// Deposits and balances are fractions of the fixed price, so the price must be known.
    pub fn requires_fixed_price(&self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::Balance)
    }

    /// Cashing one of these confirms the enrolment.
    pub fn confirms_enrolment(&self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::FullPayment)
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    #[default]
    Transfer,
    Cash,
    Cheque,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AccountingEntry {
    pub id: Uuid,
    pub lead_id: Uuid, // Foreign key to Lead
    pub kind: EntryKind,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateAccountingEntry {
    pub kind: EntryKind,
    pub amount_cents: i64,
    pub method: Option<PaymentMethod>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateAccountingEntry {
    pub amount_cents: Option<i64>,
    pub method: Option<PaymentMethod>,
    /// An explicit `null` clears the note
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[ts(as = "Option<String>")]
    pub note: Option<Option<String>>,
}

/// Totals over all entries, used by reporting
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize, TS)]
pub struct EntryTotals {
    pub paid_cents: i64,
    pub pending_cents: i64,
}

impl AccountingEntry {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountingEntry>(
            r#"SELECT id, lead_id, kind, amount_cents, method, paid, paid_at, note, created_at, updated_at
               FROM accounting_entries
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_lead_id(
        pool: &SqlitePool,
        lead_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountingEntry>(
            r#"SELECT id, lead_id, kind, amount_cents, method, paid, paid_at, note, created_at, updated_at
               FROM accounting_entries
               WHERE lead_id = $1
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .bind(lead_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        lead_id: Uuid,
        data: &CreateAccountingEntry,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AccountingEntry>(
            r#"INSERT INTO accounting_entries (id, lead_id, kind, amount_cents, method, note)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, lead_id, kind, amount_cents, method, paid, paid_at, note, created_at, updated_at"#,
        )
        .bind(id)
        .bind(lead_id)
        .bind(data.kind)
        .bind(data.amount_cents)
        .bind(data.method.unwrap_or_default())
        .bind(data.note.as_deref())
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateAccountingEntry,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccountingEntry>(
            r#"UPDATE accounting_entries
               SET amount_cents = COALESCE($2, amount_cents),
                   method = COALESCE($3, method),
                   note = CASE WHEN $4 THEN $5 ELSE note END,
                   updated_at = CURRENT_TIMESTAMP
               WHERE id = $1
               RETURNING id, lead_id, kind, amount_cents, method, paid, paid_at, note, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.amount_cents)
        .bind(data.method)
        .bind(data.note.is_some())
        .bind(data.note.clone().flatten())
        .fetch_optional(pool)
        .await
    }

    pub async fn set_paid(
        pool: &SqlitePool,
        id: Uuid,
        paid: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let paid_at = paid.then(Utc::now);
        sqlx::query_as::<_, AccountingEntry>(
            r#"UPDATE accounting_entries
               SET paid = $2,
                   paid_at = $3,
                   updated_at = CURRENT_TIMESTAMP
               WHERE id = $1
               RETURNING id, lead_id, kind, amount_cents, method, paid, paid_at, note, created_at, updated_at"#,
        )
        .bind(id)
        .bind(paid)
        .bind(paid_at)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accounting_entries WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Sum of paid entries for a lead
    pub async fn sum_paid(pool: &SqlitePool, lead_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM accounting_entries WHERE lead_id = $1 AND paid = 1",
        )
        .bind(lead_id)
        .fetch_one(pool)
        .await
    }

    pub async fn totals(pool: &SqlitePool) -> Result<EntryTotals, sqlx::Error> {
        sqlx::query_as::<_, EntryTotals>(
            r#"SELECT
                 COALESCE(SUM(CASE WHEN paid = 1 THEN amount_cents ELSE 0 END), 0) AS paid_cents,
                 COALESCE(SUM(CASE WHEN paid = 0 THEN amount_cents ELSE 0 END), 0) AS pending_cents
               FROM accounting_entries"#,
        )
        .fetch_one(pool)
        .await
    }
}
