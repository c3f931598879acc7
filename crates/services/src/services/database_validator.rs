//! Startup check that the schema the services rely on is in place

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

/// Tables every service expects after migrations ran
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "leads",
    "accounting_entries",
    "plannings",
    "planning_participants",
    "comments",
    "message_logs",
    "activity_logs",
];

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database schema is incomplete: {}", .0.join(", "))]
    MissingTables(Vec<String>),
}

pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check that migrations were applied and the required tables exist
    pub async fn validate(&self) -> Result<ValidationResult, DatabaseValidationError> {
        let migrations_table_exists = self.table_exists("_sqlx_migrations").await?;
        if !migrations_table_exists {
            warn!("Database not initialized - _sqlx_migrations table does not exist");
            return Ok(ValidationResult {
                is_initialized: false,
                migrations_applied: 0,
                latest_migration: None,
                missing_tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
            });
        }

        let migrations_applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let result = ValidationResult {
            is_initialized: true,
            migrations_applied: usize::try_from(migrations_applied).unwrap_or_default(),
            latest_migration: self.latest_migration().await?,
            missing_tables: self.missing_tables(REQUIRED_TABLES).await?,
        };

        if result.is_ok() {
            info!(
                migrations_applied = result.migrations_applied,
                latest_migration = ?result.latest_migration,
                "Database validation complete"
            );
        } else {
            warn!(missing_tables = ?result.missing_tables, "Database validation found issues");
        }
        Ok(result)
    }

    /// Like [`validate`](Self::validate), but an incomplete schema is an error
    pub async fn ensure_ready(&self) -> Result<ValidationResult, DatabaseValidationError> {
        let result = self.validate().await?;
        if !result.missing_tables.is_empty() {
            return Err(DatabaseValidationError::MissingTables(result.missing_tables));
        }
        Ok(result)
    }

    pub async fn missing_tables(&self, required: &[&str]) -> Result<Vec<String>, DatabaseValidationError> {
        let mut missing = Vec::new();
        for table in required {
            if !self.table_exists(table).await? {
                missing.push(table.to_string());
            }
        }
        Ok(missing)
    }

    async fn table_exists(&self, name: &str) -> Result<bool, DatabaseValidationError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn latest_migration(&self) -> Result<Option<String>, DatabaseValidationError> {
        let migration = sqlx::query_scalar::<_, String>(
            "SELECT description FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(migration)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_initialized: bool,
    pub migrations_applied: usize,
    pub latest_migration: Option<String>,
    pub missing_tables: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.is_initialized && self.missing_tables.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.is_initialized {
            "Database not initialized - migrations need to be run".to_string()
        } else if !self.missing_tables.is_empty() {
            format!("Database is missing tables: {}", self.missing_tables.join(", "))
        } else {
            format!("Database OK - {} migrations applied", self.migrations_applied)
        }
    }
}
