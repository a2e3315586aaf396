use chrono::{DateTime, Utc};
use mailpress_common::{Error, Result};
use rusqlite::{Connection, Transaction, params};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Durable bookkeeping of applied migration identifiers.
///
/// One `Ledger` instance wraps one tracking table; the schema and data
/// migrators each construct their own so the two histories stay independent.
/// The table is created lazily on first use and is append-only except for
/// [`Ledger::forget`], which backs out a single record during rollback.
pub struct Ledger {
    table: String,
}

/// One row of a ledger table: a migration that has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub migration_id: String,
    pub applied_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// The effect of one migration unit, executed inside its transaction.
pub(crate) enum Effect<'a> {
    /// A verbatim SQL script (schema migrations).
    Script(&'a str),
    /// A callable that reads and writes through the live transaction
    /// (data migrations).
    Transform(Box<dyn FnOnce(&Transaction<'_>) -> Result<()> + 'a>),
}

impl Ledger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Name of the tracking table this ledger writes to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the tracking table if it does not exist. Idempotent.
    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migration_id TEXT UNIQUE NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
            self.table
        );
        conn.execute_batch(&sql)
            .map_err(|e| Error::Database(format!("failed to create {}: {e}", self.table)))
    }

    /// All recorded identifiers, in the order they were applied.
    pub fn list_applied(&self, conn: &Connection) -> Result<Vec<String>> {
        let sql = format!("SELECT migration_id FROM {} ORDER BY id", self.table);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query {}: {e}", self.table)))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| Error::Database(format!("failed to read row: {e}")))?);
        }
        Ok(ids)
    }

    /// Full records, in application order.
    pub fn records(&self, conn: &Connection) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT migration_id, applied_at, description FROM {} ORDER BY id",
            self.table
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MigrationRecord {
                    migration_id: row.get(0)?,
                    applied_at: parse_datetime(row.get::<_, String>(1)?),
                    description: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query {}: {e}", self.table)))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| Error::Database(format!("failed to read row: {e}")))?);
        }
        Ok(records)
    }

    /// Insert one record. The unique constraint on `migration_id` maps to
    /// [`Error::DuplicateMigration`]; the idempotency check in
    /// [`Ledger::apply`] normally prevents this, so hitting it means two
    /// writers raced on the same identifier.
    pub fn record(&self, conn: &Connection, migration_id: &str, description: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (migration_id, description) VALUES (?1, ?2)",
            self.table
        );
        match conn.execute(&sql, params![migration_id, description]) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateMigration(migration_id.to_string()))
            }
            Err(e) => Err(Error::Database(format!("failed to record migration: {e}"))),
        }
    }

    /// Delete the record for one identifier. Only used during rollback;
    /// an absent identifier is [`Error::NotApplied`].
    pub fn forget(&self, conn: &Connection, migration_id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE migration_id = ?1", self.table);
        let deleted = conn
            .execute(&sql, params![migration_id])
            .map_err(|e| Error::Database(format!("failed to delete migration record: {e}")))?;

        if deleted == 0 {
            return Err(Error::NotApplied(migration_id.to_string()));
        }
        Ok(())
    }

    /// Apply one migration unit with the at-most-once guarantee.
    ///
    /// Returns `false` without side effects when the identifier is already
    /// recorded. Otherwise the effect and the ledger insert run in one
    /// transaction: either both commit or, on any failure, neither persists
    /// (the transaction rolls back on drop).
    pub(crate) fn apply(
        &self,
        conn: &mut Connection,
        migration_id: &str,
        description: &str,
        effect: Effect<'_>,
    ) -> Result<bool> {
        self.ensure_table(conn)?;
        if self.list_applied(conn)?.iter().any(|id| id == migration_id) {
            return Ok(false);
        }

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        match effect {
            Effect::Script(script) => {
                tx.execute_batch(script).map_err(|e| Error::MigrationFailed {
                    id: migration_id.to_string(),
                    cause: e.to_string(),
                })?
            }
            Effect::Transform(transform) => {
                transform(&tx).map_err(|e| Error::DataMigrationFailed {
                    id: migration_id.to_string(),
                    cause: e.to_string(),
                })?
            }
        }

        self.record(&tx, migration_id, description)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit {migration_id}: {e}")))?;

        info!("applied migration {migration_id}");
        Ok(true)
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
