use std::collections::HashSet;
use std::path::Path;

use mailpress_common::{Error, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::ledger::{Effect, Ledger, MigrationRecord};
use crate::source::{MigrationSource, ScriptUnit};

/// Default tracking table for schema migrations.
pub const SCHEMA_LEDGER_TABLE: &str = "schema_migrations";

/// Applies ordered DDL scripts, tracking each by its file stem.
///
/// Every operation borrows the caller's connection; the migrator itself holds
/// no connection state, so isolated instances can run against separate
/// databases in parallel. Within one connection the caller is the single
/// writer for the duration of a run.
pub struct SchemaMigrator {
    ledger: Ledger,
}

impl SchemaMigrator {
    pub fn new() -> Self {
        Self::with_table(SCHEMA_LEDGER_TABLE)
    }

    pub fn with_table(table: &str) -> Self {
        Self {
            ledger: Ledger::new(table),
        }
    }

    /// Create the tracking table if absent. Idempotent; also performed
    /// implicitly by every apply/rollback call.
    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        self.ledger.ensure_table(conn)
    }

    /// Applied identifiers in application order.
    pub fn list_applied(&self, conn: &Connection) -> Result<Vec<String>> {
        self.ledger.list_applied(conn)
    }

    /// Full ledger rows in application order.
    pub fn records(&self, conn: &Connection) -> Result<Vec<MigrationRecord>> {
        self.ledger.records(conn)
    }

    /// Apply one unit. Returns `false` if its identifier is already recorded
    /// (idempotent no-op). The script and the ledger insert share one
    /// transaction; any failure rolls both back and surfaces as
    /// [`Error::MigrationFailed`].
    pub fn apply_one(&self, conn: &mut Connection, unit: &ScriptUnit) -> Result<bool> {
        let description = unit
            .description
            .clone()
            .unwrap_or_else(|| format!("applied from {}.sql", unit.id));
        self.ledger
            .apply(conn, &unit.id, &description, Effect::Script(&unit.script))
    }

    /// Apply a single migration file directly.
    pub fn apply_file(&self, conn: &mut Connection, path: &Path) -> Result<bool> {
        let unit = ScriptUnit::from_path(path)?;
        self.apply_one(conn, &unit)
    }

    /// Apply every unapplied unit the source knows about, in ascending
    /// identifier order. Returns the number actually applied. Stops at the
    /// first failure; units committed before it stay applied.
    pub fn apply_all_from(
        &self,
        conn: &mut Connection,
        source: &dyn MigrationSource,
    ) -> Result<usize> {
        self.ledger.ensure_table(conn)?;
        let applied: HashSet<String> = self.ledger.list_applied(conn)?.into_iter().collect();

        let mut pending: Vec<String> = source
            .list()?
            .into_iter()
            .filter(|id| !applied.contains(id))
            .collect();
        pending.sort();

        let mut count = 0;
        for id in &pending {
            let unit = source.load(id)?;
            match self.apply_one(conn, &unit) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("migration batch stopped at {id}");
                    return Err(e);
                }
            }
        }
        Ok(count)
    }

    /// Roll back one applied migration using its companion down script.
    ///
    /// Fails with [`Error::NotApplied`] if the identifier is not recorded and
    /// [`Error::RollbackScriptNotFound`] if the source has no down script for
    /// it. The down script and the ledger delete share one transaction.
    pub fn rollback_one(
        &self,
        conn: &mut Connection,
        source: &dyn MigrationSource,
        migration_id: &str,
    ) -> Result<()> {
        self.ledger.ensure_table(conn)?;
        if !self
            .ledger
            .list_applied(conn)?
            .iter()
            .any(|id| id == migration_id)
        {
            return Err(Error::NotApplied(migration_id.to_string()));
        }

        let down = source
            .down_script(migration_id)?
            .ok_or_else(|| Error::RollbackScriptNotFound(migration_id.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        tx.execute_batch(&down).map_err(|e| Error::MigrationFailed {
            id: migration_id.to_string(),
            cause: format!("rollback script failed: {e}"),
        })?;
        self.ledger.forget(&tx, migration_id)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit rollback of {migration_id}: {e}")))?;

        info!("rolled back migration {migration_id}");
        Ok(())
    }
}

impl Default for SchemaMigrator {
    fn default() -> Self {
        Self::new()
    }
}
