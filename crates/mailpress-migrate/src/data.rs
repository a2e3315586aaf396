use std::fs;
use std::path::Path;

use mailpress_common::{Error, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Transaction, params_from_iter};

use crate::ledger::{Effect, Ledger, MigrationRecord};

/// Default tracking table for data migrations.
pub const DATA_LEDGER_TABLE: &str = "data_migrations";

/// Applies programmatic data transformations, each identified by a
/// caller-chosen token rather than a file.
///
/// A transform receives the live transaction and may run arbitrary reads and
/// writes through it; the transform and its ledger record commit together or
/// not at all. Callers invoking several transforms in sequence should present
/// them in ascending identifier order and stop at the first failure, matching
/// the schema batch policy.
pub struct DataMigrator {
    ledger: Ledger,
}

impl DataMigrator {
    pub fn new() -> Self {
        Self::with_table(DATA_LEDGER_TABLE)
    }

    pub fn with_table(table: &str) -> Self {
        Self {
            ledger: Ledger::new(table),
        }
    }

    /// Create the tracking table if absent. Idempotent.
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

    /// Apply one data migration. Returns `false` if the identifier is already
    /// recorded; the transform is not invoked in that case. On failure the
    /// transaction rolls back, so partial writes never persist, and the error
    /// surfaces as [`Error::DataMigrationFailed`].
    pub fn apply_migration<F>(
        &self,
        conn: &mut Connection,
        migration_id: &str,
        transform: F,
        description: Option<&str>,
    ) -> Result<bool>
    where
        F: FnOnce(&Transaction<'_>) -> Result<()>,
    {
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("applied migration {migration_id}"));
        self.ledger.apply(
            conn,
            migration_id,
            &description,
            Effect::Transform(Box::new(transform)),
        )
    }
}

impl Default for DataMigrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bulk-load rows from a JSON array file into a table.
///
/// Column names come from the first record; later records missing a key
/// insert NULL for it. Returns the number of rows inserted. Intended for use
/// inside a data migration transform so the load shares the migration's
/// transaction.
pub fn import_from_json(conn: &Connection, json_path: &Path, table: &str) -> Result<usize> {
    let raw = fs::read_to_string(json_path)?;
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&raw)?;

    let Some(first) = records.first() else {
        return Ok(0);
    };
    let columns: Vec<String> = first.keys().cloned().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::Database(format!("failed to prepare insert into {table}: {e}")))?;

    let mut count = 0;
    for record in &records {
        let values: Vec<SqlValue> = columns
            .iter()
            .map(|col| json_to_sql(record.get(col).unwrap_or(&serde_json::Value::Null)))
            .collect();
        stmt.execute(params_from_iter(values))
            .map_err(|e| Error::Database(format!("failed to insert into {table}: {e}")))?;
        count += 1;
    }
    Ok(count)
}

fn json_to_sql(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(*b as i64),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        // Nested arrays/objects are stored as their JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}
