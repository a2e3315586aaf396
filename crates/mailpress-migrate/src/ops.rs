use mailpress_common::{Error, Result};
use rusqlite::Connection;

/// Add a column to an existing table. `definition` is the column's type and
/// constraints, e.g. `"TEXT DEFAULT 'email'"`.
pub fn add_column(conn: &Connection, table: &str, column: &str, definition: &str) -> Result<()> {
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
        .map_err(|e| Error::Database(format!("failed to add column {column} to {table}: {e}")))
}

/// Rename a table.
pub fn rename_table(conn: &Connection, old_name: &str, new_name: &str) -> Result<()> {
    conn.execute_batch(&format!("ALTER TABLE {old_name} RENAME TO {new_name}"))
        .map_err(|e| Error::Database(format!("failed to rename {old_name} to {new_name}: {e}")))
}

/// Create an index on a table. The name defaults to `idx_<table>_<columns>`.
pub fn create_index(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    index_name: Option<&str>,
) -> Result<()> {
    let name = index_name
        .map(str::to_string)
        .unwrap_or_else(|| format!("idx_{table}_{}", columns.join("_")));
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {name} ON {table} ({})",
        columns.join(", ")
    ))
    .map_err(|e| Error::Database(format!("failed to create index {name}: {e}")))
}
