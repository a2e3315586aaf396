//! Schema and data migration engine for the mailpress data store.
//!
//! Two managers share one ledger design: [`SchemaMigrator`] applies ordered
//! DDL scripts discovered through a [`MigrationSource`], and [`DataMigrator`]
//! applies programmatic transforms over the live data. Each migration unit's
//! effect and its ledger record commit in a single transaction, so re-running
//! a migration run against the same database is always safe: an applied
//! identifier is skipped, a failed unit leaves no trace.

pub mod data;
pub mod ledger;
pub mod ops;
pub mod schema;
pub mod source;

pub use data::{DATA_LEDGER_TABLE, DataMigrator, import_from_json};
pub use ledger::{Ledger, MigrationRecord};
pub use mailpress_common::{Error, Result};
pub use schema::{SCHEMA_LEDGER_TABLE, SchemaMigrator};
pub use source::{DirSource, MemorySource, MigrationSource, ScriptUnit};
