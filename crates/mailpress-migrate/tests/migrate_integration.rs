//! End-to-end run of the project's own migration scripts from `migrations/`
//! against a freshly bootstrapped database.

use std::path::PathBuf;

use mailpress_migrate::{DataMigrator, DirSource, MigrationSource, SchemaMigrator};
use rusqlite::Connection;

fn migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../migrations")
}

/// The base tables the checked-in migrations alter. Schema bootstrap proper
/// lives outside this crate; the test recreates the minimum it needs.
fn bootstrapped_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE customers (
            customer_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        );
        CREATE TABLE mail_items (
            mail_item_id INTEGER PRIMARY KEY,
            customer_id INTEGER REFERENCES customers(customer_id),
            content TEXT
        );
        CREATE TABLE print_jobs (
            print_job_id INTEGER PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'queued'
        );
        INSERT INTO customers (name, email) VALUES ('Acme Mailing Co', 'ops@acme.test');",
    )
    .unwrap();
    conn
}

fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
    let rows = stmt.query_map([], |row| row.get::<_, String>(1)).unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

#[test]
fn checked_in_migrations_apply_in_order() {
    let mut conn = bootstrapped_conn();
    let migrator = SchemaMigrator::new();
    let source = DirSource::new(migrations_dir());

    let count = migrator.apply_all_from(&mut conn, &source).unwrap();
    assert_eq!(count, 3);

    assert_eq!(
        migrator.list_applied(&conn).unwrap(),
        vec![
            "001_add_contact_preference",
            "002_add_priority",
            "003_add_cost_center"
        ]
    );

    assert!(table_columns(&conn, "customers").contains(&"contact_preference".to_string()));
    assert!(table_columns(&conn, "mail_items").contains(&"priority".to_string()));
    assert!(table_columns(&conn, "print_jobs").contains(&"cost_center".to_string()));

    // The pre-existing customer picks up the column default.
    let preference: String = conn
        .query_row(
            "SELECT contact_preference FROM customers WHERE name = 'Acme Mailing Co'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(preference, "email");

    // Re-running the whole batch is a no-op.
    assert_eq!(migrator.apply_all_from(&mut conn, &source).unwrap(), 0);
}

#[test]
fn down_script_resolves_next_to_the_migration() {
    let mut conn = bootstrapped_conn();
    let migrator = SchemaMigrator::new();
    let source = DirSource::new(migrations_dir());

    migrator.apply_all_from(&mut conn, &source).unwrap();
    migrator
        .rollback_one(&mut conn, &source, "001_add_contact_preference")
        .unwrap();

    assert!(!table_columns(&conn, "customers").contains(&"contact_preference".to_string()));
    assert_eq!(
        migrator.list_applied(&conn).unwrap(),
        vec!["002_add_priority", "003_add_cost_center"]
    );

    // The migration is pending again and can be re-applied.
    assert_eq!(migrator.apply_all_from(&mut conn, &source).unwrap(), 1);
}

#[test]
fn source_lists_ids_without_down_companions() {
    let mut ids = DirSource::new(migrations_dir()).list().unwrap();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            "001_add_contact_preference",
            "002_add_priority",
            "003_add_cost_center"
        ]
    );
}

#[test]
fn schema_and_data_histories_stay_separate() {
    let mut conn = bootstrapped_conn();
    let schema = SchemaMigrator::new();
    let data = DataMigrator::new();
    let source = DirSource::new(migrations_dir());

    schema.apply_all_from(&mut conn, &source).unwrap();
    data.apply_migration(
        &mut conn,
        "001_default_preferences",
        |tx| {
            tx.execute(
                "UPDATE customers SET contact_preference = 'mail' WHERE email IS NULL",
                [],
            )
            .map_err(|e| mailpress_migrate::Error::Database(e.to_string()))?;
            Ok(())
        },
        Some("customers without email fall back to postal mail"),
    )
    .unwrap();

    assert_eq!(schema.list_applied(&conn).unwrap().len(), 3);
    assert_eq!(
        data.list_applied(&conn).unwrap(),
        vec!["001_default_preferences"]
    );
}
