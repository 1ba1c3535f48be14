// src/db/schema.rs

//! Manifest store schema and migrations
//!
//! The store holds exactly two tables: `packages` and `paths`. The schema
//! version lives in SQLite's `user_version` pragma so no bookkeeping table
//! is added next to them.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(Error::FormatVersion {
            what: "manifest store",
            found: current_version.to_string(),
        });
    }

    if current_version == SCHEMA_VERSION {
        debug!("Manifest store schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying manifest store migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown manifest store migration: {version}"
        ))),
    }
}

/// Initial schema - Version 1
///
/// `IF NOT EXISTS` lets stores created before the version stamp existed
/// be adopted as-is.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS packages (
            name TEXT PRIMARY KEY NOT NULL,
            revision INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS paths (
            path TEXT PRIMARY KEY NOT NULL,
            dir INTEGER NOT NULL DEFAULT 0,
            package TEXT NOT NULL,
            FOREIGN KEY (package) REFERENCES packages(name) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_paths_package ON paths(package);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        (temp_file, conn)
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrate_creates_two_tables() {
        let (_temp, conn) = create_test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        migrate(&conn).unwrap();

        assert_eq!(table_names(&conn), vec!["packages", "paths"]);
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_adopts_unversioned_store() {
        let (_temp, conn) = create_test_db();
        conn.execute_batch(
            "CREATE TABLE packages(name char(64) primary key not null, revision uint not null);
             CREATE TABLE paths(path char(512) not null primary key,
                                dir int(1) not null default 0,
                                package char(64) not null,
                                foreign key (package) references packages(name) on delete cascade);
             INSERT INTO packages VALUES ('legacy', 3);",
        )
        .unwrap();

        migrate(&conn).unwrap();

        let revision: i64 = conn
            .query_row("SELECT revision FROM packages WHERE name = 'legacy'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(revision, 3);
    }

    #[test]
    fn test_rejects_newer_store() {
        let (_temp, conn) = create_test_db();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(migrate(&conn), Err(Error::FormatVersion { .. })));
    }

    #[test]
    fn test_cascading_delete() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute("INSERT INTO packages (name, revision) VALUES ('a', 1)", [])
            .unwrap();
        conn.execute("INSERT INTO paths (path, dir, package) VALUES ('x.txt', 0, 'a')", [])
            .unwrap();
        conn.execute("DELETE FROM packages WHERE name = 'a'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM paths", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_path_requires_package() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO paths (path, dir, package) VALUES ('x.txt', 0, 'ghost')",
            [],
        );
        assert!(result.is_err());
    }
}
