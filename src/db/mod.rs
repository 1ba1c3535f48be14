// src/db/mod.rs

//! Per-distribution manifest store
//!
//! Every distribution keeps a SQLite database at `.wadist/packages.db`
//! recording which packages are installed (name and revision) and which
//! paths each of them owns.

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a connection waits for a competing writer before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a new manifest store and bring its schema up to date
pub fn init<P: AsRef<Path>>(db_path: P) -> Result<()> {
    let db_path = db_path.as_ref();
    debug!("Initializing manifest store at {}", db_path.display());

    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(())
}

/// Open an existing manifest store
///
/// The schema is migrated on open so stores written by older releases
/// pick up the version stamp.
pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let db_path = db_path.as_ref();
    if !db_path.exists() {
        return Err(crate::Error::NotFoundError(format!(
            "Manifest store not found at {}",
            db_path.display()
        )));
    }

    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// Run `f` inside a transaction, committing only if it returns `Ok`
///
/// Dropping the transaction on the error path rolls it back.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
