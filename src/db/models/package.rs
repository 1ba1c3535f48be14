// src/db/models/package.rs

//! Package model - one installed package and its revision

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// An installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub revision: i64,
}

impl Package {
    pub fn new(name: impl Into<String>, revision: i64) -> Self {
        Self {
            name: name.into(),
            revision,
        }
    }

    /// Insert this package into the database
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO packages (name, revision) VALUES (?1, ?2)",
            params![&self.name, self.revision],
        )?;
        Ok(())
    }

    /// Find a package by name
    pub fn find(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT name, revision FROM packages WHERE name = ?1")?;
        let package = stmt.query_row([name], Self::from_row).optional()?;
        Ok(package)
    }

    /// Installed revision of `name`, if any
    pub fn revision_of(conn: &Connection, name: &str) -> Result<Option<i64>> {
        Ok(Self::find(conn, name)?.map(|p| p.revision))
    }

    /// List all packages ordered by name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT name, revision FROM packages ORDER BY name")?;
        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Delete a package; its path records go with it
    pub fn delete(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("DELETE FROM paths WHERE package = ?1", [name])?;
        conn.execute("DELETE FROM packages WHERE name = ?1", [name])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            revision: row.get(1)?,
        })
    }
}
