// src/db/models/path_entry.rs

//! PathEntry model - a file or directory owned by a package

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A path owned by exactly one package
///
/// Paths are stored relative to the distribution root, `/`-separated,
/// without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
    pub is_dir: bool,
    pub package: String,
}

impl PathEntry {
    pub fn new(path: impl Into<String>, is_dir: bool, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir,
            package: package.into(),
        }
    }

    /// Insert this path record
    ///
    /// Fails on a primary key conflict: a path has one owner.
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO paths (path, dir, package) VALUES (?1, ?2, ?3)",
            params![&self.path, self.is_dir, &self.package],
        )?;
        Ok(())
    }

    /// Insert unless another package already owns the path
    ///
    /// Returns whether a row was written. Used for directories, which
    /// several packages may legitimately populate.
    pub fn insert_if_unowned(&self, conn: &Connection) -> Result<bool> {
        let rows = conn.execute(
            "INSERT OR IGNORE INTO paths (path, dir, package) VALUES (?1, ?2, ?3)",
            params![&self.path, self.is_dir, &self.package],
        )?;
        Ok(rows > 0)
    }

    /// Find the record for a path
    pub fn find_by_path(conn: &Connection, path: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT path, dir, package FROM paths WHERE path = ?1")?;
        let entry = stmt.query_row([path], Self::from_row).optional()?;
        Ok(entry)
    }

    /// All records owned by a package
    pub fn find_by_package(conn: &Connection, package: &str) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare("SELECT path, dir, package FROM paths WHERE package = ?1 ORDER BY path")?;
        let entries = stmt
            .query_map([package], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Files (not directories) owned by a package
    pub fn files_of(conn: &Connection, package: &str) -> Result<Vec<String>> {
        Self::paths_of(conn, package, false)
    }

    /// Directories owned by a package
    pub fn dirs_of(conn: &Connection, package: &str) -> Result<Vec<String>> {
        Self::paths_of(conn, package, true)
    }

    fn paths_of(conn: &Connection, package: &str, is_dir: bool) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT path FROM paths WHERE package = ?1 AND dir = ?2")?;
        let paths = stmt
            .query_map(params![package, is_dir], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// A package owning some path strictly below directory `dir`
    pub fn owner_below(conn: &Connection, dir: &str) -> Result<Option<String>> {
        let prefix = format!("{dir}/");
        let owner = conn
            .query_row(
                "SELECT package FROM paths
                 WHERE substr(path, 1, length(?1)) = ?1
                 ORDER BY path LIMIT 1",
                [&prefix],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Number of path records in the store
    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM paths", [], |row| row.get(0))?;
        Ok(count)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            is_dir: row.get(1)?,
            package: row.get(2)?,
        })
    }
}
