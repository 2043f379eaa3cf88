//! Versioned SQLite schema definitions.
//!
//! Each store declares an ordered list of schemas; the database's
//! `user_version` pragma records which one it is on, and migrations bring
//! older databases forward.

use anyhow::{bail, Result};
use rusqlite::Connection;

/// Offset added to the schema version when stored in `user_version`, so a
/// plain SQLite file is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 77000;

/// A single table definition.
pub struct Table {
    pub name: &'static str,
    /// Column names in declaration order, used for validation.
    pub columns: &'static [&'static str],
    /// Full CREATE TABLE statement.
    pub create_sql: &'static str,
    /// (index name, indexed columns) pairs.
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(self.create_sql, [])?;
        for (index_name, index_columns) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {} ({})",
                    index_name, self.name, index_columns
                ),
                [],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<usize, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

        if actual_columns.is_empty() {
            bail!("Table {} does not exist", self.name);
        }
        let matches = actual_columns.len() == self.columns.len()
            && actual_columns
                .iter()
                .zip(self.columns)
                .all(|(actual, expected)| actual.as_str() == *expected);
        if !matches {
            bail!(
                "Table {} columns mismatch. Found: {}, expected: {}",
                self.name,
                actual_columns.join(", "),
                self.columns.join(", ")
            );
        }
        Ok(())
    }
}

/// One version of a store's full schema.
pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Migration from the previous version, None for the initial schema.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    /// Create all tables and stamp the database version.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check that an existing database matches this schema version.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Open or create a database for the given schema list, validating and
/// migrating as needed. Returns the ready connection.
pub fn open_versioned(
    db_path: &std::path::Path,
    schemas: &'static [VersionedSchema],
) -> Result<Connection> {
    let conn = if db_path.exists() {
        Connection::open(db_path)?
    } else {
        let conn = Connection::open(db_path)?;
        schemas
            .last()
            .ok_or_else(|| anyhow::anyhow!("No schemas defined"))?
            .create(&conn)?;
        tracing::info!("Created new database at {:?}", db_path);
        conn
    };

    let db_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))?
        - BASE_DB_VERSION as i64;

    if db_version < 0 {
        bail!(
            "Database {:?} does not carry base version {}",
            db_path,
            BASE_DB_VERSION
        );
    }
    let version = db_version as usize;
    if version >= schemas.len() {
        bail!(
            "Database version {} is too new (max supported: {})",
            version,
            schemas.len() - 1
        );
    }

    schemas[version].validate(&conn)?;
    migrate_if_needed(&conn, schemas, version)?;

    Ok(conn)
}

/// Create the latest schema in a fresh in-memory database, for tests.
pub fn open_in_memory(schemas: &'static [VersionedSchema]) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schemas
        .last()
        .ok_or_else(|| anyhow::anyhow!("No schemas defined"))?
        .create(&conn)?;
    Ok(conn)
}

fn migrate_if_needed(
    conn: &Connection,
    schemas: &'static [VersionedSchema],
    current_version: usize,
) -> Result<()> {
    let target_version = schemas.len() - 1;
    if current_version >= target_version {
        return Ok(());
    }

    tracing::info!(
        "Migrating database from version {} to {}",
        current_version,
        target_version
    );
    for schema in schemas.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            migration_fn(conn)?;
        }
    }
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
        [],
    )?;
    Ok(())
}
