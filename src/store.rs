//! Destination store: the relational table records are synchronized into.
//!
//! The [`Destination`] trait is the narrow capability the upserter needs:
//! count, delete-all, insert (bulk or single), update by identifier and a
//! single commit per run. [`SqliteDestination`] implements it on SQLite,
//! holding one transaction open from connect until [`Destination::commit`].
//! Dropping it uncommitted discards every write of the run.

use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use itertools::Itertools;
use log::{debug, info, warn};
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use thiserror::Error;

use crate::{
    normalize::CanonicalRecord,
    schema::{CanonicalSchema, is_sql_identifier},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to {database:?} after {attempts} attempt(s)")]
    ConnectExhausted {
        database: PathBuf,
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("destination rejected the write: {0}")]
    Rejected(String),
    #[error("record has {actual} value(s) but the table has {expected} column(s)")]
    Arity { expected: usize, actual: usize },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// A record addressed by its destination identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRow {
    pub id: i64,
    pub record: CanonicalRecord,
}

pub trait Destination {
    fn count_rows(&mut self) -> Result<u64, StoreError>;
    fn delete_all(&mut self) -> Result<u64, StoreError>;
    /// Inserts every row or none of them.
    fn insert_many(&mut self, rows: &[DestinationRow]) -> Result<usize, StoreError>;
    fn insert_one(&mut self, row: &DestinationRow) -> Result<(), StoreError>;
    /// Returns `false` when no row carries the identifier.
    fn update_one(&mut self, row: &DestinationRow) -> Result<bool, StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    pub database: PathBuf,
    pub table: String,
    pub attempts: u32,
    pub backoff: Duration,
}

pub struct SqliteDestination {
    conn: Connection,
    table: String,
    columns: Vec<String>,
}

impl SqliteDestination {
    pub fn open(path: &Path, table: &str, schema: &CanonicalSchema) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, table, schema)
    }

    pub fn open_in_memory(table: &str, schema: &CanonicalSchema) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, table, schema)
    }

    fn from_connection(
        conn: Connection,
        table: &str,
        schema: &CanonicalSchema,
    ) -> Result<Self, StoreError> {
        if !is_sql_identifier(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        conn.execute_batch(&create_table_sql(table, schema))?;
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn,
            table: table.to_string(),
            columns: schema.destination_columns(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Reads one row to prove the table is reachable and returns the row count.
    pub fn probe(&mut self) -> Result<u64, StoreError> {
        let sql = format!("SELECT id FROM \"{}\" LIMIT 1", self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let _ = rows.next()?;
        drop(rows);
        drop(stmt);
        self.count_rows()
    }

    /// Text values of every column for `id`, in schema order.
    pub fn fetch(&self, id: i64) -> Result<Option<Vec<Option<String>>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE id = ?1",
            self.quoted_columns(),
            self.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => {
                let values = (0..self.columns.len())
                    .map(|idx| row.get::<_, Option<String>>(idx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    pub fn ids(&self) -> Result<Vec<i64>, StoreError> {
        let sql = format!("SELECT id FROM \"{}\" ORDER BY id", self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn quoted_columns(&self) -> String {
        self.columns.iter().map(|c| format!("\"{c}\"")).join(", ")
    }

    fn row_values(&self, row: &DestinationRow) -> Result<Vec<SqlValue>, StoreError> {
        if row.record.values.len() != self.columns.len() {
            return Err(StoreError::Arity {
                expected: self.columns.len(),
                actual: row.record.values.len(),
            });
        }
        let mut values = Vec::with_capacity(self.columns.len() + 1);
        values.push(SqlValue::Integer(row.id));
        values.extend(
            row.record
                .values
                .iter()
                .map(|value| value.to_sql_text().map_or(SqlValue::Null, SqlValue::Text)),
        );
        Ok(values)
    }

    fn insert_sql(&self, row_count: usize) -> String {
        let width = self.columns.len() + 1;
        let tuple = format!("({})", vec!["?"; width].join(", "));
        format!(
            "INSERT INTO \"{}\" (id, {}) VALUES {}",
            self.table,
            self.quoted_columns(),
            vec![tuple; row_count].join(", ")
        )
    }
}

impl Destination for SqliteDestination {
    fn count_rows(&mut self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delete_all(&mut self) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM \"{}\"", self.table);
        let deleted = self.conn.execute(&sql, [])?;
        Ok(deleted as u64)
    }

    fn insert_many(&mut self, rows: &[DestinationRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut values = Vec::with_capacity(rows.len() * (self.columns.len() + 1));
        for row in rows {
            values.extend(self.row_values(row)?);
        }
        let sql = self.insert_sql(rows.len());
        // Savepoint keeps a rejected statement from leaving partial rows behind.
        let savepoint = self.conn.savepoint()?;
        let inserted = savepoint.execute(&sql, params_from_iter(values))?;
        savepoint.commit()?;
        Ok(inserted)
    }

    fn insert_one(&mut self, row: &DestinationRow) -> Result<(), StoreError> {
        let values = self.row_values(row)?;
        let sql = self.insert_sql(1);
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn update_one(&mut self, row: &DestinationRow) -> Result<bool, StoreError> {
        let mut values = self.row_values(row)?;
        let id = values.remove(0);
        values.push(id);
        let assignments = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| format!("\"{column}\" = ?{}", idx + 1))
            .join(", ");
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE id = ?{}",
            self.table,
            assignments,
            self.columns.len() + 1
        );
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(changed > 0)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            debug!("Nothing to commit on '{}'", self.table);
            return Ok(());
        }
        self.conn.execute_batch("COMMIT")?;
        info!("Committed changes to '{}'", self.table);
        Ok(())
    }
}

pub fn create_table_sql(table: &str, schema: &CanonicalSchema) -> String {
    let columns = schema
        .fields
        .iter()
        .map(|field| {
            let column = field.destination_column();
            match field.max_length {
                Some(max) => format!("    \"{column}\" TEXT CHECK (length(\"{column}\") <= {max})"),
                None => format!("    \"{column}\" TEXT"),
            }
        })
        .join(",\n");
    format!("CREATE TABLE IF NOT EXISTS \"{table}\" (\n    id INTEGER PRIMARY KEY,\n{columns}\n);")
}

/// Runs `attempt` up to `attempts` times, sleeping `backoff * n` after the n-th failure.
pub fn retry_with_backoff<T, E, F>(attempts: u32, backoff: Duration, mut attempt: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let attempts = attempts.max(1);
    let mut current = 1;
    loop {
        match attempt(current) {
            Ok(value) => return Ok(value),
            Err(err) if current < attempts => {
                let delay = backoff * current;
                warn!("Attempt {current}/{attempts} failed: {err}; retrying in {delay:?}");
                thread::sleep(delay);
                current += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn connect_with_retry(
    settings: &ConnectSettings,
    schema: &CanonicalSchema,
) -> Result<SqliteDestination, StoreError> {
    if !is_sql_identifier(&settings.table) {
        return Err(StoreError::InvalidTable(settings.table.clone()));
    }
    let result = retry_with_backoff(settings.attempts, settings.backoff, |attempt| {
        debug!("Connecting to {:?} (attempt {attempt})", settings.database);
        SqliteDestination::open(&settings.database, &settings.table, schema)
    });
    match result {
        Ok(destination) => {
            info!(
                "Connected to {:?} table '{}'",
                settings.database, settings.table
            );
            Ok(destination)
        }
        Err(StoreError::Sqlite(source)) => Err(StoreError::ConnectExhausted {
            database: settings.database.clone(),
            attempts: settings.attempts.max(1),
            source,
        }),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retry_stops_after_first_success() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = retry_with_backoff(3, Duration::ZERO, |attempt| {
            calls.set(calls.get() + 1);
            if attempt < 2 {
                Err("down".to_string())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), String> = retry_with_backoff(3, Duration::ZERO, |_| {
            calls.set(calls.get() + 1);
            Err("down".to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn create_table_sql_declares_length_checks() {
        let sql = create_table_sql("leads", &CanonicalSchema::leads());
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"telefono\" TEXT CHECK (length(\"telefono\") <= 50)"));
        assert!(sql.contains("\"fecha_creada\" TEXT,"));
    }
}
