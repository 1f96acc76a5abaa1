//! SQLite source database operations.

mod types;

pub use types::*;

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::{MigrateError, Result, Side};

/// Trait for source database operations.
///
/// Reads are synchronous: a call returns once the driver has produced the
/// whole page.
pub trait SourceReader {
    /// Column names of a table, in source order.
    ///
    /// Fails with [`MigrateError::MissingTable`] if the table does not exist.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Read up to `limit` rows whose rowid is greater than `after`.
    fn read_batch(&self, table: &str, after: Option<i64>, limit: usize) -> Result<RawBatch>;

    /// Get the row count for a table.
    fn row_count(&self, table: &str) -> Result<i64>;

    /// Lazily page through a whole table, `batch_size` rows at a time.
    ///
    /// Each call starts again from the first row.
    fn batches(&self, table: &str, batch_size: usize) -> Result<Batches<'_, Self>>
    where
        Self: Sized,
    {
        // Fail fast on a missing table rather than on the first page.
        self.columns(table)?;
        Ok(Batches {
            reader: self,
            table: table.to_string(),
            batch_size: batch_size.max(1),
            cursor: None,
            done: false,
        })
    }
}

/// Iterator over the pages of one table.
pub struct Batches<'a, R: SourceReader> {
    reader: &'a R,
    table: String,
    batch_size: usize,
    cursor: Option<i64>,
    done: bool,
}

impl<R: SourceReader> Iterator for Batches<'_, R> {
    type Item = Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self
            .reader
            .read_batch(&self.table, self.cursor, self.batch_size)
        {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                // A short page is the last one.
                if batch.len() < self.batch_size {
                    self.done = true;
                }
                self.cursor = batch.last_rowid();
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// SQLite source opened read-only.
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    /// Open the SQLite file at `path` without write access.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MigrateError::connection(
                Side::Source,
                format!("SQLite file {:?} does not exist", path),
            ));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| MigrateError::connection(Side::Source, e))?;

        // Opening is lazy in SQLite; touch the schema to surface corrupt files now.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| MigrateError::connection(Side::Source, e))?;

        info!("Opened SQLite source: {:?}", path);
        Ok(Self { conn })
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Check the connection answers a trivial query.
    pub fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| MigrateError::connection(Side::Source, e))?;
        Ok(())
    }

    /// Quote an SQLite identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl SourceReader for SqliteReader {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(MigrateError::MissingTable(table.to_string()));
        }
        Ok(columns)
    }

    fn read_batch(&self, table: &str, after: Option<i64>, limit: usize) -> Result<RawBatch> {
        let sql = format!(
            "SELECT rowid, * FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
            Self::quote_ident(table)
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        // First result column is the rowid cursor.
        let columns: Arc<[String]> = stmt
            .column_names()
            .iter()
            .skip(1)
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .into();
        let width = columns.len();

        let mut rows = stmt.query(params![after.unwrap_or(i64::MIN), limit as i64])?;
        let mut batch = RawBatch::default();
        while let Some(row) = rows.next()? {
            let rowid: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(width);
            for idx in 1..=width {
                values.push(RawValue::from(row.get_ref(idx)?));
            }
            batch.rows.push(RawRow::new(rowid, columns.clone(), values));
        }

        debug!(
            "Read {} rows from {} (after rowid {:?})",
            batch.len(),
            table,
            after
        );
        Ok(batch)
    }

    fn row_count(&self, table: &str) -> Result<i64> {
        self.columns(table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}
