//! Conversion of raw source rows into typed records.
//!
//! The source stores timestamps as text such as
//! `2021-06-16 20:14:09.221838+00`. The two-digit offset is not accepted by
//! strict ISO-8601 parsers, so it is widened to `+00:00` before parsing.
//!
//! In [`MapMode::Fresh`] the timestamps are not read at all; every record of
//! the batch gets the same `now`.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::LoadMode;
use crate::error::{MigrateError, Result};
use crate::model::{
    Filmwork, FilmworkType, Genre, GenreFilmwork, LinkMeta, Person, PersonFilmwork, Record,
    RecordMeta,
};
use crate::source::{RawRow, RawValue};

/// How timestamps are produced for mapped records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Parse timestamps from the source row.
    Backfill,
    /// Stamp every record with this instant.
    Fresh { now: DateTime<Utc> },
}

impl MapMode {
    /// Mode for one batch, capturing the current time for fresh loads.
    pub fn for_batch(load_mode: LoadMode) -> Self {
        match load_mode {
            LoadMode::Backfill => MapMode::Backfill,
            LoadMode::Fresh => MapMode::Fresh { now: Utc::now() },
        }
    }
}

/// Build a typed record from a raw source row.
pub trait FromRawRow: Record + Sized {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self>;
}

/// Map every row of a batch, stopping at the first failure.
pub fn map_batch<R: FromRawRow>(rows: &[RawRow], mode: MapMode) -> Result<Vec<R>> {
    rows.iter().map(|row| R::from_raw(row, mode)).collect()
}

/// Rewrite a trailing two-digit UTC offset (`+00`, `-05`) to `+HH:00`.
///
/// Strings that already carry a full offset, or none, are returned as-is.
pub fn widen_utc_offset(raw: &str) -> String {
    let s = raw.trim();
    let bytes = s.as_bytes();
    if bytes.len() >= 3 {
        let sign = bytes[bytes.len() - 3];
        let hh = &bytes[bytes.len() - 2..];
        let before = bytes.len().checked_sub(4).map(|i| bytes[i]);
        // The sign must follow a time digit, otherwise this is a date like 2020-01-01.
        let after_time = before.is_some_and(|b| b.is_ascii_digit())
            && s[..s.len() - 3].contains(':');
        if (sign == b'+' || sign == b'-') && hh.iter().all(u8::is_ascii_digit) && after_time {
            return format!("{}:00", s);
        }
    }
    s.to_string()
}

/// Parse a source timestamp into a UTC instant.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let widened = widen_utc_offset(raw);
    DateTime::parse_from_str(&widened, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_str(&widened, "%Y-%m-%dT%H:%M:%S%.f%:z"))
        .or_else(|_| DateTime::parse_from_rfc3339(&widened))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("'{}' is not a valid timestamp: {}", raw, e))
}

/// Typed field access for one row of one table, with error context.
struct Fields<'a> {
    table: &'static str,
    row: &'a RawRow,
}

impl<'a> Fields<'a> {
    fn new<R: Record>(row: &'a RawRow) -> Self {
        Self {
            table: R::KIND.name(),
            row,
        }
    }

    fn row_id(&self) -> String {
        self.row
            .text("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("rowid {}", self.row.rowid))
    }

    fn error(&self, column: &str, message: impl Into<String>) -> MigrateError {
        MigrateError::parse(self.table, self.row_id(), column, message)
    }

    /// Bytes where text was expected: undecodable text or a real BLOB.
    fn blob_error(&self, column: &str, bytes: &[u8]) -> MigrateError {
        match std::str::from_utf8(bytes) {
            Err(e) => self.error(column, format!("invalid UTF-8: {}", e)),
            Ok(_) => self.error(column, "expected TEXT, found BLOB"),
        }
    }

    /// Text column that must be present and non-NULL.
    fn text(&self, column: &str) -> Result<&'a str> {
        match self.row.get(column) {
            Some(RawValue::Text(s)) => Ok(s.as_str()),
            Some(RawValue::Null) => Err(self.error(column, "value is NULL")),
            Some(RawValue::Blob(bytes)) => Err(self.blob_error(column, bytes)),
            Some(other) => Err(self.error(column, format!("expected TEXT, found {}", other.type_name()))),
            None => Err(self.error(column, "column is missing from source table")),
        }
    }

    /// Optional text column; an absent column reads as NULL.
    fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.row.get(column) {
            None | Some(RawValue::Null) => Ok(None),
            Some(RawValue::Text(s)) => Ok(Some(s.clone())),
            Some(RawValue::Integer(i)) => Ok(Some(i.to_string())),
            Some(RawValue::Real(f)) => Ok(Some(f.to_string())),
            Some(RawValue::Blob(bytes)) => Err(self.blob_error(column, bytes)),
        }
    }

    fn uuid(&self, column: &str) -> Result<Uuid> {
        let s = self.text(column)?;
        Uuid::parse_str(s.trim()).map_err(|e| self.error(column, format!("'{}': {}", s, e)))
    }

    fn opt_f64(&self, column: &str) -> Result<Option<f64>> {
        match self.row.get(column) {
            None | Some(RawValue::Null) => Ok(None),
            Some(RawValue::Real(f)) => Ok(Some(*f)),
            Some(RawValue::Integer(i)) => Ok(Some(*i as f64)),
            Some(RawValue::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(RawValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| self.error(column, format!("'{}': {}", s, e))),
            Some(RawValue::Blob(_)) => Err(self.error(column, "expected REAL, found BLOB")),
        }
    }

    fn opt_date(&self, column: &str) -> Result<Option<NaiveDate>> {
        let Some(s) = self.opt_text(column)? else {
            return Ok(None);
        };
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        // Timestamp-shaped values keep their date part.
        let date_part = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| self.error(column, format!("'{}': {}", s, e)))
    }

    fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        let s = self.text(column)?;
        parse_timestamp(s).map_err(|message| self.error(column, message))
    }

    fn record_meta(&self, mode: MapMode) -> Result<RecordMeta> {
        let id = self.uuid("id")?;
        let (created, modified) = match mode {
            MapMode::Fresh { now } => (now, now),
            MapMode::Backfill => (self.timestamp("created")?, self.timestamp("modified")?),
        };
        Ok(RecordMeta {
            id,
            created,
            modified,
        })
    }

    fn link_meta(&self, mode: MapMode) -> Result<LinkMeta> {
        let id = self.uuid("id")?;
        let created = match mode {
            MapMode::Fresh { now } => now,
            MapMode::Backfill => self.timestamp("created")?,
        };
        Ok(LinkMeta { id, created })
    }
}

impl FromRawRow for Person {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self> {
        let f = Fields::new::<Self>(row);
        Ok(Person {
            meta: f.record_meta(mode)?,
            full_name: f.text("full_name")?.to_string(),
        })
    }
}

impl FromRawRow for Genre {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self> {
        let f = Fields::new::<Self>(row);
        Ok(Genre {
            meta: f.record_meta(mode)?,
            name: f.text("name")?.to_string(),
            description: f.opt_text("description")?,
        })
    }
}

impl FromRawRow for Filmwork {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self> {
        let f = Fields::new::<Self>(row);
        let kind = f.text("type")?;
        let kind = kind
            .trim()
            .parse::<FilmworkType>()
            .map_err(|message| f.error("type", message))?;

        // Legacy dumps still carry file_path; it has no target column.
        Ok(Filmwork {
            meta: f.record_meta(mode)?,
            title: f.text("title")?.to_string(),
            description: f.opt_text("description")?,
            creation_date: f.opt_date("creation_date")?,
            rating: f.opt_f64("rating")?,
            kind,
        })
    }
}

impl FromRawRow for PersonFilmwork {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self> {
        let f = Fields::new::<Self>(row);
        Ok(PersonFilmwork {
            meta: f.link_meta(mode)?,
            film_work_id: f.uuid("film_work_id")?,
            person_id: f.uuid("person_id")?,
            role: f.opt_text("role")?,
        })
    }
}

impl FromRawRow for GenreFilmwork {
    fn from_raw(row: &RawRow, mode: MapMode) -> Result<Self> {
        let f = Fields::new::<Self>(row);
        Ok(GenreFilmwork {
            meta: f.link_meta(mode)?,
            film_work_id: f.uuid("film_work_id")?,
            genre_id: f.uuid("genre_id")?,
        })
    }
}
