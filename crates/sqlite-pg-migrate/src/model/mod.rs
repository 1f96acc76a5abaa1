//! Typed records for the five catalogue tables.
//!
//! Every record embeds its identity and timestamps as a composed struct
//! ([`RecordMeta`] for entities, [`LinkMeta`] for junction rows). Each record
//! knows its table, its target column order, and how to render itself as a
//! row of [`SqlValue`]s in that order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::target::{SqlNullType, SqlValue};

/// Widest target row (film_work).
pub const MAX_COLUMNS: usize = 8;

/// Inclusive bounds for `film_work.rating`.
pub const RATING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// The five migrated tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Person,
    Genre,
    Filmwork,
    PersonFilmwork,
    GenreFilmwork,
}

impl TableKind {
    /// Parents before children, as the target's foreign keys require.
    pub const LOAD_ORDER: [TableKind; 5] = [
        TableKind::Person,
        TableKind::Genre,
        TableKind::Filmwork,
        TableKind::PersonFilmwork,
        TableKind::GenreFilmwork,
    ];

    /// Table name, identical in source and target.
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Person => "person",
            TableKind::Genre => "genre",
            TableKind::Filmwork => "film_work",
            TableKind::PersonFilmwork => "person_film_work",
            TableKind::GenreFilmwork => "genre_film_work",
        }
    }

    /// Target columns in insert order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Person => &["id", "full_name", "created", "modified"],
            TableKind::Genre => &["id", "name", "description", "created", "modified"],
            TableKind::Filmwork => &[
                "id",
                "title",
                "description",
                "creation_date",
                "rating",
                "type",
                "created",
                "modified",
            ],
            TableKind::PersonFilmwork => &["id", "film_work_id", "person_id", "role", "created"],
            TableKind::GenreFilmwork => &["id", "film_work_id", "genre_id", "created"],
        }
    }

    /// Source columns with no target counterpart, such as the legacy
    /// `film_work.file_path`.
    pub fn unmapped_columns<'a>(&self, source_columns: &'a [String]) -> Vec<&'a str> {
        let targets = self.columns();
        source_columns
            .iter()
            .map(String::as_str)
            .filter(|c| !targets.contains(c))
            .collect()
    }

    /// Referenced parent tables as `(fk_column, parent)` pairs.
    pub fn parents(&self) -> &'static [(&'static str, TableKind)] {
        match self {
            TableKind::PersonFilmwork => &[
                ("film_work_id", TableKind::Filmwork),
                ("person_id", TableKind::Person),
            ],
            TableKind::GenreFilmwork => &[
                ("film_work_id", TableKind::Filmwork),
                ("genre_id", TableKind::Genre),
            ],
            _ => &[],
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity and timestamps shared by entity records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMeta {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Identity and creation time shared by junction records.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMeta {
    pub id: Uuid,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub meta: RecordMeta,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub meta: RecordMeta,
    pub name: String,
    pub description: Option<String>,
}

/// `film_work.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmworkType {
    Movie,
    TvShow,
}

impl FilmworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilmworkType::Movie => "movie",
            FilmworkType::TvShow => "tv_show",
        }
    }
}

impl std::str::FromStr for FilmworkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "movie" => Ok(FilmworkType::Movie),
            "tv_show" => Ok(FilmworkType::TvShow),
            other => Err(format!("unknown film work type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filmwork {
    pub meta: RecordMeta,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub kind: FilmworkType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonFilmwork {
    pub meta: LinkMeta,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreFilmwork {
    pub meta: LinkMeta,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
}

/// A typed row that can be written to its target table.
pub trait Record: Send + Sync {
    /// Table this record belongs to.
    const KIND: TableKind;

    /// Values in the order of `Self::KIND.columns()`.
    fn values(&self) -> Vec<SqlValue>;

    /// Write-time data rules that the target schema does not enforce itself.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn opt_text(value: &Option<String>) -> SqlValue {
    match value {
        Some(s) => SqlValue::Text(s.clone()),
        None => SqlValue::Null(SqlNullType::Text),
    }
}

impl Record for Person {
    const KIND: TableKind = TableKind::Person;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.meta.id),
            SqlValue::Text(self.full_name.clone()),
            SqlValue::Timestamp(self.meta.created),
            SqlValue::Timestamp(self.meta.modified),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(MigrateError::constraint(
                Self::KIND.name(),
                format!("person {} has an empty full_name", self.meta.id),
            ));
        }
        Ok(())
    }
}

impl Record for Genre {
    const KIND: TableKind = TableKind::Genre;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.meta.id),
            SqlValue::Text(self.name.clone()),
            opt_text(&self.description),
            SqlValue::Timestamp(self.meta.created),
            SqlValue::Timestamp(self.meta.modified),
        ]
    }
}

impl Record for Filmwork {
    const KIND: TableKind = TableKind::Filmwork;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.meta.id),
            SqlValue::Text(self.title.clone()),
            opt_text(&self.description),
            self.creation_date
                .map(SqlValue::Date)
                .unwrap_or(SqlValue::Null(SqlNullType::Date)),
            self.rating
                .map(SqlValue::F64)
                .unwrap_or(SqlValue::Null(SqlNullType::F64)),
            SqlValue::Text(self.kind.as_str().to_string()),
            SqlValue::Timestamp(self.meta.created),
            SqlValue::Timestamp(self.meta.modified),
        ]
    }

    fn validate(&self) -> Result<()> {
        match self.rating {
            Some(rating) if !RATING_RANGE.contains(&rating) => Err(MigrateError::constraint(
                Self::KIND.name(),
                format!(
                    "film work {} has rating {} outside [{}, {}]",
                    self.meta.id,
                    rating,
                    RATING_RANGE.start(),
                    RATING_RANGE.end()
                ),
            )),
            _ => Ok(()),
        }
    }
}

impl Record for PersonFilmwork {
    const KIND: TableKind = TableKind::PersonFilmwork;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.meta.id),
            SqlValue::Uuid(self.film_work_id),
            SqlValue::Uuid(self.person_id),
            opt_text(&self.role),
            SqlValue::Timestamp(self.meta.created),
        ]
    }
}

impl Record for GenreFilmwork {
    const KIND: TableKind = TableKind::GenreFilmwork;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.meta.id),
            SqlValue::Uuid(self.film_work_id),
            SqlValue::Uuid(self.genre_id),
            SqlValue::Timestamp(self.meta.created),
        ]
    }
}
