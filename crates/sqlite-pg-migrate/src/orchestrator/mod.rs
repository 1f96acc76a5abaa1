//! Migration orchestrator - main workflow coordinator.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{CommitMode, Config, LoadMode};
use crate::error::{MigrateError, Result};
use crate::mapper::{map_batch, FromRawRow, MapMode};
use crate::model::{Filmwork, Genre, GenreFilmwork, Person, PersonFilmwork, TableKind};
use crate::source::{SourceReader, SqliteReader};
use crate::target::{write_records, PgWriter, TargetWriter};

/// Migration orchestrator.
///
/// Loads the five content tables in dependency order, one batch at a time.
pub struct Orchestrator<S = SqliteReader, T = PgWriter> {
    config: Config,
    source: S,
    target: T,
}

/// Row counts for one table of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table: String,
    pub rows_read: u64,
    pub rows_inserted: u64,
    /// Rows whose id already existed in the target.
    pub rows_skipped: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub load_mode: LoadMode,

    pub truncate_first: bool,

    /// Per-table counts in load order.
    pub tables: Vec<TableStats>,

    /// Total rows inserted across all tables.
    pub rows_inserted: u64,

    /// Total rows skipped across all tables.
    pub rows_skipped: u64,
}

impl MigrationResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row-count comparison for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableValidation {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Outcome of `validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.tables.iter().all(|t| t.matches)
    }

    /// Names of tables whose counts differ.
    pub fn mismatched(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.matches)
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator<SqliteReader, PgWriter> {
    /// Open the source file and connect to the target.
    pub async fn new(config: Config) -> Result<Self> {
        let source = SqliteReader::open(&config.source.path)?;
        let target = PgWriter::connect(&config.target).await?;
        Ok(Self::with_parts(config, source, target))
    }

    /// Open each store independently and time a trivial query on it.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let start = Instant::now();
        let source = SqliteReader::open(&config.source.path).and_then(|r| r.ping());
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match PgWriter::connect(&config.target).await {
            Ok(writer) => writer.ping().await,
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_error = source.err().map(|e| e.to_string());
        let target_error = target.err().map(|e| e.to_string());

        HealthCheckResult {
            source_connected: source_error.is_none(),
            source_latency_ms,
            target_connected: target_error.is_none(),
            target_latency_ms,
            healthy: source_error.is_none() && target_error.is_none(),
            source_error,
            target_error,
        }
    }
}

impl<S: SourceReader, T: TargetWriter> Orchestrator<S, T> {
    /// Build an orchestrator over already opened stores.
    pub fn with_parts(config: Config, source: S, target: T) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give back the stores, e.g. to inspect them after a run.
    pub fn into_parts(self) -> (S, T) {
        (self.source, self.target)
    }

    /// Migrate every table from the source into the target.
    pub async fn run(&mut self) -> Result<MigrationResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let migration = &self.config.migration;

        info!(
            "Starting migration run {} (load_mode={:?}, truncate_first={}, batch_size={}, commit_mode={:?})",
            run_id, migration.load_mode, migration.truncate_first, migration.batch_size, migration.commit_mode
        );

        let whole_run = migration.commit_mode == CommitMode::Run;
        if whole_run {
            self.target.begin().await?;
        }

        let tables = match self.load_all().await {
            Ok(tables) => tables,
            Err(e) => {
                error!("Migration run {} failed: {}", run_id, e);
                if let Err(rollback_err) = self.target.rollback().await {
                    warn!("Rollback after failure also failed: {}", rollback_err);
                }
                return Err(e);
            }
        };

        if whole_run {
            self.target.commit().await?;
        }

        let completed_at = Utc::now();
        let duration_seconds = start.elapsed().as_secs_f64();
        let rows_inserted = tables.iter().map(|t| t.rows_inserted).sum();
        let rows_skipped = tables.iter().map(|t| t.rows_skipped).sum();

        info!(
            "Migration run {} completed in {:.2}s: {} rows inserted, {} skipped",
            run_id, duration_seconds, rows_inserted, rows_skipped
        );

        Ok(MigrationResult {
            run_id,
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_seconds,
            load_mode: self.config.migration.load_mode,
            truncate_first: self.config.migration.truncate_first,
            tables,
            rows_inserted,
            rows_skipped,
        })
    }

    async fn load_all(&mut self) -> Result<Vec<TableStats>> {
        if self.config.migration.truncate_first {
            let mut tables = TableKind::LOAD_ORDER;
            tables.reverse();
            self.target.truncate_all(&tables).await?;
        }

        let mut stats = Vec::with_capacity(TableKind::LOAD_ORDER.len());
        for kind in TableKind::LOAD_ORDER {
            let table_stats = match kind {
                TableKind::Person => self.load_table::<Person>().await,
                TableKind::Genre => self.load_table::<Genre>().await,
                TableKind::Filmwork => self.load_table::<Filmwork>().await,
                TableKind::PersonFilmwork => self.load_table::<PersonFilmwork>().await,
                TableKind::GenreFilmwork => self.load_table::<GenreFilmwork>().await,
            }
            .map_err(|e| e.in_table(kind.name()))?;
            stats.push(table_stats);
        }
        Ok(stats)
    }

    /// Stream one table from source to target.
    async fn load_table<R: FromRawRow>(&mut self) -> Result<TableStats> {
        let table = R::KIND.name();
        let migration = &self.config.migration;
        let per_table = migration.commit_mode == CommitMode::PerTable;
        let per_batch = migration.commit_mode == CommitMode::PerBatch;

        info!("{}: loading", table);
        let source_columns = self.source.columns(table)?;
        let unmapped = R::KIND.unmapped_columns(&source_columns);
        if !unmapped.is_empty() {
            warn!(
                "{}: ignoring source columns with no target column: {}",
                table,
                unmapped.join(", ")
            );
        }
        let mut stats = TableStats {
            table: table.to_string(),
            ..Default::default()
        };

        if per_table {
            self.target.begin().await?;
        }

        for batch in self.source.batches(table, migration.batch_size)? {
            let batch = batch?;
            let records: Vec<R> = map_batch(&batch.rows, MapMode::for_batch(migration.load_mode))?;

            if per_batch {
                self.target.begin().await?;
            }
            let (inserted, skipped) = write_records(&mut self.target, &records).await?;
            if per_batch {
                self.target.commit().await?;
            }

            stats.rows_read += records.len() as u64;
            stats.rows_inserted += inserted;
            stats.rows_skipped += skipped;
            debug!(
                "{}: batch of {} rows (after rowid {:?}), {} inserted",
                table,
                records.len(),
                batch.last_rowid(),
                inserted
            );
        }

        if per_table {
            self.target.commit().await?;
        }

        if stats.rows_skipped > 0 {
            warn!(
                "{}: {} rows already present in target were skipped",
                table, stats.rows_skipped
            );
        }
        info!(
            "{}: completed ({} read, {} inserted)",
            table, stats.rows_read, stats.rows_inserted
        );
        Ok(stats)
    }

    /// Compare source and target row counts for every table.
    pub async fn validate(&mut self) -> Result<ValidationReport> {
        let mut tables = Vec::with_capacity(TableKind::LOAD_ORDER.len());

        for kind in TableKind::LOAD_ORDER {
            let table = kind.name();
            let source_rows = self.source.row_count(table)?;
            let target_rows = self.target.row_count(table).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, source_rows);
            } else {
                warn!(
                    "{}: source={}, target={} (MISMATCH)",
                    table, source_rows, target_rows
                );
            }

            tables.push(TableValidation {
                table: table.to_string(),
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(ValidationReport { tables })
    }
}

/// Turn a failed validation report into an error.
pub fn ensure_valid(report: &ValidationReport) -> Result<()> {
    if report.is_ok() {
        Ok(())
    } else {
        Err(MigrateError::Validation(format!(
            "row counts differ for: {}",
            report.mismatched().join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
    use crate::target::SqlValue;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::collections::{BTreeMap, HashSet};
    use uuid::Uuid;

    /// In-memory stand-in for Postgres with id conflict-skip, FK checks and
    /// transactions.
    #[derive(Default)]
    struct FakeWriter {
        tables: BTreeMap<String, Vec<Vec<SqlValue>>>,
        snapshot: Option<BTreeMap<String, Vec<Vec<SqlValue>>>>,
        batch_sizes: Vec<usize>,
        commits: usize,
        truncates: usize,
    }

    impl FakeWriter {
        fn ids(&self, table: &str) -> HashSet<Uuid> {
            self.tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| match r[0] {
                            SqlValue::Uuid(id) => Some(id),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        fn rows(&self, table: &str) -> &[Vec<SqlValue>] {
            self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
        }
    }

    #[async_trait]
    impl TargetWriter for FakeWriter {
        async fn truncate_all(&mut self, tables: &[TableKind]) -> Result<()> {
            for t in tables {
                self.tables.remove(t.name());
            }
            self.truncates += 1;
            Ok(())
        }

        async fn begin(&mut self) -> Result<()> {
            if self.snapshot.is_none() {
                self.snapshot = Some(self.tables.clone());
            }
            Ok(())
        }

        async fn insert_batch(
            &mut self,
            table: &str,
            columns: &[&str],
            rows: Vec<Vec<SqlValue>>,
        ) -> Result<u64> {
            let kind = TableKind::LOAD_ORDER
                .into_iter()
                .find(|k| k.name() == table)
                .unwrap();
            for (fk, parent) in kind.parents() {
                let idx = columns.iter().position(|c| c == fk).unwrap();
                let parent_ids = self.ids(parent.name());
                for row in &rows {
                    if let SqlValue::Uuid(id) = row[idx] {
                        if !parent_ids.contains(&id) {
                            return Err(MigrateError::constraint(
                                table,
                                format!("{} {} not present in {}", fk, id, parent.name()),
                            ));
                        }
                    }
                }
            }

            self.batch_sizes.push(rows.len());
            let mut existing = self.ids(table);
            let target = self.tables.entry(table.to_string()).or_default();
            let mut inserted = 0;
            for row in rows {
                if let SqlValue::Uuid(id) = row[0] {
                    if existing.insert(id) {
                        target.push(row);
                        inserted += 1;
                    }
                }
            }
            Ok(inserted)
        }

        async fn commit(&mut self) -> Result<()> {
            if self.snapshot.take().is_some() {
                self.commits += 1;
            }
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            if let Some(snapshot) = self.snapshot.take() {
                self.tables = snapshot;
            }
            Ok(())
        }

        async fn row_count(&mut self, table: &str) -> Result<i64> {
            Ok(self.rows(table).len() as i64)
        }
    }

    const G1: &str = "3d8d9bf5-0d90-4353-88ba-4ccc5d2c07ff";
    const P1: &str = "26e83050-29ef-4163-a99d-b546cac208f8";
    const F1: &str = "025c58cd-1b7e-43be-9ffb-8571a613579b";

    fn source_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE person (id TEXT PRIMARY KEY, full_name TEXT NOT NULL, created TEXT, modified TEXT);
             CREATE TABLE genre (id TEXT PRIMARY KEY, name TEXT NOT NULL, description TEXT, created TEXT, modified TEXT);
             CREATE TABLE film_work (id TEXT PRIMARY KEY, title TEXT NOT NULL, description TEXT,
                 creation_date DATE, file_path TEXT, rating FLOAT, type TEXT NOT NULL, created TEXT, modified TEXT);
             CREATE TABLE person_film_work (id TEXT PRIMARY KEY, film_work_id TEXT NOT NULL,
                 person_id TEXT NOT NULL, role TEXT, created TEXT);
             CREATE TABLE genre_film_work (id TEXT PRIMARY KEY, film_work_id TEXT NOT NULL,
                 genre_id TEXT NOT NULL, created TEXT);",
        )
        .unwrap();
        conn
    }

    fn seed_catalog(conn: &Connection) {
        conn.execute(
            "INSERT INTO genre VALUES (?1, 'Drama', 'Serious stories', '2020-01-01 00:00:00.000000+00', '2020-01-01 00:00:00.000000+00')",
            [G1],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO person VALUES (?1, 'Ann Smith', '2021-06-16 20:14:09.221838+00', '2021-06-16 20:14:09.221838+00')",
            [P1],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO film_work VALUES (?1, 'Star Trek', 'Space, the final frontier', '1966-09-08',
                 '/films/star_trek.mp4', 6.5, 'tv_show',
                 '2021-06-16 20:14:09.221838+00', '2021-06-16 20:14:09.221838+00')",
            [F1],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO person_film_work VALUES ('b5d0c6a5-98a4-4b0a-a1f5-0b59c3c3c2a1', ?1, ?2, 'actor',
                 '2021-06-16 20:14:09.221838+00')",
            [F1, P1],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO genre_film_work VALUES ('c2a4f1de-7b0c-4f5d-9e3a-3f2e1d0c9b8a', ?1, ?2,
                 '2021-06-16 20:14:09.221838+00')",
            [F1, G1],
        )
        .unwrap();
    }

    fn config(migration: MigrationConfig) -> Config {
        Config {
            source: SourceConfig {
                path: ":memory:".into(),
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "movies_database".to_string(),
                user: "app".to_string(),
                password: String::new(),
                schema: "content".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration,
        }
    }

    fn orchestrator(
        conn: Connection,
        migration: MigrationConfig,
    ) -> Orchestrator<SqliteReader, FakeWriter> {
        Orchestrator::with_parts(
            config(migration),
            SqliteReader::from_connection(conn),
            FakeWriter::default(),
        )
    }

    fn fresh_truncate() -> MigrationConfig {
        MigrationConfig {
            load_mode: LoadMode::Fresh,
            truncate_first: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fresh_truncate_run_stamps_run_time() {
        let conn = source_db();
        conn.execute(
            "INSERT INTO genre VALUES (?1, 'Drama', NULL, '2020-01-01 00:00:00.000000+00', '2020-01-01 00:00:00.000000+00')",
            [G1],
        )
        .unwrap();

        let mut orch = orchestrator(conn, fresh_truncate());
        let before = Utc::now();
        let result = orch.run().await.unwrap();
        let after = Utc::now();

        let (_, writer) = orch.into_parts();
        assert_eq!(writer.truncates, 1);
        let rows = writer.rows("genre");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], SqlValue::Uuid(Uuid::parse_str(G1).unwrap()));
        assert_eq!(rows[0][1], SqlValue::Text("Drama".to_string()));
        for col in [3, 4] {
            match rows[0][col] {
                SqlValue::Timestamp(ts) => assert!(ts >= before && ts <= after),
                ref other => panic!("expected timestamp, got {other:?}"),
            }
        }

        assert_eq!(result.status, "completed");
        let genre = result.tables.iter().find(|t| t.table == "genre").unwrap();
        assert_eq!((genre.rows_read, genre.rows_inserted, genre.rows_skipped), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_rerun_without_truncate_inserts_nothing() {
        let conn = source_db();
        seed_catalog(&conn);
        let mut orch = orchestrator(conn, MigrationConfig::default());

        let first = orch.run().await.unwrap();
        assert_eq!(first.rows_inserted, 5);

        let second = orch.run().await.unwrap();
        assert_eq!(second.rows_inserted, 0);
        assert_eq!(second.rows_skipped, 5);

        let (_, writer) = orch.into_parts();
        assert_eq!(writer.rows("genre").len(), 1);
        assert_eq!(writer.truncates, 0);
    }

    #[tokio::test]
    async fn test_backfill_rows_equal_source_field_by_field() {
        let conn = source_db();
        seed_catalog(&conn);
        let mut orch = orchestrator(conn, MigrationConfig::default());
        orch.run().await.unwrap();

        let id = |s: &str| SqlValue::Uuid(Uuid::parse_str(s).unwrap());
        let text = |s: &str| SqlValue::Text(s.to_string());
        let at = |s: &str| {
            SqlValue::Timestamp(DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc))
        };
        let t2020 = at("2020-01-01T00:00:00+00:00");
        let t2021 = at("2021-06-16T20:14:09.221838+00:00");

        let (_, writer) = orch.into_parts();
        assert_eq!(
            writer.rows("person"),
            &[vec![id(P1), text("Ann Smith"), t2021.clone(), t2021.clone()]]
        );
        assert_eq!(
            writer.rows("genre"),
            &[vec![id(G1), text("Drama"), text("Serious stories"), t2020.clone(), t2020]]
        );
        assert_eq!(
            writer.rows("film_work"),
            &[vec![
                id(F1),
                text("Star Trek"),
                text("Space, the final frontier"),
                SqlValue::Date(chrono::NaiveDate::from_ymd_opt(1966, 9, 8).unwrap()),
                SqlValue::F64(6.5),
                text("tv_show"),
                t2021.clone(),
                t2021.clone(),
            ]]
        );
        assert_eq!(
            writer.rows("person_film_work"),
            &[vec![
                id("b5d0c6a5-98a4-4b0a-a1f5-0b59c3c3c2a1"),
                id(F1),
                id(P1),
                text("actor"),
                t2021.clone(),
            ]]
        );
        assert_eq!(
            writer.rows("genre_film_work"),
            &[vec![
                id("c2a4f1de-7b0c-4f5d-9e3a-3f2e1d0c9b8a"),
                id(F1),
                id(G1),
                t2021,
            ]]
        );
    }

    #[tokio::test]
    async fn test_full_run_loads_every_table_and_validates() {
        let conn = source_db();
        seed_catalog(&conn);
        let mut orch = orchestrator(conn, MigrationConfig::default());
        let result = orch.run().await.unwrap();

        let order: Vec<&str> = result.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(
            order,
            vec!["person", "genre", "film_work", "person_film_work", "genre_film_work"]
        );

        let report = orch.validate().await.unwrap();
        assert!(report.is_ok());
        ensure_valid(&report).unwrap();
        // One commit per table.
        assert_eq!(orch.into_parts().1.commits, 5);
    }

    #[tokio::test]
    async fn test_junction_before_parent_is_constraint_violation() {
        let conn = source_db();
        seed_catalog(&conn);
        let source = SqliteReader::from_connection(conn);
        let mut writer = FakeWriter::default();

        let batch = source.read_batch("genre_film_work", None, 10).unwrap();
        let records: Vec<GenreFilmwork> = map_batch(&batch.rows, MapMode::Backfill).unwrap();
        let err = write_records(&mut writer, &records).await.unwrap_err();
        assert!(matches!(err, MigrateError::ConstraintViolation { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONSTRAINT_ERROR);
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let conn = source_db();
        for i in 0..7 {
            conn.execute(
                "INSERT INTO person VALUES (?1, ?2, '2021-06-16 20:14:09.221838+00', '2021-06-16 20:14:09.221838+00')",
                [Uuid::new_v4().to_string(), format!("Person {i}")],
            )
            .unwrap();
        }
        let mut orch = orchestrator(
            conn,
            MigrationConfig {
                batch_size: 3,
                commit_mode: CommitMode::PerBatch,
                ..Default::default()
            },
        );
        orch.run().await.unwrap();

        let (_, writer) = orch.into_parts();
        assert_eq!(writer.batch_sizes, vec![3, 3, 1]);
        assert_eq!(writer.commits, 3);
        assert_eq!(writer.rows("person").len(), 7);
    }

    #[tokio::test]
    async fn test_parse_error_names_table_and_rolls_back_run() {
        let conn = source_db();
        seed_catalog(&conn);
        conn.execute(
            "INSERT INTO film_work VALUES ('6b0ac8c1-42f2-4d5a-8c8c-6e0a7c9b3b11', 'Broken', NULL, NULL,
                 NULL, NULL, 'movie', 'yesterday', 'yesterday')",
            [],
        )
        .unwrap();
        let mut orch = orchestrator(
            conn,
            MigrationConfig {
                commit_mode: CommitMode::Run,
                ..Default::default()
            },
        );

        let err = orch.run().await.unwrap_err();
        assert!(err.to_string().contains("film_work"));
        assert!(matches!(err.root(), MigrateError::Parse { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_PARSE_ERROR);

        // The whole run was one transaction, so nothing stays loaded.
        let (_, writer) = orch.into_parts();
        assert!(writer.rows("person").is_empty());
        assert!(writer.rows("genre").is_empty());
    }

    #[tokio::test]
    async fn test_rating_out_of_range_aborts_at_film_work() {
        let conn = source_db();
        conn.execute(
            "INSERT INTO film_work VALUES (?1, 'Too good', NULL, NULL, NULL, 140.0, 'movie',
                 '2021-06-16 20:14:09.221838+00', '2021-06-16 20:14:09.221838+00')",
            [F1],
        )
        .unwrap();
        let mut orch = orchestrator(conn, MigrationConfig::default());

        let err = orch.run().await.unwrap_err();
        match &err {
            MigrateError::Table { table, source } => {
                assert_eq!(table, "film_work");
                assert!(matches!(**source, MigrateError::ConstraintViolation { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_source_table_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        let mut orch = orchestrator(conn, MigrationConfig::default());
        let err = orch.run().await.unwrap_err();
        assert!(matches!(err.root(), MigrateError::MissingTable(t) if t == "person"));
    }

    #[tokio::test]
    async fn test_validate_reports_mismatch() {
        let conn = source_db();
        seed_catalog(&conn);
        let mut orch = orchestrator(conn, MigrationConfig::default());

        let report = orch.validate().await.unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.mismatched().len(), 5);
        let err = ensure_valid(&report).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_VALIDATION_ERROR);
    }

    #[test]
    fn test_result_serializes_to_json() {
        let now = Utc::now();
        let result = MigrationResult {
            run_id: "r1".to_string(),
            status: "completed".to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.5,
            load_mode: LoadMode::Fresh,
            truncate_first: true,
            tables: vec![TableStats {
                table: "genre".to_string(),
                rows_read: 1,
                rows_inserted: 1,
                rows_skipped: 0,
            }],
            rows_inserted: 1,
            rows_skipped: 0,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"load_mode\": \"fresh\""));
        assert!(json.contains("\"rows_inserted\": 1"));
    }
}
