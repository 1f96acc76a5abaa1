//! PostgreSQL target database operations.

mod tls;

pub use tls::SslMode;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result, Side};
use crate::model::{Record, TableKind};

/// Connection timeout for the target.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for target database operations.
///
/// The writer owns one connection for the whole run; transaction boundaries
/// are driven by the caller through `begin`/`commit`/`rollback`.
#[async_trait]
pub trait TargetWriter: Send {
    /// Remove every row from `tables`, cascading to dependent rows.
    async fn truncate_all(&mut self, tables: &[TableKind]) -> Result<()>;

    /// Open a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Insert a batch with one multi-row statement, skipping rows whose `id`
    /// already exists. Returns the number of rows actually inserted.
    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Get the row count for a table.
    async fn row_count(&mut self, table: &str) -> Result<i64>;
}

/// Validate typed records and insert them as one batch.
///
/// Returns `(inserted, skipped)`; skipped rows already existed in the target.
pub async fn write_records<W, R>(writer: &mut W, records: &[R]) -> Result<(u64, u64)>
where
    W: TargetWriter + ?Sized,
    R: Record,
{
    if records.is_empty() {
        return Ok((0, 0));
    }
    for record in records {
        record.validate()?;
    }

    let rows: Vec<Vec<SqlValue>> = records.iter().map(Record::values).collect();
    let inserted = writer
        .insert_batch(R::KIND.name(), R::KIND.columns(), rows)
        .await?;
    let skipped = records.len() as u64 - inserted.min(records.len() as u64);
    Ok((inserted, skipped))
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    F64(f64),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

/// Type hint for NULL values to ensure correct PostgreSQL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    F64,
    Text,
    Date,
}

impl SqlValue {
    /// Get SQL cast suffix for this value.
    fn cast(&self) -> &'static str {
        match self {
            SqlValue::F64(_) | SqlValue::Null(SqlNullType::F64) => "::double precision",
            SqlValue::Text(_) | SqlValue::Null(SqlNullType::Text) => "::text",
            SqlValue::Uuid(_) => "::uuid",
            SqlValue::Date(_) | SqlValue::Null(SqlNullType::Date) => "::date",
            SqlValue::Timestamp(_) => "::timestamptz",
        }
    }

    /// Convert to a boxed ToSql parameter whose type matches [`SqlValue::cast`].
    fn to_param(&self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            SqlValue::Null(SqlNullType::F64) => Box::new(None::<f64>),
            SqlValue::Null(SqlNullType::Text) => Box::new(None::<String>),
            SqlValue::Null(SqlNullType::Date) => Box::new(None::<NaiveDate>),
            SqlValue::F64(v) => Box::new(*v),
            SqlValue::Text(s) => Box::new(s.clone()),
            SqlValue::Uuid(u) => Box::new(*u),
            SqlValue::Date(d) => Box::new(*d),
            SqlValue::Timestamp(ts) => Box::new(*ts),
        }
    }
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Build a conflict-skipping multi-row INSERT with parameters.
fn build_insert_sql(
    schema: &str,
    table: &str,
    cols: &[&str],
    rows: &[Vec<SqlValue>],
) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let col_list: String = cols
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(rows.len() * cols.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = row
            .iter()
            .map(|value| {
                let p = format!("${}{}", idx, value.cast());
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));
        params.extend(row.iter().map(SqlValue::to_param));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
        qualify_table(schema, table),
        col_list,
        placeholders.join(", "),
        quote_ident("id")
    );

    (sql, params)
}

/// Build one TRUNCATE covering every table, cascading to dependents.
fn build_truncate_sql(schema: &str, tables: &[TableKind]) -> String {
    let list: Vec<String> = tables
        .iter()
        .map(|t| qualify_table(schema, t.name()))
        .collect();
    format!("TRUNCATE TABLE {} CASCADE", list.join(", "))
}

/// PostgreSQL target writer holding a single pooled connection.
pub struct PgWriter {
    // Kept alive for the lifetime of `client`.
    _pool: Pool,
    client: Object,
    schema: String,
    in_transaction: bool,
}

impl PgWriter {
    /// Connect to the target described by `config`.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("sqlite-pg-migrate");
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match SslMode::parse(&config.ssl_mode)?.connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr).max_size(1).build()
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr).max_size(1).build()
            }
        }
        .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(Side::Target, e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(Side::Target, e))?;

        info!("Connected to PostgreSQL target: {}", config.display_dsn());

        Ok(Self {
            _pool: pool,
            client,
            schema: config.schema.clone(),
            in_transaction: false,
        })
    }

    /// Check the connection answers a trivial query.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(Side::Target, e))?;
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for PgWriter {
    async fn truncate_all(&mut self, tables: &[TableKind]) -> Result<()> {
        let sql = build_truncate_sql(&self.schema, tables);
        self.client.batch_execute(&sql).await?;
        info!("Truncated {} target tables in {}", tables.len(), self.schema);
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let (sql, params) = build_insert_sql(&self.schema, table, columns, &rows);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let inserted = self
            .client
            .execute(sql.as_str(), &param_refs)
            .await
            .map_err(|e| {
                if let Some(first_row) = rows.first() {
                    let preview: Vec<String> =
                        first_row.iter().take(3).map(|v| format!("{:?}", v)).collect();
                    tracing::error!(
                        "Insert failed for {}.{}: {} - first row preview: {:?}",
                        self.schema,
                        table,
                        e,
                        preview
                    );
                }
                MigrateError::from_target(table, e)
            })?;

        debug!(
            "{}: inserted {} of {} rows",
            table,
            inserted,
            rows.len()
        );
        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.batch_execute("COMMIT").await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_table(&self.schema, table));
        let row = self.client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }
}
