use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::TryStreamExt;
use sqlx::sqlite::{
    SqliteConnection, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Executor, Row, Statement, TypeInfo, ValueRef};

use crate::backend::{unique_column_names, Backend, CellValue, QueryResult};
use crate::error::GatewayError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_LIFETIME: Duration = Duration::from_secs(600);
/// VM instructions between deadline checks.
const PROGRESS_HANDLER_OPS: i32 = 1000;
/// Primary result code SQLite reports for an interrupted statement.
const SQLITE_INTERRUPT: &str = "9";

/// Single-connection pool opened in SQLite read-only mode.
///
/// Created once per process and lent to [`SqliteBackend`]. The connection is
/// opened lazily on first use and concurrent callers queue on the pool.
pub struct ReadOnlyPool {
    pool: SqlitePool,
    path: PathBuf,
}

impl ReadOnlyPool {
    pub fn open(path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .max_lifetime(CONNECTION_LIFETIME)
            .connect_lazy_with(options);
        Self {
            pool,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Writable connection, used only to install the catalog views.
pub async fn connect_writable(path: &Path) -> Result<SqlitePool, GatewayError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .busy_timeout(BUSY_TIMEOUT);
    SqlitePool::connect_with(options)
        .await
        .map_err(|e| GatewayError::Connection {
            message: format!("cannot open {}: {}", path.display(), e),
        })
}

pub struct SqliteBackend<'p> {
    pool: &'p ReadOnlyPool,
}

impl<'p> SqliteBackend<'p> {
    pub fn new(pool: &'p ReadOnlyPool) -> Self {
        Self { pool }
    }

    async fn collect(
        &self,
        sql: &str,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        let mut conn = self
            .pool
            .pool
            .acquire()
            .await
            .map_err(|e| GatewayError::Connection {
                message: format!(
                    "cannot open read-only connection to {}: {}",
                    self.pool.path.display(),
                    e
                ),
            })?;

        // The handler outlives a dropped future, so a timed-out statement is
        // interrupted on the worker thread and the connection frees up.
        install_progress_handler(&mut conn, Instant::now() + timeout)
            .await
            .map_err(execution_error)?;
        let drained = drain(&mut conn, sql, max_rows).await;
        clear_progress_handler(&mut conn)
            .await
            .map_err(execution_error)?;

        drained.map_err(|e| {
            if is_interrupt_error(&e) {
                timeout_error(timeout)
            } else {
                execution_error(e)
            }
        })
    }
}

async fn drain(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> Result<QueryResult, sqlx::Error> {
    let statement = (&mut *conn).prepare(sql).await?;
    let columns = unique_column_names(statement.columns().iter().map(|c| c.name()));

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut stream = sqlx::query(sql).fetch(&mut *conn);
    while let Some(row) = stream.try_next().await? {
        rows.push(decode_row(&row)?);
        // Stop draining at the cap even if the statement's own LIMIT is larger.
        if max_rows > 0 && rows.len() >= max_rows {
            truncated = true;
            break;
        }
    }

    Ok(QueryResult {
        columns,
        rows,
        truncated,
    })
}

async fn install_progress_handler(
    conn: &mut SqliteConnection,
    deadline: Instant,
) -> Result<(), sqlx::Error> {
    conn.lock_handle()
        .await?
        .set_progress_handler(PROGRESS_HANDLER_OPS, move || Instant::now() < deadline);
    Ok(())
}

async fn clear_progress_handler(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    conn.lock_handle().await?.remove_progress_handler();
    Ok(())
}

fn is_interrupt_error(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| {
        db.code().is_some_and(|code| code == SQLITE_INTERRUPT) || db.message().contains("interrupt")
    })
}

impl Backend for SqliteBackend<'_> {
    async fn execute(
        &self,
        sql: &str,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        match tokio::time::timeout(timeout, self.collect(sql, max_rows, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(timeout)),
        }
    }
}

fn timeout_error(timeout: Duration) -> GatewayError {
    GatewayError::Timeout {
        millis: timeout.as_millis() as u64,
    }
}

fn execution_error(e: sqlx::Error) -> GatewayError {
    GatewayError::Execution {
        message: e.to_string(),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<CellValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|idx| decode_cell(row, idx))
        .collect()
}

fn decode_cell(row: &SqliteRow, idx: usize) -> Result<CellValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(CellValue::Null);
    }

    let declared = row
        .columns()
        .get(idx)
        .map(|c| c.type_info().name().to_ascii_uppercase())
        .unwrap_or_default();

    if is_temporal(&declared)
        && let Ok(ts) = row.try_get::<DateTime<Utc>, _>(idx)
    {
        return Ok(CellValue::Text(ts.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(if declared == "BOOLEAN" {
            CellValue::Bool(v != 0)
        } else {
            CellValue::Integer(v)
        });
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(CellValue::Real(v));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(CellValue::Text(v));
    }
    let bytes: Vec<u8> = row.try_get(idx)?;
    Ok(CellValue::Text(String::from_utf8_lossy(&bytes).into_owned()))
}

fn is_temporal(declared: &str) -> bool {
    declared.contains("DATETIME") || declared.contains("TIMESTAMP")
}
