//! Metrics and signal persistence with SQLite
//!
//! Daily metrics are keyed by `(symbol, date)` and overwritten on conflict.
//! Signal events are keyed by `(symbol, date, type)` and never re-inserted.

use crate::error::{MetricsError, Result};
use crate::pipeline::MetricsRow;
use crate::types::{ProcessedRow, SignalEvent, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::Path;

/// Tables owned by this store; the only names interpolated into SQL
const TABLES: &[&str] = &["tickers", "daily_metrics", "signal_events"];

/// Columns added after the first schema version
const LATE_DAILY_COLUMNS: &[(&str, &str)] = &[("pct_from_52w_high", "REAL"), ("is_52w_high", "INTEGER")];

/// SQLite-backed store for daily metrics and crossover events
pub struct MetricsStore {
    conn: Connection,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> MetricsError + '_ {
    move |e| MetricsError::DatabaseError(format!("{}: {}", context, e))
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl MetricsStore {
    /// Create or open database at path, creating parent directories
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).map_err(db_err("Failed to open database"))?;

        let mut store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(db_err("Failed to create in-memory database"))?;

        let mut store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create tables if they don't exist and bring older tables up to date
    pub fn init_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS tickers (
                    id INTEGER PRIMARY KEY,
                    symbol TEXT UNIQUE
                );
                CREATE TABLE IF NOT EXISTS daily_metrics (
                    symbol TEXT,
                    date TEXT,
                    close REAL,
                    sma50 REAL,
                    sma200 REAL,
                    high_52w REAL,
                    bvps REAL,
                    pb REAL,
                    ev REAL,
                    pct_from_52w_high REAL,
                    is_52w_high INTEGER,
                    UNIQUE(symbol, date)
                );
                CREATE TABLE IF NOT EXISTS signal_events (
                    symbol TEXT,
                    date TEXT,
                    type TEXT,
                    UNIQUE(symbol, date, type)
                );",
            )
            .map_err(db_err("Failed to create schema"))?;

        self.add_missing_columns("daily_metrics", LATE_DAILY_COLUMNS)
    }

    /// Add any of `columns` that the table does not have yet
    pub(crate) fn add_missing_columns(&mut self, table: &str, columns: &[(&str, &str)]) -> Result<()> {
        let existing = self.column_names(table)?;
        for (name, sql_type) in columns {
            if !existing.iter().any(|c| c == name) {
                log::info!("adding column {}.{} {}", table, name, sql_type);
                self.conn
                    .execute(
                        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, sql_type),
                        [],
                    )
                    .map_err(db_err("Failed to add column"))?;
            }
        }
        Ok(())
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        if !TABLES.contains(&table) {
            return Err(MetricsError::DatabaseError(format!("unknown table '{}'", table)));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .map_err(db_err("Failed to inspect table"))?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(db_err("Failed to inspect table"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to inspect table"))?;

        Ok(names)
    }

    /// Register a ticker in the symbol table
    pub fn upsert_ticker(&mut self, symbol: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO tickers (symbol) VALUES (?1)",
                params![symbol],
            )
            .map_err(db_err("Failed to upsert ticker"))?;
        Ok(())
    }

    /// Insert or overwrite daily metrics rows; returns the number of rows written
    pub fn upsert_daily(&mut self, symbol: &str, rows: &[MetricsRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .transaction()
            .map_err(db_err("Failed to begin transaction"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO daily_metrics
                        (symbol, date, close, sma50, sma200, high_52w, bvps, pb, ev, pct_from_52w_high, is_52w_high)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(symbol, date) DO UPDATE SET
                        close = excluded.close,
                        sma50 = excluded.sma50,
                        sma200 = excluded.sma200,
                        high_52w = excluded.high_52w,
                        bvps = excluded.bvps,
                        pb = excluded.pb,
                        ev = excluded.ev,
                        pct_from_52w_high = excluded.pct_from_52w_high,
                        is_52w_high = excluded.is_52w_high",
                )
                .map_err(db_err("Failed to prepare daily upsert"))?;

            for row in rows {
                let row = row.to_processed();
                stmt.execute(params![
                    symbol,
                    row.date.format(DATE_FORMAT).to_string(),
                    row.close,
                    row.sma50,
                    row.sma200,
                    row.high_52w,
                    row.bvps,
                    row.pb,
                    row.ev,
                    row.pct_from_52w_high,
                    row.is_52w_high.map(i64::from),
                ])
                .map_err(db_err("Failed to upsert daily metrics"))?;
            }
        }
        tx.commit().map_err(db_err("Failed to commit daily metrics"))?;

        log::debug!("{}: upserted {} daily rows", symbol, rows.len());
        Ok(rows.len())
    }

    /// Insert signal events, skipping any already stored; returns the number newly inserted
    pub fn upsert_signals(&mut self, symbol: &str, events: &[SignalEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .transaction()
            .map_err(db_err("Failed to begin transaction"))?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO signal_events (symbol, date, type) VALUES (?1, ?2, ?3)
                     ON CONFLICT(symbol, date, type) DO NOTHING",
                )
                .map_err(db_err("Failed to prepare signal upsert"))?;

            for event in events {
                inserted += stmt
                    .execute(params![
                        symbol,
                        event.date.format(DATE_FORMAT).to_string(),
                        event.kind.as_str(),
                    ])
                    .map_err(db_err("Failed to upsert signal"))?;
            }
        }
        tx.commit().map_err(db_err("Failed to commit signals"))?;

        log::debug!("{}: inserted {} of {} signals", symbol, inserted, events.len());
        Ok(inserted)
    }

    /// Stored daily rows for a symbol, ascending by date
    pub fn load_daily(&self, symbol: &str) -> Result<Vec<ProcessedRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date, close, sma50, sma200, high_52w, bvps, pb, ev, pct_from_52w_high, is_52w_high
                 FROM daily_metrics WHERE symbol = ?1 ORDER BY date",
            )
            .map_err(db_err("Failed to prepare query"))?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                Ok(ProcessedRow {
                    date: parse_date(&row.get::<_, String>(0)?)?,
                    close: row.get(1)?,
                    sma50: row.get(2)?,
                    sma200: row.get(3)?,
                    high_52w: row.get(4)?,
                    bvps: row.get(5)?,
                    pb: row.get(6)?,
                    ev: row.get(7)?,
                    pct_from_52w_high: row.get(8)?,
                    is_52w_high: row.get::<_, Option<i64>>(9)?.map(|v| v != 0),
                })
            })
            .map_err(db_err("Failed to query daily metrics"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to collect daily metrics"))?;

        Ok(rows)
    }

    /// Stored events for a symbol, ascending by date
    pub fn load_signals(&self, symbol: &str) -> Result<Vec<SignalEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, type FROM signal_events WHERE symbol = ?1 ORDER BY date, type")
            .map_err(db_err("Failed to prepare query"))?;

        let raw = stmt
            .query_map(params![symbol], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err("Failed to query signals"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to collect signals"))?;

        raw.into_iter()
            .map(|(date, kind)| {
                let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|e| MetricsError::ParseError(format!("stored date '{}': {}", date, e)))?;
                Ok(SignalEvent::new(symbol, date, kind.parse()?))
            })
            .collect()
    }

    pub fn count_daily(&self, symbol: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM daily_metrics WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .map_err(db_err("Failed to count daily metrics"))?;
        Ok(count as usize)
    }

    pub fn count_signals(&self, symbol: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM signal_events WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .map_err(db_err("Failed to count signals"))?;
        Ok(count as usize)
    }

    /// All registered ticker symbols
    pub fn tickers(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT symbol FROM tickers ORDER BY symbol")
            .map_err(db_err("Failed to prepare query"))?;

        let symbols = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_err("Failed to query tickers"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to collect tickers"))?;

        Ok(symbols)
    }
}
