//! SQLite storage layer -- schema, run history queries.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};

use crate::scheduler::history::HistoryEntry;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Save one run attempt, successful or not.
pub fn record_run(pool: &Pool, entry: &HistoryEntry) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO runs (id, triggered_by, status, started_at, finished_at, total_packets, anomaly_count, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.trigger.as_str(),
            entry.status.as_str(),
            entry.started_at.to_rfc3339(),
            entry.finished_at.map(|t| t.to_rfc3339()),
            entry.total_packets.map(|n| n as i64),
            entry.anomaly_count.map(|n| n as i64),
            entry.error,
        ],
    )
    .context("Failed to insert run")?;
    Ok(())
}

/// Most recent runs first.
pub fn list_runs(pool: &Pool, limit: usize) -> Result<Vec<HistoryEntry>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, triggered_by, status, started_at, finished_at, total_packets, anomaly_count, error
         FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], raw_run)?;

    let mut list = Vec::new();
    for r in rows {
        list.push(r?.parse()?);
    }
    Ok(list)
}

struct RawRun {
    id: String,
    trigger: String,
    status: String,
    started_at: String,
    finished_at: Option<String>,
    total_packets: Option<i64>,
    anomaly_count: Option<i64>,
    error: Option<String>,
}

fn raw_run(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        id: row.get(0)?,
        trigger: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        total_packets: row.get(5)?,
        anomaly_count: row.get(6)?,
        error: row.get(7)?,
    })
}

impl RawRun {
    fn parse(self) -> Result<HistoryEntry> {
        let ts = |s: &str| -> Result<DateTime<Utc>> {
            Ok(DateTime::parse_from_rfc3339(s)
                .with_context(|| format!("bad timestamp '{s}' in runs"))?
                .with_timezone(&Utc))
        };
        Ok(HistoryEntry {
            id: self.id.parse().context("bad run id")?,
            trigger: self.trigger.parse()?,
            status: self.status.parse()?,
            started_at: ts(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(ts).transpose()?,
            total_packets: self.total_packets.map(|n| n as usize),
            anomaly_count: self.anomaly_count.map(|n| n as usize),
            error: self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::history::{RunStatus, RunTrigger};

    #[test]
    fn test_record_and_list_runs() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("data/satwatch.db")).unwrap();
        assert!(list_runs(&pool, 10).unwrap().is_empty());

        let first = HistoryEntry::skipped(RunTrigger::Api);
        record_run(&pool, &first).unwrap();
        let mut second = HistoryEntry::skipped(RunTrigger::Schedule);
        second.started_at = first.started_at + chrono::Duration::seconds(5);
        second.status = RunStatus::Success;
        second.total_packets = Some(500);
        second.anomaly_count = Some(3);
        second.error = None;
        record_run(&pool, &second).unwrap();

        let runs = list_runs(&pool, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[0].total_packets, Some(500));
        assert_eq!(runs[1].status, RunStatus::Skipped);
        assert_eq!(list_runs(&pool, 1).unwrap().len(), 1);
    }
}
