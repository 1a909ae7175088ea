//! Operational metrics for the crisis engine: a fixed vocabulary of
//! counters and gauges (sessions, assessments, escalations, spool depth)
//! kept live in memory and periodically snapshotted to SQLite so the
//! `telemetry.metrics` query can look back in time.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

/// A persisted metric value at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub id: i64,
    pub timestamp: String,
    pub name: String,
    pub value: f64,
    pub labels: Option<String>,
    pub metric_type: MetricType,
}

/// Query parameters for historical snapshots.
#[derive(Clone, Debug, Default)]
pub struct MetricsQuery {
    pub name: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Counter(f64),
    Gauge(f64),
}

impl Slot {
    fn value(self) -> f64 {
        match self {
            Self::Counter(v) | Self::Gauge(v) => v,
        }
    }

    fn kind(self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Gauge(_) => MetricType::Gauge,
        }
    }
}

type Key = (&'static str, Option<String>);

/// Thread-safe recorder with a named method per metric the engine emits.
/// The write path is a single short-held mutex; SQLite is only touched by
/// [`snapshot`](Self::snapshot), [`query`](Self::query), and
/// [`prune`](Self::prune).
pub struct MetricsRecorder {
    live: Mutex<BTreeMap<Key, Slot>>,
    db: Mutex<Connection>,
}

impl MetricsRecorder {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::with_conn(Connection::open(db_path)?)
    }

    /// Recorder backed by an in-memory snapshot store, for tests.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::with_conn(Connection::open_in_memory()?)
    }

    fn with_conn(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS metrics_snapshots (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 name TEXT NOT NULL,
                 value REAL NOT NULL,
                 labels TEXT,
                 metric_type TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics_snapshots(name, timestamp);",
        )?;
        Ok(Self {
            live: Mutex::new(BTreeMap::new()),
            db: Mutex::new(conn),
        })
    }

    // Session lifecycle.

    pub fn session_created(&self) {
        self.bump("sessions.created", None, 1.0);
    }

    pub fn session_ended(&self, reason: &str) {
        self.bump("sessions.ended", label("reason", reason), 1.0);
    }

    pub fn sessions_active(&self, count: usize) {
        self.set("sessions.active", None, count as f64);
    }

    // Triage and escalation.

    pub fn assessment_scored(&self, level: &str) {
        self.bump("assessments.scored", label("level", level), 1.0);
    }

    pub fn escalation_fired(&self, action: &str, coalesced: bool) {
        self.bump("escalations.fired", label("action", action), 1.0);
        if coalesced {
            self.bump("escalations.coalesced", label("action", action), 1.0);
        }
    }

    pub fn escalation_suppressed(&self, action: &str) {
        self.bump("escalations.suppressed", label("action", action), 1.0);
    }

    // Store spool.

    pub fn spool_depth(&self, depth: usize) {
        self.set("spool.depth", None, depth as f64);
    }

    pub fn spool_replayed(&self, writes: usize) {
        if writes > 0 {
            self.bump("spool.replayed", None, writes as f64);
        }
    }

    /// Current live value for `name`, summed across label sets. `None`
    /// when the metric has never been recorded.
    pub fn current(&self, name: &str) -> Option<f64> {
        let live = self.live.lock();
        let mut sum = 0.0;
        let mut seen = false;
        for ((n, _), slot) in live.iter() {
            if *n == name {
                sum += slot.value();
                seen = true;
            }
        }
        seen.then_some(sum)
    }

    fn bump(&self, name: &'static str, labels: Option<String>, by: f64) {
        let mut live = self.live.lock();
        match live.entry((name, labels)).or_insert(Slot::Counter(0.0)) {
            Slot::Counter(v) | Slot::Gauge(v) => *v += by,
        }
    }

    fn set(&self, name: &'static str, labels: Option<String>, value: f64) {
        self.live.lock().insert((name, labels), Slot::Gauge(value));
    }

    /// Persist every live value to SQLite. Returns the row count written.
    pub fn snapshot(&self) -> Result<usize, rusqlite::Error> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<(Key, Slot)> = {
            let live = self.live.lock();
            live.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };

        let written = rows.len();
        let db = self.db.lock();
        for ((name, labels), slot) in rows {
            db.execute(
                "INSERT INTO metrics_snapshots (timestamp, name, value, labels, metric_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![now, name, slot.value(), labels, slot.kind().as_str()],
            )?;
        }
        Ok(written)
    }

    /// Query historical snapshots, newest first.
    pub fn query(&self, q: &MetricsQuery) -> Result<Vec<MetricsSnapshot>, rusqlite::Error> {
        let db = self.db.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, name, value, labels, metric_type FROM metrics_snapshots WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(name) = &q.name {
            sql.push_str(&format!(" AND name = ?{}", params.len() + 1));
            params.push(Box::new(name.clone()));
        }
        if let Some(since) = &q.since {
            sql.push_str(&format!(" AND timestamp >= ?{}", params.len() + 1));
            params.push(Box::new(since.clone()));
        }

        sql.push_str(" ORDER BY id DESC");
        let limit = q.limit.unwrap_or(100);
        sql.push_str(&format!(" LIMIT {limit}"));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let kind: String = row.get(5)?;
            Ok(MetricsSnapshot {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                name: row.get(2)?,
                value: row.get(3)?,
                labels: row.get(4)?,
                metric_type: if kind == "gauge" {
                    MetricType::Gauge
                } else {
                    MetricType::Counter
                },
            })
        })?;

        rows.collect()
    }

    /// Prune snapshots older than `retention_days`.
    pub fn prune(&self, retention_days: u32) -> Result<usize, rusqlite::Error> {
        let db = self.db.lock();
        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(i64::from(retention_days)))
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        db.execute(
            "DELETE FROM metrics_snapshots WHERE timestamp < ?1",
            rusqlite::params![cutoff],
        )
    }
}

fn label(key: &str, value: &str) -> Option<String> {
    Some(serde_json::json!({ key: value }).to_string())
}
