use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use pushmon_common::types::{Metric, MetricKind, MetricValue};

use crate::error::StorageError;
use crate::MetricStore;

/// The merge contract expressed as a conflict clause: the database itself
/// overwrites gauges and accumulates counter deltas.
const UPSERT: &str = "INSERT INTO metric (name, kind, delta, value) VALUES (?1, ?2, ?3, ?4)
 ON CONFLICT(name) DO UPDATE
 SET kind = excluded.kind, delta = metric.delta + excluded.delta, value = excluded.value";

/// SQLite-backed metric store. State and durability live in one table keyed
/// by metric name; `save` is a no-op because every mutation is durable.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`. A schema-initialization
    /// failure is logged but does not fail construction: the backend must
    /// still come up far enough to answer `ping`.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        if let Err(err) = init_schema(&conn) {
            tracing::error!(error = %err, "initializing metric table");
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metric (
            name  TEXT PRIMARY KEY,
            kind  TEXT NOT NULL,
            delta INTEGER NOT NULL DEFAULT 0,
            value REAL NOT NULL DEFAULT 0.0
         );
         CREATE INDEX IF NOT EXISTS idx_metric_name ON metric (name);",
    )?;
    Ok(())
}

fn to_columns(metric: &Metric) -> (&str, &'static str, i64, f64) {
    match metric.value {
        MetricValue::Gauge(value) => (metric.id.as_str(), "gauge", 0, value),
        MetricValue::Counter(delta) => (metric.id.as_str(), "counter", delta, 0.0),
    }
}

fn from_columns(name: String, kind: String, delta: i64, value: f64) -> Option<Metric> {
    match kind.parse::<MetricKind>() {
        Ok(MetricKind::Gauge) => Some(Metric::gauge(name, value)),
        Ok(MetricKind::Counter) => Some(Metric::counter(name, delta)),
        Err(_) => {
            tracing::warn!(name, kind, "skipping row with unrecognized kind");
            None
        }
    }
}

type Row = (String, String, i64, f64);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

impl MetricStore for SqliteStore {
    fn get(&self, id: &str) -> Option<Metric> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, kind, delta, value FROM metric WHERE name = ?1",
                params![id],
                read_row,
            )
            .optional();
        match row {
            Ok(Some((name, kind, delta, value))) => from_columns(name, kind, delta, value),
            Ok(None) => None,
            Err(err) => {
                tracing::error!(id, error = %err, "reading metric");
                None
            }
        }
    }

    fn get_all(&self) -> HashMap<String, Metric> {
        let conn = self.conn.lock().unwrap();
        let mut read = || -> Result<HashMap<String, Metric>, StorageError> {
            let mut stmt = conn.prepare_cached("SELECT name, kind, delta, value FROM metric")?;
            let rows = stmt.query_map([], read_row)?;
            let mut metrics = HashMap::new();
            for row in rows {
                let (name, kind, delta, value) = row?;
                if let Some(metric) = from_columns(name, kind, delta, value) {
                    metrics.insert(metric.id.clone(), metric);
                }
            }
            Ok(metrics)
        };
        match read() {
            Ok(metrics) => metrics,
            Err(err) => {
                tracing::error!(error = %err, "reading all metrics");
                HashMap::new()
            }
        }
    }

    fn set(&self, metric: Metric) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let (name, kind, delta, value) = to_columns(&metric);
        conn.execute(UPSERT, params![name, kind, delta, value])?;
        Ok(())
    }

    fn set_all(&self, batch: &[Metric]) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        // One transaction per batch: any failed upsert rolls back the lot.
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT)?;
            for metric in batch {
                let (name, kind, delta, value) = to_columns(metric);
                stmt.execute(params![name, kind, delta, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM metric WHERE name = ?1", params![id])?;
        Ok(())
    }

    fn ping(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn save(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
