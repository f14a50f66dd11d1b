//! Relational strategy: one row per `(name, kind)` pair.

use super::{MetricStore, PersistenceBackend};
use crate::core::{
    Batch, MetricKey, MetricKind, MetricSample, MetricValue, MetricaError, Result, Snapshot,
};
use tokio_postgres::{Client, NoTls};

const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS metrics (\
        name    TEXT NOT NULL,\
        kind    TEXT NOT NULL,\
        gauge   DOUBLE PRECISION,\
        counter BIGINT,\
        PRIMARY KEY (name, kind)\
    )";

const UPSERT_GAUGE: &str = "\
    INSERT INTO metrics (name, kind, gauge) VALUES ($1, 'gauge', $2) \
    ON CONFLICT (name, kind) DO UPDATE SET gauge = EXCLUDED.gauge";

const ACCUMULATE_COUNTER: &str = "\
    INSERT INTO metrics (name, kind, counter) VALUES ($1, 'counter', $2) \
    ON CONFLICT (name, kind) DO UPDATE \
    SET counter = COALESCE(metrics.counter, 0) + EXCLUDED.counter";

const OVERWRITE_COUNTER: &str = "\
    INSERT INTO metrics (name, kind, counter) VALUES ($1, 'counter', $2) \
    ON CONFLICT (name, kind) DO UPDATE SET counter = EXCLUDED.counter";

const LOAD_ALL: &str = "SELECT name, kind, gauge, counter FROM metrics";

/// Postgres-backed durability. Merge notifications translate to
/// upsert-with-accumulate for counters and upsert-with-overwrite for
/// gauges; timed flushes overwrite rows with snapshot totals.
pub struct PostgresBackend {
    client: Client,
}

impl PostgresBackend {
    /// Connects, spawns the connection driver task and ensures the schema.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "postgres connection terminated");
            }
        });
        client.execute(SCHEMA, &[]).await?;
        Ok(Self { client })
    }

    async fn upsert(&self, key: &MetricKey, value: MetricValue, accumulate: bool) -> Result<()> {
        match value {
            MetricValue::Gauge(v) => {
                self.client.execute(UPSERT_GAUGE, &[&key.name, &v]).await?;
            },
            MetricValue::Counter(d) => {
                let query = if accumulate { ACCUMULATE_COUNTER } else { OVERWRITE_COUNTER };
                self.client.execute(query, &[&key.name, &d]).await?;
            },
        }
        Ok(())
    }
}

/// Validates a batch for durable upserts. Malformed samples are skipped
/// with a warning, exactly like the in-memory merge skips them, so the
/// database never silently diverges from the store over one bad neighbor.
fn validated_for_upsert(samples: &[MetricSample]) -> Vec<(MetricKey, MetricValue)> {
    samples
        .iter()
        .filter_map(|sample| match sample.validated() {
            Ok(pair) => Some(pair),
            Err(error) => {
                tracing::warn!(id = %sample.id, %error, "skipping malformed sample in durable upsert");
                None
            },
        })
        .collect()
}

/// Maps one row back to wire form. Rejects rows whose kind column does not
/// name a known metric kind.
fn row_to_sample(
    name: String,
    kind: &str,
    gauge: Option<f64>,
    counter: Option<i64>,
) -> Result<MetricSample> {
    match MetricKind::parse(kind)? {
        MetricKind::Gauge => {
            let value = gauge.ok_or_else(|| {
                MetricaError::storage(format!("gauge row {name} has no gauge column"))
            })?;
            Ok(MetricSample::gauge(name, value))
        },
        MetricKind::Counter => {
            let delta = counter.ok_or_else(|| {
                MetricaError::storage(format!("counter row {name} has no counter column"))
            })?;
            Ok(MetricSample::counter(name, delta))
        },
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn notify_merge(&self, batch: &Batch, _store: &MetricStore) -> Result<()> {
        for (key, value) in validated_for_upsert(batch) {
            self.upsert(&key, value, true).await?;
        }
        Ok(())
    }

    async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        // Snapshot values are authoritative totals, so counters overwrite.
        for (key, value) in validated_for_upsert(&snapshot.records) {
            self.upsert(&key, value, false).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let rows = self.client.query(LOAD_ALL, &[]).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            let kind: String = row.get(1);
            let gauge: Option<f64> = row.get(2);
            let counter: Option<i64> = row.get(3);
            records.push(row_to_sample(name, &kind, gauge, counter)?);
        }
        Ok(Some(Snapshot { records }))
    }

    async fn ping(&self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
