//! Search analytics: fire-and-forget capture and aggregate reporting.
//!
//! # Write Path
//!
//! The query executor hands each committed search to [`Recorder::record`],
//! which only does a `try_send` onto a bounded channel. A single background
//! worker drains the channel into an [`AnalyticsStore`]. A full queue, a
//! store failure or a stopped worker is logged and dropped; none of them
//! can delay or fail the search that produced the event.
//!
//! The worker runs under a supervisor task that restarts it if it panics.
//!
//! # Read Path
//!
//! [`SqliteAnalytics::overview`] aggregates the last N days:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `totalSearches` | events in the window |
//! | `uniqueQueries` | distinct query strings |
//! | `avgResultsPerQuery` | mean `resultsCount` (0 when empty) |
//! | `searchVolume` | per-UTC-day counts, most recent first |
//! | `topQueries` | most frequent queries among searches that found something, with their mean results |
//! | `noResultQueries` | most frequent queries that found nothing |

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::now_ts;
use crate::error::PortalResult;
use crate::models::SearchAnalyticsEvent;

const SECONDS_PER_DAY: i64 = 86_400;

/// Request metadata attached to an analytics event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Persistence for analytics events.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn insert(&self, event: &SearchAnalyticsEvent) -> PortalResult<()>;
}

/// Handle for submitting events to the background worker.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<SearchAnalyticsEvent>,
}

impl Recorder {
    /// Start the worker and its supervisor.
    ///
    /// The returned handle finishes once every `Recorder` clone has been
    /// dropped and the queue is drained.
    pub fn spawn(store: Arc<dyn AnalyticsStore>, capacity: usize) -> (Recorder, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let supervisor = tokio::spawn(supervise(rx, store));
        (Recorder { tx }, supervisor)
    }

    /// Queue one event. Never blocks and never fails the caller.
    ///
    /// Returns whether the event was accepted onto the queue. Blank
    /// queries are ignored.
    pub fn record(&self, query: &str, results_count: u64, caller: &CallerInfo) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }

        let event = SearchAnalyticsEvent {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            results_count,
            user_ip: caller.ip.clone(),
            user_agent: caller.user_agent.clone(),
            created_at: now_ts(),
        };

        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(query = %event.query, "analytics queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(query = %event.query, "analytics worker stopped, dropping event");
                false
            }
        }
    }
}

async fn supervise(
    rx: Arc<Mutex<mpsc::Receiver<SearchAnalyticsEvent>>>,
    store: Arc<dyn AnalyticsStore>,
) {
    loop {
        let worker = tokio::spawn(drain(rx.clone(), store.clone()));
        match worker.await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                tracing::error!("analytics worker panicked, restarting");
            }
            Err(_) => break,
        }
    }
    tracing::debug!("analytics worker stopped");
}

async fn drain(rx: Arc<Mutex<mpsc::Receiver<SearchAnalyticsEvent>>>, store: Arc<dyn AnalyticsStore>) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(event) = next else {
            return;
        };
        if let Err(e) = store.insert(&event).await {
            tracing::warn!(
                query = %event.query,
                error = %e,
                details = e.details().unwrap_or_default(),
                "failed to persist search analytics"
            );
        }
    }
}

// ============ Reporting ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

impl DateRange {
    fn window(since: i64, now: i64, days: Option<u32>) -> Self {
        Self {
            start: format_iso(since),
            end: format_iso(now),
            days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    pub total_searches: u64,
    pub unique_queries: u64,
    pub avg_results_per_query: f64,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayVolume {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopQuery {
    pub query: String,
    pub count: u64,
    pub avg_results: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZeroResultQuery {
    pub query: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub overview: OverviewTotals,
    pub search_volume: Vec<DayVolume>,
    pub top_queries: Vec<TopQuery>,
    pub no_result_queries: Vec<ZeroResultQuery>,
}

/// `2024-03-01T12:00:00.000Z`
pub fn format_iso(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ts.to_string())
}

/// SQLite-backed analytics store and report queries.
#[derive(Clone)]
pub struct SqliteAnalytics {
    pool: SqlitePool,
}

impl SqliteAnalytics {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Aggregates over the last `days` days; top lists hold `limit` rows.
    pub async fn overview(&self, days: u32, limit: u32) -> PortalResult<AnalyticsOverview> {
        let now = now_ts();
        let since = now - days as i64 * SECONDS_PER_DAY;

        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT query) AS uniq, AVG(results_count) AS avg
             FROM search_analytics WHERE created_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let volume = sqlx::query(
            "SELECT date(created_at, 'unixepoch') AS day, COUNT(*) AS count
             FROM search_analytics WHERE created_at >= ?
             GROUP BY day ORDER BY day DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let top = sqlx::query(
            "SELECT query, COUNT(*) AS count, AVG(results_count) AS avg_results
             FROM search_analytics WHERE results_count > 0 AND created_at >= ?
             GROUP BY query ORDER BY count DESC, query ASC LIMIT ?",
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let zero = sqlx::query(
            "SELECT query, COUNT(*) AS count
             FROM search_analytics WHERE results_count = 0 AND created_at >= ?
             GROUP BY query ORDER BY count DESC, query ASC LIMIT ?",
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalyticsOverview {
            overview: OverviewTotals {
                total_searches: totals.get::<i64, _>("total") as u64,
                unique_queries: totals.get::<i64, _>("uniq") as u64,
                avg_results_per_query: totals.get::<Option<f64>, _>("avg").unwrap_or(0.0),
                date_range: DateRange::window(since, now, Some(days)),
            },
            search_volume: volume
                .iter()
                .map(|r| DayVolume {
                    date: r.get("day"),
                    count: r.get::<i64, _>("count") as u64,
                })
                .collect(),
            top_queries: top
                .iter()
                .map(|r| TopQuery {
                    query: r.get("query"),
                    count: r.get::<i64, _>("count") as u64,
                    avg_results: r.get::<Option<f64>, _>("avg_results").unwrap_or(0.0),
                })
                .collect(),
            no_result_queries: zero
                .iter()
                .map(|r| ZeroResultQuery {
                    query: r.get("query"),
                    count: r.get::<i64, _>("count") as u64,
                })
                .collect(),
        })
    }

    /// Events from the last `days` days, newest first, with the window.
    pub async fn events_since(&self, days: u32) -> PortalResult<(Vec<SearchAnalyticsEvent>, DateRange)> {
        let now = now_ts();
        let since = now - days as i64 * SECONDS_PER_DAY;

        let rows = sqlx::query(
            "SELECT id, query, results_count, user_ip, user_agent, created_at
             FROM search_analytics WHERE created_at >= ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .iter()
            .map(|r| SearchAnalyticsEvent {
                id: r.get("id"),
                query: r.get("query"),
                results_count: r.get::<i64, _>("results_count") as u64,
                user_ip: r.get("user_ip"),
                user_agent: r.get("user_agent"),
                created_at: r.get("created_at"),
            })
            .collect();

        Ok((events, DateRange::window(since, now, None)))
    }

    pub async fn count(&self) -> PortalResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_analytics")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalytics {
    async fn insert(&self, event: &SearchAnalyticsEvent) -> PortalResult<()> {
        sqlx::query(
            "INSERT INTO search_analytics (id, query, results_count, user_ip, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.query)
        .bind(event.results_count as i64)
        .bind(&event.user_ip)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingStore(StdMutex<Vec<SearchAnalyticsEvent>>);

    #[async_trait]
    impl AnalyticsStore for CollectingStore {
        async fn insert(&self, event: &SearchAnalyticsEvent) -> PortalResult<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl AnalyticsStore for FailingStore {
        async fn insert(&self, _event: &SearchAnalyticsEvent) -> PortalResult<()> {
            Err(PortalError::upstream("Database unavailable", "disk full"))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl AnalyticsStore for SlowStore {
        async fn insert(&self, _event: &SearchAnalyticsEvent) -> PortalResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_records_trimmed_query_and_drains_on_drop() {
        let store = Arc::new(CollectingStore::default());
        let (recorder, worker) = Recorder::spawn(store.clone(), 8);

        let caller = CallerInfo {
            ip: Some("10.0.0.1".into()),
            user_agent: Some("curl/8".into()),
        };
        assert!(recorder.record("  payroll ", 3, &caller));
        assert!(!recorder.record("   ", 0, &caller));

        drop(recorder);
        worker.await.unwrap();

        let events = store.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].query, "payroll");
        assert_eq!(events[0].results_count, 3);
        assert_eq!(events[0].user_ip.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let (recorder, worker) = Recorder::spawn(Arc::new(FailingStore), 8);
        assert!(recorder.record("payroll", 1, &CallerInfo::default()));
        assert!(recorder.record("benefits", 0, &CallerInfo::default()));
        drop(recorder);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (recorder, _worker) = Recorder::spawn(Arc::new(SlowStore), 1);
        let started = std::time::Instant::now();
        let accepted = (0..10)
            .filter(|i| recorder.record(&format!("q{}", i), 0, &CallerInfo::default()))
            .count();
        assert!(accepted < 10);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_format_iso() {
        assert_eq!(format_iso(0), "1970-01-01T00:00:00.000Z");
    }
}
