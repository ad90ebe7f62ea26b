//! Bridge metrics.
//!
//! Counters are updated on the call path without taking any registry lock.
//! `MetricsSnapshot` is the read-only view exported over HTTP `/stats`, the
//! control plane and the periodic log line.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use super::bridge::ToolBridge;
use crate::domains::sessions::{SessionRegistry, TransportKind};
use crate::domains::tools::ToolRegistry;
use crate::domains::workers::PoolStatus;

/// Outcome label of a successful call.
pub const OUTCOME_SUCCESS: &str = "success";

/// Outcome label of a call whose worker reported `isError`.
pub const OUTCOME_TOOL_ERROR: &str = "tool_error";

#[derive(Debug, Default)]
struct ToolStats {
    outcomes: BTreeMap<String, u64>,
    calls: u64,
    latency_total: Duration,
    latency_max: Duration,
}

/// Counters collected by the bridge.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    tools: DashMap<String, ToolStats>,
    sessions_created: DashMap<TransportKind, u64>,
    auth_rejections: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished tool call.
    pub fn record_call(&self, tool: &str, outcome: &str, elapsed: Duration) {
        let mut stats = self.tools.entry(tool.to_string()).or_default();
        *stats.outcomes.entry(outcome.to_string()).or_insert(0) += 1;
        stats.calls += 1;
        stats.latency_total += elapsed;
        stats.latency_max = stats.latency_max.max(elapsed);
    }

    /// Record an admitted session.
    pub fn record_session(&self, transport: TransportKind) {
        *self.sessions_created.entry(transport).or_insert(0) += 1;
    }

    /// Record a refused connection attempt.
    pub fn record_auth_rejection(&self) {
        self.auth_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Calls recorded for `tool` with `outcome`.
    pub fn calls(&self, tool: &str, outcome: &str) -> u64 {
        self.tools
            .get(tool)
            .and_then(|stats| stats.outcomes.get(outcome).copied())
            .unwrap_or(0)
    }

    /// Build a snapshot combining counters with the current registry state.
    pub fn snapshot(
        &self,
        tools: &ToolRegistry,
        sessions: &SessionRegistry,
        pool: Option<PoolStatus>,
    ) -> MetricsSnapshot {
        let tool_calls = self
            .tools
            .iter()
            .map(|entry| {
                let stats = entry.value();
                let average = if stats.calls == 0 {
                    0.0
                } else {
                    stats.latency_total.as_secs_f64() * 1000.0 / stats.calls as f64
                };
                let view = ToolCallStats {
                    calls: stats.calls,
                    outcomes: stats.outcomes.clone(),
                    latency_avg_ms: average,
                    latency_max_ms: stats.latency_max.as_secs_f64() * 1000.0,
                };
                (entry.key().clone(), view)
            })
            .collect();

        MetricsSnapshot {
            taken_at: Utc::now(),
            tools_registered: tools.len(),
            active_sessions: sessions.count_by_transport(),
            sessions_created: self
                .sessions_created
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            auth_rejections: self.auth_rejections.load(Ordering::Relaxed),
            tool_calls,
            pool,
        }
    }
}

/// Per-tool call statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallStats {
    pub calls: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub latency_avg_ms: f64,
    pub latency_max_ms: f64,
}

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub tools_registered: usize,
    pub active_sessions: BTreeMap<TransportKind, usize>,
    pub sessions_created: BTreeMap<TransportKind, u64>,
    pub auth_rejections: u64,
    pub tool_calls: BTreeMap<String, ToolCallStats>,
    pub pool: Option<PoolStatus>,
}

impl MetricsSnapshot {
    /// Total calls across tools and outcomes.
    pub fn total_calls(&self) -> u64 {
        self.tool_calls.values().map(|stats| stats.calls).sum()
    }

    /// Total active sessions across transports.
    pub fn total_sessions(&self) -> usize {
        self.active_sessions.values().sum()
    }
}

/// Log a metrics line every `interval` until the task is aborted.
pub fn spawn_metrics_logger(bridge: Arc<ToolBridge>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = bridge.snapshot();
            let pool = snapshot.pool.unwrap_or_default();
            info!(
                tools = snapshot.tools_registered,
                sessions = snapshot.total_sessions(),
                calls = snapshot.total_calls(),
                auth_rejections = snapshot.auth_rejections,
                workers = pool.total,
                workers_busy = pool.busy,
                "Bridge metrics"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_record_call_outcomes() {
        let metrics = BridgeMetrics::new();
        metrics.record_call("echo", OUTCOME_SUCCESS, Duration::from_millis(10));
        metrics.record_call("echo", OUTCOME_SUCCESS, Duration::from_millis(30));
        metrics.record_call("echo", "worker_unavailable", Duration::from_millis(1));

        assert_eq!(metrics.calls("echo", OUTCOME_SUCCESS), 2);
        assert_eq!(metrics.calls("echo", "worker_unavailable"), 1);
        assert_eq!(metrics.calls("other", OUTCOME_SUCCESS), 0);

        let snapshot = metrics.snapshot(&ToolRegistry::new(), &SessionRegistry::new(), None);
        let echo = &snapshot.tool_calls["echo"];
        assert_eq!(echo.calls, 3);
        assert_eq!(echo.latency_max_ms, 30.0);
        assert_eq!(snapshot.total_calls(), 3);
    }

    #[test]
    fn test_snapshot_reads_registries() {
        let metrics = BridgeMetrics::new();
        let sessions = SessionRegistry::new();
        sessions.track("a", "", TransportKind::Stream, Map::new());
        sessions.track("b", "", TransportKind::Pipe, Map::new());
        metrics.record_session(TransportKind::Stream);
        metrics.record_auth_rejection();

        let pool = PoolStatus {
            total: 2,
            busy: 1,
            idle: 1,
        };
        let snapshot = metrics.snapshot(&ToolRegistry::new(), &sessions, Some(pool));
        assert_eq!(snapshot.total_sessions(), 2);
        assert_eq!(snapshot.sessions_created[&TransportKind::Stream], 1);
        assert_eq!(snapshot.auth_rejections, 1);
        assert_eq!(snapshot.pool, Some(pool));
    }

    #[test]
    fn test_snapshot_serializes_transport_keys() {
        let metrics = BridgeMetrics::new();
        metrics.record_session(TransportKind::Pipe);
        let snapshot = metrics.snapshot(&ToolRegistry::new(), &SessionRegistry::new(), None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sessions_created"]["pipe"], 1);
    }
}
