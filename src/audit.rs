//! Append-only audit log.
//!
//! Every state transition in the core emits exactly one audit entry.
//! Emission is fire-and-forget from the caller's perspective: a failed
//! append never fails the triggering operation. Failed entries land on
//! a bounded in-process retry queue that is drained opportunistically
//! on subsequent emits; overflow drops the oldest entry, increments
//! the `audit_entries_dropped` counter, and logs a warning.
//!
//! Ordering: entry timestamps give a total order within a single
//! writer; across writers ties break lexicographically on the
//! nanosecond `id`. No cross-record causality is guaranteed.

use crate::config::AuditConfig;
use crate::constants::audit_categories;
use crate::providers::{Clock, GraphStore};
use crate::state::{AuditEntry, Severity};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Days per retention year; leap days are irrelevant at this horizon.
const DAYS_PER_YEAR: i64 = 365;

/// Append-only audit log over the graph store.
pub struct AuditLog<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    store: S,
    clock: C,
    config: AuditConfig,
    /// Entries whose append failed, awaiting retry.
    retry_queue: Mutex<VecDeque<AuditEntry>>,
    /// Entries dropped because the retry queue overflowed.
    dropped: AtomicU64,
}

impl<S, C> AuditLog<S, C>
where
    S: GraphStore + Clone,
    C: Clock + Clone,
{
    /// Create a new audit log.
    #[must_use]
    pub fn new(store: S, clock: C, config: AuditConfig) -> Self {
        Self {
            store,
            clock,
            config,
            retry_queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Retention horizon for a category.
    #[must_use]
    pub fn retention_for(&self, category: &str) -> Duration {
        let years = match category {
            audit_categories::AUTHENTICATION => self.config.authentication_retention_years,
            audit_categories::PII_ACCESS => self.config.pii_retention_years,
            _ => self.config.general_retention_years,
        };
        Duration::days(years * DAYS_PER_YEAR)
    }

    /// Number of entries dropped so far.
    #[must_use]
    pub fn dropped_entries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Append an `INFO` entry.
    pub async fn emit(
        &self,
        category: &str,
        action: &str,
        object_type: &str,
        object_id: &str,
        performed_by: &str,
        details: serde_json::Value,
    ) {
        self.emit_with_severity(
            category,
            action,
            object_type,
            object_id,
            performed_by,
            details,
            Severity::Info,
        )
        .await;
    }

    /// Append an entry with an explicit severity.
    #[allow(clippy::too_many_arguments)]
    pub async fn emit_with_severity(
        &self,
        category: &str,
        action: &str,
        object_type: &str,
        object_id: &str,
        performed_by: &str,
        details: serde_json::Value,
        severity: Severity,
    ) {
        let timestamp = self.clock.now();
        let entry = AuditEntry {
            uid: String::new(),
            id: audit_id(timestamp),
            category: category.to_string(),
            action: action.to_string(),
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            performed_by: performed_by.to_string(),
            timestamp,
            details: details.to_string(),
            severity,
            source: "cerberus-auth".to_string(),
            retention_date: timestamp + self.retention_for(category),
        };

        self.flush_retries().await;

        if let Err(e) = self.store.append_audit(entry.clone()).await {
            tracing::warn!(
                action = %entry.action,
                object_id = %entry.object_id,
                error = %e,
                "audit append failed, queuing for retry"
            );
            self.enqueue(entry);
        }
    }

    /// Retry queued entries, oldest first, stopping at the first
    /// failure so an unavailable store is probed once per emit.
    async fn flush_retries(&self) {
        loop {
            let Some(entry) = self.pop_front() else {
                return;
            };

            if let Err(e) = self.store.append_audit(entry.clone()).await {
                tracing::debug!(error = %e, "audit retry still failing");
                self.requeue_front(entry);
                return;
            }

            tracing::debug!(id = %entry.id, "audit retry succeeded");
        }
    }

    fn enqueue(&self, entry: AuditEntry) {
        let Ok(mut queue) = self.retry_queue.lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if queue.len() >= self.config.retry_queue_capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("audit_entries_dropped").increment(1);
            tracing::warn!(
                capacity = self.config.retry_queue_capacity,
                "audit retry queue overflow, dropping oldest entry"
            );
        }
        queue.push_back(entry);
    }

    fn pop_front(&self) -> Option<AuditEntry> {
        self.retry_queue.lock().ok()?.pop_front()
    }

    fn requeue_front(&self, entry: AuditEntry) {
        if let Ok(mut queue) = self.retry_queue.lock() {
            queue.push_front(entry);
        }
    }
}

/// Nanosecond-timestamp token used as the audit entry id.
fn audit_id(timestamp: DateTime<Utc>) -> String {
    let nanos = timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| timestamp.timestamp_micros().saturating_mul(1_000));
    format!("audit_{nanos}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MemoryGraphStore, MockClock};
    use serde_json::json;

    fn test_log(
        config: AuditConfig,
    ) -> (AuditLog<MemoryGraphStore, MockClock>, MemoryGraphStore) {
        let store = MemoryGraphStore::new();
        let log = AuditLog::new(store.clone(), MockClock::new(), config);
        (log, store)
    }

    #[test]
    fn test_audit_id_shape() {
        let ts = Utc::now();
        let id = audit_id(ts);
        assert!(id.starts_with("audit_"));
        assert!(id.len() > "audit_".len());
    }

    #[tokio::test]
    async fn test_retention_per_category() {
        let (log, _) = test_log(AuditConfig::default());
        assert_eq!(
            log.retention_for(audit_categories::AUTHENTICATION),
            Duration::days(7 * 365)
        );
        assert_eq!(
            log.retention_for(audit_categories::PII_ACCESS),
            Duration::days(7 * 365)
        );
        assert_eq!(log.retention_for("anything-else"), Duration::days(2 * 365));
    }

    #[tokio::test]
    async fn test_failed_append_is_retried_on_next_emit() {
        let (log, store) = test_log(AuditConfig::default());

        store.fail_next_audit_appends(1);
        log.emit("authentication", "first", "T", "1", "system", json!({}))
            .await;
        // The caller was not failed, but nothing landed yet.
        assert!(store.audits().is_empty());

        log.emit("authentication", "second", "T", "2", "system", json!({}))
            .await;

        let actions: Vec<String> = store
            .audits()
            .iter()
            .map(|entry| entry.action.clone())
            .collect();
        // Queued entry drains first, so order is preserved.
        assert_eq!(actions, ["first", "second"]);
        assert_eq!(log.dropped_entries(), 0);
    }

    #[tokio::test]
    async fn test_retry_queue_overflow_drops_oldest() {
        let config = AuditConfig {
            retry_queue_capacity: 2,
            ..AuditConfig::default()
        };
        let (log, store) = test_log(config);

        // Exactly enough failures to cover three emits and the retry
        // probes between them.
        store.fail_next_audit_appends(5);
        for action in ["a", "b", "c"] {
            log.emit("authentication", action, "T", "1", "system", json!({}))
                .await;
        }

        assert_eq!(log.dropped_entries(), 1);

        // Store recovers; the surviving two drain in order.
        log.emit("authentication", "d", "T", "1", "system", json!({}))
            .await;
        let actions: Vec<String> = store
            .audits()
            .iter()
            .map(|entry| entry.action.clone())
            .collect();
        assert_eq!(actions, ["b", "c", "d"]);
    }
}
