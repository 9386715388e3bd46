// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded ledger of submission attempts.
//!
//! Entries are kept most-recent-first. Once the ledger holds `capacity` entries, every new
//! append evicts the oldest one. Entries are immutable once stored and are shared by reference
//! between the ledger and its readers.

use crate::outcome::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// What kind of submission an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEntryType {
    MetricsApi,
    MetricsDogstatsd,
    LogsApi,
    LogsAgentFile,
    EventsApi,
}

impl HistoryEntryType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetricsApi => "metrics_api",
            Self::MetricsDogstatsd => "metrics_dogstatsd",
            Self::LogsApi => "logs_api",
            Self::LogsAgentFile => "logs_agent_file",
            Self::EventsApi => "events_api",
        }
    }
}

impl FromStr for HistoryEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics_api" => Ok(Self::MetricsApi),
            "metrics_dogstatsd" => Ok(Self::MetricsDogstatsd),
            "logs_api" => Ok(Self::LogsApi),
            "logs_agent_file" => Ok(Self::LogsAgentFile),
            "events_api" => Ok(Self::EventsApi),
            other => Err(format!("unknown history entry type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Short random token, unrelated to the outcome's request id
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: HistoryEntryType,
    pub timestamp: DateTime<Utc>,
    /// The caller payload as it was received
    pub request: Value,
    pub response: Outcome,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(entry_type: HistoryEntryType, request: Value, response: Outcome) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            entry_type,
            timestamp: Utc::now(),
            request,
            response,
        }
    }
}

/// Fixed-capacity, most-recent-first store shared by every producer of outcomes.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    entries: Mutex<VecDeque<Arc<HistoryEntry>>>,
}

impl History {
    /// A capacity of zero is raised to one so that the latest attempt is always inspectable.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stores an entry at the head, evicting the oldest one when full.
    pub fn append(&self, entry: HistoryEntry) -> Arc<HistoryEntry> {
        let entry = Arc::new(entry);
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_back() {
                debug!("History full, evicting entry {}", evicted.id);
            }
        }
        entries.push_front(Arc::clone(&entry));
        entry
    }

    /// Records an outcome together with the request that produced it.
    pub fn record(
        &self,
        entry_type: HistoryEntryType,
        request: Value,
        response: Outcome,
    ) -> Arc<HistoryEntry> {
        self.append(HistoryEntry::new(entry_type, request, response))
    }

    /// Entries most-recent-first, optionally restricted to one type; `limit` applies after
    /// filtering.
    #[must_use]
    pub fn list(
        &self,
        limit: Option<usize>,
        entry_type: Option<HistoryEntryType>,
    ) -> Vec<Arc<HistoryEntry>> {
        let entries = self.lock();
        entries
            .iter()
            .filter(|entry| entry_type.map_or(true, |t| entry.entry_type == t))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<HistoryEntry>> {
        self.lock().iter().find(|entry| entry.id == id).cloned()
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        let dropped = entries.len();
        entries.clear();
        debug!("History cleared ({dropped} entries dropped)");
    }

    /// Pretty-printed JSON array of every entry, most-recent-first like [`History::list`].
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let entries = self.list(None, None);
        let entries: Vec<&HistoryEntry> = entries.iter().map(AsRef::as_ref).collect();
        serde_json::to_string_pretty(&entries)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<HistoryEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Instant;

    fn outcome(n: usize) -> Outcome {
        Outcome::succeeded(&format!("metrics-{n}"), "ok", Instant::now())
    }

    fn push(history: &History, entry_type: HistoryEntryType, n: usize) -> Arc<HistoryEntry> {
        history.record(entry_type, json!({ "n": n }), outcome(n))
    }

    #[test]
    fn test_most_recent_first() {
        let history = History::new(10);
        for n in 0..3 {
            push(&history, HistoryEntryType::MetricsApi, n);
        }
        let ns: Vec<u64> = history
            .list(None, None)
            .iter()
            .map(|e| e.request["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![2, 1, 0]);
    }

    #[test]
    fn test_filter_then_limit() {
        let history = History::new(10);
        push(&history, HistoryEntryType::LogsApi, 0);
        push(&history, HistoryEntryType::MetricsDogstatsd, 1);
        push(&history, HistoryEntryType::LogsApi, 2);
        push(&history, HistoryEntryType::LogsApi, 3);

        let logs = history.list(Some(2), Some(HistoryEntryType::LogsApi));
        let ns: Vec<u64> = logs
            .iter()
            .map(|e| e.request["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![3, 2]);
        assert!(history
            .list(None, Some(HistoryEntryType::EventsApi))
            .is_empty());
    }

    #[test]
    fn test_get_by_id() {
        let history = History::new(5);
        assert!(history.get("missing").is_none());
        let entry = push(&history, HistoryEntryType::EventsApi, 1);
        assert_eq!(entry.id.len(), 8);
        assert_eq!(history.get(&entry.id).unwrap().as_ref(), entry.as_ref());
        assert!(history.get("nope").is_none());
    }

    #[test]
    fn test_clear() {
        let history = History::new(5);
        push(&history, HistoryEntryType::LogsAgentFile, 1);
        history.clear();
        assert!(history.is_empty());
        assert!(history.list(None, None).is_empty());
        assert_eq!(history.export_json().unwrap(), "[]");
    }

    #[test]
    fn test_list_is_idempotent() {
        let history = History::new(5);
        push(&history, HistoryEntryType::MetricsApi, 1);
        push(&history, HistoryEntryType::LogsApi, 2);
        assert_eq!(history.list(None, None), history.list(None, None));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_export_json_shape() {
        let history = History::new(5);
        let entry = push(&history, HistoryEntryType::MetricsDogstatsd, 1);
        let exported: Value = serde_json::from_str(&history.export_json().unwrap()).unwrap();
        assert_eq!(exported[0]["id"], entry.id.as_str());
        assert_eq!(exported[0]["type"], "metrics_dogstatsd");
        assert_eq!(exported[0]["response"]["request_id"], "metrics-1");
    }

    #[test]
    fn test_entry_type_parsing() {
        for t in [
            HistoryEntryType::MetricsApi,
            HistoryEntryType::MetricsDogstatsd,
            HistoryEntryType::LogsApi,
            HistoryEntryType::LogsAgentFile,
            HistoryEntryType::EventsApi,
        ] {
            assert_eq!(t.as_str().parse::<HistoryEntryType>(), Ok(t));
        }
        assert!("traces".parse::<HistoryEntryType>().is_err());
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let history = History::new(0);
        push(&history, HistoryEntryType::MetricsApi, 1);
        push(&history, HistoryEntryType::MetricsApi, 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.list(None, None)[0].request["n"], 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_respect_capacity() {
        let history = Arc::new(History::new(50));
        let mut handles = Vec::new();
        for task in 0..8 {
            let history = Arc::clone(&history);
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    push(&history, HistoryEntryType::MetricsApi, task * 100 + n);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(history.len(), 50);
    }

    proptest! {
        #[test]
        fn holds_the_most_recent_entries(capacity in 1usize..20, extra in 1usize..20) {
            let history = History::new(capacity);
            let total = capacity + extra;
            for n in 0..total {
                push(&history, HistoryEntryType::MetricsApi, n);
            }
            let ns: Vec<usize> = history
                .list(None, None)
                .iter()
                .map(|e| e.request["n"].as_u64().unwrap() as usize)
                .collect();
            let expected: Vec<usize> = (extra..total).rev().collect();
            prop_assert_eq!(ns, expected);
        }
    }
}
