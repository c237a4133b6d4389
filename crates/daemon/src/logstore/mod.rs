// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log Store & Pub/Sub: a bounded ring buffer with monotonic sequence
//! numbers, a clear watermark, and multi-subscriber drop-oldest fan-out.
//!
//! A single mutex covers sequence allocation, ring modification, and
//! subscriber iteration, following the producer-lock pattern this lineage
//! uses for its own bounded queues: never block the ingest path under a slow
//! subscriber, and iterate a snapshot of subscribers so a concurrent
//! unsubscribe cannot re-enter the broadcast.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub sequence_number: u64,
    pub timestamp_ms: u64,
    pub source: String,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A subscriber's own bounded backlog, owned jointly by the store (which
/// pushes into it) and the `LogSubscription` handle (which drains it). This
/// is what makes true drop-oldest possible: a plain `tokio::sync::mpsc`
/// channel blocks or rejects the producer on `Full` rather than evicting the
/// receiver's own oldest buffered item, so the queue is reimplemented here
/// with the producer holding eviction rights.
struct SubscriberQueue {
    backlog: Mutex<VecDeque<LogEntry>>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn push(&self, entry: LogEntry) {
        let mut backlog = self.backlog.lock();
        if backlog.len() >= self.capacity {
            backlog.pop_front();
        }
        backlog.push_back(entry);
        drop(backlog);
        self.notify.notify_one();
    }
}

struct Inner {
    ring: VecDeque<LogEntry>,
    capacity: usize,
    next_sequence: u64,
    clear_watermark: u64,
    subscribers: Vec<Arc<SubscriberQueue>>,
}

/// Bounded append-only log with fan-out subscriptions.
pub struct LogStore {
    inner: Mutex<Inner>,
    subscription_capacity: usize,
}

/// A bounded, drop-oldest subscription to the store. Dropping the
/// subscription releases the store's reference to its backlog on the next
/// append (pruned via `Arc::strong_count`).
pub struct LogSubscription {
    state: Arc<SubscriberQueue>,
}

impl LogSubscription {
    /// Waits for the next entry. Never resolves to an end-of-stream value;
    /// callers that want to stop simply stop polling and drop the
    /// subscription.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        loop {
            if let Some(entry) = self.state.backlog.lock().pop_front() {
                return Some(entry);
            }
            self.state.notify.notified().await;
        }
    }
}

impl LogStore {
    pub fn new(capacity: usize, subscription_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                next_sequence: 0,
                clear_watermark: 0,
                subscribers: Vec::new(),
            }),
            subscription_capacity,
        }
    }

    /// Assign the next sequence number, push to the ring (evicting the
    /// oldest entry on overflow), then fan out to subscribers non-blocking.
    pub fn append(
        &self,
        source: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
        stack_trace: Option<String>,
        color: Option<String>,
    ) -> LogEntry {
        let mut inner = self.inner.lock();
        let sequence_number = inner.next_sequence;
        inner.next_sequence += 1;

        let entry = LogEntry {
            sequence_number,
            timestamp_ms: now_ms(),
            source: source.into(),
            level: level.into(),
            message: message.into(),
            stack_trace,
            color,
        };

        if inner.ring.len() >= inner.capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(entry.clone());

        // Prune subscribers whose `LogSubscription` was dropped: the store
        // holds the only remaining strong reference at that point.
        inner.subscribers.retain(|sub| Arc::strong_count(sub) > 1);
        for sub in &inner.subscribers {
            sub.push(entry.clone());
        }

        entry
    }

    /// `recent(count, source_filter, include_cleared)`.
    pub fn recent(&self, count: usize, source_filter: &str, include_cleared: bool) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        let watermark = if include_cleared { 0 } else { inner.clear_watermark };

        let filtered: Vec<LogEntry> = inner
            .ring
            .iter()
            .filter(|e| source_filter == "all" || e.source == source_filter)
            .filter(|e| e.sequence_number >= watermark)
            .cloned()
            .collect();

        if count == 0 {
            filtered
        } else {
            let start = filtered.len().saturating_sub(count);
            filtered[start..].to_vec()
        }
    }

    /// Advance the clear watermark to the next sequence number. Does not
    /// delete any entries; only changes what a default `recent` query sees.
    pub fn clear(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.clear_watermark = inner.next_sequence;
        inner.clear_watermark
    }

    pub fn subscribe(&self) -> LogSubscription {
        let state = Arc::new(SubscriberQueue {
            backlog: Mutex::new(VecDeque::with_capacity(self.subscription_capacity)),
            notify: Notify::new(),
            capacity: self.subscription_capacity,
        });
        self.inner.lock().subscribers.push(state.clone());
        LogSubscription { state }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|sub| Arc::strong_count(sub) > 1);
        inner.subscribers.len()
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis() as u64
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
