//! Backend console log: bounded ring buffer with live fan-out.
//!
//! One `ConsoleLog` is constructed at process start and injected wherever
//! handlers need to record activity; it is never reconstructed. Entries live
//! only for the lifetime of the server process - this is operational
//! visibility for the browser console, not an audit log. The server's own
//! diagnostics go through `tracing`, a separate channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Entries retained before the oldest are evicted.
pub const MAX_ENTRIES: usize = 500;
/// Message length at which entries are clamped.
pub const MAX_MESSAGE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One timestamped, leveled, length-bounded unit of backend activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 UTC, millisecond precision.
    pub ts: String,
    pub level: LogLevel,
    pub message: String,
}

struct Inner {
    capacity: usize,
    buffer: VecDeque<LogEntry>,
    /// Insertion-ordered so fan-out happens in subscription order.
    subscribers: Vec<(u64, mpsc::UnboundedSender<LogEntry>)>,
    next_id: u64,
}

/// Process-wide log store with publish/subscribe fan-out.
pub struct ConsoleLog {
    inner: Mutex<Inner>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                buffer: VecDeque::with_capacity(capacity.min(MAX_ENTRIES)),
                subscribers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("console log mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record one line of backend activity.
    ///
    /// Clamps the message, appends to the ring buffer (evicting the oldest
    /// entries past the cap), then fans the entry out to every live
    /// subscriber. Append and fan-out happen under one lock, so every
    /// subscriber observes the same global entry order. Never blocks and
    /// never fails visibly: a subscriber whose receiver is gone is pruned
    /// without affecting delivery to the others.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            message: clamp_message(message.into()),
        };

        let mut inner = self.lock();
        inner.buffer.push_back(entry.clone());
        while inner.buffer.len() > inner.capacity {
            inner.buffer.pop_front();
        }
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(entry.clone()).is_ok());
    }

    /// Ordered copy of the current buffer, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().buffer.iter().cloned().collect()
    }

    /// Register a subscriber for future entries.
    ///
    /// The returned `Subscription` removes the subscriber when dropped;
    /// `unsubscribe` may also be called explicitly and is idempotent.
    pub fn subscribe(self: &Arc<Self>) -> (Subscription, mpsc::UnboundedReceiver<LogEntry>) {
        let mut inner = self.lock();
        let (subscription, rx) = register(self, &mut inner);
        (subscription, rx)
    }

    /// Snapshot and subscribe under a single lock acquisition.
    ///
    /// Guarantees replay-then-follow with no gap: an entry appended after
    /// the snapshot was taken is always delivered through the receiver.
    pub fn subscribe_with_snapshot(
        self: &Arc<Self>,
    ) -> (Vec<LogEntry>, Subscription, mpsc::UnboundedReceiver<LogEntry>) {
        let mut inner = self.lock();
        let snapshot = inner.buffer.iter().cloned().collect();
        let (subscription, rx) = register(self, &mut inner);
        (snapshot, subscription, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn remove_subscriber(&self, id: u64) {
        self.lock().subscribers.retain(|(sid, _)| *sid != id);
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new()
    }
}

fn register(
    console: &Arc<ConsoleLog>,
    inner: &mut Inner,
) -> (Subscription, mpsc::UnboundedReceiver<LogEntry>) {
    let id = inner.next_id;
    inner.next_id += 1;
    let (tx, rx) = mpsc::unbounded_channel();
    inner.subscribers.push((id, tx));
    (
        Subscription {
            id,
            console: Arc::clone(console),
        },
        rx,
    )
}

/// Handle that keeps a subscriber registered; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    console: Arc<ConsoleLog>,
}

impl Subscription {
    /// Remove the subscriber. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.console.remove_subscriber(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.console.remove_subscriber(self.id);
    }
}

fn clamp_message(value: String) -> String {
    match value.char_indices().nth(MAX_MESSAGE) {
        None => value,
        Some((idx, _)) => format!("{}...", &value[..idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn snapshot_keeps_most_recent_entries_oldest_first() {
        let console = ConsoleLog::with_capacity(3);
        for i in 0..5 {
            console.log(LogLevel::Info, format!("entry {i}"));
        }

        let snapshot = console.snapshot();
        assert_eq!(messages(&snapshot), vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let console = ConsoleLog::new();
        console.log(LogLevel::Info, "one");

        let mut snapshot = console.snapshot();
        snapshot.clear();

        assert_eq!(console.snapshot().len(), 1);
    }

    #[test]
    fn messages_are_clamped_with_ellipsis() {
        let console = ConsoleLog::new();
        console.log(LogLevel::Info, "x".repeat(MAX_MESSAGE + 50));

        let snapshot = console.snapshot();
        assert_eq!(snapshot[0].message.len(), MAX_MESSAGE + 3);
        assert!(snapshot[0].message.ends_with("..."));
    }

    #[test]
    fn timestamps_carry_millisecond_precision() {
        let console = ConsoleLog::new();
        console.log(LogLevel::Debug, "tick");

        let ts = &console.snapshot()[0].ts;
        // e.g. 2026-08-30T12:34:56.789Z
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.split('.').nth(1).map(|frac| frac.len()), Some(4));
    }

    #[tokio::test]
    async fn subscriber_receives_entries_in_order_exactly_once() {
        let console = Arc::new(ConsoleLog::new());
        let (_subscription, mut rx) = console.subscribe();

        for i in 0..3 {
            console.log(LogLevel::Info, format!("line {i}"));
        }

        for i in 0..3 {
            let entry = rx.recv().await.expect("entry");
            assert_eq!(entry.message, format!("line {i}"));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_is_idempotent() {
        let console = Arc::new(ConsoleLog::new());
        let (subscription, mut rx) = console.subscribe();

        console.log(LogLevel::Info, "before");
        subscription.unsubscribe();
        subscription.unsubscribe();
        console.log(LogLevel::Info, "after");

        assert_eq!(rx.recv().await.expect("entry").message, "before");
        assert!(rx.recv().await.is_none());
        assert_eq!(console.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let console = Arc::new(ConsoleLog::new());
        {
            let (_subscription, _rx) = console.subscribe();
            assert_eq!(console.subscriber_count(), 1);
        }
        assert_eq!(console.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_break_delivery_to_others() {
        let console = Arc::new(ConsoleLog::new());
        let (sub_a, rx_a) = console.subscribe();
        let (_sub_b, mut rx_b) = console.subscribe();

        // Receiver gone without unsubscribing - the send failure must be
        // contained to this subscriber.
        drop(rx_a);
        console.log(LogLevel::Info, "still flowing");

        assert_eq!(rx_b.recv().await.expect("entry").message, "still flowing");
        assert_eq!(console.subscriber_count(), 1);
        drop(sub_a);
    }

    #[tokio::test]
    async fn two_subscribers_observe_the_same_global_order() {
        let console = Arc::new(ConsoleLog::new());
        let (_sub_a, mut rx_a) = console.subscribe();
        console.log(LogLevel::Info, "first");
        let (_sub_b, mut rx_b) = console.subscribe();

        console.log(LogLevel::Warn, "second");
        console.log(LogLevel::Error, "third");

        assert_eq!(rx_a.recv().await.expect("entry").message, "first");
        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await.expect("entry").message, "second");
            assert_eq!(rx.recv().await.expect("entry").message, "third");
        }
    }

    #[tokio::test]
    async fn snapshot_and_subscription_leave_no_gap() {
        let console = Arc::new(ConsoleLog::new());
        console.log(LogLevel::Info, "replayed");

        let (snapshot, _subscription, mut rx) = console.subscribe_with_snapshot();
        console.log(LogLevel::Info, "live");

        assert_eq!(messages(&snapshot), vec!["replayed"]);
        assert_eq!(rx.recv().await.expect("entry").message, "live");
    }
}
