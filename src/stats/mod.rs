//! Asynchronous request metrics.
//!
//! Handlers publish one event per request through a bounded channel and
//! never wait: a full channel drops the event, because the counters are
//! advisory. A single consumer task batches updates (ten events or 100 ms,
//! whichever comes first) into a shared snapshot plus a bounded ring of
//! recent requests for the dashboard.


use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bound on queued, not-yet-applied events.
pub const CHANNEL_CAPACITY: usize = 1000;

/// Most recent requests kept for the dashboard.
pub const LIVE_RING_CAPACITY: usize = 100;

const BATCH_SIZE: usize = 10;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// One finished (or failed) request, as published by the handlers.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    pub id: String,
    pub timestamp: i64,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub user_agent: String,
    pub model: String,
    pub streaming: bool,
}

/// Aggregate view served on the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub streaming_requests: u64,
    pub non_streaming_requests: u64,
    pub requests_per_model: HashMap<String, u64>,
    pub fastest_ms: Option<u64>,
    pub slowest_ms: Option<u64>,
    pub average_ms: f64,
}

#[derive(Default)]
struct StatsState {
    snapshot: StatsSnapshot,
    total_duration_ms: u128,
    live: VecDeque<RequestEvent>,
}

impl StatsState {
    fn apply(&mut self, event: RequestEvent) {
        let s = &mut self.snapshot;
        s.total_requests += 1;
        if (200..400).contains(&event.status) {
            s.successful_requests += 1;
        } else {
            s.failed_requests += 1;
        }
        if event.streaming {
            s.streaming_requests += 1;
        } else {
            s.non_streaming_requests += 1;
        }
        if !event.model.is_empty() {
            *s.requests_per_model.entry(event.model.clone()).or_insert(0) += 1;
        }

        s.fastest_ms = Some(match s.fastest_ms {
            Some(f) => f.min(event.duration_ms),
            None => event.duration_ms,
        });
        s.slowest_ms = Some(match s.slowest_ms {
            Some(f) => f.max(event.duration_ms),
            None => event.duration_ms,
        });
        self.total_duration_ms += u128::from(event.duration_ms);
        s.average_ms = self.total_duration_ms as f64 / s.total_requests as f64;

        if self.live.len() == LIVE_RING_CAPACITY {
            self.live.pop_front();
        }
        self.live.push_back(event);
    }
}

/// Process-wide metrics collector.
pub struct StatsCollector {
    tx: RwLock<Option<mpsc::Sender<RequestEvent>>>,
    state: Arc<RwLock<StatsState>>,
    consumer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StatsCollector {
    /// Starts the consumer task. Must be called inside a Tokio runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::channel::<RequestEvent>(CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(StatsState::default()));

        let consumer_state = state.clone();
        let consumer = tokio::spawn(async move {
            let mut batch: Vec<RequestEvent> = Vec::with_capacity(BATCH_SIZE);
            loop {
                let flush_at = tokio::time::sleep(FLUSH_INTERVAL);
                tokio::pin!(flush_at);

                let closed = loop {
                    tokio::select! {
                        event = rx.recv() => match event {
                            Some(event) => {
                                batch.push(event);
                                if batch.len() >= BATCH_SIZE {
                                    break false;
                                }
                            }
                            None => break true,
                        },
                        _ = &mut flush_at => break false,
                    }
                };

                if !batch.is_empty() {
                    let mut state = consumer_state.write();
                    for event in batch.drain(..) {
                        state.apply(event);
                    }
                }

                if closed {
                    return;
                }
            }
        });

        Self {
            tx: RwLock::new(Some(tx)),
            state,
            consumer: parking_lot::Mutex::new(Some(consumer)),
        }
    }

    /// Publishes an event without blocking. Dropped when the queue is full
    /// or the collector is shut down.
    pub fn record(&self, event: RequestEvent) {
        if let Some(tx) = self.tx.read().as_ref() {
            if tx.try_send(event).is_err() {
                debug!("stats channel full, dropping event");
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.state.read().snapshot.clone()
    }

    /// Recent requests, oldest first.
    pub fn live_requests(&self) -> Vec<RequestEvent> {
        self.state.read().live.iter().cloned().collect()
    }

    /// Closes the channel, drains outstanding events and stops the
    /// consumer.
    pub async fn shutdown(&self) {
        self.tx.write().take();
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
