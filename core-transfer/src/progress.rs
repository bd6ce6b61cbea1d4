//! Progress reporting for single-file transfers.

use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Progress of the file currently being transferred.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub filename: String,
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Time since this file started
    pub elapsed: Duration,
    pub speed_bytes_per_sec: u64,
}

impl ProgressSnapshot {
    /// Build a snapshot; zero elapsed time reports zero speed.
    pub fn new(filename: impl Into<String>, bytes_done: u64, total_bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let speed_bytes_per_sec = if secs > 0.0 {
            (bytes_done as f64 / secs) as u64
        } else {
            0
        };

        Self {
            filename: filename.into(),
            bytes_done,
            total_bytes,
            elapsed,
            speed_bytes_per_sec,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_done as f64 * 100.0 / self.total_bytes as f64
    }
}

/// Receiver of progress snapshots.
///
/// Called from the transfer loop after every chunk; implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

/// Discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn report(&self, _snapshot: &ProgressSnapshot) {}
}

/// Forwards snapshots into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressSnapshot>,
}

impl ChannelProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressSnapshot>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressSnapshot>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, snapshot: &ProgressSnapshot) {
        // A dropped receiver just means nobody is watching.
        self.sender.send(snapshot.clone()).ok();
    }
}

/// Publishes snapshots as `TransferEvent::Progress` on the event bus.
#[derive(Debug, Clone)]
pub struct EventBusProgressSink {
    event_bus: EventBus,
    job_id: String,
}

impl EventBusProgressSink {
    pub fn new(event_bus: EventBus, job_id: impl Into<String>) -> Self {
        Self {
            event_bus,
            job_id: job_id.into(),
        }
    }
}

impl ProgressSink for EventBusProgressSink {
    fn report(&self, snapshot: &ProgressSnapshot) {
        self.event_bus
            .emit(CoreEvent::Transfer(TransferEvent::Progress {
                job_id: self.job_id.clone(),
                filename: snapshot.filename.clone(),
                bytes_done: snapshot.bytes_done,
                total_bytes: snapshot.total_bytes,
                speed_bytes_per_sec: snapshot.speed_bytes_per_sec,
            }))
            .ok();
    }
}
