//! Broadcast-based publisher for [`InstrumentEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::trace;

use liveprobe_core::InstrumentEvent;

use crate::traits::EventPublisher;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Fans lifecycle events out to any number of subscribers.
///
/// `emit` never blocks. A subscriber that falls more than the channel
/// capacity behind sees `RecvError::Lagged` instead of stalling the engine.
pub struct EventEmitter {
    tx: broadcast::Sender<InstrumentEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Emitter with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Emitter with a custom capacity (clamped to at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Send to every current subscriber. Returns how many received it.
    pub fn emit(&self, event: InstrumentEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        trace!(event = event.event_type(), "emitting");
        self.tx.send(event).unwrap_or(0)
    }

    /// Receiver for events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<InstrumentEvent> {
        self.tx.subscribe()
    }

    /// Active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events emitted so far, delivered or not.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventEmitter {
    fn publish(&self, event: InstrumentEvent) {
        let _ = self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveprobe_core::{LiveInstrument, LocationKey};

    fn applied(id: &str) -> InstrumentEvent {
        InstrumentEvent::applied(LiveInstrument::breakpoint(id, LocationKey::new("a.B", 1)))
    }

    #[test]
    fn emit_with_no_subscribers() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(applied("bp")), 0);
        assert_eq!(emitter.emit_count(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let emitter = EventEmitter::new();
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 2);

        emitter.publish(applied("bp"));

        let r1 = rx1.recv().await.unwrap();
        let r2 = rx2.recv().await.unwrap();
        assert_eq!(r1.event_type(), "breakpoint_applied");
        assert_eq!(r2.instrument_id().map(|id| id.as_str()), Some("bp"));
    }

    #[tokio::test]
    async fn slow_receiver_lags() {
        let emitter = EventEmitter::with_capacity(2);
        let mut rx = emitter.subscribe();
        for id in ["a", "b", "c"] {
            let _ = emitter.emit(applied(id));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let emitter = EventEmitter::default();
        let rx = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 1);
        drop(rx);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let emitter = EventEmitter::with_capacity(0);
        let _rx = emitter.subscribe();
        assert_eq!(emitter.emit(applied("bp")), 1);
    }
}
