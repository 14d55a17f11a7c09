//! Event emission (spec §9 "Event emission": plain enum values dispatched
//! synchronously, no async, no queues). Mirrors the teacher's
//! `scheduler_v2::events` Null/Logging/Collecting sink trio, extended with
//! the `MetricsTracker`/`SpikeDetector` events spec.md §4.2/§4.3 name.

use std::sync::Mutex;

use crate::model::{ResponseMetric, SessionMetrics, SpikeEvent};

/// Events emitted by `MetricsTracker` and the scheduling pipeline.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    SessionStarted { session_id: String },
    SessionEnded { summary: SessionMetrics },
    ItemCompleted { metric: ResponseMetric },
    SpikeDetected { event: SpikeEvent },
    RoundStarted { lego_id: String },
    RoundCompleted { lego_id: String },
    SeedIntroduced { seed_id: String, thread_id: u8 },
    ThreadRotated { from: u8, to: u8 },
}

/// Capability a host installs on `MetricsTracker`/engines to observe events.
/// Listener failures are isolated by the caller (spec §4.2, §7): a panic or
/// logged error in one listener must never affect engine state.
pub trait SchedulerEventSink: Send + Sync {
    fn emit(&self, event: SchedulerEvent);
}

/// No-op sink, zero overhead.
pub struct NullEventSink;

impl SchedulerEventSink for NullEventSink {
    #[inline]
    fn emit(&self, _event: SchedulerEvent) {}
}

/// Sink that forwards events through `tracing` at debug level.
pub struct LoggingEventSink;

impl SchedulerEventSink for LoggingEventSink {
    fn emit(&self, event: SchedulerEvent) {
        tracing::debug!(?event, "scheduler_event");
    }
}

/// Sink that buffers events for test assertions.
#[derive(Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn count_spikes(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::SpikeDetected { .. }))
            .count()
    }
}

impl SchedulerEventSink for CollectingEventSink {
    fn emit(&self, event: SchedulerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_does_nothing() {
        let sink = NullEventSink;
        sink.emit(SchedulerEvent::ThreadRotated { from: 1, to: 2 });
    }

    #[test]
    fn collecting_sink_captures_and_clears() {
        let sink = CollectingEventSink::new();
        sink.emit(SchedulerEvent::ThreadRotated { from: 1, to: 2 });
        sink.emit(SchedulerEvent::SeedIntroduced {
            seed_id: "S0001".into(),
            thread_id: 1,
        });
        assert_eq!(sink.events().len(), 2);
        sink.clear();
        assert_eq!(sink.events().len(), 0);
    }
}
