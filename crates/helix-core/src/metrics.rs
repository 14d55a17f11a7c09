//! C2: MetricsTracker (spec §4.2). Owns the rolling window of normalized
//! latencies that `SpikeDetector` and `AdaptationEngine` read from, plus the
//! current session's metric/spike log.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::events::{SchedulerEvent, SchedulerEventSink};
use crate::model::{ItemMode, LegoId, ResponseMetric, SessionMetrics, SpikeEvent, ThreadId, TimingFields};

#[derive(Debug, Default, Clone, Copy)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub len: usize,
}

fn mean_and_std_dev(samples: impl Iterator<Item = f64> + Clone) -> RollingStats {
    let values: Vec<f64> = samples.collect();
    let len = values.len();
    if len == 0 {
        return RollingStats::default();
    }
    let mean = values.iter().sum::<f64>() / len as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len as f64;
    RollingStats {
        mean,
        std_dev: variance.sqrt(),
        len,
    }
}

pub struct MetricsTracker {
    rolling_window_size: usize,
    rolling_window: VecDeque<f64>,
    duration_delta_window: VecDeque<f64>,
    current_session: Option<SessionMetrics>,
    listeners: Vec<Arc<dyn SchedulerEventSink>>,
}

impl MetricsTracker {
    pub fn new(rolling_window_size: usize) -> Self {
        Self {
            rolling_window_size: rolling_window_size.max(1),
            rolling_window: VecDeque::with_capacity(rolling_window_size),
            duration_delta_window: VecDeque::with_capacity(rolling_window_size),
            current_session: None,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, sink: Arc<dyn SchedulerEventSink>) {
        self.listeners.push(sink);
    }

    fn emit(&self, event: SchedulerEvent) {
        for listener in &self.listeners {
            let listener = listener.clone();
            let event = event.clone();
            // A failing listener must never poison tracker state (spec §7).
            if catch_unwind(AssertUnwindSafe(|| listener.emit(event))).is_err() {
                tracing::warn!("scheduler event listener panicked, ignoring");
            }
        }
    }

    pub fn start_session(&mut self, session_id: String, now: DateTime<Utc>) -> &SessionMetrics {
        self.rolling_window.clear();
        self.duration_delta_window.clear();
        self.current_session = Some(SessionMetrics::new(session_id.clone(), now));
        self.emit(SchedulerEvent::SessionStarted { session_id });
        self.current_session.as_ref().expect("just set")
    }

    pub fn end_session(&mut self, now: DateTime<Utc>) -> Option<SessionMetrics> {
        let mut session = self.current_session.take()?;
        session.ended_at = Some(now);
        session.final_rolling_average = if self.rolling_window.is_empty() {
            None
        } else {
            Some(self.rolling_average().mean)
        };
        self.emit(SchedulerEvent::SessionEnded {
            summary: session.clone(),
        });
        Some(session)
    }

    pub fn current_session(&self) -> Option<&SessionMetrics> {
        self.current_session.as_ref()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_response(
        &mut self,
        lego_id: LegoId,
        thread_id: ThreadId,
        mode: ItemMode,
        response_latency_ms: u32,
        phrase_length: u32,
        timing: Option<TimingFields>,
        now: DateTime<Utc>,
    ) -> ResponseMetric {
        let normalized_latency = ResponseMetric::normalize(response_latency_ms, phrase_length);

        self.rolling_window.push_back(normalized_latency);
        while self.rolling_window.len() > self.rolling_window_size {
            self.rolling_window.pop_front();
        }
        if let Some(t) = &timing {
            self.duration_delta_window.push_back(t.duration_delta_ms);
            while self.duration_delta_window.len() > self.rolling_window_size {
                self.duration_delta_window.pop_front();
            }
        }

        let metric = ResponseMetric {
            lego_id,
            timestamp: now,
            response_latency_ms,
            phrase_length,
            normalized_latency,
            thread_id,
            mode,
            triggered_spike: false,
            timing,
        };

        if let Some(session) = &mut self.current_session {
            session.metrics.push(metric.clone());
        }
        self.emit(SchedulerEvent::ItemCompleted {
            metric: metric.clone(),
        });
        metric
    }

    /// Records a spike already classified by `SpikeDetector`, marking the
    /// most recent matching metric as having triggered it.
    pub fn record_spike(&mut self, event: SpikeEvent) {
        if let Some(session) = &mut self.current_session {
            if let Some(last) = session
                .metrics
                .iter_mut()
                .rev()
                .find(|m| m.lego_id == event.lego_id)
            {
                last.triggered_spike = true;
            }
            session.spikes.push(event.clone());
        }
        self.emit(SchedulerEvent::SpikeDetected { event });
    }

    /// True once the window holds at least half of its configured capacity
    /// (spec §4.2): below that, spike classification is not trusted.
    pub fn has_enough_data(&self) -> bool {
        self.rolling_window.len() >= self.min_samples_required()
    }

    pub fn min_samples_required(&self) -> usize {
        self.rolling_window_size / 2
    }

    pub fn is_full(&self) -> bool {
        self.rolling_window.len() >= self.rolling_window_size
    }

    pub fn window_len(&self) -> usize {
        self.rolling_window.len()
    }

    pub fn rolling_average(&self) -> RollingStats {
        mean_and_std_dev(self.rolling_window.iter().copied())
    }

    /// Stats over the window excluding the most recent sample, used by
    /// `SpikeDetector` to compare the latest response against what preceded it.
    pub fn rolling_average_excluding_last(&self) -> RollingStats {
        let len = self.rolling_window.len();
        if len == 0 {
            return RollingStats::default();
        }
        mean_and_std_dev(self.rolling_window.iter().take(len - 1).copied())
    }

    pub fn duration_delta_stats(&self) -> RollingStats {
        mean_and_std_dev(self.duration_delta_window.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn rolling_window_is_capped_at_configured_size() {
        let mut tracker = MetricsTracker::new(3);
        tracker.start_session("s1".into(), ts());
        for i in 0..5 {
            tracker.record_response(
                format!("L{i}"),
                1,
                ItemMode::Practice,
                1000 + i * 100,
                10,
                None,
                ts(),
            );
        }
        assert_eq!(tracker.window_len(), 3);
    }

    #[test]
    fn has_enough_data_requires_half_the_window() {
        let mut tracker = MetricsTracker::new(10);
        tracker.start_session("s1".into(), ts());
        assert!(!tracker.has_enough_data());
        for i in 0..4 {
            tracker.record_response(format!("L{i}"), 1, ItemMode::Practice, 1000, 10, None, ts());
        }
        assert!(!tracker.has_enough_data());
        tracker.record_response("L4".into(), 1, ItemMode::Practice, 1000, 10, None, ts());
        assert!(tracker.has_enough_data());
    }

    #[test]
    fn session_lifecycle_populates_final_rolling_average() {
        let mut tracker = MetricsTracker::new(5);
        tracker.start_session("s1".into(), ts());
        tracker.record_response("L1".into(), 1, ItemMode::Practice, 1000, 10, None, ts());
        let summary = tracker.end_session(ts()).unwrap();
        assert!(summary.final_rolling_average.is_some());
        assert!(tracker.current_session().is_none());
    }

    #[test]
    fn listeners_receive_session_and_item_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let mut tracker = MetricsTracker::new(5);
        tracker.add_listener(sink.clone());
        tracker.start_session("s1".into(), ts());
        tracker.record_response("L1".into(), 1, ItemMode::Practice, 1000, 10, None, ts());
        tracker.end_session(ts());
        assert_eq!(sink.events().len(), 3);
    }
}
