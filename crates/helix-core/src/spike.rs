//! C3: SpikeDetector (spec §4.3). Classifies discontinuities in normalized
//! response latency against the rolling window `MetricsTracker` maintains,
//! then resolves a response strategy subject to a per-thread cooldown.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::SpikeConfig;
use crate::metrics::RollingStats;
use crate::model::{LegoId, LegoKind, SpikeEvent, SpikeResponseKind, SpikeSeverity, ThreadId};

/// Fixed severity tiers for the z-score path (spec §4.3 step 5): these do
/// not scale with `config.stddev_threshold`, which only gates whether a
/// response counts as a spike at all.
const SEVERE_Z: f64 = 4.0;
const MODERATE_Z: f64 = 2.5;

/// Fixed severity tiers for the ratio fallback, deliberately distinct from
/// the z-score tiers (spec §9 open question: "boundaries differ... preserve
/// as-is").
const SEVERE_RATIO: f64 = 2.5;
const MODERATE_RATIO: f64 = 1.8;

pub struct SpikeDetector {
    cooldowns: HashMap<ThreadId, u32>,
    alternate_cursor: HashMap<ThreadId, usize>,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpikeDetector {
    pub fn new() -> Self {
        Self {
            cooldowns: HashMap::new(),
            alternate_cursor: HashMap::new(),
        }
    }

    /// Severity of `latency` against `stats`, or `None` if it isn't a spike.
    /// Prefers z-score classification when the window has spread; falls back
    /// to a percent-of-mean ratio when `use_stddev_detection` is off or the
    /// window is too uniform to compute a meaningful z-score.
    pub fn classify(
        &self,
        latency: f64,
        stats: &RollingStats,
        config: &SpikeConfig,
    ) -> Option<SpikeSeverity> {
        if stats.len < config.rolling_window_size / 2 {
            return None;
        }
        if config.use_stddev_detection && stats.std_dev > 0.0 {
            let z = (latency - stats.mean) / stats.std_dev;
            if z < config.stddev_threshold {
                return None;
            }
            return Some(if z >= SEVERE_Z {
                SpikeSeverity::Severe
            } else if z >= MODERATE_Z {
                SpikeSeverity::Moderate
            } else {
                SpikeSeverity::Mild
            });
        }
        if stats.mean <= 0.0 {
            return None;
        }
        let ratio_pct = (latency / stats.mean) * 100.0;
        if ratio_pct < config.threshold_percent {
            return None;
        }
        let ratio = latency / stats.mean;
        Some(if ratio >= SEVERE_RATIO {
            SpikeSeverity::Severe
        } else if ratio >= MODERATE_RATIO {
            SpikeSeverity::Moderate
        } else {
            SpikeSeverity::Mild
        })
    }

    /// Runs detection for one response and, if it's a spike not currently
    /// cooling down, resolves a response strategy and starts a new cooldown.
    #[allow(clippy::too_many_arguments)]
    pub fn detect(
        &mut self,
        lego_id: LegoId,
        thread_id: ThreadId,
        lego_kind: LegoKind,
        latency: f64,
        stats: &RollingStats,
        config: &SpikeConfig,
        now: DateTime<Utc>,
    ) -> Option<(SpikeSeverity, SpikeEvent)> {
        if let Some(remaining) = self.cooldowns.get_mut(&thread_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return None;
            }
        }

        let severity = self.classify(latency, stats, config)?;
        let mut response = self.resolve_strategy(thread_id, config, severity);
        if response == SpikeResponseKind::Breakdown && lego_kind == LegoKind::Atomic {
            // Atomic LEGOs have no components to break down into.
            response = SpikeResponseKind::Repeat;
        }

        self.cooldowns.insert(thread_id, config.cooldown_items);

        Some((
            severity,
            SpikeEvent {
                lego_id,
                timestamp: now,
                latency,
                rolling_average: stats.mean,
                spike_ratio: if stats.mean > 0.0 {
                    latency / stats.mean
                } else {
                    0.0
                },
                response,
                thread_id,
            },
        ))
    }

    fn resolve_strategy(
        &mut self,
        thread_id: ThreadId,
        config: &SpikeConfig,
        severity: SpikeSeverity,
    ) -> SpikeResponseKind {
        use crate::config::ResponseStrategy;
        match config.response_strategy {
            ResponseStrategy::Repeat => SpikeResponseKind::Repeat,
            ResponseStrategy::Breakdown => SpikeResponseKind::Breakdown,
            ResponseStrategy::Alternate => {
                // Severe discontinuities always break down regardless of
                // where the alternation cursor sits.
                if severity == SpikeSeverity::Severe {
                    return SpikeResponseKind::Breakdown;
                }
                let sequence = &config.alternate_sequence;
                if sequence.is_empty() {
                    return SpikeResponseKind::Repeat;
                }
                let cursor = self.alternate_cursor.entry(thread_id).or_insert(0);
                let step = sequence[*cursor % sequence.len()].as_str();
                *cursor = (*cursor + 1) % sequence.len();
                match step {
                    "breakdown" => SpikeResponseKind::Breakdown,
                    _ => SpikeResponseKind::Repeat,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpikeConfig;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn stats(mean: f64, std_dev: f64, len: usize) -> RollingStats {
        RollingStats { mean, std_dev, len }
    }

    #[test]
    fn no_spike_when_latency_within_normal_range() {
        let detector = SpikeDetector::new();
        let config = SpikeConfig::default();
        assert!(detector
            .classify(100.0, &stats(100.0, 10.0, 10), &config)
            .is_none());
    }

    #[test]
    fn severe_discontinuity_classified_above_double_threshold() {
        let detector = SpikeDetector::new();
        let config = SpikeConfig::default();
        // threshold 2.0, so z >= 4.0 is severe
        let severity = detector
            .classify(100.0 + 4.1 * 10.0, &stats(100.0, 10.0, 10), &config)
            .unwrap();
        assert_eq!(severity, SpikeSeverity::Severe);
    }

    #[test]
    fn cooldown_suppresses_repeated_spikes_on_same_thread() {
        let mut detector = SpikeDetector::new();
        let mut config = SpikeConfig::default();
        config.cooldown_items = 2;
        let spiky = stats(100.0, 10.0, 10);

        let first = detector.detect("L1".into(), 1, LegoKind::Atomic, 500.0, &spiky, &config, ts());
        assert!(first.is_some());

        let second = detector.detect("L1".into(), 1, LegoKind::Atomic, 500.0, &spiky, &config, ts());
        assert!(second.is_none());
    }

    #[test]
    fn breakdown_never_selected_for_atomic_legos() {
        let mut detector = SpikeDetector::new();
        let mut config = SpikeConfig::default();
        config.response_strategy = crate::config::ResponseStrategy::Breakdown;
        let spiky = stats(100.0, 10.0, 10);
        let (_, event) = detector
            .detect("L1".into(), 1, LegoKind::Atomic, 500.0, &spiky, &config, ts())
            .unwrap();
        assert_eq!(event.response, SpikeResponseKind::Repeat);
    }

    #[test]
    fn alternate_strategy_cycles_through_sequence() {
        let mut detector = SpikeDetector::new();
        let mut config = SpikeConfig::default();
        config.response_strategy = crate::config::ResponseStrategy::Alternate;
        config.cooldown_items = 0;
        let spiky = stats(100.0, 10.0, 10);

        let mut kinds = Vec::new();
        for _ in 0..4 {
            // z ~= 2.5, Mild severity, so the alternation cursor controls
            // the outcome rather than the Severe-always-breaks-down rule.
            let (_, event) = detector
                .detect("L1".into(), 1, LegoKind::Molecular, 125.0, &spiky, &config, ts())
                .unwrap();
            kinds.push(event.response);
        }
        assert_eq!(
            kinds,
            vec![
                SpikeResponseKind::Repeat,
                SpikeResponseKind::Breakdown,
                SpikeResponseKind::Repeat,
                SpikeResponseKind::Breakdown,
            ]
        );
    }
}
