//! C10: AdaptationEngine (spec §4.10). The public facade: composes
//! ConfigResolver, MetricsTracker, SpikeDetector, MasteryStateMachine,
//! WeightedSelector and TripleHelixEngine into one `process_completion`
//! pipeline, and layers continuous performance scoring and learner
//! calibration on top for pause-duration control.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::ConfigResolver;
use crate::error::SchedulerError;
use crate::events::SchedulerEventSink;
use crate::helix::{NextAction, TripleHelixEngine};
use crate::mastery::MasteryStateMachine;
use crate::metrics::MetricsTracker;
use crate::model::{
    AdaptedAction, AdaptedItem, BreakdownState, CalibrationState, Competence, ItemMode,
    LearnerBaseline, LegoId, LegoKind, SpikeResponseKind, ThreadId, TimingCompetenceSignal,
    TimingFields,
};
use crate::selector::WeightedSelector;
use crate::spike::SpikeDetector;

/// Exponential-smoothing rate applied to the continuous pause multiplier so
/// it doesn't jump around on a single noisy response.
const RESPONSIVENESS: f64 = 0.3;
/// Baseline/session blend for continuous scoring: mostly trust the
/// learner's calibrated baseline, but let the current session nudge it.
const BASELINE_WEIGHT: f64 = 0.7;
const SESSION_WEIGHT: f64 = 1.0 - BASELINE_WEIGHT;

pub struct AdaptationEngine {
    config: ConfigResolver,
    metrics: MetricsTracker,
    spike_detector: SpikeDetector,
    mastery: MasteryStateMachine,
    selector: WeightedSelector,
    helix: TripleHelixEngine,

    calibration_state: CalibrationState,
    calibration_samples: Vec<(f64, Option<f64>)>,
    min_calibration_items: usize,
    baseline: Option<LearnerBaseline>,

    smoothed_multiplier: f64,
    spike_extension_remaining: u32,
    active_breakdown: Option<BreakdownState>,
}

impl AdaptationEngine {
    pub fn new(thread_count: u8, min_calibration_items: usize) -> Self {
        let config = ConfigResolver::new();
        let rolling_window_size = config.resolve().spike.rolling_window_size;
        Self {
            config,
            metrics: MetricsTracker::new(rolling_window_size),
            spike_detector: SpikeDetector::new(),
            mastery: MasteryStateMachine::new(),
            selector: WeightedSelector::new(),
            helix: TripleHelixEngine::new(thread_count),
            calibration_state: CalibrationState::NotStarted,
            calibration_samples: Vec::new(),
            min_calibration_items,
            baseline: None,
            smoothed_multiplier: 1.0,
            spike_extension_remaining: 0,
            active_breakdown: None,
        }
    }

    pub fn config(&self) -> &ConfigResolver {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigResolver {
        &mut self.config
    }

    pub fn helix(&self) -> &TripleHelixEngine {
        &self.helix
    }

    pub fn helix_mut(&mut self) -> &mut TripleHelixEngine {
        &mut self.helix
    }

    pub fn add_event_listener(&mut self, sink: std::sync::Arc<dyn SchedulerEventSink>) {
        self.metrics.add_listener(sink);
    }

    pub fn next_item(&mut self, rng: &mut impl Rng, now: DateTime<Utc>) -> NextAction {
        let initial_reps = self.config.resolve().repetition.initial_reps;
        self.helix.next_item(initial_reps, rng, now)
    }

    // ------------------------------------------------------------------
    // Calibration
    // ------------------------------------------------------------------

    pub fn start_calibration(&mut self) {
        if self.calibration_state == CalibrationState::NotStarted {
            self.calibration_state = CalibrationState::InProgress;
        }
    }

    pub fn record_calibration_sample(&mut self, response_latency_ms: u32, phrase_length: u32, duration_delta_ms: Option<f64>) {
        let normalized = crate::model::ResponseMetric::normalize(response_latency_ms, phrase_length);
        self.calibration_samples.push((normalized, duration_delta_ms));
    }

    pub fn complete_calibration(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let actual = self.calibration_samples.len();
        if actual < self.min_calibration_items {
            return Err(SchedulerError::InsufficientCalibrationItems {
                min: self.min_calibration_items,
                actual,
            });
        }
        let latencies: Vec<f64> = self.calibration_samples.iter().map(|(l, _)| *l).collect();
        let (latency_mean, latency_std_dev) = mean_std(&latencies);

        let deltas: Vec<f64> = self
            .calibration_samples
            .iter()
            .filter_map(|(_, d)| *d)
            .collect();
        let had_timing_data = !deltas.is_empty();
        let (duration_delta_mean, duration_delta_std_dev) = mean_std(&deltas);

        self.baseline = Some(LearnerBaseline {
            calibrated_at: now,
            calibration_items: actual,
            latency_mean,
            latency_std_dev,
            duration_delta_mean,
            duration_delta_std_dev,
            had_timing_data,
        });
        self.calibration_state = CalibrationState::Completed;
        Ok(())
    }

    pub fn skip_calibration(&mut self) {
        self.calibration_state = CalibrationState::Skipped;
    }

    pub fn import_baseline(&mut self, baseline: LearnerBaseline) {
        self.baseline = Some(baseline);
        self.calibration_state = CalibrationState::Completed;
    }

    pub fn export_baseline(&self) -> Option<LearnerBaseline> {
        self.baseline.clone()
    }

    pub fn get_calibration_state(&self) -> CalibrationState {
        self.calibration_state
    }

    pub fn get_calibration_progress(&self) -> (usize, usize) {
        (self.calibration_samples.len(), self.min_calibration_items)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration_state == CalibrationState::Completed
    }

    // ------------------------------------------------------------------
    // Completion pipeline
    // ------------------------------------------------------------------

    /// Runs the full completion pipeline for one learner response (spec
    /// §4.10): records the response, detects discontinuities, updates
    /// mastery/selection weights and the helix queue, scores continuous
    /// performance against the learner's baseline, and resolves the next
    /// adapted action plus pause duration.
    #[allow(clippy::too_many_arguments)]
    pub fn process_completion(
        &mut self,
        lego_id: LegoId,
        lego_kind: LegoKind,
        thread_id: ThreadId,
        response_latency_ms: u32,
        phrase_length: u32,
        mode: ItemMode,
        timing: Option<TimingFields>,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> AdaptedItem {
        let config = self.config.resolve();

        // 0. A Breakdown sequence in progress takes over the item entirely:
        // step it to the next component (or clear it once exhausted) instead
        // of running the full completion pipeline on this response.
        if self.is_in_breakdown() {
            if let Some(next_id) = self.advance_breakdown() {
                return AdaptedItem {
                    action: AdaptedAction::Breakdown,
                    reason: self.describe_action(AdaptedAction::Breakdown, &None),
                    pause_duration_ms: self.pause_duration_ms(&config),
                    breakdown_component_ids: Some(vec![next_id]),
                };
            }
        }

        // 1. Record the raw response and its normalized latency.
        let metric = self.metrics.record_response(
            lego_id.clone(),
            thread_id,
            mode,
            response_latency_ms,
            phrase_length,
            timing.clone(),
            now,
        );

        // 2. Stats as they stood before this response, for spike comparison.
        let stats_before = self.metrics.rolling_average_excluding_last();

        // 3. Spike detection.
        let spike = self.spike_detector.detect(
            lego_id.clone(),
            thread_id,
            lego_kind,
            metric.normalized_latency,
            &stats_before,
            &config.spike,
            now,
        );

        // 4/5. Mastery + selector bookkeeping, branching on whether this was
        // a discontinuity or a smooth response.
        let mut action = AdaptedAction::Continue;
        match &spike {
            Some((severity, event)) => {
                self.metrics.record_spike(event.clone());
                self.mastery.record_discontinuity(&lego_id, *severity, now);
                self.selector.record_discontinuity(&lego_id);
                if config.spike.pause_extension_enabled {
                    self.spike_extension_remaining = config.spike.pause_extension_duration;
                }
                action = match event.response {
                    SpikeResponseKind::Repeat => AdaptedAction::Repeat,
                    SpikeResponseKind::Breakdown => AdaptedAction::Breakdown,
                };
            }
            None => {
                let is_fast = response_latency_ms < config.vad.quick_response_ms;
                self.mastery.record_smooth(&lego_id, is_fast, &config.mastery, now);
            }
        }

        // 6. Selection weight update.
        self.selector.update_after_practice(&lego_id, now);

        // 7. Queue bookkeeping: advance interval, decrement siblings, rotate
        // the active thread.
        let was_spike = spike.is_some();
        let was_successful = !was_spike
            && !timing
                .as_ref()
                .map(|t| t.still_speaking_at_voice1)
                .unwrap_or(false);
        self.helix.record_practice(
            thread_id,
            &lego_id,
            was_successful,
            was_spike,
            config.repetition.initial_reps,
            &config.repetition.fibonacci_sequence,
            now,
        );

        // 8. If a Round is mid-SpacedRep on this thread, count the practice.
        if let Some(round) = self.helix.active_round_mut(thread_id) {
            crate::round::RoundEngine::record_spaced_rep_practice(round);
        }

        // 9. Continuous performance scoring against the calibrated baseline.
        let score = self.score_performance(metric.normalized_latency, timing.as_ref(), &config.scoring);

        // 10. Timing overrides: forced Repeat when the learner was still
        // mid-response at the second voice prompt, regardless of latency.
        if let Some(t) = &timing {
            if t.still_speaking_at_voice1 && matches!(action, AdaptedAction::Continue) {
                action = AdaptedAction::Repeat;
            }
        }

        // 11. Target multiplier from the score, then smooth it so pause
        // duration doesn't jump around between consecutive items.
        let target_multiplier = score.target_multiplier;
        self.smoothed_multiplier += RESPONSIVENESS * (target_multiplier - self.smoothed_multiplier);

        // 12. Tick down any legacy spike-extension window.
        if self.spike_extension_remaining > 0 {
            self.spike_extension_remaining -= 1;
        }

        // 13. Resolve pause duration and breakdown payload, return.
        let pause_duration_ms = self.pause_duration_ms(&config);
        let breakdown_component_ids = if action == AdaptedAction::Breakdown {
            self.active_breakdown.as_ref().map(|b| b.component_ids.clone())
        } else {
            None
        };

        AdaptedItem {
            action,
            reason: self.describe_action(action, &spike),
            pause_duration_ms,
            breakdown_component_ids,
        }
    }

    fn describe_action(
        &self,
        action: AdaptedAction,
        spike: &Option<(crate::model::SpikeSeverity, crate::model::SpikeEvent)>,
    ) -> String {
        match (action, spike) {
            (AdaptedAction::Repeat, Some((severity, _))) => {
                format!("{severity:?} discontinuity, repeating")
            }
            (AdaptedAction::Breakdown, Some((severity, _))) => {
                format!("{severity:?} discontinuity, breaking down")
            }
            (AdaptedAction::Repeat, None) => "learner still speaking at second prompt".into(),
            (AdaptedAction::Continue, _) => "smooth response".into(),
            (AdaptedAction::Breakdown, None) => "breakdown continuation".into(),
        }
    }

    fn score_performance(
        &self,
        normalized_latency: f64,
        timing: Option<&TimingFields>,
        scoring: &crate::config::ScoringConfig,
    ) -> crate::model::ContinuousPerformanceScore {
        let session_stats = self.metrics.rolling_average();

        let (mean, std_dev) = match &self.baseline {
            Some(b) if session_stats.len > 0 => (
                BASELINE_WEIGHT * b.latency_mean + SESSION_WEIGHT * session_stats.mean,
                BASELINE_WEIGHT * b.latency_std_dev + SESSION_WEIGHT * session_stats.std_dev,
            ),
            Some(b) => (b.latency_mean, b.latency_std_dev),
            None if session_stats.len > 0 => (session_stats.mean, session_stats.std_dev),
            None => (normalized_latency, 0.0),
        };

        let latency_z = if std_dev > 0.0 {
            Some((normalized_latency - mean) / std_dev)
        } else {
            None
        };

        let duration_delta_z = match (&self.baseline, timing) {
            (Some(b), Some(t)) if b.had_timing_data && b.duration_delta_std_dev > 0.0 => {
                Some((t.duration_delta_ms - b.duration_delta_mean) / b.duration_delta_std_dev)
            }
            _ => None,
        };

        // No tanh: the raw weighted combination is clamped directly to
        // [-1, 1] rather than squashed through a sigmoid.
        let raw = match (latency_z, duration_delta_z) {
            (Some(lz), Some(dz)) => {
                -lz * scoring.latency_weight - (dz.abs() - 1.0) * (1.0 - scoring.latency_weight)
            }
            (Some(lz), None) => -lz,
            (None, Some(dz)) => -dz,
            (None, None) => 0.0,
        };
        let mut overall = raw.clamp(-1.0, 1.0);

        // Overrides, applied to the clamped score rather than the raw sum:
        // jumping in before the prompt finished only overrides a latency
        // reading that looked suspiciously fast in the first place; still
        // talking at the second voice is unambiguous struggle regardless of
        // what the z-scores say.
        if let Some(t) = timing {
            if t.started_during_prompt && latency_z.is_some_and(|lz| lz < -1.0) {
                overall = 0.5;
            }
            if t.still_speaking_at_voice1 {
                overall = overall.min(-0.5);
            }
        }

        let target_multiplier =
            (1.0 - overall * 0.5).clamp(scoring.multiplier_min, scoring.multiplier_max);

        crate::model::ContinuousPerformanceScore {
            overall,
            latency_z,
            duration_delta_z,
            target_multiplier,
        }
    }

    pub fn timing_competence(&self, score: &crate::model::ContinuousPerformanceScore) -> TimingCompetenceSignal {
        let competence = if score.overall > 0.3 {
            Competence::Confident
        } else if score.overall < -0.3 {
            Competence::Struggling
        } else {
            Competence::Neutral
        };
        TimingCompetenceSignal {
            competence,
            recommend_extend_pause: matches!(competence, Competence::Struggling),
        }
    }

    fn pause_duration_ms(&self, config: &crate::config::LearningConfig) -> u64 {
        let legacy_extended = if self.spike_extension_remaining > 0 {
            1.0 + config.spike.pause_extension_factor
        } else {
            1.0
        };
        let multiplier = legacy_extended.max(self.smoothed_multiplier);
        let base = config.cycle.pause_duration_ms as f64 * multiplier;
        (base as u64).clamp(config.cycle.min_pause_ms, config.cycle.max_pause_ms)
    }

    pub fn get_pause_duration_multiplier(&self) -> f64 {
        let legacy_extended = if self.spike_extension_remaining > 0 {
            1.0 + self.config.resolve().spike.pause_extension_factor
        } else {
            1.0
        };
        legacy_extended.max(self.smoothed_multiplier)
    }

    // ------------------------------------------------------------------
    // Breakdown sequencing
    // ------------------------------------------------------------------

    pub fn start_breakdown(&mut self, lego_id: LegoId, component_ids: Vec<LegoId>) {
        self.active_breakdown = Some(BreakdownState {
            lego_id,
            component_ids,
            current_index: 0,
            in_buildup: false,
        });
    }

    pub fn is_in_breakdown(&self) -> bool {
        self.active_breakdown.is_some()
    }

    /// Steps the active breakdown forward: first cycles each component in
    /// isolation, then replays them as a cumulative buildup before clearing.
    pub fn advance_breakdown(&mut self) -> Option<LegoId> {
        let state = self.active_breakdown.as_mut()?;
        if state.component_ids.is_empty() {
            self.active_breakdown = None;
            return None;
        }
        if state.current_index >= state.component_ids.len() {
            if state.in_buildup {
                self.active_breakdown = None;
                return None;
            }
            state.in_buildup = true;
            state.current_index = 0;
        }
        let id = state.component_ids[state.current_index].clone();
        state.current_index += 1;
        Some(id)
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}
