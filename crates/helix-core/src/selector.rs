//! C5: WeightedSelector (spec §4.5). Picks a LEGO among candidates using a
//! staleness x struggle x recency weight, drawn through the single pluggable
//! random source (spec §5).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::SelectorConfig;
use crate::error::SchedulerError;
use crate::model::LegoId;
use crate::rng::uniform01;

/// A never-practiced LEGO is treated as overdue by this many days when
/// computing its staleness factor.
const NEVER_PRACTICED_DAYS: f64 = 365.0;

#[derive(Debug, Clone)]
pub struct LegoWeightData {
    pub lego_id: LegoId,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub practice_count: u32,
    pub discontinuity_count: u32,
}

impl LegoWeightData {
    fn new(lego_id: LegoId) -> Self {
        Self {
            lego_id,
            last_practiced_at: None,
            practice_count: 0,
            discontinuity_count: 0,
        }
    }

    fn days_since_practice(&self, now: DateTime<Utc>) -> f64 {
        match self.last_practiced_at {
            None => NEVER_PRACTICED_DAYS,
            Some(last) => (now - last).num_minutes() as f64 / (60.0 * 24.0),
        }
    }

    fn staleness_factor(&self, now: DateTime<Utc>, config: &SelectorConfig) -> f64 {
        1.0 + self.days_since_practice(now).max(0.0) * config.staleness_rate
    }

    fn struggle_factor(&self, config: &SelectorConfig) -> f64 {
        1.0 + self.discontinuity_count as f64 * config.struggle_multiplier
    }

    fn recency_factor(&self, now: DateTime<Utc>, config: &SelectorConfig) -> f64 {
        match self.last_practiced_at {
            None => 1.0,
            Some(last) => {
                let minutes_since = (now - last).num_minutes() as f64;
                let ramp = (minutes_since.max(0.0) / config.recency_window_minutes).min(1.0);
                0.5 + 0.5 * ramp
            }
        }
    }

    fn weight(&self, now: DateTime<Utc>, config: &SelectorConfig) -> f64 {
        self.staleness_factor(now, config) * self.struggle_factor(config) * self.recency_factor(now, config)
    }
}

#[derive(Debug, Default)]
pub struct WeightedSelector {
    data: HashMap<LegoId, LegoWeightData>,
}

impl WeightedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_lego(&mut self, lego_id: &LegoId) {
        self.data
            .entry(lego_id.clone())
            .or_insert_with(|| LegoWeightData::new(lego_id.clone()));
    }

    pub fn reset_lego(&mut self, lego_id: &LegoId) {
        self.data.insert(lego_id.clone(), LegoWeightData::new(lego_id.clone()));
    }

    pub fn clear_all_data(&mut self) {
        self.data.clear();
    }

    pub fn get_all_lego_data(&self) -> Vec<LegoWeightData> {
        self.data.values().cloned().collect()
    }

    pub fn update_after_practice(&mut self, lego_id: &LegoId, now: DateTime<Utc>) {
        self.initialize_lego(lego_id);
        let entry = self.data.get_mut(lego_id).expect("just initialized");
        entry.last_practiced_at = Some(now);
        entry.practice_count += 1;
    }

    pub fn record_discontinuity(&mut self, lego_id: &LegoId) {
        self.initialize_lego(lego_id);
        self.data.get_mut(lego_id).expect("just initialized").discontinuity_count += 1;
    }

    /// Decays accumulated struggle, e.g. once per Round: LEGOs not practiced
    /// more recently than `days_threshold` days ago have `decay_amount`
    /// subtracted from their discontinuity count (floored at 0), so past
    /// spikes stop dominating selection weight indefinitely once a LEGO has
    /// had time to settle.
    pub fn decay_discontinuity_counts(&mut self, now: DateTime<Utc>, days_threshold: i64, decay_amount: u32) {
        for entry in self.data.values_mut() {
            let eligible = entry
                .last_practiced_at
                .is_some_and(|last| (now - last).num_days() >= days_threshold);
            if eligible {
                entry.discontinuity_count = entry.discontinuity_count.saturating_sub(decay_amount);
            }
        }
    }

    /// Selects one candidate weighted by staleness x struggle x recency. If
    /// every candidate ends up with zero weight, falls back to a uniform
    /// draw so a candidate is always returned.
    pub fn select(
        &mut self,
        candidates: &[LegoId],
        config: &SelectorConfig,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Result<LegoId, SchedulerError> {
        if candidates.is_empty() {
            return Err(SchedulerError::EmptyCandidates);
        }
        for id in candidates {
            self.initialize_lego(id);
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|id| self.data[id].weight(now, config))
            .collect();
        let total: f64 = weights.iter().sum();

        if total <= 0.0 {
            let idx = rng.gen_range(0..candidates.len());
            return Ok(candidates[idx].clone());
        }

        let draw = uniform01(rng) * total;
        let mut cumulative = 0.0;
        for (id, weight) in candidates.iter().zip(weights.iter()) {
            cumulative += weight;
            if draw < cumulative {
                return Ok(id.clone());
            }
        }
        Ok(candidates.last().expect("non-empty").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn config() -> SelectorConfig {
        SelectorConfig::default()
    }

    #[test]
    fn empty_candidates_errors() {
        let mut selector = WeightedSelector::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = selector.select(&[], &config(), &mut rng, ts()).unwrap_err();
        assert!(matches!(err, SchedulerError::EmptyCandidates));
    }

    #[test]
    fn never_practiced_lego_has_higher_weight_than_just_practiced_one() {
        let mut selector = WeightedSelector::new();
        selector.update_after_practice(&"fresh".to_string(), ts());
        let stale = LegoWeightData::new("stale".to_string());
        let fresh = selector.data[&"fresh".to_string()].clone();
        assert!(stale.weight(ts(), &config()) > fresh.weight(ts(), &config()));
    }

    #[test]
    fn discontinuity_increases_struggle_weight() {
        let data_config = config();
        let mut data = LegoWeightData::new("L1".to_string());
        let base = data.weight(ts(), &data_config);
        data.discontinuity_count = 3;
        assert!(data.weight(ts(), &data_config) > base);
    }

    #[test]
    fn recency_factor_ramps_linearly_back_up_to_one_over_the_window() {
        let data_config = config();
        let mut data = LegoWeightData::new("L1".to_string());
        data.last_practiced_at = Some(ts());

        let just_practiced = data.recency_factor(ts(), &data_config);
        let halfway = data.recency_factor(ts() + chrono::Duration::minutes(15), &data_config);
        let past_window = data.recency_factor(ts() + chrono::Duration::minutes(45), &data_config);

        assert!((just_practiced - 0.5).abs() < 1e-9);
        assert!((halfway - 0.75).abs() < 1e-9);
        assert!((past_window - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decay_subtracts_the_configured_amount_once_the_threshold_has_passed() {
        let mut selector = WeightedSelector::new();
        selector.update_after_practice(&"L1".to_string(), ts());
        for _ in 0..4 {
            selector.record_discontinuity(&"L1".to_string());
        }

        // Not yet past the threshold: untouched.
        selector.decay_discontinuity_counts(ts(), 7, 1);
        assert_eq!(selector.data[&"L1".to_string()].discontinuity_count, 4);

        let later = ts() + chrono::Duration::days(8);
        selector.decay_discontinuity_counts(later, 7, 1);
        assert_eq!(selector.data[&"L1".to_string()].discontinuity_count, 3);
    }

    #[test]
    fn a_never_practiced_lego_is_not_eligible_for_decay() {
        let mut selector = WeightedSelector::new();
        selector.record_discontinuity(&"L1".to_string());
        selector.decay_discontinuity_counts(ts() + chrono::Duration::days(365), 7, 1);
        assert_eq!(selector.data[&"L1".to_string()].discontinuity_count, 1);
    }

    #[test]
    fn select_always_returns_one_of_the_candidates() {
        let mut selector = WeightedSelector::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let candidates = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        for _ in 0..20 {
            let picked = selector.select(&candidates, &config(), &mut rng, ts()).unwrap();
            assert!(candidates.contains(&picked));
        }
    }
}
