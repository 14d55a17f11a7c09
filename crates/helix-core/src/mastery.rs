//! C4: MasteryStateMachine (spec §4.4). Tracks each LEGO's progression
//! through Acquisition -> Consolidating -> Confident -> Mastered, advancing
//! on sustained smooth responses and regressing on discontinuities.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::MasteryConfig;
use crate::model::{LegoId, LegoMasteryState, MasteryTransition, SpikeSeverity};

#[derive(Debug, Default)]
pub struct MasteryStateMachine {
    states: HashMap<LegoId, LegoMasteryState>,
}

impl MasteryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state for `lego_id`, initializing it to `Acquisition` on
    /// first query.
    pub fn get_or_init(&mut self, lego_id: &LegoId, now: DateTime<Utc>) -> &LegoMasteryState {
        self.states
            .entry(lego_id.clone())
            .or_insert_with(|| LegoMasteryState::new(lego_id.clone(), now))
    }

    pub fn get(&self, lego_id: &LegoId) -> Option<&LegoMasteryState> {
        self.states.get(lego_id)
    }

    /// Records a non-discontinuous response. `is_fast` distinguishes a
    /// response quick enough to count toward the fast-track streak from an
    /// ordinary smooth one.
    pub fn record_smooth(
        &mut self,
        lego_id: &LegoId,
        is_fast: bool,
        config: &MasteryConfig,
        now: DateTime<Utc>,
    ) -> MasteryTransition {
        self.get_or_init(lego_id, now);
        let state = self.states.get_mut(lego_id).expect("just initialized");

        state.consecutive_smooth += 1;
        state.consecutive_fast = if is_fast { state.consecutive_fast + 1 } else { 0 };
        state.updated_at = now;

        let transition = if state.consecutive_fast >= config.fast_track_threshold {
            state.current_state = state.current_state.advance(2);
            state.consecutive_smooth = 0;
            state.consecutive_fast = 0;
            MasteryTransition::FastTrack
        } else if state.consecutive_smooth >= config.advancement_threshold {
            state.current_state = state.current_state.advance(1);
            state.consecutive_smooth = 0;
            MasteryTransition::Advancement
        } else {
            MasteryTransition::Hold
        };
        transition
    }

    /// Records a discontinuity (spike) against this LEGO, resetting the
    /// smooth streaks and regressing mastery in proportion to severity.
    pub fn record_discontinuity(
        &mut self,
        lego_id: &LegoId,
        severity: SpikeSeverity,
        now: DateTime<Utc>,
    ) -> MasteryTransition {
        self.get_or_init(lego_id, now);
        let state = self.states.get_mut(lego_id).expect("just initialized");

        state.consecutive_smooth = 0;
        state.consecutive_fast = 0;
        state.discontinuity_count += 1;
        state.last_discontinuity_at = Some(now);
        state.updated_at = now;

        let regress_steps = match severity {
            SpikeSeverity::Mild => 0,
            SpikeSeverity::Moderate => 1,
            SpikeSeverity::Severe => 2,
        };
        if regress_steps > 0 {
            let before = state.current_state;
            state.current_state = state.current_state.regress(regress_steps);
            if state.current_state == before {
                MasteryTransition::NoChange
            } else {
                MasteryTransition::Regression
            }
        } else {
            MasteryTransition::Hold
        }
    }

    pub fn load_states(&mut self, states: Vec<LegoMasteryState>) {
        for state in states {
            self.states.insert(state.lego_id.clone(), state);
        }
    }

    pub fn get_all_states(&self) -> Vec<LegoMasteryState> {
        self.states.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MasteryLevel;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn advances_one_level_after_advancement_threshold_smooth_responses() {
        let mut machine = MasteryStateMachine::new();
        let config = MasteryConfig::default();
        let lego = "L1".to_string();
        for _ in 0..2 {
            assert_eq!(
                machine.record_smooth(&lego, false, &config, ts()),
                MasteryTransition::Hold
            );
        }
        assert_eq!(
            machine.record_smooth(&lego, false, &config, ts()),
            MasteryTransition::Advancement
        );
        assert_eq!(
            machine.get(&lego).unwrap().current_state,
            MasteryLevel::Consolidating
        );
    }

    #[test]
    fn fast_track_advances_two_levels_at_once() {
        let mut machine = MasteryStateMachine::new();
        let config = MasteryConfig::default();
        let lego = "L1".to_string();
        for _ in 0..4 {
            machine.record_smooth(&lego, true, &config, ts());
        }
        assert_eq!(
            machine.record_smooth(&lego, true, &config, ts()),
            MasteryTransition::FastTrack
        );
        assert_eq!(
            machine.get(&lego).unwrap().current_state,
            MasteryLevel::Confident
        );
    }

    #[test]
    fn severe_discontinuity_regresses_two_levels_and_resets_streaks() {
        let mut machine = MasteryStateMachine::new();
        let config = MasteryConfig::default();
        let lego = "L1".to_string();
        machine.record_smooth(&lego, false, &config, ts());
        machine.record_smooth(&lego, false, &config, ts());
        machine.record_smooth(&lego, false, &config, ts());
        assert_eq!(
            machine.get(&lego).unwrap().current_state,
            MasteryLevel::Consolidating
        );

        machine.record_discontinuity(&lego, SpikeSeverity::Severe, ts());
        let state = machine.get(&lego).unwrap();
        assert_eq!(state.current_state, MasteryLevel::Acquisition);
        assert_eq!(state.consecutive_smooth, 0);
        assert_eq!(state.discontinuity_count, 1);
    }

    #[test]
    fn regression_already_at_acquisition_reports_no_change() {
        let mut machine = MasteryStateMachine::new();
        let config = MasteryConfig::default();
        let lego = "L1".to_string();
        machine.get_or_init(&lego, ts());
        let transition = machine.record_discontinuity(&lego, SpikeSeverity::Severe, ts());
        assert_eq!(transition, MasteryTransition::NoChange);
        assert_eq!(
            machine.get(&lego).unwrap().current_state,
            MasteryLevel::Acquisition
        );
    }

    #[test]
    fn mild_discontinuity_holds_level_but_still_resets_streak() {
        let mut machine = MasteryStateMachine::new();
        let config = MasteryConfig::default();
        let lego = "L1".to_string();
        machine.record_smooth(&lego, false, &config, ts());
        let transition = machine.record_discontinuity(&lego, SpikeSeverity::Mild, ts());
        assert_eq!(transition, MasteryTransition::Hold);
        assert_eq!(
            machine.get(&lego).unwrap().current_state,
            MasteryLevel::Acquisition
        );
    }

    #[test]
    fn load_states_round_trips_through_get_all_states() {
        let mut machine = MasteryStateMachine::new();
        machine.record_smooth(&"L1".to_string(), false, &MasteryConfig::default(), ts());
        let saved = machine.get_all_states();

        let mut restored = MasteryStateMachine::new();
        restored.load_states(saved.clone());
        assert_eq!(restored.get_all_states().len(), saved.len());
    }
}
