//! C6: SpacedRepetitionQueue (spec §4.6). One Fibonacci-interval queue per
//! thread, keyed by LEGO. Retired items (finished the interval sequence)
//! sort last by carrying infinite priority.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::model::{CourseId, LegoId, LegoProgress, ThreadId};
use crate::rng::uniform01;

#[derive(Debug, Default)]
pub struct SpacedRepetitionQueue {
    threads: HashMap<ThreadId, HashMap<LegoId, LegoProgress>>,
}

impl SpacedRepetitionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_new(&mut self, thread_id: ThreadId, lego_id: LegoId, course_id: CourseId) {
        self.threads
            .entry(thread_id)
            .or_default()
            .entry(lego_id.clone())
            .or_insert_with(|| LegoProgress::new(lego_id, course_id, thread_id));
    }

    fn priority(
        entry: &LegoProgress,
        initial_reps: u32,
        rng: &mut impl Rng,
    ) -> f64 {
        if entry.is_retired {
            return f64::INFINITY;
        }
        let under_initial_bonus = if entry.reps_completed < initial_reps {
            -10.0
        } else {
            0.0
        };
        entry.skip_number as f64
            + under_initial_bonus
            + entry.fibonacci_position as f64 * 0.5
            + uniform01(rng) * 0.1
    }

    /// Lowest-priority non-retired LEGO on `thread_id`, or `None` if the
    /// thread has no entries left (everything retired, or thread unused).
    pub fn get_next(
        &self,
        thread_id: ThreadId,
        initial_reps: u32,
        rng: &mut impl Rng,
    ) -> Option<LegoId> {
        let entries = self.threads.get(&thread_id)?;
        entries
            .values()
            .filter(|e| !e.is_retired)
            .map(|e| (e.lego_id.clone(), Self::priority(e, initial_reps, rng)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// LEGOs whose skip_number has counted down to zero on `thread_id`.
    pub fn get_ready(&self, thread_id: ThreadId) -> Vec<LegoId> {
        self.threads
            .get(&thread_id)
            .map(|entries| {
                entries
                    .values()
                    .filter(|e| !e.is_retired && e.skip_number == 0)
                    .map(|e| e.lego_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Advances `lego_id`'s Fibonacci position (spec §4.6): a spike regresses
    /// it by one, a successful rep only advances it once `initial_reps`
    /// repetitions have accumulated, and the sequence's last position
    /// retires the LEGO.
    #[allow(clippy::too_many_arguments)]
    pub fn record_practice(
        &mut self,
        thread_id: ThreadId,
        lego_id: &LegoId,
        was_successful: bool,
        was_spike: bool,
        initial_reps: u32,
        fibonacci_sequence: &[u32],
        now: DateTime<Utc>,
    ) {
        let Some(entry) = self
            .threads
            .get_mut(&thread_id)
            .and_then(|t| t.get_mut(lego_id))
        else {
            return;
        };

        entry.last_practiced_at = Some(now);

        if was_spike {
            entry.fibonacci_position = entry.fibonacci_position.saturating_sub(1);
        } else if was_successful {
            entry.reps_completed += 1;
            if entry.reps_completed >= initial_reps {
                entry.fibonacci_position =
                    (entry.fibonacci_position + 1).min(fibonacci_sequence.len().saturating_sub(1));
                if entry.fibonacci_position == fibonacci_sequence.len().saturating_sub(1) {
                    entry.is_retired = true;
                }
            }
        }

        entry.skip_number = fibonacci_sequence.get(entry.fibonacci_position).copied().unwrap_or(0);
    }

    /// Decrements skip_number (floored at 0) for every other LEGO on the
    /// thread, the standard spaced-repetition "time passes" step.
    pub fn decrement_skip_numbers(&mut self, thread_id: ThreadId, except: &LegoId) {
        if let Some(entries) = self.threads.get_mut(&thread_id) {
            for (id, entry) in entries.iter_mut() {
                if id != except && entry.skip_number > 0 {
                    entry.skip_number -= 1;
                }
            }
        }
    }

    pub fn get_progress(&self, thread_id: ThreadId, lego_id: &LegoId) -> Option<&LegoProgress> {
        self.threads.get(&thread_id)?.get(lego_id)
    }

    pub fn get_progress_mut(&mut self, thread_id: ThreadId, lego_id: &LegoId) -> Option<&mut LegoProgress> {
        self.threads.get_mut(&thread_id)?.get_mut(lego_id)
    }

    pub fn mark_introduction_complete(&mut self, thread_id: ThreadId, lego_id: &LegoId) {
        if let Some(entry) = self
            .threads
            .get_mut(&thread_id)
            .and_then(|t| t.get_mut(lego_id))
        {
            entry.introduction_complete = true;
        }
    }

    pub fn get_all_progress(&self) -> Vec<LegoProgress> {
        self.threads
            .values()
            .flat_map(|t| t.values().cloned())
            .collect()
    }

    pub fn load_progress(&mut self, progress: Vec<LegoProgress>) {
        for entry in progress {
            self.threads
                .entry(entry.thread_id)
                .or_default()
                .insert(entry.lego_id.clone(), entry);
        }
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

    const FIB: &[u32] = &[1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

    #[test]
    fn practicing_advances_fibonacci_position_and_sets_skip_number() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        queue.record_practice(1, &"L1".to_string(), true, false, 1, FIB, ts());
        let entry = queue.get_progress(1, &"L1".to_string()).unwrap();
        assert_eq!(entry.fibonacci_position, 1);
        assert_eq!(entry.skip_number, FIB[1]);
        assert_eq!(entry.reps_completed, 1);
    }

    #[test]
    fn position_does_not_advance_before_initial_reps_is_reached() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        queue.record_practice(1, &"L1".to_string(), true, false, 3, FIB, ts());
        queue.record_practice(1, &"L1".to_string(), true, false, 3, FIB, ts());
        let entry = queue.get_progress(1, &"L1".to_string()).unwrap();
        assert_eq!(entry.reps_completed, 2);
        assert_eq!(entry.fibonacci_position, 0);

        queue.record_practice(1, &"L1".to_string(), true, false, 3, FIB, ts());
        let entry = queue.get_progress(1, &"L1".to_string()).unwrap();
        assert_eq!(entry.reps_completed, 3);
        assert_eq!(entry.fibonacci_position, 1);
    }

    #[test]
    fn a_spike_regresses_the_fibonacci_position_by_one() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        queue.record_practice(1, &"L1".to_string(), true, false, 1, FIB, ts());
        queue.record_practice(1, &"L1".to_string(), true, false, 1, FIB, ts());
        assert_eq!(queue.get_progress(1, &"L1".to_string()).unwrap().fibonacci_position, 2);

        queue.record_practice(1, &"L1".to_string(), false, true, 1, FIB, ts());
        let entry = queue.get_progress(1, &"L1".to_string()).unwrap();
        assert_eq!(entry.fibonacci_position, 1);
        assert_eq!(entry.skip_number, FIB[1]);

        // Regression never goes below zero.
        queue.record_practice(1, &"L1".to_string(), false, true, 1, FIB, ts());
        queue.record_practice(1, &"L1".to_string(), false, true, 1, FIB, ts());
        let entry = queue.get_progress(1, &"L1".to_string()).unwrap();
        assert_eq!(entry.fibonacci_position, 0);
    }

    #[test]
    fn exhausting_the_sequence_retires_the_lego() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        for _ in 0..FIB.len() {
            queue.record_practice(1, &"L1".to_string(), true, false, 1, FIB, ts());
        }
        assert!(queue.get_progress(1, &"L1".to_string()).unwrap().is_retired);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(queue.get_next(1, 7, &mut rng).is_none());
    }

    #[test]
    fn decrement_skip_numbers_excludes_just_practiced_lego() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        queue.add_new(1, "L2".into(), "C1".into());
        queue.record_practice(1, &"L1".to_string(), true, false, 1, FIB, ts());
        let before = queue.get_progress(1, &"L2".to_string()).unwrap().skip_number;
        queue.decrement_skip_numbers(1, &"L1".to_string());
        let l1_skip = queue.get_progress(1, &"L1".to_string()).unwrap().skip_number;
        let l2_skip = queue.get_progress(1, &"L2".to_string()).unwrap().skip_number;
        assert_eq!(l1_skip, FIB[1]); // untouched, it was excluded
        assert_eq!(l2_skip, before.saturating_sub(1));
    }

    #[test]
    fn get_ready_only_returns_zero_skip_entries() {
        let mut queue = SpacedRepetitionQueue::new();
        queue.add_new(1, "L1".into(), "C1".into());
        assert_eq!(queue.get_ready(1), vec!["L1".to_string()]);
        queue.record_practice(1, &"L1".to_string(), true, false, 7, FIB, ts());
        assert!(queue.get_ready(1).is_empty());
    }
}
