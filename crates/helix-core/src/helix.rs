//! C9: TripleHelixEngine (spec §4.9). Multiplexes several Fibonacci queues
//! (one per thread) with a card-deal SEED distribution and a round-robin
//! active thread, interleaving LEGO introduction Rounds with ordinary
//! spaced-repetition practice.
//!
//! This layer is deliberately content-blind: it decides *which* LEGO needs
//! attention next, never resolves phrases or audio for it. The caller
//! (`AdaptationEngine`) fetches the `ClassifiedBasket` and drives
//! `RoundEngine` against the `RoundState` this engine hands back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::LegoIntroductionConfig;
use crate::model::{
    CourseId, HelixState, LegoId, LegoProgress, SeedId, SeedPair, SeedProgress, ThreadHelixState,
    ThreadId,
};
use crate::queue::SpacedRepetitionQueue;
use crate::round::RoundEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Resume the in-progress Round introducing this LEGO.
    ContinueRound { thread_id: ThreadId, lego_id: LegoId },
    /// Start a new Round for a LEGO that hasn't completed introduction.
    StartRound { thread_id: ThreadId, lego_id: LegoId },
    /// Pull a plain spaced-repetition practice for this LEGO.
    PracticeReady { thread_id: ThreadId, lego_id: LegoId },
    /// No thread has anything ready.
    ThreadExhausted,
}

pub struct TripleHelixEngine {
    state: HelixState,
    queue: SpacedRepetitionQueue,
    seed_progress: HashMap<SeedId, SeedProgress>,
    active_rounds: HashMap<ThreadId, crate::model::RoundState>,
    /// LEGO ids per SEED, in introduction order. Content-bearing, but kept
    /// to ids only: the engine still never looks at language pairs or audio.
    seed_legos: HashMap<SeedId, Vec<LegoId>>,
    course_id: CourseId,
}

impl TripleHelixEngine {
    pub fn new(thread_count: u8) -> Self {
        let mut threads = HashMap::new();
        for t in 1..=thread_count {
            threads.insert(t, ThreadHelixState::default());
        }
        Self {
            state: HelixState {
                active_thread: 1,
                threads,
            },
            queue: SpacedRepetitionQueue::new(),
            seed_progress: HashMap::new(),
            active_rounds: HashMap::new(),
            seed_legos: HashMap::new(),
            course_id: CourseId::default(),
        }
    }

    /// Card-deal distribution (spec §4.9): the i-th SEED lands on thread `(i
    /// mod thread_count) + 1`. Each thread starts parked on the first SEED
    /// dealt to it; `introduce_next_lego` walks its LEGOs in order as the
    /// thread earns room for new content.
    pub fn distribute_seeds(&mut self, seeds: &[SeedPair], course_id: CourseId, thread_count: u8) {
        self.course_id = course_id;
        for (i, seed) in seeds.iter().enumerate() {
            let thread_id = (i % thread_count as usize) as ThreadId + 1;
            let thread = self.state.threads.entry(thread_id).or_default();
            thread.seed_order.push(seed.seed_id.clone());
            if thread.current_seed_id.is_none() {
                thread.current_seed_id = Some(seed.seed_id.clone());
                thread.current_lego_index = 0;
            }
            self.seed_progress
                .entry(seed.seed_id.clone())
                .or_insert_with(|| SeedProgress {
                    seed_id: seed.seed_id.clone(),
                    thread_id,
                    is_introduced: false,
                    introduced_at: None,
                });
            self.seed_legos
                .insert(seed.seed_id.clone(), seed.legos.iter().map(|l| l.id.clone()).collect());
        }
    }

    pub fn add_lego(&mut self, thread_id: ThreadId, lego_id: LegoId, course_id: String) {
        self.queue.add_new(thread_id, lego_id, course_id);
    }

    /// Registers the next not-yet-seen LEGO from the thread's current SEED
    /// into the practice queue, advancing to the next SEED once the current
    /// one is exhausted (marking it introduced). Returns the LEGO registered,
    /// or `None` if the thread has worked through every SEED dealt to it.
    pub fn introduce_next_lego(&mut self, thread_id: ThreadId, now: DateTime<Utc>) -> Option<LegoId> {
        loop {
            let thread = self.state.threads.get(&thread_id)?;
            let seed_id = thread.current_seed_id.clone()?;
            let legos = self.seed_legos.get(&seed_id).cloned().unwrap_or_default();
            let index = thread.current_lego_index;

            if index >= legos.len() {
                self.mark_seed_introduced(&seed_id, now);
                let thread = self.state.threads.get_mut(&thread_id)?;
                let pos = thread.seed_order.iter().position(|s| s == &seed_id);
                let next_seed = pos.and_then(|p| thread.seed_order.get(p + 1)).cloned();
                thread.current_seed_id = next_seed;
                thread.current_lego_index = 0;
                if thread.current_seed_id.is_none() {
                    return None;
                }
                continue;
            }

            let lego_id = legos[index].clone();
            if let Some(thread) = self.state.threads.get_mut(&thread_id) {
                thread.current_lego_index += 1;
            }
            self.queue.add_new(thread_id, lego_id.clone(), self.course_id.clone());
            return Some(lego_id);
        }
    }

    pub fn mark_seed_introduced(&mut self, seed_id: &SeedId, now: DateTime<Utc>) {
        if let Some(progress) = self.seed_progress.get_mut(seed_id) {
            progress.is_introduced = true;
            progress.introduced_at = Some(now);
        }
    }

    /// Priority cascade (spec §4.9): continue any in-progress Round first,
    /// preferring the active thread; otherwise try the active thread's
    /// queue; if that thread's queue is empty but it still has SEEDs left to
    /// introduce, pull the next LEGO in; otherwise rotate through the
    /// remaining threads in order.
    pub fn next_item(&mut self, initial_reps: u32, rng: &mut impl Rng, now: DateTime<Utc>) -> NextAction {
        if let Some(round) = self.active_rounds.get(&self.state.active_thread) {
            return NextAction::ContinueRound {
                thread_id: self.state.active_thread,
                lego_id: round.lego_id.clone(),
            };
        }
        if let Some((&thread_id, round)) = self
            .sorted_thread_ids()
            .into_iter()
            .find_map(|t| self.active_rounds.get(&t).map(|r| (&t, r)))
        {
            return NextAction::ContinueRound {
                thread_id,
                lego_id: round.lego_id.clone(),
            };
        }

        let mut order = vec![self.state.active_thread];
        order.extend(self.sorted_thread_ids().into_iter().filter(|t| *t != self.state.active_thread));

        for thread_id in order {
            if let Some(lego_id) = self.queue.get_next(thread_id, initial_reps, rng) {
                let needs_round = self
                    .queue
                    .get_progress(thread_id, &lego_id)
                    .map(|p| p.needs_round())
                    .unwrap_or(false);
                return if needs_round {
                    NextAction::StartRound { thread_id, lego_id }
                } else {
                    NextAction::PracticeReady { thread_id, lego_id }
                };
            }
            if let Some(lego_id) = self.introduce_next_lego(thread_id, now) {
                return NextAction::StartRound { thread_id, lego_id };
            }
        }
        NextAction::ThreadExhausted
    }

    fn sorted_thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = self.state.threads.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn start_round(&mut self, thread_id: ThreadId, lego_id: LegoId, config: &LegoIntroductionConfig) {
        self.active_rounds.insert(thread_id, RoundEngine::start(lego_id, config));
    }

    pub fn active_round_mut(&mut self, thread_id: ThreadId) -> Option<&mut crate::model::RoundState> {
        self.active_rounds.get_mut(&thread_id)
    }

    pub fn lego_progress_mut(&mut self, thread_id: ThreadId, lego_id: &LegoId) -> Option<&mut LegoProgress> {
        self.queue.get_progress_mut(thread_id, lego_id)
    }

    /// Borrows the active Round and the LEGO's progress simultaneously, both
    /// mutable, for driving `RoundEngine::next`. Disjoint fields, so this
    /// doesn't fight the borrow checker the way two separate accessor calls
    /// chained off `&mut self` would.
    pub fn round_and_progress_mut(
        &mut self,
        thread_id: ThreadId,
        lego_id: &LegoId,
    ) -> (Option<&mut crate::model::RoundState>, Option<&mut LegoProgress>) {
        (
            self.active_rounds.get_mut(&thread_id),
            self.queue.get_progress_mut(thread_id, lego_id),
        )
    }

    pub fn complete_round(&mut self, thread_id: ThreadId, lego_id: &LegoId) {
        self.active_rounds.remove(&thread_id);
        self.queue.mark_introduction_complete(thread_id, lego_id);
    }

    /// Records a practice, then decrements every other LEGO's skip number on
    /// that thread, then rotates the active thread forward.
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
        self.queue.record_practice(
            thread_id,
            lego_id,
            was_successful,
            was_spike,
            initial_reps,
            fibonacci_sequence,
            now,
        );
        self.queue.decrement_skip_numbers(thread_id, lego_id);
        self.rotate_active_thread();
    }

    fn rotate_active_thread(&mut self) {
        let ids = self.sorted_thread_ids();
        if ids.is_empty() {
            return;
        }
        if let Some(pos) = ids.iter().position(|&t| t == self.state.active_thread) {
            self.state.active_thread = ids[(pos + 1) % ids.len()];
        }
    }

    pub fn get_helix_state(&self) -> &HelixState {
        &self.state
    }

    pub fn get_all_lego_progress(&self) -> Vec<LegoProgress> {
        self.queue.get_all_progress()
    }

    pub fn get_all_seed_progress(&self) -> Vec<SeedProgress> {
        self.seed_progress.values().cloned().collect()
    }

    /// Restores persisted state. Entries referencing threads that no longer
    /// exist in `helix_state` are dropped rather than rejected wholesale
    /// (spec §7 `MismatchedIds`): a course edit that removes a thread must
    /// not make the whole save unloadable.
    pub fn load_state(
        &mut self,
        helix_state: HelixState,
        lego_progress: Vec<LegoProgress>,
        seed_progress: Vec<SeedProgress>,
    ) {
        self.state = helix_state;
        let mut kept = Vec::with_capacity(lego_progress.len());
        for entry in lego_progress {
            if self.state.threads.contains_key(&entry.thread_id) {
                kept.push(entry);
            } else {
                tracing::warn!(
                    lego_id = %entry.lego_id,
                    thread_id = entry.thread_id,
                    "dropping lego progress for unknown thread on load"
                );
            }
        }
        self.queue.load_progress(kept);

        self.seed_progress.clear();
        for entry in seed_progress {
            if self.state.threads.contains_key(&entry.thread_id) {
                self.seed_progress.insert(entry.seed_id.clone(), entry);
            } else {
                tracing::warn!(
                    seed_id = %entry.seed_id,
                    thread_id = entry.thread_id,
                    "dropping seed progress for unknown thread on load"
                );
            }
        }
    }
}
