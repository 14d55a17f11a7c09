//! C8: RoundEngine (spec §4.8). Drives a LEGO through its six-phase
//! introduction: IntroAudio -> Components (always skipped, feeds Breakdown
//! only) -> DebutLego -> DebutPhrases -> SpacedRep -> Consolidation.

use rand::Rng;

use crate::config::LegoIntroductionConfig;
use crate::model::{ClassifiedBasket, LegoId, LegoProgress, PracticePhrase, RoundPhase, RoundState};
use crate::phrase::PhraseSelector;

#[derive(Debug, Clone)]
pub enum RoundResult {
    PlayIntroAudio {
        lego_id: LegoId,
    },
    /// The Components phase is structural only: it is never delivered to the
    /// learner, so the engine fast-forwards through it on its own.
    PresentDebutLego {
        lego_id: LegoId,
    },
    PresentPhrase {
        phrase: PracticePhrase,
    },
    /// Signals the host to pull the LEGO's next spaced-repetition item from
    /// `SpacedRepetitionQueue` itself; the Round doesn't own the queue.
    ContinueSpacedRep,
    Complete {
        lego_id: LegoId,
    },
}

pub struct RoundEngine;

impl RoundEngine {
    pub fn start(lego_id: LegoId, config: &LegoIntroductionConfig) -> RoundState {
        RoundState::new(
            lego_id,
            config.spaced_rep_interleave_count,
            config.consolidation_count,
        )
    }

    pub fn needs_round(progress: &LegoProgress) -> bool {
        progress.needs_round()
    }

    fn advance(state: &mut RoundState, phase: RoundPhase) {
        state.current_phase = phase;
        state.phase_index = 0;
    }

    /// Produces the next delivery for this Round, advancing `state` in
    /// place. Recurses through phases that never reach the learner
    /// (Components), have been fully consumed, or don't apply to this
    /// basket (IntroAudio with no audio, or once already played), so every
    /// call either returns a deliverable or `Complete`.
    pub fn next(
        state: &mut RoundState,
        basket: &ClassifiedBasket,
        progress: &mut LegoProgress,
        config: &LegoIntroductionConfig,
        rng: &mut impl Rng,
    ) -> RoundResult {
        match state.current_phase {
            RoundPhase::IntroAudio => {
                if basket.introduction_audio.is_none() || progress.introduction_played {
                    Self::advance(state, RoundPhase::Components);
                    return Self::next(state, basket, progress, config, rng);
                }
                progress.introduction_played = true;
                let result = RoundResult::PlayIntroAudio {
                    lego_id: state.lego_id.clone(),
                };
                Self::advance(state, RoundPhase::Components);
                result
            }
            RoundPhase::Components => {
                Self::advance(state, RoundPhase::DebutLego);
                Self::next(state, basket, progress, config, rng)
            }
            RoundPhase::DebutLego => {
                let result = RoundResult::PresentDebutLego {
                    lego_id: state.lego_id.clone(),
                };
                Self::advance(state, RoundPhase::DebutPhrases);
                result
            }
            RoundPhase::DebutPhrases => {
                if state.phase_index < basket.debut_phrases.len() {
                    let phrase = basket.debut_phrases[state.phase_index].clone();
                    state.phase_index += 1;
                    RoundResult::PresentPhrase { phrase }
                } else {
                    Self::advance(state, RoundPhase::SpacedRep);
                    Self::next(state, basket, progress, config, rng)
                }
            }
            RoundPhase::SpacedRep => {
                if state.spaced_rep_completed < state.spaced_rep_target {
                    RoundResult::ContinueSpacedRep
                } else {
                    Self::advance(state, RoundPhase::Consolidation);
                    Self::next(state, basket, progress, config, rng)
                }
            }
            RoundPhase::Consolidation => {
                if state.consolidation_remaining > 0 {
                    state.consolidation_remaining -= 1;
                    let phrase = PhraseSelector::select_eternal_phrase(
                        basket,
                        &mut progress.eternal_urn,
                        &mut progress.last_eternal_phrase_id,
                        config.eternal_selection_mode,
                        rng,
                    )
                    .unwrap_or_else(|| basket.debut.clone());
                    RoundResult::PresentPhrase { phrase }
                } else {
                    RoundResult::Complete {
                        lego_id: state.lego_id.clone(),
                    }
                }
            }
        }
    }

    /// Called by the host once a SpacedRep item the queue delivered has
    /// been practiced, so the Round can track progress toward its target.
    pub fn record_spaced_rep_practice(state: &mut RoundState) {
        if state.current_phase == RoundPhase::SpacedRep {
            state.spaced_rep_completed += 1;
        }
    }
}
