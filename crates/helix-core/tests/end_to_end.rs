//! End-to-end scenarios driving the public API the way a host would:
//! distribute content, pull items, and feed completions back in, without
//! reaching into any engine's private state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use helix_core::{
    AdaptationEngine, AudioRef, AudioRefs, ClassifiedBasket, ItemMode, LanguagePair, LegoKind,
    LegoPair, NextAction, PhraseClassification, PhraseRole, PracticePhrase, RoundEngine,
    RoundResult, SeedPair, TargetVoices,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn audio(id: &str) -> AudioRef {
    AudioRef {
        id: id.into(),
        url: format!("demo://{id}"),
        duration_ms: Some(900),
    }
}

fn phrase(id: &str, lego_id: &str, word_count: u32, role: PhraseRole) -> PracticePhrase {
    PracticePhrase {
        id: id.into(),
        classification: PhraseClassification::Role(role),
        pair: LanguagePair {
            known_text: format!("known {id}"),
            target_text: format!("target {id}"),
        },
        audio: AudioRefs {
            known: audio(id),
            target: TargetVoices {
                voice1: audio(id),
                voice2: audio(id),
            },
        },
        word_count,
        contains_lego_ids: vec![lego_id.into()],
    }
}

fn basket(lego_id: &str) -> ClassifiedBasket {
    let debut = phrase(&format!("{lego_id}-debut"), lego_id, 4, PhraseRole::Build);
    ClassifiedBasket {
        lego_id: lego_id.into(),
        components: Vec::new(),
        debut_phrases: vec![
            phrase(&format!("{lego_id}-p1"), lego_id, 4, PhraseRole::Build),
            phrase(&format!("{lego_id}-p2"), lego_id, 5, PhraseRole::Build),
        ],
        debut,
        build_pool: Vec::new(),
        eternal_pool: Vec::new(),
        introduction_audio: None,
    }
}

/// Drives a freshly-started Round for `lego_id` all the way to `Complete`,
/// feeding every learner-facing deliverable through `process_completion`.
fn run_round_to_completion(
    engine: &mut AdaptationEngine,
    thread_id: u8,
    lego_id: &str,
    basket: &ClassifiedBasket,
    rng: &mut StdRng,
    clock: &mut DateTime<Utc>,
) {
    let config = engine.config().resolve().lego_introduction.clone();
    loop {
        let (round_state, progress) = engine.helix_mut().round_and_progress_mut(thread_id, &lego_id.to_string());
        let (Some(round_state), Some(progress)) = (round_state, progress) else {
            break;
        };
        let result = RoundEngine::next(round_state, basket, progress, &config, rng);
        match result {
            RoundResult::PlayIntroAudio { .. } | RoundResult::PresentDebutLego { .. } => {}
            RoundResult::PresentPhrase { phrase } => {
                *clock += ChronoDuration::seconds(1);
                engine.process_completion(
                    lego_id.to_string(),
                    LegoKind::Atomic,
                    thread_id,
                    1200,
                    phrase.word_count,
                    ItemMode::Introduction,
                    None,
                    rng,
                    *clock,
                );
            }
            RoundResult::ContinueSpacedRep => {
                *clock += ChronoDuration::seconds(1);
                engine.process_completion(
                    lego_id.to_string(),
                    LegoKind::Atomic,
                    thread_id,
                    1200,
                    5,
                    ItemMode::Practice,
                    None,
                    rng,
                    *clock,
                );
            }
            RoundResult::Complete { lego_id } => {
                engine.helix_mut().complete_round(thread_id, &lego_id);
                break;
            }
        }
    }
}

fn seed_pair(id: &str) -> SeedPair {
    SeedPair {
        seed_id: id.into(),
        pair: LanguagePair {
            known_text: format!("known {id}"),
            target_text: format!("target {id}"),
        },
        legos: vec![LegoPair {
            id: format!("{id}-L1"),
            kind: LegoKind::Atomic,
            is_new: true,
            pair: LanguagePair {
                known_text: "hi".into(),
                target_text: "ciao".into(),
            },
            components: None,
            audio: AudioRefs {
                known: audio(id),
                target: TargetVoices {
                    voice1: audio(id),
                    voice2: audio(id),
                },
            },
        }],
    }
}

#[test]
fn seeds_distribute_card_deal_across_threads() {
    let mut engine = AdaptationEngine::new(3, 5);
    let seeds: Vec<SeedPair> = (0..9).map(|i| seed_pair(&format!("S{i}"))).collect();
    engine.helix_mut().distribute_seeds(&seeds, "C1".into(), 3);

    let state = engine.helix().get_helix_state();
    assert_eq!(state.threads[&1].seed_order, vec!["S0", "S3", "S6"]);
    assert_eq!(state.threads[&2].seed_order, vec!["S1", "S4", "S7"]);
    assert_eq!(state.threads[&3].seed_order, vec!["S2", "S5", "S8"]);
}

#[test]
fn a_fresh_lego_runs_a_full_round_then_enters_spaced_repetition() {
    let mut engine = AdaptationEngine::new(2, 5);
    engine.helix_mut().add_lego(1, "L1".into(), "course".into());
    let basket = basket("L1");
    let mut rng = StdRng::seed_from_u64(7);
    let mut clock = ts();

    let action = engine.next_item(&mut rng, clock);
    let (thread_id, lego_id) = match action {
        NextAction::StartRound { thread_id, lego_id } => (thread_id, lego_id),
        other => panic!("expected StartRound, got {other:?}"),
    };
    let config = engine.config().resolve().lego_introduction.clone();
    engine.helix_mut().start_round(thread_id, lego_id.clone(), &config);

    run_round_to_completion(&mut engine, thread_id, &lego_id, &basket, &mut rng, &mut clock);

    // Round finished: the same LEGO now comes back as a plain practice item,
    // never another round, since introduction_complete is set.
    let next = engine.next_item(&mut rng, clock);
    assert!(matches!(next, NextAction::PracticeReady { .. } | NextAction::ThreadExhausted));
}

#[test]
fn a_severe_discontinuity_triggers_a_repeat_action() {
    let mut engine = AdaptationEngine::new(1, 5);
    engine.helix_mut().add_lego(1, "L1".into(), "course".into());
    let mut rng = StdRng::seed_from_u64(3);
    let mut clock = ts();

    // Establish a stable rolling baseline around ~1000ms.
    for _ in 0..6 {
        clock += ChronoDuration::seconds(2);
        engine.process_completion(
            "L1".into(),
            LegoKind::Atomic,
            1,
            1000,
            5,
            ItemMode::Practice,
            None,
            &mut rng,
            clock,
        );
    }

    clock += ChronoDuration::seconds(2);
    let item = engine.process_completion(
        "L1".into(),
        LegoKind::Atomic,
        1,
        8000,
        5,
        ItemMode::Practice,
        None,
        &mut rng,
        clock,
    );

    assert_ne!(item.action, helix_core::AdaptedAction::Continue);
}

#[test]
fn calibration_requires_the_configured_minimum_sample_count() {
    let mut engine = AdaptationEngine::new(1, 3);
    engine.start_calibration();
    engine.record_calibration_sample(900, 5, None);
    let err = engine.complete_calibration(ts()).unwrap_err();
    assert!(matches!(
        err,
        helix_core::SchedulerError::InsufficientCalibrationItems { min: 3, actual: 1 }
    ));

    engine.record_calibration_sample(950, 5, None);
    engine.record_calibration_sample(1000, 5, None);
    engine.complete_calibration(ts()).expect("now enough samples");
    assert!(engine.is_calibrated());
}

#[test]
fn loading_state_with_an_unknown_thread_id_does_not_poison_the_engine() {
    let mut engine = AdaptationEngine::new(2, 5);
    engine.helix_mut().add_lego(1, "L1".into(), "course".into());

    let state = engine.helix().get_helix_state().clone();
    let progress = engine.helix().get_all_lego_progress();
    let seeds = engine.helix().get_all_seed_progress();
    engine.helix_mut().load_state(state, progress, seeds);

    let mut rng = StdRng::seed_from_u64(1);
    let action = engine.next_item(&mut rng, ts());
    assert!(matches!(action, NextAction::StartRound { .. }));
}
