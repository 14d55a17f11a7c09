//! Pure scheduling core for an adaptive spaced-repetition language trainer.
//!
//! No I/O, no async, no system clock reads: every operation here is a
//! function of its explicit inputs (including `now: DateTime<Utc>` and a
//! caller-supplied `Rng`), so a host can replay a session byte-for-byte
//! given the same inputs and seed. Rendering, audio playback, course
//! content storage, and persistence are the host's job.

pub mod adaptation;
pub mod config;
pub mod error;
pub mod events;
pub mod helix;
pub mod mastery;
pub mod metrics;
pub mod model;
pub mod phrase;
pub mod queue;
pub mod rng;
pub mod round;
pub mod selector;
pub mod spike;

pub use adaptation::AdaptationEngine;
pub use config::{ConfigOverrides, ConfigResolver, LearningConfig};
pub use error::SchedulerError;
pub use events::{CollectingEventSink, LoggingEventSink, NullEventSink, SchedulerEvent, SchedulerEventSink};
pub use helix::{NextAction, TripleHelixEngine};
pub use mastery::MasteryStateMachine;
pub use metrics::MetricsTracker;
pub use phrase::{EternalSelectionMode, PhraseSelector};
pub use queue::SpacedRepetitionQueue;
pub use round::{RoundEngine, RoundResult};
pub use selector::WeightedSelector;
pub use spike::SpikeDetector;

pub use model::{
    AdaptedAction, AdaptedItem, AudioRef, AudioRefs, BreakdownState, CalibrationState,
    ClassifiedBasket, Competence, ContinuousPerformanceScore, CourseId, ItemMode, LanguagePair,
    LearnerBaseline, LegoId, LegoKind, LegoMasteryState, LegoPair, LegoProgress, MasteryLevel,
    MasteryTransition, PhraseClassification, PhraseId, PhraseRole, PracticePhrase, ResponseMetric,
    RoundPhase, RoundState, SeedId, SeedPair, SeedProgress, SpikeEvent, SpikeResponseKind,
    SpikeSeverity, TargetVoices, ThreadHelixState, ThreadId, TimingCompetenceSignal, TimingFields,
};
