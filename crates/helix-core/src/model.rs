//! Core data model (spec §3). Identifiers are opaque strings; timestamps are
//! `chrono::DateTime<Utc>` supplied explicitly by callers rather than read
//! from the system clock, so every engine operation stays deterministic
//! given its inputs (spec §5).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type LegoId = String;
pub type SeedId = String;
pub type PhraseId = String;
pub type CourseId = String;
pub type ThreadId = u8;

// ============================================================================
// CONTENT: language pairs, audio, LEGOs, phrases, SEEDs
// ============================================================================

/// An ordered known/target language pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub known_text: String,
    pub target_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub id: String,
    pub url: String,
    pub duration_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetVoices {
    pub voice1: AudioRef,
    pub voice2: AudioRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRefs {
    pub known: AudioRef,
    pub target: TargetVoices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegoKind {
    Atomic,
    Molecular,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegoPair {
    pub id: LegoId,
    pub kind: LegoKind,
    pub is_new: bool,
    pub pair: LanguagePair,
    /// Ordered known/target components. Only meaningful for `Molecular`
    /// LEGOs; drives Breakdown sequences in the adaptation layer only — the
    /// Components phase itself is never delivered to the learner.
    pub components: Option<Vec<LanguagePair>>,
    pub audio: AudioRefs,
}

/// Current role of a practice phrase within a LEGO's basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseRole {
    Component,
    Build,
    Use,
}

/// Legacy authoring vocabulary, mapped to `PhraseRole` on ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyPhraseType {
    Component,
    Debut,
    Practice,
    Eternal,
}

impl LegacyPhraseType {
    pub fn to_role(self) -> PhraseRole {
        match self {
            LegacyPhraseType::Component => PhraseRole::Component,
            LegacyPhraseType::Debut => PhraseRole::Build,
            LegacyPhraseType::Practice | LegacyPhraseType::Eternal => PhraseRole::Use,
        }
    }
}

/// How a phrase was classified by its authors: the new-style `role`, or a
/// legacy `type` that `PhraseSelector` maps to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhraseClassification {
    Role(PhraseRole),
    Legacy(LegacyPhraseType),
}

impl PhraseClassification {
    pub fn role(self) -> PhraseRole {
        match self {
            PhraseClassification::Role(r) => r,
            PhraseClassification::Legacy(l) => l.to_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticePhrase {
    pub id: PhraseId,
    pub classification: PhraseClassification,
    pub pair: LanguagePair,
    pub audio: AudioRefs,
    pub word_count: u32,
    pub contains_lego_ids: Vec<LegoId>,
}

impl PracticePhrase {
    pub fn role(&self) -> PhraseRole {
        self.classification.role()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPair {
    pub seed_id: SeedId,
    pub pair: LanguagePair,
    pub legos: Vec<LegoPair>,
}

/// Per-LEGO derived basket of classified phrases (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedBasket {
    pub lego_id: LegoId,
    /// Never delivered to the learner; feeds Breakdown sequences only.
    pub components: Vec<PracticePhrase>,
    pub debut: PracticePhrase,
    pub debut_phrases: Vec<PracticePhrase>,
    /// Sorted ascending by target character length.
    pub build_pool: Vec<PracticePhrase>,
    /// Sorted ascending by target character length.
    pub eternal_pool: Vec<PracticePhrase>,
    pub introduction_audio: Option<AudioRef>,
}

// ============================================================================
// PROGRESS / STATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegoProgress {
    pub lego_id: LegoId,
    pub course_id: CourseId,
    pub thread_id: ThreadId,
    pub fibonacci_position: usize,
    pub skip_number: u32,
    pub reps_completed: u32,
    pub is_retired: bool,
    pub last_practiced_at: Option<DateTime<Utc>>,
    // Round fields
    pub introduction_played: bool,
    pub introduction_index: usize,
    pub introduction_complete: bool,
    pub eternal_urn: Vec<PhraseId>,
    pub last_eternal_phrase_id: Option<PhraseId>,
}

impl LegoProgress {
    pub fn new(lego_id: LegoId, course_id: CourseId, thread_id: ThreadId) -> Self {
        Self {
            lego_id,
            course_id,
            thread_id,
            fibonacci_position: 0,
            skip_number: 0,
            reps_completed: 0,
            is_retired: false,
            last_practiced_at: None,
            introduction_played: false,
            introduction_index: 0,
            introduction_complete: false,
            eternal_urn: Vec::new(),
            last_eternal_phrase_id: None,
        }
    }

    pub fn needs_round(&self) -> bool {
        !self.introduction_complete
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProgress {
    pub seed_id: SeedId,
    pub thread_id: ThreadId,
    pub is_introduced: bool,
    pub introduced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    IntroAudio,
    Components,
    DebutLego,
    DebutPhrases,
    SpacedRep,
    Consolidation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub lego_id: LegoId,
    pub current_phase: RoundPhase,
    pub phase_index: usize,
    pub spaced_rep_target: u32,
    pub spaced_rep_completed: u32,
    pub consolidation_remaining: u32,
}

impl RoundState {
    pub fn new(lego_id: LegoId, spaced_rep_target: u32, consolidation_count: u32) -> Self {
        Self {
            lego_id,
            current_phase: RoundPhase::IntroAudio,
            phase_index: 0,
            spaced_rep_target,
            spaced_rep_completed: 0,
            consolidation_remaining: consolidation_count,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadHelixState {
    pub seed_order: Vec<SeedId>,
    pub current_seed_id: Option<SeedId>,
    pub current_lego_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelixState {
    pub active_thread: ThreadId,
    pub threads: HashMap<ThreadId, ThreadHelixState>,
}

// ============================================================================
// MASTERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    Acquisition,
    Consolidating,
    Confident,
    Mastered,
}

impl MasteryLevel {
    pub fn index(self) -> u8 {
        match self {
            MasteryLevel::Acquisition => 0,
            MasteryLevel::Consolidating => 1,
            MasteryLevel::Confident => 2,
            MasteryLevel::Mastered => 3,
        }
    }

    pub fn from_index(i: u8) -> Self {
        match i {
            0 => MasteryLevel::Acquisition,
            1 => MasteryLevel::Consolidating,
            2 => MasteryLevel::Confident,
            _ => MasteryLevel::Mastered,
        }
    }

    pub fn advance(self, steps: u8) -> Self {
        Self::from_index((self.index().saturating_add(steps)).min(3))
    }

    pub fn regress(self, steps: u8) -> Self {
        Self::from_index(self.index().saturating_sub(steps))
    }

    /// Typical skip value hint for this mastery state (spec §4.4).
    pub fn typical_skip(self) -> u32 {
        match self {
            MasteryLevel::Acquisition => 1,
            MasteryLevel::Consolidating => 3,
            MasteryLevel::Confident => 8,
            MasteryLevel::Mastered => 21,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasteryTransition {
    Advancement,
    FastTrack,
    Hold,
    Regression,
    /// A regression was attempted but the state was already clamped at
    /// `Acquisition`, so nothing actually changed.
    NoChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegoMasteryState {
    pub lego_id: LegoId,
    pub current_state: MasteryLevel,
    pub consecutive_smooth: u32,
    pub consecutive_fast: u32,
    pub discontinuity_count: u32,
    pub last_discontinuity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LegoMasteryState {
    pub fn new(lego_id: LegoId, now: DateTime<Utc>) -> Self {
        Self {
            lego_id,
            current_state: MasteryLevel::Acquisition,
            consecutive_smooth: 0,
            consecutive_fast: 0,
            discontinuity_count: 0,
            last_discontinuity_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// METRICS / SPIKES
// ============================================================================

/// What kind of item a response was recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemMode {
    Introduction,
    Review,
    Practice,
}

/// Optional richer timing data from voice-activity detection, reported by
/// the (out-of-scope) host audio layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingFields {
    pub speech_detected: bool,
    pub true_latency_ms: u32,
    pub learner_duration_ms: u32,
    pub duration_delta_ms: f64,
    pub started_during_prompt: bool,
    pub still_speaking_at_voice1: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetric {
    pub lego_id: LegoId,
    pub timestamp: DateTime<Utc>,
    pub response_latency_ms: u32,
    pub phrase_length: u32,
    pub normalized_latency: f64,
    pub thread_id: ThreadId,
    pub mode: ItemMode,
    pub triggered_spike: bool,
    pub timing: Option<TimingFields>,
}

impl ResponseMetric {
    pub fn normalize(latency_ms: u32, phrase_length: u32) -> f64 {
        latency_ms as f64 / (phrase_length.max(5)) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeSeverity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeResponseKind {
    Repeat,
    Breakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub lego_id: LegoId,
    pub timestamp: DateTime<Utc>,
    pub latency: f64,
    pub rolling_average: f64,
    pub spike_ratio: f64,
    pub response: SpikeResponseKind,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerBaseline {
    pub calibrated_at: DateTime<Utc>,
    pub calibration_items: usize,
    pub latency_mean: f64,
    pub latency_std_dev: f64,
    pub duration_delta_mean: f64,
    pub duration_delta_std_dev: f64,
    pub had_timing_data: bool,
}

// ============================================================================
// SESSIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: Vec<ResponseMetric>,
    pub spikes: Vec<SpikeEvent>,
    pub final_rolling_average: Option<f64>,
}

impl SessionMetrics {
    pub fn new(id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            metrics: Vec::new(),
            spikes: Vec::new(),
            final_rolling_average: None,
        }
    }
}

// ============================================================================
// LEARNING ITEMS / ADAPTED RESPONSE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningItem {
    pub lego_id: LegoId,
    pub seed_id: Option<SeedId>,
    pub thread_id: ThreadId,
    pub phrase: Option<PracticePhrase>,
    pub mode: ItemMode,
    pub is_introduction_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptedAction {
    Continue,
    Repeat,
    Breakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptedItem {
    pub action: AdaptedAction,
    pub reason: String,
    pub pause_duration_ms: u64,
    pub breakdown_component_ids: Option<Vec<LegoId>>,
}

/// In-flight Breakdown sequence state (spec §4.10 final paragraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownState {
    pub lego_id: LegoId,
    pub component_ids: Vec<LegoId>,
    pub current_index: usize,
    pub in_buildup: bool,
}

// ============================================================================
// CALIBRATION / CONTINUOUS SCORING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Competence {
    Struggling,
    Neutral,
    Confident,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingCompetenceSignal {
    pub competence: Competence,
    pub recommend_extend_pause: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContinuousPerformanceScore {
    pub overall: f64,
    pub latency_z: Option<f64>,
    pub duration_delta_z: Option<f64>,
    pub target_multiplier: f64,
}
