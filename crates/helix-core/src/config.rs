//! C1: ConfigResolver (spec §4.1). Three-tier deep-by-section merge of
//! system defaults, course overrides, and learner overrides. The resolver
//! never mutates its source partials; `resolve()` always returns a fresh
//! `LearningConfig`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    CardDeal,
    Sequential,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    Repeat,
    Breakdown,
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelixConfig {
    pub thread_count: u8,
    pub initial_seed_count: u32,
    pub distribution_method: DistributionMethod,
    pub content_injection_max_threads: u8,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            thread_count: 3,
            initial_seed_count: 150,
            distribution_method: DistributionMethod::CardDeal,
            content_injection_max_threads: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionConfig {
    pub initial_reps: u32,
    pub min_reps: u32,
    pub max_reps: u32,
    pub fibonacci_sequence: Vec<u32>,
    pub core_sentence_count: u32,
    pub core_refresh_hours: u32,
    pub adaptive_reps_enabled: bool,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            initial_reps: 7,
            min_reps: 3,
            max_reps: 15,
            fibonacci_sequence: vec![1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89],
            core_sentence_count: 30,
            core_refresh_hours: 5,
            adaptive_reps_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    pub pause_duration_ms: u64,
    pub min_pause_ms: u64,
    pub max_pause_ms: u64,
    pub transition_gap_ms: u64,
    pub pause_adapts_to_phrase_length: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            pause_duration_ms: 3000,
            min_pause_ms: 1000,
            max_pause_ms: 10000,
            transition_gap_ms: 500,
            pause_adapts_to_phrase_length: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeConfig {
    pub rolling_window_size: usize,
    pub threshold_percent: f64,
    pub response_strategy: ResponseStrategy,
    pub alternate_sequence: Vec<String>,
    pub cooldown_items: u32,
    pub use_stddev_detection: bool,
    pub stddev_threshold: f64,
    pub pause_extension_enabled: bool,
    pub pause_extension_factor: f64,
    pub pause_extension_duration: u32,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            rolling_window_size: 10,
            threshold_percent: 150.0,
            response_strategy: ResponseStrategy::Repeat,
            alternate_sequence: vec!["repeat".into(), "breakdown".into()],
            cooldown_items: 3,
            use_stddev_detection: true,
            stddev_threshold: 2.0,
            pause_extension_enabled: true,
            pause_extension_factor: 0.3,
            pause_extension_duration: 3,
        }
    }
}

/// RoundEngine defaults (spec §4.8), configurable per course/learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegoIntroductionConfig {
    pub max_build_phrases: u32,
    pub spaced_rep_interleave_count: u32,
    pub consolidation_count: u32,
    pub eternal_selection_mode: crate::phrase::EternalSelectionMode,
}

impl Default for LegoIntroductionConfig {
    fn default() -> Self {
        Self {
            max_build_phrases: 7,
            spaced_rep_interleave_count: 12,
            consolidation_count: 2,
            eternal_selection_mode: crate::phrase::EternalSelectionMode::RandomUrn,
        }
    }
}

/// `MasteryStateMachine` thresholds (spec §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryConfig {
    pub advancement_threshold: u32,
    pub fast_track_threshold: u32,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            advancement_threshold: 3,
            fast_track_threshold: 5,
        }
    }
}

/// `WeightedSelector` weighting constants (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub staleness_rate: f64,
    pub struggle_multiplier: f64,
    pub recency_window_minutes: f64,
    pub decay_days_threshold: i64,
    pub decay_amount: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            staleness_rate: 0.1,
            struggle_multiplier: 0.5,
            recency_window_minutes: 30.0,
            decay_days_threshold: 7,
            decay_amount: 1,
        }
    }
}

/// Continuous performance scoring constants (spec §4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub latency_weight: f64,
    pub multiplier_min: f64,
    pub multiplier_max: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            latency_weight: 0.6,
            multiplier_min: 0.5,
            multiplier_max: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInjectionConfig {
    pub enabled: bool,
}

impl Default for ContentInjectionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineConfig {
    pub enabled: bool,
    pub max_queue_size: u32,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_queue_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_session_length: u32,
    pub max_session_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_session_length: 20,
            max_session_minutes: 30,
        }
    }
}

/// Feature gates for optional behaviors (e.g. `"spike_detection"`,
/// `"continuous_scoring"`). Absent keys default to enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(flatten)]
    pub flags: HashMap<String, bool>,
}

impl FeaturesConfig {
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    pub enabled: bool,
    pub quick_response_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            quick_response_ms: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LearningConfig {
    pub helix: HelixConfig,
    pub repetition: RepetitionConfig,
    pub cycle: CycleConfig,
    pub spike: SpikeConfig,
    pub mastery: MasteryConfig,
    pub selector: SelectorConfig,
    pub scoring: ScoringConfig,
    pub lego_introduction: LegoIntroductionConfig,
    pub content_injection: ContentInjectionConfig,
    pub offline: OfflineConfig,
    pub session: SessionConfig,
    pub features: FeaturesConfig,
    pub vad: VadConfig,
}

/// One layer of overrides: `section -> key -> value`. Keys absent from the
/// layer fall through to the layer beneath; sections/keys the resolver
/// doesn't recognize are ignored (spec §7 `InvalidConfigOverride`).
pub type ConfigOverrides = HashMap<String, Map<String, Value>>;

#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    system_defaults: LearningConfig,
    course_overrides: ConfigOverrides,
    learner_overrides: ConfigOverrides,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            system_defaults: LearningConfig::default(),
            course_overrides: ConfigOverrides::new(),
            learner_overrides: ConfigOverrides::new(),
        }
    }

    pub fn with_system_defaults(system_defaults: LearningConfig) -> Self {
        Self {
            system_defaults,
            course_overrides: ConfigOverrides::new(),
            learner_overrides: ConfigOverrides::new(),
        }
    }

    /// Deep-by-section merge: system defaults -> course overrides -> learner
    /// overrides. Never mutates the resolver's stored layers.
    pub fn resolve(&self) -> LearningConfig {
        let mut value =
            serde_json::to_value(&self.system_defaults).expect("LearningConfig always serializes");
        Self::merge_layer(&mut value, &self.course_overrides);
        Self::merge_layer(&mut value, &self.learner_overrides);
        serde_json::from_value(value).unwrap_or_else(|_| self.system_defaults.clone())
    }

    fn merge_layer(base: &mut Value, layer: &ConfigOverrides) {
        let Some(base_obj) = base.as_object_mut() else {
            return;
        };
        for (section, keys) in layer {
            let Some(section_obj) = base_obj.get_mut(section).and_then(Value::as_object_mut)
            else {
                tracing::warn!(section, "InvalidConfigOverride: unknown section, ignored");
                continue;
            };
            for (key, val) in keys {
                if section_obj.contains_key(key) {
                    section_obj.insert(key.clone(), val.clone());
                } else {
                    tracing::warn!(section, key, "InvalidConfigOverride: unknown key, ignored");
                }
            }
        }
    }

    pub fn get(&self) -> LearningConfig {
        self.resolve()
    }

    /// Reads a single resolved value by dotted `section.key` path.
    pub fn get_param(&self, section: &str, key: &str) -> Option<Value> {
        let resolved = serde_json::to_value(self.resolve()).ok()?;
        resolved.get(section)?.get(key).cloned()
    }

    pub fn set_course_overrides(&mut self, overrides: ConfigOverrides) {
        self.course_overrides = overrides;
    }

    pub fn set_learner_overrides(&mut self, overrides: ConfigOverrides) {
        self.learner_overrides = overrides;
    }

    /// Upserts a single key within the learner override layer.
    pub fn update_learner_param(&mut self, section: &str, key: &str, value: Value) {
        self.learner_overrides
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn reset_learner_overrides(&mut self) {
        self.learner_overrides.clear();
    }

    pub fn export_overrides(&self) -> (ConfigOverrides, ConfigOverrides) {
        (self.course_overrides.clone(), self.learner_overrides.clone())
    }

    pub fn import_overrides(&mut self, course: ConfigOverrides, learner: ConfigOverrides) {
        self.course_overrides = course;
        self.learner_overrides = learner;
    }
}
