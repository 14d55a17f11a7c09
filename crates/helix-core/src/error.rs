use thiserror::Error;

/// Structured failures surfaced by the scheduler's public API.
///
/// Most of the engine is best-effort (see the module docs on `helix`):
/// a missing basket or SEED during Round continuation abandons the Round
/// rather than raising an error. `SchedulerError` exists only for the
/// handful of operations where the caller needs a typed reason.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no candidates to select from")]
    EmptyCandidates,

    #[error("invalid spike severity, defaulting to Mild")]
    InvalidSeverity,

    #[error("calibration requires at least {min} items, have {actual}")]
    InsufficientCalibrationItems { min: usize, actual: usize },

    #[error("config override section/key not recognized: {section}.{key}")]
    InvalidConfigOverride { section: String, key: String },

    #[error("lego {lego_id} referenced in loaded state has no matching entry, ignored")]
    MismatchedIds { lego_id: String },
}
