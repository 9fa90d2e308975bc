//! Pure domain logic for the report engine: geo distance, candidate scoring,
//! reconfirmation classification, signal tiers, lifecycle rules and export
//! period resolution. No I/O and no shared state; everything here is a
//! deterministic function of its inputs.

pub mod export_period;
pub mod geo;
pub mod lifecycle;
pub mod reconfirmation;
pub mod scoring;

pub use export_period::resolve_export_window;
pub use geo::haversine_meters;
pub use lifecycle::ensure_transition;
pub use reconfirmation::{
    classify_group_history, signal_strength_for, ReconfirmationClass, ReconfirmationOutcome,
};
pub use scoring::{
    dedupe_lookback_start, score_duplicate_candidate, score_signal_candidate,
    signal_lookback_start, DuplicateCandidate,
};
