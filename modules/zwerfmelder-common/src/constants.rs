//! Tuning thresholds for the reconfirmation/dedupe engine.

use std::time::Duration;

/// Radius for duplicate-submission triage candidates.
pub const DEDUPE_RADIUS_METERS: f64 = 15.0;
/// How far back duplicate triage looks.
pub const DEDUPE_LOOKBACK_DAYS: i64 = 30;
/// At most this many duplicate candidates are surfaced per new report.
pub const DEDUPE_CANDIDATE_LIMIT: usize = 5;

/// Radius for same-bike (bike group) matching. Tighter than the duplicate
/// radius: a bike group is a single physical object, not a nearby incident.
pub const SIGNAL_MATCH_RADIUS_METERS: f64 = 10.0;
/// How far back bike-group matching looks.
pub const SIGNAL_CANDIDATE_LOOKBACK_DAYS: i64 = 180;
/// Minimum gap before a repeat report counts as a reconfirmation.
pub const SIGNAL_RECONFIRMATION_GAP_DAYS: i64 = 28;
/// Unique reporters required for the strong signal tier.
pub const STRONG_SIGNAL_MIN_UNIQUE_REPORTERS: u32 = 2;

/// Submission rate limit per source IP.
pub const REPORT_RATE_LIMIT_REQUESTS: u32 = 8;
pub const REPORT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Reports from one fingerprint within the rate-limit window before the
/// current report is flagged for review.
pub const FINGERPRINT_BURST_THRESHOLD: u32 = 4;

/// Lifetime of the signed tracking link issued on submission.
pub const TRACKING_TOKEN_TTL_DAYS: i64 = 90;
