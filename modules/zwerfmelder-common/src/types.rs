use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo ---

/// Where the reporter stood, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportLocation {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    New,
    Triaged,
    Forwarded,
    Resolved,
    Invalid,
}

impl ReportStatus {
    /// Open reports are still actionable and participate in duplicate triage.
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Triaged | Self::Forwarded)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Triaged => write!(f, "triaged"),
            Self::Forwarded => write!(f, "forwarded"),
            Self::Resolved => write!(f, "resolved"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Confidence tier that a bike group represents a genuinely abandoned bike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    None,
    WeakSameReporter,
    StrongDistinctReporters,
}

impl SignalStrength {
    /// Ascending ordering used by the operator "signal" sort.
    pub fn priority(self) -> u8 {
        match self {
            Self::None => 0,
            Self::WeakSameReporter => 1,
            Self::StrongDistinctReporters => 2,
        }
    }
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::WeakSameReporter => write!(f, "weak_same_reporter"),
            Self::StrongDistinctReporters => write!(f, "strong_distinct_reporters"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReporterMatchKind {
    SameReporter,
    DistinctReporter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Web,
    PartnerImport,
}

// --- Entities ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub is_active: bool,
}

/// A citizen report. Immutable after creation except for `status`,
/// `dedupe_group_id`, `flagged_for_review` and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    /// Short public identifier used in tracking links.
    pub public_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub location: ReportLocation,
    pub tags: Vec<String>,
    pub note: Option<String>,
    pub source: ReportSource,
    /// Set only when an operator merges this report into a dedupe group.
    pub dedupe_group_id: Option<Uuid>,
    /// Assigned at creation and never reassigned afterwards.
    pub bike_group_id: Uuid,
    pub fingerprint_hash: String,
    pub reporter_hash: String,
    pub flagged_for_review: bool,
}

/// One physical bicycle/location cluster. The anchor coordinate comes from
/// the report that created the group and is never recentered; counters are
/// recomputed from the full report history on every insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BikeGroup {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anchor_lat: f64,
    pub anchor_lng: f64,
    pub last_report_at: DateTime<Utc>,
    pub total_reports: u32,
    pub unique_reporters: u32,
    pub same_reporter_reconfirmations: u32,
    pub distinct_reporter_reconfirmations: u32,
    pub first_qualifying_reconfirmation_at: Option<DateTime<Utc>>,
    pub last_qualifying_reconfirmation_at: Option<DateTime<Utc>>,
    pub signal_strength: SignalStrength,
}

/// Aggregate counters derived from a bike group's report history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSummary {
    pub total_reports: u32,
    pub unique_reporters: u32,
    pub same_reporter_reconfirmations: u32,
    pub distinct_reporter_reconfirmations: u32,
    pub first_qualifying_reconfirmation_at: Option<DateTime<Utc>>,
    pub last_qualifying_reconfirmation_at: Option<DateTime<Utc>>,
    pub last_report_at: Option<DateTime<Utc>>,
    pub has_qualifying_reconfirmation: bool,
}

impl From<&BikeGroup> for SignalSummary {
    fn from(group: &BikeGroup) -> Self {
        Self {
            total_reports: group.total_reports,
            unique_reporters: group.unique_reporters,
            same_reporter_reconfirmations: group.same_reporter_reconfirmations,
            distinct_reporter_reconfirmations: group.distinct_reporter_reconfirmations,
            first_qualifying_reconfirmation_at: group.first_qualifying_reconfirmation_at,
            last_qualifying_reconfirmation_at: group.last_qualifying_reconfirmation_at,
            last_report_at: Some(group.last_report_at),
            has_qualifying_reconfirmation: group.same_reporter_reconfirmations
                + group.distinct_reporter_reconfirmations
                > 0,
        }
    }
}

// --- Audit events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEventType {
    Created,
    StatusChanged,
    Merged,
    Exported,
    SignalReconfirmationCounted,
    SignalReconfirmationIgnoredSameDay,
    SignalStrengthChanged,
}

/// Append-only audit log entry. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEvent {
    pub id: Uuid,
    pub report_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_type: ReportEventType,
    pub actor: String,
    pub metadata: serde_json::Value,
}

/// Event fields supplied by callers; id and timestamp are assigned on append.
#[derive(Debug, Clone)]
pub struct NewReportEvent {
    pub report_id: Uuid,
    pub event_type: ReportEventType,
    pub actor: String,
    pub metadata: serde_json::Value,
}

// --- Operator-curated merges ---

/// Operator-confirmed merge of reports describing the same submission event.
/// Distinct from BikeGroup, which clusters by physical bike over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeGroup {
    pub id: Uuid,
    pub canonical_report_id: Uuid,
    /// Set-union semantics: merging the same canonical again extends this
    /// list without duplicating member ids.
    pub merged_report_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

// --- Intake payload and response ---

/// Validated intake payload. Transport validation and photo handling happen
/// upstream; this is what the engine consumes.
#[derive(Debug, Clone)]
pub struct CreateReportPayload {
    pub location: ReportLocation,
    pub tags: Vec<String>,
    pub note: Option<String>,
    pub client_ts: Option<DateTime<Utc>>,
    pub source: ReportSource,
    pub ip: String,
    pub fingerprint_hash: String,
    pub reporter_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCreateOutcome {
    pub public_id: String,
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub tracking_url: String,
    pub dedupe_candidates: Vec<Uuid>,
    pub flagged_for_review: bool,
    pub bike_group_id: Uuid,
    pub signal_strength: SignalStrength,
    pub signal_summary: SignalSummary,
}

/// Citizen-facing status view, gated behind the tracking token.
#[derive(Debug, Clone, Serialize)]
pub struct ReportTrackingView {
    pub public_id: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Operator read models ---

#[derive(Debug, Clone, Serialize)]
pub struct OperatorReportView {
    #[serde(flatten)]
    pub report: Report,
    pub signal_summary: SignalSummary,
    pub signal_strength: SignalStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSort {
    #[default]
    Newest,
    Signal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorReportFilters {
    pub status: Option<ReportStatus>,
    pub tag: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub signal_strength: Option<SignalStrength>,
    pub has_qualifying_reconfirmation: Option<bool>,
    #[serde(default)]
    pub strong_only: bool,
    #[serde(default)]
    pub sort: ReportSort,
}

/// One row of the per-group reconfirmation timeline shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct SignalTimelineEntry {
    pub report_id: Uuid,
    pub public_id: String,
    pub created_at: DateTime<Utc>,
    /// Stable pseudonym within the group ("Reporter A", "Reporter B", ...).
    pub reporter_label: String,
    pub reporter_match_kind: Option<ReporterMatchKind>,
    pub qualified: bool,
    pub ignored_same_day: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalDetails {
    pub bike_group: BikeGroup,
    pub signal_summary: SignalSummary,
    pub signal_strength: SignalStrength,
    pub timeline: Vec<SignalTimelineEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDetails {
    pub report: Report,
    pub events: Vec<ReportEvent>,
    pub signal_details: SignalDetails,
}

/// Authenticated operator performing a privileged action.
#[derive(Debug, Clone)]
pub struct OperatorSession {
    pub email: String,
}

// --- Export windows ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPeriodType {
    Weekly,
    Monthly,
}

/// Resolved UTC window for an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportWindow {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
