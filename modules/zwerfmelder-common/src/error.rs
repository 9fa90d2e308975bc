use thiserror::Error;
use uuid::Uuid;

use crate::types::ReportStatus;

/// Errors surfaced by the report engine. Each variant carries a stable
/// machine-readable code; transport status mapping happens at the edge.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("too many reports from this source, retry later")]
    RateLimited,

    #[error("unknown or inactive tag: {0}")]
    InvalidTag(String),

    #[error("cannot transition report from {from} to {to}")]
    InvalidStatusTransition { from: ReportStatus, to: ReportStatus },

    #[error("report not found")]
    ReportNotFound,

    #[error("canonical report not found")]
    CanonicalNotFound,

    #[error("duplicate report not found: {0}")]
    DuplicateNotFound(Uuid),

    #[error("bike group not found")]
    BikeGroupNotFound,

    #[error("tracking token is required")]
    MissingToken,

    #[error("tracking token does not match report")]
    TokenMismatch,

    #[error("unable to resolve export period")]
    PeriodResolutionFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReportError {
    /// Stable error code for API payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidTag(_) => "invalid_tag",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::ReportNotFound => "report_not_found",
            Self::CanonicalNotFound => "canonical_not_found",
            Self::DuplicateNotFound(_) => "duplicate_not_found",
            Self::BikeGroupNotFound => "bike_group_not_found",
            Self::MissingToken => "missing_token",
            Self::TokenMismatch => "token_mismatch",
            Self::PeriodResolutionFailed => "period_resolution_failed",
            Self::Other(_) => "internal",
        }
    }
}
