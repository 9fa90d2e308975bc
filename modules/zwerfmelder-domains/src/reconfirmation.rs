//! Reconfirmation classification over a bike group's full report history.
//!
//! The classifier is a pure function of history: every insertion triggers a
//! total recomputation rather than an incremental counter update, so the
//! stored aggregates can always be reproduced from the reports alone. Do not
//! replace this with incremental updates.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use zwerfmelder_common::constants::{
    SIGNAL_RECONFIRMATION_GAP_DAYS, STRONG_SIGNAL_MIN_UNIQUE_REPORTERS,
};
use zwerfmelder_common::{Report, SignalStrength, SignalSummary};

/// How a single report contributes to its group's reconfirmation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconfirmationClass {
    /// First report in the group.
    Initial,
    /// Same reporter already reported this bike on the same UTC calendar
    /// day; never counts, to block trivial reconfirmation farming.
    IgnoredSameDay,
    /// Arrived before the reconfirmation gap elapsed since the previous
    /// report.
    NonQualifying,
    /// Qualifying reconfirmation by a reporter already seen in the group.
    CountedSameReporter,
    /// Qualifying reconfirmation by a reporter new to the group.
    CountedDistinctReporter,
}

impl ReconfirmationClass {
    pub fn qualified(self) -> bool {
        matches!(self, Self::CountedSameReporter | Self::CountedDistinctReporter)
    }
}

/// Result of classifying a full group history.
#[derive(Debug, Clone)]
pub struct ReconfirmationOutcome {
    pub summary: SignalSummary,
    pub signal_strength: SignalStrength,
    pub class_by_report: HashMap<Uuid, ReconfirmationClass>,
}

/// Map aggregate counters to a signal tier. Evaluated fresh on every
/// recomputation; a group's tier can drop when its history changes.
pub fn signal_strength_for(summary: &SignalSummary) -> SignalStrength {
    if summary.distinct_reporter_reconfirmations > 0
        && summary.unique_reporters >= STRONG_SIGNAL_MIN_UNIQUE_REPORTERS
    {
        return SignalStrength::StrongDistinctReporters;
    }

    if summary.has_qualifying_reconfirmation {
        return SignalStrength::WeakSameReporter;
    }

    SignalStrength::None
}

fn same_utc_day(left: DateTime<Utc>, right: DateTime<Utc>) -> bool {
    left.date_naive() == right.date_naive()
}

fn fractional_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 86_400_000.0
}

/// Classify every report in a bike group and derive the aggregate counters.
///
/// Reports are sorted by creation time internally, so the outcome depends
/// only on creation timestamps, never on insertion order.
pub fn classify_group_history(reports: &[Report]) -> ReconfirmationOutcome {
    let mut sorted: Vec<&Report> = reports.iter().collect();
    sorted.sort_by_key(|report| report.created_at);

    let mut class_by_report = HashMap::with_capacity(sorted.len());
    let mut same_reporter_reconfirmations = 0u32;
    let mut distinct_reporter_reconfirmations = 0u32;
    let mut first_qualifying_reconfirmation_at: Option<DateTime<Utc>> = None;
    let mut last_qualifying_reconfirmation_at: Option<DateTime<Utc>> = None;

    for (index, current) in sorted.iter().enumerate() {
        if index == 0 {
            class_by_report.insert(current.id, ReconfirmationClass::Initial);
            continue;
        }

        let earlier = &sorted[..index];

        let same_day_repeat = earlier.iter().any(|candidate| {
            candidate.reporter_hash == current.reporter_hash
                && same_utc_day(candidate.created_at, current.created_at)
        });

        if same_day_repeat {
            class_by_report.insert(current.id, ReconfirmationClass::IgnoredSameDay);
            continue;
        }

        // Gap is measured against the immediately preceding report, not the
        // group's first one.
        let previous = earlier[earlier.len() - 1];
        let gap_days = fractional_days_between(previous.created_at, current.created_at);

        if gap_days < SIGNAL_RECONFIRMATION_GAP_DAYS as f64 {
            class_by_report.insert(current.id, ReconfirmationClass::NonQualifying);
            continue;
        }

        let seen_before = earlier
            .iter()
            .any(|candidate| candidate.reporter_hash == current.reporter_hash);

        if seen_before {
            same_reporter_reconfirmations += 1;
            class_by_report.insert(current.id, ReconfirmationClass::CountedSameReporter);
        } else {
            distinct_reporter_reconfirmations += 1;
            class_by_report.insert(current.id, ReconfirmationClass::CountedDistinctReporter);
        }

        if first_qualifying_reconfirmation_at.is_none() {
            first_qualifying_reconfirmation_at = Some(current.created_at);
        }
        last_qualifying_reconfirmation_at = Some(current.created_at);
    }

    let unique_reporters = sorted
        .iter()
        .map(|report| report.reporter_hash.as_str())
        .collect::<HashSet<_>>()
        .len() as u32;

    let summary = SignalSummary {
        total_reports: sorted.len() as u32,
        unique_reporters,
        same_reporter_reconfirmations,
        distinct_reporter_reconfirmations,
        first_qualifying_reconfirmation_at,
        last_qualifying_reconfirmation_at,
        last_report_at: sorted.last().map(|report| report.created_at),
        has_qualifying_reconfirmation: same_reporter_reconfirmations
            + distinct_reporter_reconfirmations
            > 0,
    };

    let signal_strength = signal_strength_for(&summary);

    ReconfirmationOutcome {
        summary,
        signal_strength,
        class_by_report,
    }
}
