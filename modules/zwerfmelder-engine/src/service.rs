//! The report intake orchestrator and operator read paths.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use zwerfmelder_common::constants::DEDUPE_CANDIDATE_LIMIT;
use zwerfmelder_common::{
    BikeGroup, CreateReportPayload, DedupeGroup, ExportPeriodType, ExportWindow, NewReportEvent,
    OperatorReportFilters, OperatorReportView, OperatorSession, Report, ReportCreateOutcome,
    ReportDetails, ReportError, ReportEvent, ReportEventType, ReportLocation, ReportSort,
    ReportStatus, ReportTrackingView, ReporterMatchKind, SignalDetails, SignalStrength,
    SignalSummary, SignalTimelineEntry, Tag,
};
use zwerfmelder_domains::reconfirmation::ReconfirmationClass;
use zwerfmelder_domains::scoring::DuplicateCandidate;
use zwerfmelder_domains::{
    classify_group_history, dedupe_lookback_start, ensure_transition, resolve_export_window,
    score_duplicate_candidate, score_signal_candidate, signal_lookback_start,
};

use crate::clock::{Clock, SystemClock};
use crate::locks::KeyedLocks;
use crate::repository::Repository;
use crate::throttle::{BurstTracker, RateLimiter};
use crate::tracking::TrackingTokens;

const SYSTEM_ACTOR: &str = "system";
const CITIZEN_ACTOR: &str = "citizen_anonymous";

/// Wiring for a `ReportService`.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub public_base_url: String,
    pub signing_secret: String,
    pub export_timezone: Tz,
}

/// Composes the scoring/classification logic, the repository, throttling
/// state and tracking tokens into the end-to-end report operations.
///
/// The scoring and classification calls are pure; all shared mutable state
/// lives in the injected throttle components, the per-group lock registry
/// and the repository.
pub struct ReportService {
    repo: Arc<dyn Repository>,
    limiter: RateLimiter,
    bursts: BurstTracker,
    tokens: TrackingTokens,
    group_locks: KeyedLocks,
    public_base_url: String,
    export_timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn Repository>, options: ServiceOptions) -> Self {
        Self::with_clock(repo, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repo: Arc<dyn Repository>,
        options: ServiceOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            limiter: RateLimiter::default(),
            bursts: BurstTracker::default(),
            tokens: TrackingTokens::new(&options.signing_secret),
            group_locks: KeyedLocks::new(),
            public_base_url: options.public_base_url,
            export_timezone: options.export_timezone,
            clock,
        }
    }

    /// End-to-end report creation: throttle, tag check, bike-group
    /// resolution, persistence, total group recomputation, audit events,
    /// duplicate triage, burst heuristic, tracking token.
    pub async fn create_report(
        &self,
        payload: CreateReportPayload,
    ) -> Result<ReportCreateOutcome, ReportError> {
        let decision = self
            .limiter
            .check(&format!("report:{}", payload.ip), Instant::now());
        if !decision.allowed {
            warn!(ip = %payload.ip, "report submission rate limited");
            return Err(ReportError::RateLimited);
        }

        let active_tags: HashSet<String> = self
            .repo
            .get_tags()
            .await?
            .into_iter()
            .filter(|tag| tag.is_active)
            .map(|tag| tag.code)
            .collect();

        for tag in &payload.tags {
            if !active_tags.contains(tag) {
                return Err(ReportError::InvalidTag(tag.clone()));
            }
        }

        let now = self.clock.now();
        let group = match self
            .resolve_bike_group(payload.location, &payload.tags, now)
            .await?
        {
            Some(group) => group,
            None => self.repo.create_bike_group(payload.location).await?,
        };

        // Critical section: no other write to this group may interleave
        // between the insert and the counter update.
        let group_lock = self.group_locks.lock_for(group.id);
        let guard = group_lock.lock().await;

        // The copy from group resolution predates the lock; a report for the
        // same group may have landed in between. Tier comparison and counter
        // carry-over must start from what is stored now.
        let group = self
            .repo
            .get_bike_group_by_id(group.id)
            .await?
            .ok_or(ReportError::BikeGroupNotFound)?;

        let report = self.repo.create_report(&payload, group.id).await?;

        self.repo
            .add_event(NewReportEvent {
                report_id: report.id,
                event_type: ReportEventType::Created,
                actor: CITIZEN_ACTOR.to_string(),
                metadata: json!({
                    "source": payload.source,
                    "bike_group_id": group.id,
                }),
            })
            .await?;

        let history = self.repo.list_reports_by_bike_group(group.id).await?;
        let recomputation = classify_group_history(&history);
        let previous_strength = group.signal_strength;
        let updated_group = apply_summary(&group, &recomputation.summary, now);
        let updated_group = BikeGroup {
            signal_strength: recomputation.signal_strength,
            ..updated_group
        };
        self.repo.update_bike_group(&updated_group).await?;
        drop(guard);

        let classification = recomputation
            .class_by_report
            .get(&report.id)
            .copied()
            .unwrap_or(ReconfirmationClass::Initial);

        match classification {
            ReconfirmationClass::IgnoredSameDay => {
                self.repo
                    .add_event(NewReportEvent {
                        report_id: report.id,
                        event_type: ReportEventType::SignalReconfirmationIgnoredSameDay,
                        actor: SYSTEM_ACTOR.to_string(),
                        metadata: json!({ "bike_group_id": group.id }),
                    })
                    .await?;
            }
            ReconfirmationClass::CountedSameReporter
            | ReconfirmationClass::CountedDistinctReporter => {
                let kind = if classification == ReconfirmationClass::CountedSameReporter {
                    ReporterMatchKind::SameReporter
                } else {
                    ReporterMatchKind::DistinctReporter
                };
                self.repo
                    .add_event(NewReportEvent {
                        report_id: report.id,
                        event_type: ReportEventType::SignalReconfirmationCounted,
                        actor: SYSTEM_ACTOR.to_string(),
                        metadata: json!({
                            "bike_group_id": group.id,
                            "reporter_match_kind": kind,
                        }),
                    })
                    .await?;
            }
            ReconfirmationClass::Initial | ReconfirmationClass::NonQualifying => {}
        }

        if previous_strength != recomputation.signal_strength {
            info!(
                bike_group_id = %group.id,
                previous = %previous_strength,
                current = %recomputation.signal_strength,
                "signal strength changed"
            );
            self.repo
                .add_event(NewReportEvent {
                    report_id: report.id,
                    event_type: ReportEventType::SignalStrengthChanged,
                    actor: SYSTEM_ACTOR.to_string(),
                    metadata: json!({
                        "previous_signal_strength": previous_strength,
                        "signal_strength": recomputation.signal_strength,
                        "bike_group_id": group.id,
                    }),
                })
                .await?;
        }

        let dedupe_candidates = self.duplicate_candidates(&report, now).await?;

        let flagged_for_review = self.bursts.observe(&payload.fingerprint_hash, Instant::now());
        if flagged_for_review {
            warn!(report_id = %report.id, "fingerprint burst, flagging report for review");
            self.repo.set_flagged_for_review(report.id, true).await?;
        }

        let token = self.tokens.issue(&report.public_id)?;
        let tracking_url = format!(
            "{}/report/status/{}?token={}",
            self.public_base_url.trim_end_matches('/'),
            report.public_id,
            token
        );

        info!(
            report_id = %report.id,
            bike_group_id = %group.id,
            candidates = dedupe_candidates.len(),
            "report created"
        );

        Ok(ReportCreateOutcome {
            public_id: report.public_id,
            created_at: report.created_at,
            status: report.status,
            tracking_url,
            dedupe_candidates,
            flagged_for_review,
            bike_group_id: group.id,
            signal_strength: updated_group.signal_strength,
            signal_summary: SignalSummary::from(&updated_group),
        })
    }

    /// Find the best-scoring existing bike group for an incoming report, or
    /// `None` when no candidate within the lookback window qualifies.
    ///
    /// Equal top scores resolve to the older group (then id) so resolution
    /// is reproducible from stored data.
    async fn resolve_bike_group(
        &self,
        location: ReportLocation,
        tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<BikeGroup>, ReportError> {
        let candidates = self
            .repo
            .list_reports_since(signal_lookback_start(now))
            .await?;

        let mut best_by_group: HashMap<Uuid, f64> = HashMap::new();
        for candidate in candidates
            .iter()
            .filter(|candidate| candidate.status != ReportStatus::Invalid)
        {
            if let Some(score) = score_signal_candidate(location, tags, candidate, now) {
                let best = best_by_group
                    .entry(candidate.bike_group_id)
                    .or_insert(f64::NEG_INFINITY);
                if score > *best {
                    *best = score;
                }
            }
        }

        if best_by_group.is_empty() {
            return Ok(None);
        }

        let top_score = best_by_group
            .values()
            .fold(f64::NEG_INFINITY, |acc, score| acc.max(*score));

        let mut contenders = Vec::new();
        for (group_id, score) in &best_by_group {
            if *score == top_score {
                if let Some(group) = self.repo.get_bike_group_by_id(*group_id).await? {
                    contenders.push(group);
                }
            }
        }

        contenders.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then(left.id.cmp(&right.id))
        });

        Ok(contenders.into_iter().next())
    }

    /// Top open-status duplicate candidates for operator triage. Independent
    /// of bike-group assignment.
    async fn duplicate_candidates(
        &self,
        report: &Report,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ReportError> {
        let open_reports = self
            .repo
            .list_open_reports_since(dedupe_lookback_start(now))
            .await?;

        let mut candidates: Vec<DuplicateCandidate> = open_reports
            .iter()
            .filter(|candidate| candidate.id != report.id)
            .filter_map(|candidate| {
                score_duplicate_candidate(report.location, &report.tags, candidate, now)
            })
            .collect();

        candidates.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
        });

        Ok(candidates
            .into_iter()
            .take(DEDUPE_CANDIDATE_LIMIT)
            .map(|candidate| candidate.report_id)
            .collect())
    }

    /// Citizen-facing status lookup, gated by the tracking token.
    pub async fn report_status(
        &self,
        public_id: &str,
        token: Option<&str>,
    ) -> Result<ReportTrackingView, ReportError> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(ReportError::MissingToken)?;

        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| ReportError::TokenMismatch)?;
        if claims.public_id != public_id {
            return Err(ReportError::TokenMismatch);
        }

        let report = self
            .repo
            .get_report_by_public_id(public_id)
            .await?
            .ok_or(ReportError::ReportNotFound)?;

        Ok(ReportTrackingView {
            public_id: report.public_id,
            status: report.status,
            created_at: report.created_at,
            updated_at: report.updated_at,
        })
    }

    /// Operator listing with signal enrichment, signal filters and the
    /// optional signal-priority sort.
    pub async fn list_operator_reports(
        &self,
        filters: &OperatorReportFilters,
    ) -> Result<Vec<OperatorReportView>, ReportError> {
        let reports = self.repo.list_reports(filters).await?;

        let mut views = Vec::with_capacity(reports.len());
        for report in reports {
            let group = self
                .repo
                .get_bike_group_by_id(report.bike_group_id)
                .await?
                .ok_or(ReportError::BikeGroupNotFound)?;

            views.push(OperatorReportView {
                signal_summary: SignalSummary::from(&group),
                signal_strength: group.signal_strength,
                report,
            });
        }

        views.retain(|view| {
            if let Some(strength) = filters.signal_strength {
                if view.signal_strength != strength {
                    return false;
                }
            }
            if filters.strong_only
                && view.signal_strength != SignalStrength::StrongDistinctReporters
            {
                return false;
            }
            if let Some(wanted) = filters.has_qualifying_reconfirmation {
                if view.signal_summary.has_qualifying_reconfirmation != wanted {
                    return false;
                }
            }
            true
        });

        if filters.sort == ReportSort::Signal {
            views.sort_by(|left, right| {
                right
                    .signal_strength
                    .priority()
                    .cmp(&left.signal_strength.priority())
                    .then(right.report.created_at.cmp(&left.report.created_at))
            });
        }

        Ok(views)
    }

    /// Full operator detail: the report, its audit trail and the labeled
    /// reconfirmation timeline of its bike group.
    pub async fn report_details(&self, report_id: Uuid) -> Result<ReportDetails, ReportError> {
        let report = self
            .repo
            .get_report_by_id(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound)?;

        let group = self
            .repo
            .get_bike_group_by_id(report.bike_group_id)
            .await?
            .ok_or(ReportError::BikeGroupNotFound)?;

        let history = self.repo.list_reports_by_bike_group(group.id).await?;
        let events = self.repo.list_events(report_id).await?;

        Ok(ReportDetails {
            report,
            events,
            signal_details: build_signal_details(&history, group),
        })
    }

    /// Operator lifecycle transition. Emission of the `status_changed`
    /// event happens with the update itself.
    pub async fn update_status(
        &self,
        report_id: Uuid,
        next_status: ReportStatus,
        session: &OperatorSession,
    ) -> Result<Report, ReportError> {
        let current = self
            .repo
            .get_report_by_id(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound)?;

        ensure_transition(current.status, next_status)?;

        info!(
            report_id = %report_id,
            from = %current.status,
            to = %next_status,
            actor = %session.email,
            "report status updated"
        );

        self.repo
            .update_report_status(report_id, next_status, &session.email)
            .await?
            .ok_or(ReportError::ReportNotFound)
    }

    /// Operator merge of duplicate reports into the canonical one.
    pub async fn merge_duplicates(
        &self,
        canonical_id: Uuid,
        duplicate_ids: &[Uuid],
        session: &OperatorSession,
    ) -> Result<DedupeGroup, ReportError> {
        self.repo
            .get_report_by_id(canonical_id)
            .await?
            .ok_or(ReportError::CanonicalNotFound)?;

        for duplicate_id in duplicate_ids {
            self.repo
                .get_report_by_id(*duplicate_id)
                .await?
                .ok_or(ReportError::DuplicateNotFound(*duplicate_id))?;
        }

        self.repo
            .merge_reports(canonical_id, duplicate_ids, &session.email)
            .await
            .map_err(Into::into)
    }

    /// Resolve the UTC window for an export run in the configured timezone.
    pub fn export_window(
        &self,
        period_type: ExportPeriodType,
        explicit: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<ExportWindow, ReportError> {
        resolve_export_window(period_type, explicit, self.clock.now(), self.export_timezone)
    }

    pub async fn list_events(&self, report_id: Uuid) -> Result<Vec<ReportEvent>, ReportError> {
        self.repo.list_events(report_id).await.map_err(Into::into)
    }

    pub async fn available_tags(&self) -> Result<Vec<Tag>, ReportError> {
        self.repo.get_tags().await.map_err(Into::into)
    }
}

/// Carry a freshly computed summary onto the stored group. The anchor
/// coordinate is deliberately untouched.
fn apply_summary(group: &BikeGroup, summary: &SignalSummary, now: DateTime<Utc>) -> BikeGroup {
    BikeGroup {
        id: group.id,
        created_at: group.created_at,
        updated_at: now,
        anchor_lat: group.anchor_lat,
        anchor_lng: group.anchor_lng,
        last_report_at: summary.last_report_at.unwrap_or(group.last_report_at),
        total_reports: summary.total_reports,
        unique_reporters: summary.unique_reporters,
        same_reporter_reconfirmations: summary.same_reporter_reconfirmations,
        distinct_reporter_reconfirmations: summary.distinct_reporter_reconfirmations,
        first_qualifying_reconfirmation_at: summary.first_qualifying_reconfirmation_at,
        last_qualifying_reconfirmation_at: summary.last_qualifying_reconfirmation_at,
        signal_strength: group.signal_strength,
    }
}

/// Stable per-group pseudonym for the operator timeline: A, B, ... Z, then
/// A2, B2, ... in first-appearance order.
fn reporter_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index >= 26 {
        format!("Reporter {letter}{}", index / 26 + 1)
    } else {
        format!("Reporter {letter}")
    }
}

fn build_signal_details(history: &[Report], group: BikeGroup) -> SignalDetails {
    let outcome = classify_group_history(history);

    let mut sorted: Vec<&Report> = history.iter().collect();
    sorted.sort_by_key(|report| report.created_at);

    let mut label_by_reporter: HashMap<&str, String> = HashMap::new();
    for report in &sorted {
        if !label_by_reporter.contains_key(report.reporter_hash.as_str()) {
            let label = reporter_label(label_by_reporter.len());
            label_by_reporter.insert(report.reporter_hash.as_str(), label);
        }
    }

    let timeline = sorted
        .iter()
        .map(|report| {
            let classification = outcome
                .class_by_report
                .get(&report.id)
                .copied()
                .unwrap_or(ReconfirmationClass::Initial);

            let reporter_match_kind = match classification {
                ReconfirmationClass::CountedSameReporter => Some(ReporterMatchKind::SameReporter),
                ReconfirmationClass::CountedDistinctReporter => {
                    Some(ReporterMatchKind::DistinctReporter)
                }
                _ => None,
            };

            SignalTimelineEntry {
                report_id: report.id,
                public_id: report.public_id.clone(),
                created_at: report.created_at,
                reporter_label: label_by_reporter
                    .get(report.reporter_hash.as_str())
                    .cloned()
                    .unwrap_or_else(|| "Reporter".to_string()),
                reporter_match_kind,
                qualified: classification.qualified(),
                ignored_same_day: classification == ReconfirmationClass::IgnoredSameDay,
            }
        })
        .collect();

    SignalDetails {
        signal_summary: SignalSummary::from(&group),
        signal_strength: group.signal_strength,
        timeline,
        bike_group: group,
    }
}
