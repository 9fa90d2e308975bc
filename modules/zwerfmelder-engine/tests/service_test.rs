use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use zwerfmelder_common::{
    BikeGroup, CreateReportPayload, DedupeGroup, ExportPeriodType, NewReportEvent,
    OperatorReportFilters, OperatorSession, Report, ReportError, ReportEvent, ReportEventType,
    ReportLocation, ReportSource, ReportStatus, SignalStrength, Tag,
};
use zwerfmelder_engine::{ManualClock, MemoryRepository, ReportService, Repository, ServiceOptions};

// Base coordinate in central Amsterdam; offsets below stay well inside or
// well outside the 10m/15m matching radii.
const BASE_LAT: f64 = 52.3702;
const BASE_LNG: f64 = 4.8952;

fn options() -> ServiceOptions {
    ServiceOptions {
        public_base_url: "https://zwerfmelder.example".to_string(),
        signing_secret: "integration-test-secret".to_string(),
        export_timezone: chrono_tz::Europe::Amsterdam,
    }
}

fn harness() -> (Arc<MemoryRepository>, ReportService) {
    let repo = Arc::new(MemoryRepository::new());
    let service = ReportService::new(repo.clone(), options());
    (repo, service)
}

fn payload(lat: f64, lng: f64, tags: &[&str], ip: &str, reporter: &str) -> CreateReportPayload {
    CreateReportPayload {
        location: ReportLocation {
            lat,
            lng,
            accuracy_m: 5.0,
        },
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        note: None,
        client_ts: None,
        source: ReportSource::Web,
        ip: ip.to_string(),
        fingerprint_hash: format!("fp-{ip}-{reporter}"),
        reporter_hash: reporter.to_string(),
    }
}

fn session() -> OperatorSession {
    OperatorSession {
        email: "operator@gemeente.example".to_string(),
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn clocked_harness() -> (Arc<ManualClock>, Arc<MemoryRepository>, ReportService) {
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = Arc::new(MemoryRepository::with_clock(clock.clone()));
    let service = ReportService::with_clock(repo.clone(), options(), clock.clone());
    (clock, repo, service)
}

async fn events_for(
    repo: &MemoryRepository,
    service: &ReportService,
    public_id: &str,
) -> Vec<ReportEvent> {
    let report = repo
        .get_report_by_public_id(public_id)
        .await
        .unwrap()
        .unwrap();
    service.list_events(report.id).await.unwrap()
}

// ---------- intake and grouping ----------

#[tokio::test]
async fn isolated_report_creates_group_with_no_candidates() {
    let (_, service) = harness();

    let outcome = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ReportStatus::New);
    assert!(outcome.dedupe_candidates.is_empty());
    assert!(!outcome.flagged_for_review);
    assert_eq!(outcome.signal_strength, SignalStrength::None);
    assert_eq!(outcome.signal_summary.total_reports, 1);
    assert_eq!(outcome.signal_summary.unique_reporters, 1);
    assert!(outcome
        .tracking_url
        .contains(&format!("/report/status/{}", outcome.public_id)));
}

#[tokio::test]
async fn nearby_report_with_shared_tag_joins_group_and_surfaces_duplicate() {
    let (repo, service) = harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    // ~3m north of the first report.
    let second = service
        .create_report(payload(
            BASE_LAT + 0.000_027,
            BASE_LNG,
            &["rusted", "flat_tires"],
            "10.0.0.2",
            "r2",
        ))
        .await
        .unwrap();

    assert_eq!(second.bike_group_id, first.bike_group_id);
    assert_eq!(second.signal_summary.total_reports, 2);
    assert_eq!(second.signal_summary.unique_reporters, 2);
    // Same week, so not a qualifying reconfirmation yet.
    assert_eq!(second.signal_strength, SignalStrength::None);

    let first_stored = repo
        .get_report_by_public_id(&first.public_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.dedupe_candidates, vec![first_stored.id]);
}

#[tokio::test]
async fn far_away_report_starts_its_own_group() {
    let (_, service) = harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    // ~1.1km away.
    let second = service
        .create_report(payload(BASE_LAT + 0.01, BASE_LNG, &["rusted"], "10.0.0.2", "r2"))
        .await
        .unwrap();

    assert_ne!(second.bike_group_id, first.bike_group_id);
    assert!(second.dedupe_candidates.is_empty());
    assert_eq!(second.signal_summary.total_reports, 1);
}

#[tokio::test]
async fn same_reporter_same_day_repeat_is_suppressed() {
    let (repo, service) = harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    let second = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();

    assert_eq!(second.bike_group_id, first.bike_group_id);
    assert_eq!(second.signal_summary.total_reports, 2);
    assert_eq!(second.signal_summary.same_reporter_reconfirmations, 0);
    assert_eq!(second.signal_summary.distinct_reporter_reconfirmations, 0);
    assert_eq!(second.signal_strength, SignalStrength::None);

    let stored = repo
        .get_report_by_public_id(&second.public_id)
        .await
        .unwrap()
        .unwrap();
    let events = service.list_events(stored.id).await.unwrap();
    assert!(events
        .iter()
        .any(|event| event.event_type == ReportEventType::SignalReconfirmationIgnoredSameDay));
}

// ---------- tier progression ----------

#[tokio::test]
async fn qualifying_reconfirmations_raise_the_tier_over_time() {
    let (clock, repo, service) = clocked_harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    assert_eq!(first.signal_strength, SignalStrength::None);

    // 28 days later the same reporter reconfirms: weak tier.
    clock.advance(Duration::days(28));
    let second = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();

    assert_eq!(second.bike_group_id, first.bike_group_id);
    assert_eq!(second.signal_strength, SignalStrength::WeakSameReporter);
    assert_eq!(second.signal_summary.same_reporter_reconfirmations, 1);
    assert!(second.signal_summary.has_qualifying_reconfirmation);

    let second_events = events_for(&repo, &service, &second.public_id).await;
    let counted = second_events
        .iter()
        .find(|event| event.event_type == ReportEventType::SignalReconfirmationCounted)
        .expect("qualifying reconfirmation must be recorded");
    assert_eq!(
        counted.metadata["reporter_match_kind"].as_str(),
        Some("same_reporter")
    );
    let changed = second_events
        .iter()
        .find(|event| event.event_type == ReportEventType::SignalStrengthChanged)
        .expect("tier change must be recorded");
    assert_eq!(
        changed.metadata["previous_signal_strength"].as_str(),
        Some("none")
    );
    assert_eq!(
        changed.metadata["signal_strength"].as_str(),
        Some("weak_same_reporter")
    );

    // Another 28 days, a different reporter: strong tier.
    clock.advance(Duration::days(28));
    let third = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.2", "r2"))
        .await
        .unwrap();

    assert_eq!(third.bike_group_id, first.bike_group_id);
    assert_eq!(third.signal_strength, SignalStrength::StrongDistinctReporters);
    assert_eq!(third.signal_summary.distinct_reporter_reconfirmations, 1);
    assert_eq!(third.signal_summary.unique_reporters, 2);

    let third_events = events_for(&repo, &service, &third.public_id).await;
    let counted = third_events
        .iter()
        .find(|event| event.event_type == ReportEventType::SignalReconfirmationCounted)
        .unwrap();
    assert_eq!(
        counted.metadata["reporter_match_kind"].as_str(),
        Some("distinct_reporter")
    );
    let changed = third_events
        .iter()
        .find(|event| event.event_type == ReportEventType::SignalStrengthChanged)
        .unwrap();
    assert_eq!(
        changed.metadata["previous_signal_strength"].as_str(),
        Some("weak_same_reporter")
    );
    assert_eq!(
        changed.metadata["signal_strength"].as_str(),
        Some("strong_distinct_reporters")
    );
}

#[tokio::test]
async fn short_gap_reconfirmation_emits_no_signal_events() {
    let (clock, repo, service) = clocked_harness();

    service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();

    // Ten days is under the reconfirmation gap: counted nowhere.
    clock.advance(Duration::days(10));
    let second = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();

    assert_eq!(second.signal_strength, SignalStrength::None);
    assert!(!second.signal_summary.has_qualifying_reconfirmation);

    let events = events_for(&repo, &service, &second.public_id).await;
    assert!(events.iter().all(|event| {
        event.event_type != ReportEventType::SignalReconfirmationCounted
            && event.event_type != ReportEventType::SignalStrengthChanged
    }));
}

/// Delegating store that raises the stored tier of a group right after it is
/// served, standing in for a report that lands between group resolution and
/// the critical section.
struct TierShiftingRepo {
    inner: MemoryRepository,
    raise_on_next_group_read: Mutex<Option<SignalStrength>>,
}

impl TierShiftingRepo {
    fn new(inner: MemoryRepository) -> Self {
        Self {
            inner,
            raise_on_next_group_read: Mutex::new(None),
        }
    }

    fn arm(&self, tier: SignalStrength) {
        *self.raise_on_next_group_read.lock().unwrap() = Some(tier);
    }
}

#[async_trait]
impl Repository for TierShiftingRepo {
    async fn get_tags(&self) -> Result<Vec<Tag>> {
        self.inner.get_tags().await
    }

    async fn create_report(
        &self,
        payload: &CreateReportPayload,
        bike_group_id: Uuid,
    ) -> Result<Report> {
        self.inner.create_report(payload, bike_group_id).await
    }

    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        self.inner.get_report_by_id(id).await
    }

    async fn get_report_by_public_id(&self, public_id: &str) -> Result<Option<Report>> {
        self.inner.get_report_by_public_id(public_id).await
    }

    async fn list_reports(&self, filters: &OperatorReportFilters) -> Result<Vec<Report>> {
        self.inner.list_reports(filters).await
    }

    async fn list_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>> {
        self.inner.list_reports_since(since).await
    }

    async fn list_open_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>> {
        self.inner.list_open_reports_since(since).await
    }

    async fn list_reports_by_bike_group(&self, bike_group_id: Uuid) -> Result<Vec<Report>> {
        self.inner.list_reports_by_bike_group(bike_group_id).await
    }

    async fn update_report_status(
        &self,
        id: Uuid,
        status: ReportStatus,
        actor: &str,
    ) -> Result<Option<Report>> {
        self.inner.update_report_status(id, status, actor).await
    }

    async fn set_flagged_for_review(&self, id: Uuid, flagged: bool) -> Result<()> {
        self.inner.set_flagged_for_review(id, flagged).await
    }

    async fn create_bike_group(&self, anchor: ReportLocation) -> Result<BikeGroup> {
        self.inner.create_bike_group(anchor).await
    }

    async fn get_bike_group_by_id(&self, id: Uuid) -> Result<Option<BikeGroup>> {
        let group = self.inner.get_bike_group_by_id(id).await?;

        let pending = self.raise_on_next_group_read.lock().unwrap().take();
        if let (Some(tier), Some(current)) = (pending, group.as_ref()) {
            let mut raised = current.clone();
            raised.signal_strength = tier;
            self.inner.update_bike_group(&raised).await?;
        }

        Ok(group)
    }

    async fn update_bike_group(&self, group: &BikeGroup) -> Result<BikeGroup> {
        self.inner.update_bike_group(group).await
    }

    async fn merge_reports(
        &self,
        canonical_id: Uuid,
        duplicate_ids: &[Uuid],
        actor: &str,
    ) -> Result<DedupeGroup> {
        self.inner.merge_reports(canonical_id, duplicate_ids, actor).await
    }

    async fn add_event(&self, event: NewReportEvent) -> Result<ReportEvent> {
        self.inner.add_event(event).await
    }

    async fn list_events(&self, report_id: Uuid) -> Result<Vec<ReportEvent>> {
        self.inner.list_events(report_id).await
    }
}

#[tokio::test]
async fn tier_already_raised_by_interleaved_write_is_not_reannounced() {
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = Arc::new(TierShiftingRepo::new(MemoryRepository::with_clock(
        clock.clone(),
    )));
    let service = ReportService::with_clock(repo.clone(), options(), clock.clone());

    // Build a weak-tier group: initial report plus a same-reporter
    // reconfirmation after the gap.
    service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    clock.advance(Duration::days(28));
    let second = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    assert_eq!(second.signal_strength, SignalStrength::WeakSameReporter);

    // The next distinct-reporter report recomputes to strong, but the stored
    // tier is already strong by the time it enters the critical section: no
    // second announcement.
    clock.advance(Duration::days(28));
    repo.arm(SignalStrength::StrongDistinctReporters);
    let third = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.2", "r2"))
        .await
        .unwrap();
    assert_eq!(third.signal_strength, SignalStrength::StrongDistinctReporters);

    let third_report = repo
        .inner
        .get_report_by_public_id(&third.public_id)
        .await
        .unwrap()
        .unwrap();
    let events = service.list_events(third_report.id).await.unwrap();
    assert!(events
        .iter()
        .any(|event| event.event_type == ReportEventType::SignalReconfirmationCounted));
    assert!(events
        .iter()
        .all(|event| event.event_type != ReportEventType::SignalStrengthChanged));
}

// ---------- abuse controls ----------

#[tokio::test]
async fn ninth_submission_from_same_ip_is_rate_limited() {
    let (_, service) = harness();

    for attempt in 0..8 {
        service
            .create_report(payload(
                BASE_LAT + 0.01 * attempt as f64,
                BASE_LNG,
                &["rusted"],
                "10.0.0.9",
                &format!("r{attempt}"),
            ))
            .await
            .unwrap();
    }

    let err = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.9", "r9"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::RateLimited));
}

#[tokio::test]
async fn unknown_tag_is_rejected() {
    let (_, service) = harness();

    let err = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["chrome_wheels"], "10.0.0.1", "r1"))
        .await
        .unwrap_err();
    match err {
        ReportError::InvalidTag(tag) => assert_eq!(tag, "chrome_wheels"),
        other => panic!("expected InvalidTag, got {other:?}"),
    }
}

#[tokio::test]
async fn fingerprint_burst_flags_but_never_rejects() {
    let (repo, service) = harness();

    let mut outcomes = Vec::new();
    for attempt in 0..4 {
        let mut submission = payload(
            BASE_LAT + 0.01 * attempt as f64,
            BASE_LNG,
            &["rusted"],
            &format!("10.0.1.{attempt}"),
            &format!("r{attempt}"),
        );
        submission.fingerprint_hash = "shared-device".to_string();
        outcomes.push(service.create_report(submission).await.unwrap());
    }

    assert!(!outcomes[0].flagged_for_review);
    assert!(!outcomes[2].flagged_for_review);
    assert!(outcomes[3].flagged_for_review);

    let stored = repo
        .get_report_by_public_id(&outcomes[3].public_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.flagged_for_review);
}

// ---------- tracking tokens ----------

#[tokio::test]
async fn tracking_token_gates_status_lookup() {
    let (_, service) = harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    let second = service
        .create_report(payload(BASE_LAT + 0.01, BASE_LNG, &["rusted"], "10.0.0.2", "r2"))
        .await
        .unwrap();

    let token = first
        .tracking_url
        .split("token=")
        .nth(1)
        .unwrap()
        .to_string();

    let view = service
        .report_status(&first.public_id, Some(&token))
        .await
        .unwrap();
    assert_eq!(view.public_id, first.public_id);
    assert_eq!(view.status, ReportStatus::New);

    let err = service.report_status(&first.public_id, None).await.unwrap_err();
    assert!(matches!(err, ReportError::MissingToken));

    // A valid token for another report must not open this one.
    let err = service
        .report_status(&second.public_id, Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::TokenMismatch));

    let err = service
        .report_status(&first.public_id, Some("not-a-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::TokenMismatch));
}

// ---------- operator lifecycle ----------

#[tokio::test]
async fn status_transitions_follow_lifecycle() {
    let (repo, service) = harness();

    let outcome = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    let report = repo
        .get_report_by_public_id(&outcome.public_id)
        .await
        .unwrap()
        .unwrap();

    let triaged = service
        .update_status(report.id, ReportStatus::Triaged, &session())
        .await
        .unwrap();
    assert_eq!(triaged.status, ReportStatus::Triaged);

    service
        .update_status(report.id, ReportStatus::Forwarded, &session())
        .await
        .unwrap();
    service
        .update_status(report.id, ReportStatus::Resolved, &session())
        .await
        .unwrap();

    let err = service
        .update_status(report.id, ReportStatus::Triaged, &session())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::InvalidStatusTransition {
            from: ReportStatus::Resolved,
            to: ReportStatus::Triaged,
        }
    ));

    let events = service.list_events(report.id).await.unwrap();
    let status_events: Vec<_> = events
        .iter()
        .filter(|event| event.event_type == ReportEventType::StatusChanged)
        .collect();
    assert_eq!(status_events.len(), 3);
    assert_eq!(status_events[0].actor, "operator@gemeente.example");
}

#[tokio::test]
async fn merge_unions_duplicates_into_dedupe_group() {
    let (repo, service) = harness();

    let mut ids = Vec::new();
    for index in 0..3 {
        let outcome = service
            .create_report(payload(
                BASE_LAT + 0.01 * index as f64,
                BASE_LNG,
                &["rusted"],
                "10.0.0.1",
                &format!("r{index}"),
            ))
            .await
            .unwrap();
        let report = repo
            .get_report_by_public_id(&outcome.public_id)
            .await
            .unwrap()
            .unwrap();
        ids.push(report.id);
    }

    let group = service
        .merge_duplicates(ids[0], &[ids[1]], &session())
        .await
        .unwrap();
    assert_eq!(group.canonical_report_id, ids[0]);
    assert_eq!(group.merged_report_ids, vec![ids[1]]);

    // Merging again with an overlapping list extends the set without
    // duplicating members.
    let group = service
        .merge_duplicates(ids[0], &[ids[1], ids[2]], &session())
        .await
        .unwrap();
    assert_eq!(group.merged_report_ids.len(), 2);
    assert!(group.merged_report_ids.contains(&ids[1]));
    assert!(group.merged_report_ids.contains(&ids[2]));

    let missing = Uuid::new_v4();
    let err = service
        .merge_duplicates(ids[0], &[missing], &session())
        .await
        .unwrap_err();
    match err {
        ReportError::DuplicateNotFound(id) => assert_eq!(id, missing),
        other => panic!("expected DuplicateNotFound, got {other:?}"),
    }
}

// ---------- operator reads ----------

#[tokio::test]
async fn operator_listing_enriches_reports_with_signal_state() {
    let (_, service) = harness();

    let first = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    let second = service
        .create_report(payload(BASE_LAT + 0.01, BASE_LNG, &["flat_tires"], "10.0.0.2", "r2"))
        .await
        .unwrap();

    let views = service
        .list_operator_reports(&OperatorReportFilters::default())
        .await
        .unwrap();
    assert_eq!(views.len(), 2);
    // Newest first by default.
    assert_eq!(views[0].report.public_id, second.public_id);
    assert_eq!(views[1].report.public_id, first.public_id);
    assert_eq!(views[0].signal_summary.total_reports, 1);

    let strong_only = service
        .list_operator_reports(&OperatorReportFilters {
            strong_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(strong_only.is_empty());
}

#[tokio::test]
async fn report_details_carries_audit_trail_and_timeline() {
    let (repo, service) = harness();

    service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.1", "r1"))
        .await
        .unwrap();
    let second = service
        .create_report(payload(BASE_LAT, BASE_LNG, &["rusted"], "10.0.0.2", "r2"))
        .await
        .unwrap();
    let stored = repo
        .get_report_by_public_id(&second.public_id)
        .await
        .unwrap()
        .unwrap();

    let details = service.report_details(stored.id).await.unwrap();
    assert_eq!(details.report.id, stored.id);
    assert!(details
        .events
        .iter()
        .any(|event| event.event_type == ReportEventType::Created));

    let timeline = &details.signal_details.timeline;
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].reporter_label, "Reporter A");
    assert_eq!(timeline[1].reporter_label, "Reporter B");
    assert!(timeline.iter().all(|entry| !entry.qualified));
}

// ---------- exports ----------

#[tokio::test]
async fn export_window_honors_explicit_bounds() {
    let (_, service) = harness();

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();

    let window = service
        .export_window(ExportPeriodType::Monthly, Some((start, end)))
        .unwrap();
    assert_eq!(window.period_start, start);
    assert_eq!(window.period_end, end);
}
