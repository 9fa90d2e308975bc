//! In-memory repository. Production default for the single-process
//! deployment and the test double for the service tests; no database
//! required.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use zwerfmelder_common::{
    BikeGroup, CreateReportPayload, DedupeGroup, NewReportEvent, OperatorReportFilters, Report,
    ReportEvent, ReportEventType, ReportLocation, ReportStatus, SignalStrength, Tag,
};

use crate::clock::{Clock, SystemClock};
use crate::repository::Repository;

/// Tag catalogue seeded at startup.
const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("flat_tires", "Flat tires"),
    ("rusted", "Rusted"),
    ("missing_parts", "Missing parts"),
    ("blocking_sidewalk", "Blocking sidewalk"),
    ("damaged_frame", "Damaged frame"),
    ("abandoned_long_time", "Abandoned for long time"),
    ("no_chain", "No chain"),
    ("wheel_missing", "Missing wheel"),
    ("no_seat", "No seat"),
    ("other_visibility_issue", "Other visibility issue"),
];

#[derive(Default)]
struct Store {
    reports: Vec<Report>,
    events: Vec<ReportEvent>,
    dedupe_groups: Vec<DedupeGroup>,
    bike_groups: Vec<BikeGroup>,
}

impl Store {
    fn append_event(&mut self, event: NewReportEvent, now: DateTime<Utc>) -> ReportEvent {
        let entity = ReportEvent {
            id: Uuid::new_v4(),
            report_id: event.report_id,
            created_at: now,
            event_type: event.event_type,
            actor: event.actor,
            metadata: event.metadata,
        };
        self.events.push(entity.clone());
        entity
    }
}

pub struct MemoryRepository {
    tags: Vec<Tag>,
    store: Mutex<Store>,
    clock: Arc<dyn Clock>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let tags = DEFAULT_TAGS
            .iter()
            .map(|(code, label)| Tag {
                id: Uuid::new_v4(),
                code: code.to_string(),
                label: label.to_string(),
                is_active: true,
            })
            .collect();

        Self {
            tags,
            store: Mutex::new(Store::default()),
            clock,
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn new_public_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.tags.clone())
    }

    async fn create_report(
        &self,
        payload: &CreateReportPayload,
        bike_group_id: Uuid,
    ) -> Result<Report> {
        let now = self.clock.now();
        let report = Report {
            id: Uuid::new_v4(),
            public_id: new_public_id(),
            created_at: now,
            updated_at: now,
            status: ReportStatus::New,
            location: payload.location,
            tags: payload.tags.clone(),
            note: payload.note.clone(),
            source: payload.source,
            dedupe_group_id: None,
            bike_group_id,
            fingerprint_hash: payload.fingerprint_hash.clone(),
            reporter_hash: payload.reporter_hash.clone(),
            flagged_for_review: false,
        };

        self.store.lock().unwrap().reports.push(report.clone());
        Ok(report)
    }

    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        let store = self.store.lock().unwrap();
        Ok(store.reports.iter().find(|report| report.id == id).cloned())
    }

    async fn get_report_by_public_id(&self, public_id: &str) -> Result<Option<Report>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reports
            .iter()
            .find(|report| report.public_id == public_id)
            .cloned())
    }

    async fn list_reports(&self, filters: &OperatorReportFilters) -> Result<Vec<Report>> {
        let store = self.store.lock().unwrap();
        let mut reports: Vec<Report> = store
            .reports
            .iter()
            .filter(|report| {
                if let Some(status) = filters.status {
                    if report.status != status {
                        return false;
                    }
                }
                if let Some(tag) = &filters.tag {
                    if !report.tags.contains(tag) {
                        return false;
                    }
                }
                if let Some(from) = filters.from {
                    if report.created_at < from {
                        return false;
                    }
                }
                if let Some(to) = filters.to {
                    if report.created_at > to {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        reports.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(reports)
    }

    async fn list_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reports
            .iter()
            .filter(|report| report.created_at >= since)
            .cloned()
            .collect())
    }

    async fn list_open_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reports
            .iter()
            .filter(|report| report.status.is_open() && report.created_at >= since)
            .cloned()
            .collect())
    }

    async fn list_reports_by_bike_group(&self, bike_group_id: Uuid) -> Result<Vec<Report>> {
        let store = self.store.lock().unwrap();
        let mut reports: Vec<Report> = store
            .reports
            .iter()
            .filter(|report| report.bike_group_id == bike_group_id)
            .cloned()
            .collect();

        reports.sort_by_key(|report| report.created_at);
        Ok(reports)
    }

    async fn update_report_status(
        &self,
        id: Uuid,
        status: ReportStatus,
        actor: &str,
    ) -> Result<Option<Report>> {
        let mut store = self.store.lock().unwrap();
        let Some(report) = store.reports.iter_mut().find(|report| report.id == id) else {
            return Ok(None);
        };

        let now = self.clock.now();
        report.status = status;
        report.updated_at = now;
        let updated = report.clone();

        store.append_event(
            NewReportEvent {
                report_id: id,
                event_type: ReportEventType::StatusChanged,
                actor: actor.to_string(),
                metadata: serde_json::json!({ "status": status }),
            },
            now,
        );

        Ok(Some(updated))
    }

    async fn set_flagged_for_review(&self, id: Uuid, flagged: bool) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        if let Some(report) = store.reports.iter_mut().find(|report| report.id == id) {
            report.flagged_for_review = flagged;
            report.updated_at = self.clock.now();
        }
        Ok(())
    }

    async fn create_bike_group(&self, anchor: ReportLocation) -> Result<BikeGroup> {
        let now = self.clock.now();
        let group = BikeGroup {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            anchor_lat: anchor.lat,
            anchor_lng: anchor.lng,
            last_report_at: now,
            total_reports: 0,
            unique_reporters: 0,
            same_reporter_reconfirmations: 0,
            distinct_reporter_reconfirmations: 0,
            first_qualifying_reconfirmation_at: None,
            last_qualifying_reconfirmation_at: None,
            signal_strength: SignalStrength::None,
        };

        self.store.lock().unwrap().bike_groups.push(group.clone());
        Ok(group)
    }

    async fn get_bike_group_by_id(&self, id: Uuid) -> Result<Option<BikeGroup>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .bike_groups
            .iter()
            .find(|group| group.id == id)
            .cloned())
    }

    async fn update_bike_group(&self, group: &BikeGroup) -> Result<BikeGroup> {
        let mut store = self.store.lock().unwrap();
        match store
            .bike_groups
            .iter_mut()
            .find(|entry| entry.id == group.id)
        {
            Some(entry) => *entry = group.clone(),
            None => store.bike_groups.push(group.clone()),
        }
        Ok(group.clone())
    }

    async fn merge_reports(
        &self,
        canonical_id: Uuid,
        duplicate_ids: &[Uuid],
        actor: &str,
    ) -> Result<DedupeGroup> {
        let now = self.clock.now();
        let mut store = self.store.lock().unwrap();

        let mut group = store
            .dedupe_groups
            .iter()
            .find(|group| group.canonical_report_id == canonical_id)
            .cloned()
            .unwrap_or_else(|| DedupeGroup {
                id: Uuid::new_v4(),
                canonical_report_id: canonical_id,
                merged_report_ids: Vec::new(),
                created_at: now,
                created_by: actor.to_string(),
            });

        // Set union: merging the same canonical twice must not duplicate ids.
        for duplicate_id in duplicate_ids {
            if !group.merged_report_ids.contains(duplicate_id) {
                group.merged_report_ids.push(*duplicate_id);
            }
        }

        match store
            .dedupe_groups
            .iter_mut()
            .find(|entry| entry.id == group.id)
        {
            Some(entry) => *entry = group.clone(),
            None => store.dedupe_groups.push(group.clone()),
        }

        for report in store.reports.iter_mut() {
            if report.id == canonical_id || group.merged_report_ids.contains(&report.id) {
                report.dedupe_group_id = Some(group.id);
                report.updated_at = now;
            }
        }

        for duplicate_id in duplicate_ids {
            store.append_event(
                NewReportEvent {
                    report_id: *duplicate_id,
                    event_type: ReportEventType::Merged,
                    actor: actor.to_string(),
                    metadata: serde_json::json!({
                        "canonical_report_id": canonical_id,
                        "dedupe_group_id": group.id,
                    }),
                },
                now,
            );
        }

        Ok(group)
    }

    async fn add_event(&self, event: NewReportEvent) -> Result<ReportEvent> {
        let now = self.clock.now();
        Ok(self.store.lock().unwrap().append_event(event, now))
    }

    async fn list_events(&self, report_id: Uuid) -> Result<Vec<ReportEvent>> {
        let store = self.store.lock().unwrap();
        let mut events: Vec<ReportEvent> = store
            .events
            .iter()
            .filter(|event| event.report_id == report_id)
            .cloned()
            .collect();

        events.sort_by_key(|event| event.created_at);
        Ok(events)
    }
}
