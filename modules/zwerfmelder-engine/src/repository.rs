//! Persistence seam for the report engine.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use zwerfmelder_common::{
    BikeGroup, CreateReportPayload, DedupeGroup, NewReportEvent, OperatorReportFilters, Report,
    ReportEvent, ReportLocation, ReportStatus, Tag,
};

/// Storage contract the engine operates against.
///
/// Implemented by `MemoryRepository`; an external store can be swapped in
/// without touching the service. All listings return reports time-ordered as
/// documented per method.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_tags(&self) -> Result<Vec<Tag>>;

    /// Persist a new report in status `new`, bound to its bike group.
    async fn create_report(
        &self,
        payload: &CreateReportPayload,
        bike_group_id: Uuid,
    ) -> Result<Report>;

    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>>;
    async fn get_report_by_public_id(&self, public_id: &str) -> Result<Option<Report>>;

    /// Operator listing, newest first.
    async fn list_reports(&self, filters: &OperatorReportFilters) -> Result<Vec<Report>>;

    async fn list_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>>;

    /// Reports with an open status (`new`, `triaged`, `forwarded`) created
    /// at or after `since`.
    async fn list_open_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<Report>>;

    /// Full history of one bike group, least recent first.
    async fn list_reports_by_bike_group(&self, bike_group_id: Uuid) -> Result<Vec<Report>>;

    /// Update report status, recording the actor and appending the
    /// `status_changed` event. Returns `None` for an unknown report.
    async fn update_report_status(
        &self,
        id: Uuid,
        status: ReportStatus,
        actor: &str,
    ) -> Result<Option<Report>>;

    async fn set_flagged_for_review(&self, id: Uuid, flagged: bool) -> Result<()>;

    /// Create a bike group anchored at the given location with zeroed
    /// counters.
    async fn create_bike_group(&self, anchor: ReportLocation) -> Result<BikeGroup>;
    async fn get_bike_group_by_id(&self, id: Uuid) -> Result<Option<BikeGroup>>;
    async fn update_bike_group(&self, group: &BikeGroup) -> Result<BikeGroup>;

    /// Merge duplicates into the canonical report's dedupe group, creating
    /// the group lazily on first merge. Member ids are a set union; a
    /// `merged` event is appended per duplicate.
    async fn merge_reports(
        &self,
        canonical_id: Uuid,
        duplicate_ids: &[Uuid],
        actor: &str,
    ) -> Result<DedupeGroup>;

    async fn add_event(&self, event: NewReportEvent) -> Result<ReportEvent>;

    /// Audit trail for one report, oldest first.
    async fn list_events(&self, report_id: Uuid) -> Result<Vec<ReportEvent>>;
}
