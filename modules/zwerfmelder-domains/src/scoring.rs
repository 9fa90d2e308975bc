//! Candidate scoring shared by duplicate triage and bike-group matching.
//!
//! Both scorers use the same weighted formula over distance, tag overlap and
//! candidate recency; they differ in radius, lookback and short-circuit
//! rules. Scores are rounded to 4 decimals for stable comparison.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use zwerfmelder_common::constants::{
    DEDUPE_LOOKBACK_DAYS, DEDUPE_RADIUS_METERS, SIGNAL_CANDIDATE_LOOKBACK_DAYS,
    SIGNAL_MATCH_RADIUS_METERS,
};
use zwerfmelder_common::{Report, ReportLocation};

use crate::geo::haversine_meters;

const DISTANCE_WEIGHT: f64 = 0.6;
const TAG_OVERLAP_WEIGHT: f64 = 0.25;
const RECENCY_WEIGHT: f64 = 0.15;

/// A nearby open report worth showing to the operator as a possible
/// duplicate of the incoming submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
    pub report_id: Uuid,
    pub score: f64,
    pub distance_meters: f64,
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn fractional_days(span: Duration) -> f64 {
    span.num_milliseconds() as f64 / 86_400_000.0
}

/// Jaccard similarity of two tag sets. Zero when the union is empty.
fn tag_overlap_ratio(source: &[String], target: &[String]) -> f64 {
    let source_set: HashSet<&str> = source.iter().map(String::as_str).collect();
    let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();

    let union_size = source_set.union(&target_set).count();
    if union_size == 0 {
        return 0.0;
    }

    let intersection_size = source_set.intersection(&target_set).count();
    intersection_size as f64 / union_size as f64
}

fn has_shared_tags(source: &[String], target: &[String]) -> bool {
    let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();
    source.iter().any(|tag| target_set.contains(tag.as_str()))
}

/// Recency of the *candidate* relative to now, on the dedupe lookback scale.
fn recency_score(candidate_created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = fractional_days(now - candidate_created_at);
    clamp01(1.0 - age_days / DEDUPE_LOOKBACK_DAYS as f64)
}

fn weighted_score(distance_score: f64, overlap: f64, recency: f64) -> f64 {
    distance_score * DISTANCE_WEIGHT + overlap * TAG_OVERLAP_WEIGHT + recency * RECENCY_WEIGHT
}

/// Score a candidate as a possible duplicate submission of the incoming
/// report. Returns `None` when the candidate is outside the 15 m duplicate
/// radius; overlap and recency are not computed in that case.
pub fn score_duplicate_candidate(
    location: ReportLocation,
    tags: &[String],
    candidate: &Report,
    now: DateTime<Utc>,
) -> Option<DuplicateCandidate> {
    let distance_meters = haversine_meters(
        location.lat,
        location.lng,
        candidate.location.lat,
        candidate.location.lng,
    );

    if distance_meters > DEDUPE_RADIUS_METERS {
        return None;
    }

    let distance_score = clamp01(1.0 - distance_meters / DEDUPE_RADIUS_METERS);
    let overlap = tag_overlap_ratio(tags, &candidate.tags);
    let recency = recency_score(candidate.created_at, now);

    Some(DuplicateCandidate {
        report_id: candidate.id,
        score: round_to(weighted_score(distance_score, overlap, recency), 4),
        distance_meters: round_to(distance_meters, 2),
    })
}

/// Score a candidate as evidence that the incoming report describes the same
/// physical bike. Returns `None` when the two reports share no tags (checked
/// before distance) or when the candidate lies outside the 10 m match
/// radius.
pub fn score_signal_candidate(
    location: ReportLocation,
    tags: &[String],
    candidate: &Report,
    now: DateTime<Utc>,
) -> Option<f64> {
    if !has_shared_tags(tags, &candidate.tags) {
        return None;
    }

    let distance_meters = haversine_meters(
        location.lat,
        location.lng,
        candidate.location.lat,
        candidate.location.lng,
    );

    if distance_meters > SIGNAL_MATCH_RADIUS_METERS {
        return None;
    }

    let distance_score = clamp01(1.0 - distance_meters / SIGNAL_MATCH_RADIUS_METERS);
    let overlap = tag_overlap_ratio(tags, &candidate.tags);
    let recency = recency_score(candidate.created_at, now);

    Some(round_to(weighted_score(distance_score, overlap, recency), 4))
}

/// Start of the duplicate-triage candidate window.
pub fn dedupe_lookback_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(DEDUPE_LOOKBACK_DAYS)
}

/// Start of the bike-group candidate window.
pub fn signal_lookback_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(SIGNAL_CANDIDATE_LOOKBACK_DAYS)
}
