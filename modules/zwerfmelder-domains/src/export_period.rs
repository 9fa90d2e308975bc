//! Export window resolution.
//!
//! Exports cover the previous civil week (Monday through Sunday) or the
//! previous civil month in the operator timezone, converted to a UTC window.
//! Rendering of export artifacts is not handled here; consumers read reports
//! by the resolved window.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use zwerfmelder_common::{ExportPeriodType, ExportWindow, ReportError};

/// Resolve the UTC window for an export run. An explicitly requested window
/// passes through untouched; otherwise the previous week or month relative
/// to `now` in `tz` is used. Local midnights that do not exist or are
/// ambiguous (DST transitions) fail with `PeriodResolutionFailed`.
pub fn resolve_export_window(
    period_type: ExportPeriodType,
    explicit: Option<(DateTime<Utc>, DateTime<Utc>)>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<ExportWindow, ReportError> {
    if let Some((period_start, period_end)) = explicit {
        return Ok(ExportWindow {
            period_start,
            period_end,
        });
    }

    let local_today = now.with_timezone(&tz).date_naive();

    match period_type {
        ExportPeriodType::Weekly => {
            let this_week_monday = local_today
                - Duration::days(local_today.weekday().num_days_from_monday() as i64);
            let previous_monday = this_week_monday - Duration::days(7);
            window_between(previous_monday, this_week_monday, tz)
        }
        ExportPeriodType::Monthly => {
            let first_of_this_month = local_today
                .with_day(1)
                .ok_or(ReportError::PeriodResolutionFailed)?;
            let first_of_previous_month = first_of_this_month
                .checked_sub_months(Months::new(1))
                .ok_or(ReportError::PeriodResolutionFailed)?;
            window_between(first_of_previous_month, first_of_this_month, tz)
        }
    }
}

/// Build the inclusive UTC window [start 00:00, end_exclusive 00:00 - 1ms]
/// from local civil dates.
fn window_between(
    start: NaiveDate,
    end_exclusive: NaiveDate,
    tz: Tz,
) -> Result<ExportWindow, ReportError> {
    let period_start = local_midnight_utc(start, tz)?;
    let period_end = local_midnight_utc(end_exclusive, tz)? - Duration::milliseconds(1);

    Ok(ExportWindow {
        period_start,
        period_end,
    })
}

fn local_midnight_utc(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ReportError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or(ReportError::PeriodResolutionFailed)?;

    tz.from_local_datetime(&midnight)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or(ReportError::PeriodResolutionFailed)
}
