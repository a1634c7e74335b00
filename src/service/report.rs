//! Period filters, pagination and CSV export for the admin report.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::Deserialize;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::overtime::OvertimeRecord;

pub const DEFAULT_PER_PAGE: u64 = 10;
pub const MAX_PER_PAGE: u64 = 100;

const MONTHS_ID: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

const CSV_HEADER: [&str; 7] = [
    "Nama Pegawai",
    "Tanggal",
    "Waktu Check-In",
    "Waktu Check-Out",
    "Keterangan Lembur",
    "Status Verifikasi",
    "Catatan Verifikasi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
    #[default]
    All,
}

/// Offset of the office clock, e.g. `+7` for WIB.
pub fn local_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

/// `[since, until)` on check-in time for the period containing `now`.
/// `All` is unbounded.
pub fn period_bounds(
    period: ReportPeriod,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let today = now.with_timezone(&offset).date_naive();
    let (start, end) = match period {
        ReportPeriod::All => return (None, None),
        ReportPeriod::Daily => (Some(today), today.succ_opt()),
        ReportPeriod::Weekly => {
            let monday =
                today - Duration::days(today.weekday().num_days_from_monday() as i64);
            (Some(monday), Some(monday + Duration::days(7)))
        }
        ReportPeriod::Monthly => {
            let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1);
            let next = if today.month() == 12 {
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
            };
            (first, next)
        }
    };
    (
        start.and_then(|d| local_midnight(d, offset)),
        end.and_then(|d| local_midnight(d, offset)),
    )
}

/// `(page, per_page, offset)` with page ≥ 1 and per_page clamped to 1..=100.
pub fn paginate(page: Option<u64>, per_page: Option<u64>) -> (u64, u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1) * per_page)
}

/// `17 Okt 2026`
pub fn format_date_id(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        MONTHS_ID[date.month0() as usize],
        date.year()
    )
}

pub fn export_filename(now: DateTime<Utc>, offset: FixedOffset) -> String {
    format!(
        "Laporan Lembur - {}.csv",
        now.with_timezone(&offset).format("%Y-%m-%d")
    )
}

/// Free text starting with a formula trigger is opened as text by
/// spreadsheet apps once prefixed with `'`.
fn inert_text(value: &str) -> String {
    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{}", value)
    } else {
        value.to_string()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line: Vec<String> = fields.into_iter().map(|f| csv_field(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// UTF-8 with a byte order mark, CRLF line endings, one row per record.
pub fn export_csv(records: &[OvertimeRecord], offset: FixedOffset) -> String {
    let mut out = String::from("\u{feff}");
    csv_row(&mut out, CSV_HEADER);

    for record in records {
        let check_in = record.check_in_time.with_timezone(&offset);
        let check_out = record
            .check_out_time
            .map(|t| t.with_timezone(&offset).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        csv_row(
            &mut out,
            [
                inert_text(&record.employee_name),
                format_date_id(check_in.date_naive()),
                check_in.format("%H:%M:%S").to_string(),
                check_out,
                inert_text(&record.purpose),
                record.verification_status.to_string(),
                inert_text(record.verification_notes.as_deref().unwrap_or_default()),
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::overtime::{GeoLocation, NewOvertimeRecord, VerificationStatus};

    fn wib() -> FixedOffset {
        local_offset(7)
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn daily_bounds_follow_local_midnight() {
        // 2026-10-17 01:30 WIB
        let now = utc("2026-10-16T18:30:00Z");
        let (since, until) = period_bounds(ReportPeriod::Daily, now, wib());
        assert_eq!(since, Some(utc("2026-10-16T17:00:00Z")));
        assert_eq!(until, Some(utc("2026-10-17T17:00:00Z")));
    }

    #[test]
    fn weekly_starts_on_monday() {
        // Saturday 2026-10-17
        let now = utc("2026-10-17T05:00:00Z");
        let (since, until) = period_bounds(ReportPeriod::Weekly, now, wib());
        assert_eq!(since, Some(utc("2026-10-11T17:00:00Z")));
        assert_eq!(until, Some(utc("2026-10-18T17:00:00Z")));
    }

    #[test]
    fn monthly_rolls_over_year_end() {
        let now = utc("2026-12-20T05:00:00Z");
        let (since, until) = period_bounds(ReportPeriod::Monthly, now, wib());
        assert_eq!(since, Some(utc("2026-11-30T17:00:00Z")));
        assert_eq!(until, Some(utc("2026-12-31T17:00:00Z")));
        assert_eq!(
            period_bounds(ReportPeriod::All, now, wib()),
            (None, None)
        );
    }

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(paginate(None, None), (1, 10, 0));
        assert_eq!(paginate(Some(0), Some(500)), (1, 100, 0));
        assert_eq!(paginate(Some(3), Some(20)), (3, 20, 40));
    }

    #[test]
    fn indonesian_dates_and_filename() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert_eq!(format_date_id(date), "5 Agu 2026");
        assert_eq!(
            export_filename(utc("2026-10-16T18:00:00Z"), wib()),
            "Laporan Lembur - 2026-10-17.csv"
        );
    }

    #[test]
    fn csv_has_bom_header_and_escaped_rows() {
        let mut record = NewOvertimeRecord {
            employee_id: "budi".into(),
            employee_name: "Budi Santoso".into(),
            check_in_time: utc("2026-10-17T10:00:00Z"),
            check_in_location: GeoLocation {
                latitude: 3.59,
                longitude: 98.67,
            },
            purpose: "Rapat, \"anggaran\"".into(),
            check_in_validation: None,
        }
        .into_record("r1".into());
        record.check_out_time = Some(utc("2026-10-17T13:15:00Z"));
        record.verification_status = VerificationStatus::Accepted;

        let csv = export_csv(&[record], wib());
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split("\r\n").collect();
        assert_eq!(
            lines[0],
            "Nama Pegawai,Tanggal,Waktu Check-In,Waktu Check-Out,Keterangan Lembur,Status Verifikasi,Catatan Verifikasi"
        );
        assert_eq!(
            lines[1],
            "Budi Santoso,17 Okt 2026,17:00:00,20:15:00,\"Rapat, \"\"anggaran\"\"\",Accepted,"
        );
    }

    #[test]
    fn csv_neutralizes_formula_text() {
        let mut record = NewOvertimeRecord {
            employee_id: "mallory".into(),
            employee_name: "=cmd|' /C calc'!A0".into(),
            check_in_time: utc("2026-10-17T02:45:29Z"),
            check_in_location: GeoLocation {
                latitude: 3.59,
                longitude: 98.67,
            },
            purpose: "=HYPERLINK(\"http://evil\")".into(),
            check_in_validation: None,
        }
        .into_record("r2".into());
        record.verification_notes = Some("@SUM(A1)".into());

        let csv = export_csv(&[record], wib());
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split("\r\n").collect();
        assert_eq!(
            lines[1],
            "'=cmd|' /C calc'!A0,17 Okt 2026,09:45:29,-,\"'=HYPERLINK(\"\"http://evil\"\")\",Pending,'@SUM(A1)"
        );
    }
}
