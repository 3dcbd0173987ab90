//! Resolves the `ClientTimeZone` (IANA name, UTC offset, DST period)
//! attached to `OpenSession`. See spec.md §6 "Invoke payload shape".

use bc_protocol::interaction::ClientTimeZone;
use chrono::{DateTime, Duration as ChronoDuration, Offset, Utc};
use chrono_tz::Tz;

/// Look up `iana_name`'s current UTC offset and, if it observes DST, the
/// boundaries of the DST period containing `at`. Falls back to a fixed
/// zero-offset, no-DST zone for an unrecognized name.
#[must_use]
pub fn resolve_client_time_zone(iana_name: &str, at: DateTime<Utc>) -> ClientTimeZone {
    let Ok(tz) = iana_name.parse::<Tz>() else {
        return ClientTimeZone::builder()
            .name(iana_name)
            .utc_offset_minutes(0)
            .dst_start_utc(None)
            .dst_end_utc(None)
            .build();
    };

    let offset_minutes = offset_minutes_at(tz, at);
    let dst_period = find_dst_period(tz, at);

    ClientTimeZone::builder()
        .name(iana_name)
        .utc_offset_minutes(offset_minutes)
        .dst_start_utc(dst_period.map(|(start, _)| start.to_rfc3339()))
        .dst_end_utc(dst_period.map(|(_, end)| end.to_rfc3339()))
        .build()
}

fn offset_minutes_at(tz: Tz, at: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc() / 60
}

/// Sample the offset a half-year before and after `at`; if either differs
/// from the offset at `at`, binary-search the transition instant and
/// return the `(start, end)` of the DST window containing `at`.
fn find_dst_period(tz: Tz, at: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let half_year = ChronoDuration::days(182);
    let base_offset = offset_minutes_at(tz, at);

    let before = at - half_year;
    let after = at + half_year;
    let changes_before = offset_minutes_at(tz, before) != base_offset;
    let changes_after = offset_minutes_at(tz, after) != base_offset;

    if !changes_before && !changes_after {
        return None;
    }

    let start = if changes_before { find_transition(tz, before, at) } else { before };
    let end = if changes_after { find_transition(tz, at, after) } else { after };
    Some((start, end))
}

/// `a` and `b` must have different offsets. Narrows to within a minute and
/// returns (approximately) the first instant carrying `b`'s offset.
fn find_transition(tz: Tz, mut a: DateTime<Utc>, mut b: DateTime<Utc>) -> DateTime<Utc> {
    let offset_a = offset_minutes_at(tz, a);
    for _ in 0..32 {
        if (b - a) <= ChronoDuration::minutes(1) {
            break;
        }
        let mid = a + (b - a) / 2;
        if offset_minutes_at(tz, mid) == offset_a {
            a = mid;
        } else {
            b = mid;
        }
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn utc_has_no_dst_period() {
        let at = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();
        let tz = resolve_client_time_zone("UTC", at);
        assert_eq!(tz.utc_offset_minutes, 0);
        assert!(tz.dst_start_utc.is_none());
        assert!(tz.dst_end_utc.is_none());
    }

    #[test]
    fn unrecognized_zone_name_falls_back_to_fixed_utc() {
        let at = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();
        let tz = resolve_client_time_zone("Not/AZone", at);
        assert_eq!(tz.utc_offset_minutes, 0);
        assert!(tz.dst_start_utc.is_none());
    }

    #[test]
    fn copenhagen_summer_date_detects_surrounding_dst_window() {
        // CEST (UTC+2) runs from the last Sunday in March to the last
        // Sunday in October; mid-June sits well inside that window.
        let at = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();
        let tz = resolve_client_time_zone("Europe/Copenhagen", at);
        assert_eq!(tz.utc_offset_minutes, 120);
        assert!(tz.dst_start_utc.is_some());
        assert!(tz.dst_end_utc.is_some());

        let start: DateTime<Utc> = tz.dst_start_utc.unwrap().parse().unwrap();
        let end: DateTime<Utc> = tz.dst_end_utc.unwrap().parse().unwrap();
        assert!(start < at);
        assert!(at < end);
        assert!(start.month() == 3);
        assert!(end.month() == 10);
    }

    #[test]
    fn copenhagen_winter_date_has_no_dst_window() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let tz = resolve_client_time_zone("Europe/Copenhagen", at);
        assert_eq!(tz.utc_offset_minutes, 60);
        assert!(tz.dst_start_utc.is_none());
    }
}
