use chrono::{DateTime, Duration, NaiveDate, Utc};

#[allow(unused)]
pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

#[allow(unused)]
pub fn time_micros() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_micros()
}

/// RFC 3339 timestamp for history entries.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Calendar date after shifting UTC by the tenant's offset, in minutes.
/// Used as the day key for daily-call counters.
pub fn local_date(utc_offset_minutes: i32) -> NaiveDate {
    local_date_at(Utc::now(), utc_offset_minutes)
}

fn local_date_at(
    now: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> NaiveDate {
    (now + Duration::minutes(utc_offset_minutes as i64)).date_naive()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_local_date_offset() {
        // 23:30 UTC is already the next day for a tenant at UTC+1.
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(local_date_at(now, 0), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(local_date_at(now, 60), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(local_date_at(now, -12 * 60), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }
}
