//! Wall-clock instants as found in the history API and in HTTP headers.
//!
//! Action order is load-bearing for reconciliation, so everything here keeps the full sub-second
//! precision the source provides; two edits a few microseconds apart must never compare equal.

use std::{fmt, time::SystemTime};

use time::{
    OffsetDateTime, PrimitiveDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// History timestamps are emitted without an offset, e.g. `2023-01-05T10:20:30.500`. They are UTC.
const HISTORY_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// IMF-fixdate, the only format servers are allowed to generate for `Last-Modified`.
const HTTP_DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn parse(input: &str) -> Result<Self, time::error::Parse> {
        let input = input.trim();
        match OffsetDateTime::parse(input, &Rfc3339) {
            Ok(dt) => Ok(Self(dt)),
            Err(_) => Ok(Self(
                PrimitiveDateTime::parse(input, HISTORY_FORMAT)?.assume_utc(),
            )),
        }
    }

    pub fn from_unix_micros(micros: i64) -> Self {
        Self(
            OffsetDateTime::from_unix_timestamp_nanos(micros as i128 * 1_000)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        )
    }

    pub fn unix_micros(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000) as i64
    }

    pub fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(dt: OffsetDateTime) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}", self.unix_micros()),
        }
    }
}

/// Parse a `Last-Modified` style header value.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|dt| dt.assume_utc().into())
}

/// Render an instant for an `If-Modified-Since` header.
pub fn format_http_date(at: SystemTime) -> Option<String> {
    OffsetDateTime::from(at).format(HTTP_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_timestamps_keep_microseconds() {
        let a = Timestamp::parse("2023-01-05T10:20:30.000001").unwrap();
        let b = Timestamp::parse("2023-01-05T10:20:30.000002").unwrap();
        assert!(a < b);
        assert_eq!(b.unix_micros() - a.unix_micros(), 1);
    }

    #[test]
    fn offset_and_naive_forms_agree() {
        let naive = Timestamp::parse("2021-03-04T12:34:56.500").unwrap();
        let zulu = Timestamp::parse("2021-03-04T12:34:56.5Z").unwrap();
        assert_eq!(naive, zulu);
        assert_eq!(naive.unix_micros(), 1_614_861_296_500_000);
        assert_eq!(Timestamp::from_unix_micros(naive.unix_micros()), naive);
    }

    #[test]
    fn seconds_only() {
        let ts = Timestamp::parse("2021-03-04T12:34:56").unwrap();
        assert_eq!(ts.unix_micros(), 1_614_861_296_000_000);
        assert_eq!(ts.to_string(), "2021-03-04T12:34:56Z");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn http_dates() {
        let at = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(
            format_http_date(at).as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert!(parse_http_date("not a date").is_none());
    }
}
