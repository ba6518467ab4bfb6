//! Date encoding detection and format-preserving date shifting
//!
//! Source files mix several textual date encodings. Each value is matched
//! against a closed set of [`DateEncoding`]s in a fixed priority order, moved
//! by a bounded random offset and rendered back in the encoding it was read in.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
};
use rand::Rng;

/// Formats only recognized after every fixed-width encoding failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackFormat {
    /// RFC 3339 with offset; `zulu` keeps a trailing `Z` instead of `+00:00`
    Rfc3339 { zulu: bool },
    /// `YYYY-MM-DDTHH:MM:SS`
    IsoDateTime,
    /// `YYYY-MM-DD HH:MM:SS`
    IsoDateTimeSpace,
    /// `YYYY-MM-DD HH:MM`
    IsoDateTimeSpaceMinutes,
    /// `DD/MM/YYYY`
    SlashDayMonthYear,
}

impl FallbackFormat {
    const NAIVE: [FallbackFormat; 4] = [
        FallbackFormat::IsoDateTime,
        FallbackFormat::IsoDateTimeSpace,
        FallbackFormat::IsoDateTimeSpaceMinutes,
        FallbackFormat::SlashDayMonthYear,
    ];

    fn pattern(self) -> &'static str {
        match self {
            FallbackFormat::Rfc3339 { .. } => "",
            FallbackFormat::IsoDateTime => "%Y-%m-%dT%H:%M:%S",
            FallbackFormat::IsoDateTimeSpace => "%Y-%m-%d %H:%M:%S",
            FallbackFormat::IsoDateTimeSpaceMinutes => "%Y-%m-%d %H:%M",
            FallbackFormat::SlashDayMonthYear => "%d/%m/%Y",
        }
    }
}

/// Textual date encodings, listed in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEncoding {
    /// `DD-MM-YYYYHH:MM` or `DD-MM-YYYYHH:MM:SS` (no separator before the time)
    DayMonthYearTime { seconds: bool },
    /// `YYYY-MM-DD`
    IsoDate,
    /// `DD-MM-YYYY`
    DayMonthYear,
    Fallback(FallbackFormat),
}

const DMY_TIME_SECONDS_SHAPE: &str = "dd-dd-dddddd:dd:dd";
const DMY_TIME_SHAPE: &str = "dd-dd-dddddd:dd";
const ISO_DATE_SHAPE: &str = "dddd-dd-dd";
const DMY_SHAPE: &str = "dd-dd-dddd";

/// Exact-length shape match where `d` stands for any ASCII digit
fn matches_shape(text: &str, shape: &str) -> bool {
    text.len() == shape.len()
        && text.bytes().zip(shape.bytes()).all(|(t, s)| match s {
            b'd' => t.is_ascii_digit(),
            _ => t == s,
        })
}

// Naive encodings carry no offset and are treated as UTC
fn from_naive(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    naive.and_utc().fixed_offset()
}

impl DateEncoding {
    /// Identify the encoding of `text`
    ///
    /// The date+time form is checked before plain `DD-MM-YYYY` since the
    /// latter is its prefix.
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.trim();

        if matches_shape(text, DMY_TIME_SECONDS_SHAPE) {
            return Some(DateEncoding::DayMonthYearTime { seconds: true });
        }
        if matches_shape(text, DMY_TIME_SHAPE) {
            return Some(DateEncoding::DayMonthYearTime { seconds: false });
        }
        if matches_shape(text, ISO_DATE_SHAPE) {
            return Some(DateEncoding::IsoDate);
        }
        if matches_shape(text, DMY_SHAPE) {
            return Some(DateEncoding::DayMonthYear);
        }

        if DateTime::parse_from_rfc3339(text).is_ok() {
            let zulu = text.ends_with(['Z', 'z']);
            return Some(DateEncoding::Fallback(FallbackFormat::Rfc3339 { zulu }));
        }
        FallbackFormat::NAIVE
            .into_iter()
            .map(DateEncoding::Fallback)
            .find(|encoding| encoding.parse(text).is_some())
    }

    /// Parse `text` under this encoding into an absolute instant
    pub fn parse(self, text: &str) -> Option<DateTime<FixedOffset>> {
        let text = text.trim();
        let naive = match self {
            DateEncoding::DayMonthYearTime { seconds } => {
                let (date, time) = (text.get(..10)?, text.get(10..)?);
                let date = NaiveDate::parse_from_str(date, "%d-%m-%Y").ok()?;
                let time_format = if seconds { "%H:%M:%S" } else { "%H:%M" };
                let time = NaiveTime::parse_from_str(time, time_format).ok()?;
                date.and_time(time)
            }
            DateEncoding::IsoDate => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()?
                .and_time(NaiveTime::MIN),
            DateEncoding::DayMonthYear => NaiveDate::parse_from_str(text, "%d-%m-%Y")
                .ok()?
                .and_time(NaiveTime::MIN),
            DateEncoding::Fallback(FallbackFormat::Rfc3339 { .. }) => {
                return DateTime::parse_from_rfc3339(text).ok();
            }
            DateEncoding::Fallback(FallbackFormat::SlashDayMonthYear) => {
                NaiveDate::parse_from_str(text, FallbackFormat::SlashDayMonthYear.pattern())
                    .ok()?
                    .and_time(NaiveTime::MIN)
            }
            DateEncoding::Fallback(format) => {
                NaiveDateTime::parse_from_str(text, format.pattern()).ok()?
            }
        };
        Some(from_naive(naive))
    }

    /// Render an instant using this encoding's field order and separators
    pub fn render(self, instant: &DateTime<FixedOffset>) -> String {
        let naive = instant.naive_local();
        match self {
            DateEncoding::DayMonthYearTime { seconds: true } => {
                naive.format("%d-%m-%Y%H:%M:%S").to_string()
            }
            DateEncoding::DayMonthYearTime { seconds: false } => {
                naive.format("%d-%m-%Y%H:%M").to_string()
            }
            DateEncoding::IsoDate => naive.format("%Y-%m-%d").to_string(),
            DateEncoding::DayMonthYear => naive.format("%d-%m-%Y").to_string(),
            DateEncoding::Fallback(FallbackFormat::Rfc3339 { zulu }) => {
                instant.to_rfc3339_opts(SecondsFormat::AutoSi, zulu)
            }
            DateEncoding::Fallback(format) => naive.format(format.pattern()).to_string(),
        }
    }

    /// Smallest unit this encoding can represent
    pub fn resolution(self) -> Duration {
        match self {
            DateEncoding::IsoDate
            | DateEncoding::DayMonthYear
            | DateEncoding::Fallback(FallbackFormat::SlashDayMonthYear) => Duration::days(1),
            DateEncoding::DayMonthYearTime { seconds: false }
            | DateEncoding::Fallback(FallbackFormat::IsoDateTimeSpaceMinutes) => {
                Duration::minutes(1)
            }
            _ => Duration::seconds(1),
        }
    }
}

/// Result of shifting one date value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateShift {
    Shifted { text: String, encoding: DateEncoding },
    /// No encoding matched; callers keep the original text and count a warning
    Unrecognized,
}

/// Move `text` by a uniform random offset within `±bound`, keeping its encoding
///
/// The offset is a whole number of the encoding's resolution units, so the
/// rendered value never lands outside the bound through truncation.
pub fn randomize_date<R: Rng + ?Sized>(text: &str, bound: Duration, rng: &mut R) -> DateShift {
    let Some(encoding) = DateEncoding::detect(text) else {
        return DateShift::Unrecognized;
    };
    let Some(instant) = encoding.parse(text) else {
        return DateShift::Unrecognized;
    };

    let unit = encoding.resolution().num_seconds();
    let units = bound.num_seconds().abs() / unit;
    let offset = Duration::seconds(rng.gen_range(-units..=units) * unit);

    match instant.checked_add_signed(offset) {
        Some(shifted) => DateShift::Shifted {
            text: encoding.render(&shifted),
            encoding,
        },
        None => DateShift::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_detect_priority() {
        assert_eq!(
            DateEncoding::detect("15-02-202314:30"),
            Some(DateEncoding::DayMonthYearTime { seconds: false })
        );
        assert_eq!(
            DateEncoding::detect("15-02-202314:30:05"),
            Some(DateEncoding::DayMonthYearTime { seconds: true })
        );
        assert_eq!(
            DateEncoding::detect("15-02-2023"),
            Some(DateEncoding::DayMonthYear)
        );
        assert_eq!(DateEncoding::detect("2023-02-15"), Some(DateEncoding::IsoDate));
        assert_eq!(
            DateEncoding::detect("2023-02-15T08:00:00Z"),
            Some(DateEncoding::Fallback(FallbackFormat::Rfc3339 { zulu: true }))
        );
        assert_eq!(
            DateEncoding::detect("2023-02-15 08:00"),
            Some(DateEncoding::Fallback(FallbackFormat::IsoDateTimeSpaceMinutes))
        );
        assert_eq!(
            DateEncoding::detect("15/02/2023"),
            Some(DateEncoding::Fallback(FallbackFormat::SlashDayMonthYear))
        );
        assert_eq!(DateEncoding::detect("last tuesday"), None);
    }

    #[test]
    fn test_date_time_is_not_read_as_plain_date() {
        let encoding = DateEncoding::detect("01-12-202023:59").unwrap();
        let instant = encoding.parse("01-12-202023:59").unwrap();
        assert_eq!(encoding.render(&instant), "01-12-202023:59");
        assert_eq!(instant.naive_local().to_string(), "2020-12-01 23:59:00");
    }

    #[test]
    fn test_shift_round_trips_encoding() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples = [
            "2023-02-15",
            "15-02-2023",
            "15-02-202314:30",
            "15-02-202314:30:05",
            "2023-02-15T08:00:00+02:00",
            "2023-02-15T08:00:00Z",
            "2023-02-15T08:00:00",
            "2023-02-15 08:00:00",
            "2023-02-15 08:00",
            "15/02/2023",
        ];

        for sample in samples {
            let original = DateEncoding::detect(sample).unwrap();
            for _ in 0..50 {
                let DateShift::Shifted { text, encoding } =
                    randomize_date(sample, Duration::days(182), &mut rng)
                else {
                    panic!("{sample} was not recognized");
                };
                assert_eq!(encoding, original);
                assert_eq!(DateEncoding::detect(&text), Some(original), "{sample} -> {text}");
                assert_eq!(text.len(), sample.len(), "{sample} -> {text}");
            }
        }
    }

    #[test]
    fn test_shift_stays_within_bound() {
        let mut rng = StdRng::seed_from_u64(5);
        let bound = Duration::days(30);
        let base = DateEncoding::DayMonthYear.parse("01-03-2024").unwrap();

        for _ in 0..500 {
            let DateShift::Shifted { text, .. } = randomize_date("01-03-2024", bound, &mut rng)
            else {
                panic!("unrecognized");
            };
            let shifted = DateEncoding::DayMonthYear.parse(&text).unwrap();
            assert!((shifted - base).num_seconds().abs() <= bound.num_seconds(), "{text}");
        }
    }

    #[test]
    fn test_unparseable_dates_are_reported() {
        let mut rng = StdRng::seed_from_u64(5);
        for text in ["", "yesterday", "31-02-2023", "2023-13-01", "15-02-202325:00"] {
            assert_eq!(
                randomize_date(text, Duration::days(10), &mut rng),
                DateShift::Unrecognized,
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_rfc3339_keeps_offset() {
        let mut rng = StdRng::seed_from_u64(2);
        let DateShift::Shifted { text, .. } =
            randomize_date("2023-02-15T08:00:00+02:00", Duration::hours(1), &mut rng)
        else {
            panic!("unrecognized");
        };
        assert!(text.ends_with("+02:00"), "{text}");
    }
}
