//! Date and date-time values as they appear in iCalendar properties.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::Property;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Every shape a DTSTART/DTEND value can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcsTime {
    /// `VALUE=DATE`
    Date(NaiveDate),
    /// Trailing `Z`
    Utc(DateTime<Utc>),
    /// No zone information at all
    Floating(NaiveDateTime),
    /// `TZID=` parameter
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl IcsTime {
    /// Parse a DTSTART/DTEND-style property, honoring its `TZID` and `VALUE` parameters.
    pub fn from_property(prop: &Property) -> Option<Self> {
        let tzid = param(prop, "TZID");
        Self::parse(prop.val.as_ref().trim(), tzid.as_deref(), is_date_valued(prop))
    }

    pub fn parse(value: &str, tzid: Option<&str>, is_date: bool) -> Option<Self> {
        if is_date {
            return NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(IcsTime::Date);
        }

        if let Some(utc) = value.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(utc, DATE_TIME_FORMAT)
                .ok()
                .map(|dt| IcsTime::Utc(dt.and_utc()));
        }

        let datetime = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT).ok()?;
        Some(match tzid {
            Some(tzid) => IcsTime::Zoned {
                datetime,
                tzid: tzid.to_string(),
            },
            None => IcsTime::Floating(datetime),
        })
    }

    /// The calendar date as written in the source.
    pub fn date(&self) -> NaiveDate {
        match self {
            IcsTime::Date(d) => *d,
            IcsTime::Utc(dt) => dt.date_naive(),
            IcsTime::Floating(dt) => dt.date(),
            IcsTime::Zoned { datetime, .. } => datetime.date(),
        }
    }

    /// Convert to a UTC instant.
    ///
    /// Floating values and unknown zones are read as UTC. Dates become midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            IcsTime::Date(d) => d.and_time(chrono::NaiveTime::MIN).and_utc(),
            IcsTime::Utc(dt) => *dt,
            IcsTime::Floating(dt) => dt.and_utc(),
            IcsTime::Zoned { datetime, tzid } => match parse_tzid(tzid) {
                Some(tz) => resolve_local(&tz, datetime),
                None => datetime.and_utc(),
            },
        }
    }
}

/// Whether the property carries an explicit `VALUE=DATE` marker.
pub fn is_date_valued(prop: &Property) -> bool {
    param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
}

/// Look up a property parameter, with surrounding quotes removed.
pub fn param(prop: &Property, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key.as_ref().eq_ignore_ascii_case(key))
        .and_then(|p| p.val.as_ref().map(|v| v.as_ref().trim_matches('"').to_string()))
}

/// Accepts plain IANA names as well as the `/mozilla.org/20050126_1/Europe/Berlin` style.
fn parse_tzid(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim_matches('"');
    tzid.parse::<Tz>().ok().or_else(|| {
        let mut segments = tzid.rsplit('/');
        let city = segments.next()?;
        let region = segments.next()?;
        format!("{region}/{city}").parse::<Tz>().ok()
    })
}

/// Resolve a wall-clock time in `tz`. Times inside a DST gap move forward by the gap.
fn resolve_local(tz: &Tz, datetime: &NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(datetime)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(*datetime + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| datetime.and_utc())
}
