//! Canonical event types.
//!
//! Source events are normalized into these types before they are handed to a
//! destination mirror. Timed bounds are always UTC; all-day bounds are plain
//! dates with an exclusive end.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Zone label attached to every timed bound.
pub const UTC_ZONE: &str = "UTC";

/// A calendar event in destination-ready form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Source-stable identity (iCalendar UID)
    pub uid: String,
    /// Revision counter from the source (SEQUENCE), 0 when absent
    pub sequence: i64,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: EventBound,
    /// Exclusive for all-day events
    pub end: EventBound,
    /// `RRULE:`, `EXDATE…` and `RDATE…` lines in source order
    pub recurrence: Vec<String>,
    /// Attendee email addresses (lower-cased, without `mailto:`)
    pub attendees: BTreeSet<String>,
}

impl CanonicalEvent {
    pub fn is_all_day(&self) -> bool {
        matches!(self.start, EventBound::Date(_))
    }
}

/// Start or end of a canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventBound {
    Date(NaiveDate),
    Instant { instant: DateTime<Utc>, zone: String },
}

impl EventBound {
    pub fn utc(instant: DateTime<Utc>) -> Self {
        EventBound::Instant {
            instant,
            zone: UTC_ZONE.to_string(),
        }
    }
}

impl fmt::Display for EventBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventBound::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventBound::Instant { instant, .. } => {
                write!(f, "{}", instant.format("%Y-%m-%dT%H:%M:%SZ"))
            }
        }
    }
}
