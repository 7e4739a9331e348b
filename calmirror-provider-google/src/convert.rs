//! CanonicalEvent <-> Google event.

use std::collections::BTreeMap;

use calmirror_core::{CanonicalEvent, EventBound, MirroredEvent};

use crate::types::{EventAttendee, EventDateTime, ExtendedProperties, GoogleEvent};

/// Private extended property carrying the source UID.
pub const CORRELATION_PROPERTY: &str = "calmirrorUid";

pub fn to_google(event: &CanonicalEvent, correlation_key: &str, mirror_attendees: bool) -> GoogleEvent {
    let attendees = mirror_attendees.then(|| {
        event
            .attendees
            .iter()
            .map(|email| EventAttendee {
                email: email.clone(),
            })
            .collect()
    });

    let extended_properties = (!correlation_key.is_empty()).then(|| ExtendedProperties {
        private: BTreeMap::from([(
            CORRELATION_PROPERTY.to_string(),
            correlation_key.to_string(),
        )]),
    });

    GoogleEvent {
        id: String::new(),
        status: "confirmed".to_string(),
        summary: event.summary.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: Some(bound_to_google(&event.start)),
        end: Some(bound_to_google(&event.end)),
        sequence: event.sequence,
        recurrence: event.recurrence.clone(),
        attendees,
        extended_properties,
    }
}

fn bound_to_google(bound: &EventBound) -> EventDateTime {
    match bound {
        EventBound::Date(date) => EventDateTime {
            date: Some(*date),
            ..EventDateTime::default()
        },
        EventBound::Instant { instant, zone } => EventDateTime {
            date: None,
            date_time: Some(*instant),
            time_zone: Some(zone.clone()),
        },
    }
}

pub fn to_mirrored(event: GoogleEvent) -> MirroredEvent {
    let correlation_key = event.private_property(CORRELATION_PROPERTY).map(str::to_string);
    MirroredEvent {
        id: event.id,
        status: event.status,
        correlation_key,
    }
}
