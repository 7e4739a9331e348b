//! Normalize iCalendar source events into [`CanonicalEvent`]s.

use std::collections::BTreeSet;

use chrono::Duration;
use icalendar::parser::{Component, Property, read_calendar, unfold};

use crate::error::{SyncError, SyncResult};
use crate::event::{CanonicalEvent, EventBound};
use crate::ics::time::{IcsTime, is_date_valued, param};

const DEFAULT_TIMED_DURATION_MINUTES: i64 = 60;

/// Normalize the calendar data of one source resource.
///
/// Fails with [`SyncError::MalformedEvent`] when there is no VEVENT, no UID,
/// or the start cannot be read. Identical input always yields identical output.
pub fn normalize(content: &str) -> SyncResult<CanonicalEvent> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| SyncError::MalformedEvent(format!("unreadable calendar data: {e}")))?;
    let vevent = primary_vevent(&calendar.components)
        .ok_or_else(|| SyncError::MalformedEvent("no VEVENT component".into()))?;

    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| SyncError::MalformedEvent("VEVENT has no UID".into()))?;

    let summary = text(vevent, "SUMMARY");
    let description = text(vevent, "DESCRIPTION");
    let location = text(vevent, "LOCATION");
    let sequence = vevent
        .find_prop("SEQUENCE")
        .and_then(|p| p.val.as_ref().trim().parse().ok())
        .unwrap_or(0);

    let dtstart = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| malformed(&uid, "missing DTSTART"))?;
    let start_time =
        IcsTime::from_property(dtstart).ok_or_else(|| malformed(&uid, "unreadable DTSTART"))?;
    let end_time = vevent
        .find_prop("DTEND")
        .map(|p| IcsTime::from_property(p).ok_or_else(|| malformed(&uid, "unreadable DTEND")))
        .transpose()?;

    let (start, end) = if is_date_valued(dtstart) {
        all_day_bounds(&uid, &start_time, end_time.as_ref())?
    } else {
        let duration = vevent.find_prop("DURATION").and_then(parse_duration);
        timed_bounds(&uid, &start_time, end_time.as_ref(), duration)?
    };

    Ok(CanonicalEvent {
        uid,
        sequence,
        summary,
        description,
        location,
        start,
        end,
        recurrence: recurrence_lines(vevent),
        attendees: attendees(vevent),
    })
}

/// The master VEVENT of a resource: the first one without a RECURRENCE-ID,
/// falling back to the first VEVENT when the resource only holds overrides.
fn primary_vevent<'a, 'c>(components: &'a [Component<'c>]) -> Option<&'a Component<'c>> {
    let mut vevents = components.iter().filter(|c| c.name == "VEVENT").peekable();
    let first = *vevents.peek()?;
    Some(
        vevents
            .find(|c| c.find_prop("RECURRENCE-ID").is_none())
            .unwrap_or(first),
    )
}

fn malformed(uid: &str, reason: &str) -> SyncError {
    SyncError::MalformedEvent(format!("{uid}: {reason}"))
}

/// Exclusive-end date bounds. The end is one day past the inclusive end date.
fn all_day_bounds(
    uid: &str,
    start: &IcsTime,
    end: Option<&IcsTime>,
) -> SyncResult<(EventBound, EventBound)> {
    let start_date = start.date();
    let end_date = end.map(IcsTime::date).unwrap_or(start_date).max(start_date);
    let exclusive_end = end_date
        .succ_opt()
        .ok_or_else(|| malformed(uid, "end date out of range"))?;

    Ok((EventBound::Date(start_date), EventBound::Date(exclusive_end)))
}

fn timed_bounds(
    uid: &str,
    start: &IcsTime,
    end: Option<&IcsTime>,
    duration: Option<Duration>,
) -> SyncResult<(EventBound, EventBound)> {
    let start = start.to_utc();
    let end = match end {
        Some(end) => end.to_utc(),
        None => start
            .checked_add_signed(
                duration.unwrap_or(Duration::minutes(DEFAULT_TIMED_DURATION_MINUTES)),
            )
            .ok_or_else(|| malformed(uid, "duration out of range"))?,
    };

    Ok((EventBound::utc(start), EventBound::utc(end.max(start))))
}

/// Parse a non-negative DURATION value (`PT45M`, `P1D`, ...).
fn parse_duration(prop: &Property) -> Option<Duration> {
    let value = prop.val.as_ref().trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// RRULE lines first, then EXDATE and RDATE values, one entry per value.
fn recurrence_lines(vevent: &Component) -> Vec<String> {
    let mut lines: Vec<String> = props(vevent, "RRULE")
        .map(|p| format!("RRULE:{}", p.val.as_ref().trim()))
        .collect();

    for name in ["EXDATE", "RDATE"] {
        for prop in props(vevent, name) {
            let params: String = ["TZID", "VALUE"]
                .iter()
                .filter_map(|key| param(prop, key).map(|v| format!(";{key}={v}")))
                .collect();

            lines.extend(
                prop.val
                    .as_ref()
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{name}{params}:{v}")),
            );
        }
    }

    lines
}

fn attendees(vevent: &Component) -> BTreeSet<String> {
    props(vevent, "ATTENDEE")
        .filter_map(|p| {
            let value = p.val.as_ref().trim();
            let email = match value.get(..7) {
                Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
                _ => value,
            };
            (!email.is_empty()).then(|| email.to_lowercase())
        })
        .collect()
}

fn props<'a, 'c>(
    vevent: &'a Component<'c>,
    name: &'a str,
) -> impl Iterator<Item = &'a Property<'c>> + 'a {
    vevent.properties.iter().filter(move |p| p.name == name)
}

/// TEXT property value with RFC 5545 escapes resolved, or empty when absent.
fn text(vevent: &Component, name: &str) -> String {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default()
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
