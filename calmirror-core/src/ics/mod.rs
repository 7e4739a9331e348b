//! iCalendar parsing and normalization.
//!
//! Source events arrive as raw .ics text (RFC 5545). This module turns them
//! into [`CanonicalEvent`](crate::event::CanonicalEvent)s.

mod normalize;
mod time;

pub use normalize::normalize;
pub use time::IcsTime;
