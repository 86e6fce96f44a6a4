use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{feedback::repo_types::UserFeedback, meals::repo_types::Meal};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "entry", rename_all = "snake_case")]
pub enum TimelineEntry {
    Meal(Meal),
    Wellbeing(UserFeedback),
}

impl TimelineEntry {
    pub fn timestamp(&self) -> i64 {
        match self {
            TimelineEntry::Meal(m) => m.timestamp,
            TimelineEntry::Wellbeing(f) => f.feedback_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: Date,
    pub entries: Vec<TimelineEntry>,
}

/// Calendar date of an epoch-millis timestamp at `offset`. Out-of-range
/// values clamp to the epoch.
pub fn local_date(timestamp_ms: i64, offset: UtcOffset) -> Date {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
        .date()
}

/// Merges meals and feedback into day groups, newest day first and newest
/// entry first within a day.
pub fn build_timeline(meals: Vec<Meal>, feedback: Vec<UserFeedback>, offset: UtcOffset) -> Vec<DayGroup> {
    let mut entries: Vec<TimelineEntry> = meals
        .into_iter()
        .map(TimelineEntry::Meal)
        .chain(feedback.into_iter().map(TimelineEntry::Wellbeing))
        .collect();
    entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp()));

    let mut groups: Vec<DayGroup> = Vec::new();
    for entry in entries {
        let date = local_date(entry.timestamp(), offset);
        match groups.last_mut() {
            Some(group) if group.date == date => group.entries.push(entry),
            _ => groups.push(DayGroup {
                date,
                entries: vec![entry],
            }),
        }
    }
    groups
}
