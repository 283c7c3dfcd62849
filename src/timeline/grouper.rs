//! Timeline grouping: messages interleaved with day and hour bands.
//!
//! Grouping is a pure function of the ordered message list, recomputed
//! whenever the store revision changes. Band identity is derived from the
//! timestamp so keys stay stable across recomputation.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::model::Message;

/// Messages in one calendar day before its rows are split by hour bands.
pub const HOUR_BAND_DAY_THRESHOLD: usize = 60;

/// One renderable row of the conversation timeline.
#[derive(Debug, Clone)]
pub enum TimelineItem {
    /// Date separator, one per calendar day with traffic.
    DayBand {
        /// Human label, e.g. `March 1, 2026`.
        label: String,
        /// The day, for identity.
        date: NaiveDate,
    },
    /// Time separator splitting a busy day by hour.
    HourBand {
        /// Human label, e.g. `14:00`.
        label: String,
        /// Start of the hour, for identity.
        hour: DateTime<Utc>,
    },
    /// An actual message.
    Message(Message),
}

impl TimelineItem {
    /// Stable identity key; the height cache and scroll anchoring hang off
    /// this, so it must survive regrouping unchanged.
    pub fn key(&self) -> String {
        match self {
            Self::DayBand { date, .. } => format!("day:{date}"),
            Self::HourBand { hour, .. } => format!("hour:{}", hour.format("%Y-%m-%dT%H")),
            Self::Message(message) => format!("msg:{}", message.id()),
        }
    }

    /// Whether this row is a separator rather than a message.
    pub fn is_band(&self) -> bool {
        !matches!(self, Self::Message(_))
    }
}

fn day_label(date: NaiveDate) -> String {
    format!(
        "{} {}, {}",
        month_name(date.month()),
        date.day(),
        date.year()
    )
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(ts)
}

/// Interleave an ordered message list with day and hour bands, using the
/// default per-day threshold.
///
/// A day band precedes the first message of each calendar day. A day holding
/// more than [`HOUR_BAND_DAY_THRESHOLD`] messages is further split: an hour
/// band precedes each distinct hour-of-day present, bounding how many rows
/// sit flat under one separator. Quieter days get no hour bands at all.
pub fn band(messages: &[Message]) -> Vec<TimelineItem> {
    band_with_threshold(messages, HOUR_BAND_DAY_THRESHOLD)
}

/// [`band`] with a configurable per-day message threshold.
pub fn band_with_threshold(messages: &[Message], day_threshold: usize) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(messages.len() + messages.len() / 8 + 1);
    let mut start = 0;
    while start < messages.len() {
        let date = messages[start].created_at().date_naive();
        let mut end = start + 1;
        while end < messages.len() && messages[end].created_at().date_naive() == date {
            end += 1;
        }

        items.push(TimelineItem::DayBand {
            label: day_label(date),
            date,
        });

        let dense = end - start > day_threshold;
        let mut current_hour: Option<DateTime<Utc>> = None;
        for message in &messages[start..end] {
            if dense {
                let hour = hour_start(message.created_at());
                if current_hour != Some(hour) {
                    items.push(TimelineItem::HourBand {
                        label: hour.format("%H:%M").to_string(),
                        hour,
                    });
                    current_hour = Some(hour);
                }
            }
            items.push(TimelineItem::Message(message.clone()));
        }
        start = end;
    }
    items
}

/// Pinned messages of a conversation, in timeline order. Soft-deleted
/// entries never show up pinned.
pub fn pinned(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.is_pinned() && !m.is_deleted())
        .cloned()
        .collect()
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationKey, MessageId, UserId, UserRef};

    fn message(id: &str, ts: &str) -> Message {
        let ts: DateTime<Utc> = ts.parse().expect("valid timestamp");
        Message::confirmed(
            MessageId::new(id).expect("valid id"),
            ConversationKey::Shared,
            UserRef::new(UserId::new("u-2").expect("valid"), "name".to_string()),
            None,
            Some(format!("text-{id}")),
            None,
            ts,
            ts,
        )
    }

    fn keys(items: &[TimelineItem]) -> Vec<String> {
        items.iter().map(TimelineItem::key).collect()
    }

    #[test]
    fn empty_list_bands_to_nothing() {
        assert!(band(&[]).is_empty());
    }

    #[test]
    fn first_message_of_a_day_gets_only_a_day_band() {
        let items = band(&[message("m-1", "2026-03-01T09:00:00Z")]);
        assert_eq!(keys(&items), vec!["day:2026-03-01", "msg:m-1"]);
        match &items[0] {
            TimelineItem::DayBand { label, .. } => assert_eq!(label, "March 1, 2026"),
            other => panic!("expected day band, got {other:?}"),
        }
    }

    #[test]
    fn quiet_day_gets_no_hour_bands() {
        let items = band(&[
            message("m-1", "2026-03-01T09:00:00Z"),
            message("m-2", "2026-03-01T14:30:00Z"),
        ]);
        assert_eq!(keys(&items), vec!["day:2026-03-01", "msg:m-1", "msg:m-2"]);
    }

    #[test]
    fn dense_day_splits_into_one_hour_band_per_distinct_hour() {
        let items = band_with_threshold(
            &[
                message("m-1", "2026-03-01T09:00:00Z"),
                message("m-2", "2026-03-01T09:30:00Z"),
                message("m-3", "2026-03-01T10:15:00Z"),
                message("m-4", "2026-03-01T10:20:00Z"),
            ],
            2,
        );
        assert_eq!(
            keys(&items),
            vec![
                "day:2026-03-01",
                "hour:2026-03-01T09",
                "msg:m-1",
                "msg:m-2",
                "hour:2026-03-01T10",
                "msg:m-3",
                "msg:m-4",
            ]
        );
        match &items[4] {
            TimelineItem::HourBand { label, .. } => assert_eq!(label, "10:00"),
            other => panic!("expected hour band, got {other:?}"),
        }
    }

    #[test]
    fn day_at_exactly_the_threshold_stays_unsplit() {
        let items = band_with_threshold(
            &[
                message("m-1", "2026-03-01T09:00:00Z"),
                message("m-2", "2026-03-01T10:59:00Z"),
            ],
            2,
        );
        assert_eq!(keys(&items), vec!["day:2026-03-01", "msg:m-1", "msg:m-2"]);
    }

    #[test]
    fn day_change_restarts_with_day_band_not_hour_band() {
        let items = band(&[
            message("m-1", "2026-03-01T23:50:00Z"),
            message("m-2", "2026-03-02T00:05:00Z"),
        ]);
        assert_eq!(
            keys(&items),
            vec!["day:2026-03-01", "msg:m-1", "day:2026-03-02", "msg:m-2"]
        );
    }

    #[test]
    fn seventy_messages_over_two_days_band_correctly() {
        // Day one carries 70 messages across hours 08..=14; day two has one.
        let mut messages: Vec<Message> = (0..70)
            .map(|i| {
                let hour = 8 + i / 10;
                let minute = (i % 10) * 6;
                message(
                    &format!("m-{i}"),
                    &format!("2026-03-01T{hour:02}:{minute:02}:00Z"),
                )
            })
            .collect();
        messages.push(message("m-next", "2026-03-02T09:00:00Z"));

        let items = band(&messages);

        let day_bands = items
            .iter()
            .filter(|item| matches!(item, TimelineItem::DayBand { .. }))
            .count();
        assert_eq!(day_bands, 2);

        let hour_keys: Vec<String> = items
            .iter()
            .filter(|item| matches!(item, TimelineItem::HourBand { .. }))
            .map(TimelineItem::key)
            .collect();
        let expected: Vec<String> = (8..=14).map(|h| format!("hour:2026-03-01T{h:02}")).collect();
        assert_eq!(hour_keys, expected, "one hour band per distinct hour, busy day only");

        let message_count = items
            .iter()
            .filter(|item| matches!(item, TimelineItem::Message(_)))
            .count();
        assert_eq!(message_count, 71, "each message appears exactly once");
    }

    #[test]
    fn pinned_excludes_deleted_entries() {
        let mut pinned_msg = message("m-1", "2026-03-01T09:00:00Z");
        pinned_msg = pinned_msg.with_flags(false, false, true);
        let mut deleted_pinned = message("m-2", "2026-03-01T09:05:00Z");
        deleted_pinned = deleted_pinned.with_flags(false, true, true);
        let plain = message("m-3", "2026-03-01T09:10:00Z");

        let result = pinned(&[pinned_msg, deleted_pinned, plain]);
        let ids: Vec<&str> = result.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["m-1"]);
    }

    #[test]
    fn keys_are_stable_across_regrouping() {
        let messages = vec![
            message("m-1", "2026-03-01T09:00:00Z"),
            message("m-2", "2026-03-01T11:00:00Z"),
        ];
        assert_eq!(keys(&band(&messages)), keys(&band(&messages)));
    }
}
