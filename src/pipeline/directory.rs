//! Storage directory strategies.
//!
//! A strategy maps a message and the current time to a path prefix inside
//! the bucket. Resolution is pure: the same inputs always give the same path.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::Message;

/// How uploaded media is grouped inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DirectoryStrategy {
    /// `YYYY-MM-DD`
    ByDate,
    /// Chat id without its `@` suffix.
    ByChat,
    /// `YYYY-MM-DD/<chat>`
    ByDateThenChat,
    /// `<chat>/YYYY-MM-DD`
    ByChatThenDate,
    /// A fixed directory, used as-is.
    Custom(String),
}

impl DirectoryStrategy {
    /// Resolve this strategy to a path prefix.
    pub fn resolve(&self, message: &Message, now: DateTime<Utc>) -> String {
        match self {
            Self::ByDate => date_segment(now),
            Self::ByChat => chat_segment(&message.chat_id).to_string(),
            Self::ByDateThenChat => {
                format!("{}/{}", date_segment(now), chat_segment(&message.chat_id))
            }
            Self::ByChatThenDate => {
                format!("{}/{}", chat_segment(&message.chat_id), date_segment(now))
            }
            Self::Custom(dir) => dir.clone(),
        }
    }
}

impl From<String> for DirectoryStrategy {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DATE" | "BY_DATE" => Self::ByDate,
            "CHAT" | "BY_CHAT" => Self::ByChat,
            "DATE_CHAT" | "BY_DATE_THEN_CHAT" => Self::ByDateThenChat,
            "CHAT_DATE" | "BY_CHAT_THEN_DATE" => Self::ByChatThenDate,
            _ => Self::Custom(raw),
        }
    }
}

impl From<DirectoryStrategy> for String {
    fn from(strategy: DirectoryStrategy) -> Self {
        strategy.to_string()
    }
}

impl fmt::Display for DirectoryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByDate => f.write_str("DATE"),
            Self::ByChat => f.write_str("CHAT"),
            Self::ByDateThenChat => f.write_str("DATE_CHAT"),
            Self::ByChatThenDate => f.write_str("CHAT_DATE"),
            Self::Custom(dir) => f.write_str(dir),
        }
    }
}

fn date_segment(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Strip the channel-type suffix (`@c.us`, `@g.us`, ...) from a chat id.
fn chat_segment(chat_id: &str) -> &str {
    chat_id.split_once('@').map_or(chat_id, |(user, _)| user)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::pipeline::types::tests::legacy_message;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap()
    }

    fn group_message() -> Message {
        let mut msg = legacy_message("true_12345@g.us_3EB0AB12");
        msg.chat_id = "12345@g.us".into();
        msg
    }

    #[test]
    fn by_date_uses_utc_calendar_date() {
        let msg = group_message();
        assert_eq!(DirectoryStrategy::ByDate.resolve(&msg, fixed_now()), "2024-03-09");
    }

    #[test]
    fn by_chat_strips_suffix() {
        let msg = group_message();
        assert_eq!(DirectoryStrategy::ByChat.resolve(&msg, fixed_now()), "12345");

        let mut direct = group_message();
        direct.chat_id = "447700900123@c.us".into();
        assert_eq!(
            DirectoryStrategy::ByChat.resolve(&direct, fixed_now()),
            "447700900123"
        );
    }

    #[test]
    fn combined_strategies_are_reversed() {
        let msg = group_message();
        let date_chat = DirectoryStrategy::ByDateThenChat.resolve(&msg, fixed_now());
        let chat_date = DirectoryStrategy::ByChatThenDate.resolve(&msg, fixed_now());
        assert_eq!(date_chat, "2024-03-09/12345");
        assert_eq!(chat_date, "12345/2024-03-09");

        let mut reversed: Vec<&str> = chat_date.split('/').collect();
        reversed.reverse();
        assert_eq!(reversed.join("/"), date_chat);
    }

    #[test]
    fn custom_directory_is_literal() {
        let msg = group_message();
        let strategy = DirectoryStrategy::from("uploads/whatsapp".to_string());
        assert_eq!(strategy.resolve(&msg, fixed_now()), "uploads/whatsapp");
    }

    #[test]
    fn resolution_is_deterministic() {
        let msg = group_message();
        for strategy in [
            DirectoryStrategy::ByDate,
            DirectoryStrategy::ByChat,
            DirectoryStrategy::ByDateThenChat,
            DirectoryStrategy::ByChatThenDate,
        ] {
            assert_eq!(
                strategy.resolve(&msg, fixed_now()),
                strategy.resolve(&msg, fixed_now())
            );
        }
    }

    #[test]
    fn parses_both_naming_styles() {
        assert_eq!(DirectoryStrategy::from("by_date".to_string()), DirectoryStrategy::ByDate);
        assert_eq!(DirectoryStrategy::from("CHAT".to_string()), DirectoryStrategy::ByChat);
        assert_eq!(
            DirectoryStrategy::from("BY_DATE_THEN_CHAT".to_string()),
            DirectoryStrategy::ByDateThenChat
        );
        assert_eq!(
            DirectoryStrategy::from("chat_date".to_string()),
            DirectoryStrategy::ByChatThenDate
        );
    }

    #[test]
    fn serde_round_trips_through_string() {
        let json = serde_json::to_string(&DirectoryStrategy::ByDateThenChat).unwrap();
        assert_eq!(json, "\"DATE_CHAT\"");
        let back: DirectoryStrategy = serde_json::from_str("\"static/dir\"").unwrap();
        assert_eq!(back, DirectoryStrategy::Custom("static/dir".into()));
    }
}
