//! Shared types for the preprocessing pipeline.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PreprocessError};
use crate::pipeline::options::UploadOptions;

// ── Message ─────────────────────────────────────────────────────────

/// An inbound chat message as delivered by the client.
///
/// Processors take a message by value and hand back the transformed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Globally unique id. The component after the last `_` is the
    /// message's sequence suffix (e.g. `false_447700900123@c.us_3EB0C4`).
    pub id: String,
    pub mimetype: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub from_me: bool,
    /// Chat address including its channel suffix (`@c.us`, `@g.us`).
    pub chat_id: String,
    #[serde(default)]
    pub media: MediaReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Message {
    /// Legacy media info, if this message needs explicit media processing.
    pub fn legacy_media(&self) -> Option<&LegacyMedia> {
        match &self.media {
            MediaReference::Legacy(info) => Some(info),
            MediaReference::None => None,
        }
    }
}

// ── Media reference ─────────────────────────────────────────────────

/// Whether a message carries media that must be decrypted before use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaReference {
    Legacy(LegacyMedia),
    #[default]
    None,
}

/// Location of encrypted media that still needs decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMedia {
    pub url: String,
}

// ── Processor registry ──────────────────────────────────────────────

/// The interchangeable message processors, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Processor {
    /// Blank body and content.
    Scrub,
    /// Blank content, keep body.
    BodyOnly,
    /// Replace body with the decrypted data URL.
    AutoDecrypt,
    /// Decrypt to disk and point the message at the file.
    AutoDecryptSave,
    /// Upload to cloud storage and attach the object URL.
    UploadCloud,
}

impl Processor {
    /// Every registered processor.
    pub const ALL: [Processor; 5] = [
        Self::Scrub,
        Self::BodyOnly,
        Self::AutoDecrypt,
        Self::AutoDecryptSave,
        Self::UploadCloud,
    ];

    /// Symbolic name used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scrub => "SCRUB",
            Self::BodyOnly => "BODY_ONLY",
            Self::AutoDecrypt => "AUTO_DECRYPT",
            Self::AutoDecryptSave => "AUTO_DECRYPT_SAVE",
            Self::UploadCloud => "UPLOAD_CLOUD",
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Processor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "processor".into(),
                message: format!(
                    "unknown processor {s:?}, expected one of {}",
                    Self::ALL.map(Processor::name).join(", ")
                ),
            })
    }
}

// ── External capabilities ───────────────────────────────────────────

/// Decrypts the media attached to a message.
#[async_trait]
pub trait MediaDecryptor: Send + Sync {
    /// Return the decrypted media as a `data:` URL.
    async fn decrypt_media(&self, message: &Message) -> Result<String, PreprocessError>;
}

/// Transfers files to a storage provider.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    /// Upload `options.file` to its target location.
    async fn upload(&self, options: &UploadOptions) -> Result<(), PreprocessError>;

    /// The URL the object has (or will have) once uploaded.
    fn object_url(&self, options: &UploadOptions) -> String {
        options.public_url()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn legacy_message(id: &str) -> Message {
        Message {
            id: id.into(),
            mimetype: Some("image/jpeg".into()),
            body: "/9j/4AAQSkZJRg".into(),
            content: "/9j/4AAQSkZJRg".into(),
            from_me: false,
            chat_id: "447700900123@c.us".into(),
            media: MediaReference::Legacy(LegacyMedia {
                url: "https://mmg.example.net/d/f/enc".into(),
            }),
            cloud_url: None,
            file_path: None,
        }
    }

    #[test]
    fn processor_names_round_trip() {
        for p in Processor::ALL {
            assert_eq!(p.name().parse::<Processor>().unwrap(), p);
        }
        assert_eq!("upload_cloud".parse::<Processor>().unwrap(), Processor::UploadCloud);
    }

    #[test]
    fn unknown_processor_is_rejected() {
        let err = "COMPRESS".parse::<Processor>().unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "processor");
                assert!(message.contains("AUTO_DECRYPT_SAVE"));
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn processor_serializes_screaming_snake() {
        let json = serde_json::to_string(&Processor::AutoDecryptSave).unwrap();
        assert_eq!(json, "\"AUTO_DECRYPT_SAVE\"");
    }

    #[test]
    fn legacy_media_accessor() {
        let msg = legacy_message("false_1@c.us_ABC");
        assert!(msg.legacy_media().is_some());

        let plain = Message {
            media: MediaReference::None,
            ..msg
        };
        assert!(plain.legacy_media().is_none());
    }

    #[test]
    fn message_deserializes_with_defaults() {
        let msg: Message = serde_json::from_str(
            r#"{"id": "false_1@c.us_X", "mimetype": null, "chatId": "1@c.us"}"#,
        )
        .unwrap();
        assert_eq!(msg.media, MediaReference::None);
        assert!(!msg.from_me);
        assert!(msg.cloud_url.is_none());
    }

    #[test]
    fn message_serializes_media_tag() {
        let msg = legacy_message("false_1@c.us_ABC");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["media"]["kind"], "legacy");
        assert_eq!(json["chatId"], "447700900123@c.us");
        assert!(json.get("cloudUrl").is_none());
    }
}
