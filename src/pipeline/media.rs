//! Data URL decoding and the inline media decryptor.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::PreprocessError;
use crate::pipeline::types::{MediaDecryptor, Message};

/// Decode a `data:<mime>;base64,<payload>` URL into raw bytes.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, PreprocessError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| PreprocessError::InvalidDataUrl("missing data: scheme".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| PreprocessError::InvalidDataUrl("missing payload separator".into()))?;

    if !meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(PreprocessError::InvalidDataUrl(
            "only base64 payloads are supported".into(),
        ));
    }

    BASE64
        .decode(payload.trim())
        .map_err(|e| PreprocessError::InvalidDataUrl(e.to_string()))
}

/// Decryptor for clients that deliver media already decrypted, as a data URL
/// in the legacy media reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineMediaDecryptor;

#[async_trait]
impl MediaDecryptor for InlineMediaDecryptor {
    async fn decrypt_media(&self, message: &Message) -> Result<String, PreprocessError> {
        let media = message.legacy_media().ok_or_else(|| PreprocessError::Decrypt {
            id: message.id.clone(),
            reason: "message has no legacy media".into(),
        })?;
        if !media.url.starts_with("data:") {
            return Err(PreprocessError::Decrypt {
                id: message.id.clone(),
                reason: "media reference is not an inline data URL".into(),
            });
        }
        Ok(media.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::tests::legacy_message;
    use crate::pipeline::types::{LegacyMedia, MediaReference};

    #[test]
    fn decodes_base64_payload() {
        let bytes = decode_data_url("data:audio/ogg; codecs=opus;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn rejects_non_data_urls() {
        let err = decode_data_url("https://example.com/a.jpeg").unwrap_err();
        assert!(matches!(err, PreprocessError::InvalidDataUrl(_)));
    }

    #[test]
    fn rejects_plain_text_payloads() {
        let err = decode_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, PreprocessError::InvalidDataUrl(_)));
    }

    #[test]
    fn rejects_corrupt_base64() {
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn inline_decryptor_returns_embedded_data_url() {
        let mut msg = legacy_message("false_1@c.us_A");
        msg.media = MediaReference::Legacy(LegacyMedia {
            url: "data:image/jpeg;base64,aGVsbG8=".into(),
        });
        let url = InlineMediaDecryptor.decrypt_media(&msg).await.unwrap();
        assert_eq!(decode_data_url(&url).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn inline_decryptor_rejects_remote_references() {
        let msg = legacy_message("false_1@c.us_A");
        let err = InlineMediaDecryptor.decrypt_media(&msg).await.unwrap_err();
        assert!(matches!(err, PreprocessError::Decrypt { .. }));
    }
}
