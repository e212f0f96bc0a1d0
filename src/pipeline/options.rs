//! Upload option assembly and validation.
//!
//! Combines the configured `cloudUploadOptions`, environment overrides, and
//! the message itself into an [`UploadOptions`] record. Environment values
//! always win over configured ones.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::{
    CloudUploadOptions, ENV_ACCESS_KEY_ID, ENV_BUCKET, ENV_PROVIDER, ENV_SECRET_ACCESS_KEY,
    EnvOverrides,
};
use crate::error::ConfigError;
use crate::pipeline::types::Message;

/// Supported storage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Aws,
    Gcp,
    Wasabi,
    #[serde(rename = "DO")]
    DigitalOcean,
}

impl Provider {
    fn default_region(self) -> &'static str {
        match self {
            Self::Aws | Self::Wasabi => "us-east-1",
            Self::Gcp => "auto",
            Self::DigitalOcean => "nyc3",
        }
    }

    /// Virtual-hosted style base URL for `bucket`.
    fn bucket_url(self, bucket: &str, region: Option<&str>) -> String {
        let region = region.unwrap_or(self.default_region());
        match self {
            Self::Aws => format!("https://{bucket}.s3.{region}.amazonaws.com"),
            Self::Gcp => format!("https://storage.googleapis.com/{bucket}"),
            Self::Wasabi => format!("https://{bucket}.s3.{region}.wasabisys.com"),
            Self::DigitalOcean => format!("https://{bucket}.{region}.digitaloceanspaces.com"),
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AWS" | "S3" => Ok(Self::Aws),
            "GCP" | "GCS" => Ok(Self::Gcp),
            "WASABI" => Ok(Self::Wasabi),
            "DO" | "DIGITALOCEAN" => Ok(Self::DigitalOcean),
            other => Err(ConfigError::InvalidValue {
                key: "provider".into(),
                message: format!("unsupported provider {other:?}"),
            }),
        }
    }
}

/// The required upload fields, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadField {
    AccessKeyId,
    SecretAccessKey,
    Bucket,
    Provider,
}

impl UploadField {
    /// Environment variable that can supply this field.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::AccessKeyId => ENV_ACCESS_KEY_ID,
            Self::SecretAccessKey => ENV_SECRET_ACCESS_KEY,
            Self::Bucket => ENV_BUCKET,
            Self::Provider => ENV_PROVIDER,
        }
    }
}

impl fmt::Display for UploadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AccessKeyId => "accessKeyId",
            Self::SecretAccessKey => "secretAccessKey",
            Self::Bucket => "bucket",
            Self::Provider => "provider",
        })
    }
}

/// Everything a [`BlobUploader`](crate::pipeline::types::BlobUploader) needs
/// for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub provider: Provider,
    pub file: Vec<u8>,
    pub filename: String,
    pub mimetype: Option<String>,
    pub access_key_id: SecretString,
    pub secret_access_key: SecretString,
    pub bucket: String,
    pub region: Option<String>,
    pub directory: Option<String>,
}

impl UploadOptions {
    /// Attach the decrypted payload.
    pub fn with_file(mut self, file: Vec<u8>) -> Self {
        self.file = file;
        self
    }

    /// Object key inside the bucket: `<directory>/<filename>`.
    pub fn object_key(&self) -> String {
        match self.directory.as_deref().map(|d| d.trim_matches('/')) {
            Some(dir) if !dir.is_empty() => format!("{dir}/{}", self.filename),
            _ => self.filename.clone(),
        }
    }

    /// Public URL of the object on its provider.
    pub fn public_url(&self) -> String {
        format!(
            "{}/{}",
            self.provider.bucket_url(&self.bucket, self.region.as_deref()),
            self.object_key()
        )
    }
}

/// Build validated upload options for `message`.
///
/// Validation stops at the first missing field, checked in the order
/// access key, secret key, bucket, provider.
pub fn build_upload_options(
    message: &Message,
    config: &CloudUploadOptions,
    env: &EnvOverrides,
    now: DateTime<Utc>,
) -> Result<UploadOptions, ConfigError> {
    let pick = |env_value: &Option<String>, config_value: &Option<String>| {
        env_value
            .as_ref()
            .or(config_value.as_ref())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let access_key_id = pick(&env.access_key_id, &config.access_key_id)
        .ok_or(ConfigError::MissingField {
            field: UploadField::AccessKeyId,
        })?;
    let secret_access_key = pick(&env.secret_access_key, &config.secret_access_key)
        .ok_or(ConfigError::MissingField {
            field: UploadField::SecretAccessKey,
        })?;
    let bucket = pick(&env.bucket, &config.bucket).ok_or(ConfigError::MissingField {
        field: UploadField::Bucket,
    })?;
    let provider: Provider = pick(&env.provider, &config.provider)
        .ok_or(ConfigError::MissingField {
            field: UploadField::Provider,
        })?
        .parse()?;

    let directory = env
        .directory
        .as_ref()
        .or(config.directory.as_ref())
        .map(|strategy| strategy.resolve(message, now));

    Ok(UploadOptions {
        provider,
        file: Vec::new(),
        filename: media_filename(message),
        mimetype: message.mimetype.clone(),
        access_key_id: SecretString::from(access_key_id),
        secret_access_key: SecretString::from(secret_access_key),
        bucket,
        region: pick(&env.region, &config.region),
        directory,
    })
}

/// Derive the storage filename from a message: `<sequence suffix>.<ext>`.
pub fn media_filename(message: &Message) -> String {
    let suffix = message.id.rsplit('_').next().unwrap_or(&message.id);
    let ext = message
        .mimetype
        .as_deref()
        .map(extension_for_mime)
        .unwrap_or("bin");
    format!("{suffix}.{ext}")
}

/// File extension for a MIME type. Parameters (`; codecs=opus`) are ignored.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" => "jpeg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}
