//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::directory::DirectoryStrategy;
use crate::pipeline::types::Processor;

/// Environment variable names for cloud upload overrides.
pub const ENV_PROVIDER: &str = "WA_CLOUD_PROVIDER";
pub const ENV_ACCESS_KEY_ID: &str = "WA_CLOUD_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "WA_CLOUD_SECRET_ACCESS_KEY";
pub const ENV_BUCKET: &str = "WA_CLOUD_BUCKET";
pub const ENV_REGION: &str = "WA_CLOUD_REGION";
pub const ENV_DIRECTORY: &str = "WA_CLOUD_DIRECTORY";
pub const ENV_IGNORE_HOST: &str = "WA_CLOUD_IGNORE_HOST";

/// Preprocessor configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprocessorConfig {
    /// Processor applied to every inbound message. `None` disables preprocessing.
    pub processor: Option<Processor>,
    /// Cloud upload section. Absent means UPLOAD_CLOUD is not configured.
    pub cloud_upload_options: Option<CloudUploadOptions>,
    /// Target directory for AUTO_DECRYPT_SAVE.
    pub save_directory: PathBuf,
    /// Upload queue limits.
    pub queue: QueueConfig,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            processor: None,
            cloud_upload_options: None,
            save_directory: PathBuf::from("./media"),
            queue: QueueConfig::default(),
        }
    }
}

impl PreprocessorConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }
}

/// The `cloudUploadOptions` configuration section.
///
/// Every field may be overridden by its `WA_CLOUD_*` environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudUploadOptions {
    pub provider: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub directory: Option<DirectoryStrategy>,
    /// Skip uploads for messages sent by the host account.
    pub ignore_host_account: bool,
}

/// Limits for the rate-limited upload queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Maximum uploads in flight at once.
    pub concurrency: usize,
    /// Length of one rate-limit window.
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// Maximum uploads started per window.
    pub interval_cap: usize,
    /// Count uploads still in flight at rollover against the next window.
    pub carryover: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            interval: Duration::from_millis(1000),
            interval_cap: 2,
            carryover: true,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).map_err(serde::ser::Error::custom)?;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Cloud upload overrides read from the environment.
///
/// Captured once at startup; values here take precedence over
/// [`CloudUploadOptions`].
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub provider: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub directory: Option<DirectoryStrategy>,
    pub ignore_host_account: bool,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            provider: get(ENV_PROVIDER),
            access_key_id: get(ENV_ACCESS_KEY_ID),
            secret_access_key: get(ENV_SECRET_ACCESS_KEY),
            bucket: get(ENV_BUCKET),
            region: get(ENV_REGION),
            directory: get(ENV_DIRECTORY).map(DirectoryStrategy::from),
            ignore_host_account: get(ENV_IGNORE_HOST).is_some_and(|v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn queue_defaults() {
        let q = QueueConfig::default();
        assert_eq!(q.concurrency, 2);
        assert_eq!(q.interval, Duration::from_millis(1000));
        assert_eq!(q.interval_cap, 2);
        assert!(q.carryover);
    }

    #[test]
    fn queue_interval_serializes_as_millis() {
        let json = serde_json::to_value(QueueConfig::default()).unwrap();
        assert_eq!(json["interval"], 1000);

        let huge = QueueConfig {
            interval: Duration::MAX,
            ..Default::default()
        };
        assert!(serde_json::to_string(&huge).is_err());
    }

    #[test]
    fn parses_camel_case_config() {
        let cfg = PreprocessorConfig::from_json_str(
            r#"{
                "processor": "UPLOAD_CLOUD",
                "cloudUploadOptions": {
                    "provider": "AWS",
                    "accessKeyId": "AKIA",
                    "secretAccessKey": "shh",
                    "bucket": "media",
                    "region": "eu-west-1",
                    "directory": "CHAT_DATE",
                    "ignoreHostAccount": true
                },
                "queue": { "concurrency": 4, "interval": 500 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.processor, Some(Processor::UploadCloud));
        let cloud = cfg.cloud_upload_options.unwrap();
        assert_eq!(cloud.bucket.as_deref(), Some("media"));
        assert_eq!(cloud.directory, Some(DirectoryStrategy::ByChatThenDate));
        assert!(cloud.ignore_host_account);
        assert_eq!(cfg.queue.concurrency, 4);
        assert_eq!(cfg.queue.interval, Duration::from_millis(500));
        assert_eq!(cfg.queue.interval_cap, 2);
        assert_eq!(cfg.save_directory, PathBuf::from("./media"));
    }

    #[test]
    fn rejects_malformed_config() {
        let err = PreprocessorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PreprocessorConfig::load(&dir.path().join("absent.json")).unwrap();
        assert!(cfg.processor.is_none());
        assert!(cfg.cloud_upload_options.is_none());
    }

    #[test]
    fn env_overrides_from_lookup() {
        let env = EnvOverrides::from_lookup(lookup(&[
            (ENV_PROVIDER, "GCP"),
            (ENV_BUCKET, "override-bucket"),
            (ENV_DIRECTORY, "DATE"),
            (ENV_IGNORE_HOST, "True"),
            (ENV_REGION, "   "),
        ]));
        assert_eq!(env.provider.as_deref(), Some("GCP"));
        assert_eq!(env.bucket.as_deref(), Some("override-bucket"));
        assert_eq!(env.directory, Some(DirectoryStrategy::ByDate));
        assert!(env.ignore_host_account);
        assert!(env.region.is_none());
        assert!(env.access_key_id.is_none());
    }

    #[test]
    fn ignore_host_requires_truthy_value() {
        let env = EnvOverrides::from_lookup(lookup(&[(ENV_IGNORE_HOST, "false")]));
        assert!(!env.ignore_host_account);
    }
}
