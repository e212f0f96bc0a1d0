//! Message preprocessor — applies the configured processor to each message.
//!
//! Every processor is the identity for messages without legacy media. No
//! error escapes [`Preprocessor::process`]: failures are logged and the
//! message is passed through unchanged (or without its cloud URL).
//!
//! UPLOAD_CLOUD flow:
//! 1. Skip checks (host account, not configured)
//! 2. Build and validate upload options
//! 3. Claim the filename (before any await)
//! 4. Decrypt media and compute the object URL
//! 5. Enqueue the upload if the claim was granted
//! 6. Attach the URL

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{EnvOverrides, PreprocessorConfig};
use crate::error::{ConfigError, PreprocessError};
use crate::pipeline::dedup::DedupRegistry;
use crate::pipeline::media::decode_data_url;
use crate::pipeline::options::{build_upload_options, media_filename};
use crate::pipeline::queue::UploadQueue;
use crate::pipeline::types::{BlobUploader, MediaDecryptor, Message, Processor};

/// Owns the dedup registry and upload queue for one process.
pub struct Preprocessor {
    config: PreprocessorConfig,
    env: EnvOverrides,
    decryptor: Arc<dyn MediaDecryptor>,
    uploader: Arc<dyn BlobUploader>,
    registry: DedupRegistry,
    queue: UploadQueue,
}

impl Preprocessor {
    /// Create a preprocessor and start its upload queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: PreprocessorConfig,
        env: EnvOverrides,
        decryptor: Arc<dyn MediaDecryptor>,
        uploader: Arc<dyn BlobUploader>,
    ) -> Self {
        let queue = UploadQueue::start(config.queue.clone());
        info!(
            processor = ?config.processor,
            cloud_configured = config.cloud_upload_options.is_some() || env.provider.is_some(),
            "Preprocessor initialized"
        );
        Self {
            config,
            env,
            decryptor,
            uploader,
            registry: DedupRegistry::new(),
            queue,
        }
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn registry(&self) -> &DedupRegistry {
        &self.registry
    }

    /// Apply the configured processor, if any.
    pub async fn preprocess(&self, message: Message) -> Message {
        match self.config.processor {
            Some(processor) => self.process(processor, message).await,
            None => message,
        }
    }

    /// Apply `processor` to `message`.
    pub async fn process(&self, processor: Processor, message: Message) -> Message {
        if message.legacy_media().is_none() {
            return message;
        }

        match processor {
            Processor::Scrub => scrub(message),
            Processor::BodyOnly => body_only(message),
            Processor::AutoDecrypt => self.auto_decrypt(message).await,
            Processor::AutoDecryptSave => self.auto_decrypt_save(message).await,
            Processor::UploadCloud => self.upload_cloud(message).await,
        }
    }

    async fn auto_decrypt(&self, message: Message) -> Message {
        let decrypted = self.decryptor.decrypt_media(&message).await;
        match decrypted {
            Ok(data_url) => Message {
                body: data_url,
                ..message
            },
            Err(e) => {
                warn!(id = %message.id, error = %e, "Decryption failed, passing message through");
                message
            }
        }
    }

    async fn auto_decrypt_save(&self, message: Message) -> Message {
        let saved = self.save_to_disk(&message).await;
        match saved {
            Ok((filename, path)) => {
                debug!(id = %message.id, path = %path.display(), "Saved media to disk");
                Message {
                    body: filename,
                    content: String::new(),
                    file_path: Some(path.display().to_string()),
                    ..message
                }
            }
            Err(e) => {
                warn!(id = %message.id, error = %e, "Failed to save media, passing message through");
                message
            }
        }
    }

    async fn save_to_disk(&self, message: &Message) -> Result<(String, PathBuf), PreprocessError> {
        let data_url = self.decryptor.decrypt_media(message).await?;
        let bytes = decode_data_url(&data_url)?;
        let filename = media_filename(message);
        let dir = &self.config.save_directory;
        let path = dir.join(&filename);

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PreprocessError::LocalWrite {
                path: dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| PreprocessError::LocalWrite {
                path: path.clone(),
                source,
            })?;

        Ok((filename, path))
    }

    /// Upload the message's media and attach its object URL.
    pub async fn upload_cloud(&self, message: Message) -> Message {
        self.upload_cloud_at(message, Utc::now()).await
    }

    /// [`Self::upload_cloud`] with an explicit clock for directory resolution.
    pub async fn upload_cloud_at(&self, message: Message, now: DateTime<Utc>) -> Message {
        if message.legacy_media().is_none() {
            return message;
        }

        let outcome = self.try_upload_cloud(&message, now).await;
        match outcome {
            Ok(url) => Message {
                cloud_url: Some(url),
                ..message
            },
            Err(PreprocessError::HostAccountIgnored) => {
                debug!(id = %message.id, "Ignoring media from host account");
                message
            }
            Err(PreprocessError::NotConfigured) => {
                debug!(id = %message.id, "Cloud upload not configured, skipping");
                message
            }
            Err(PreprocessError::Config(ConfigError::MissingField { field })) => {
                warn!(
                    id = %message.id,
                    field = %field,
                    hint = field.env_var(),
                    "Cloud upload option missing, skipping upload (set the env var to override)"
                );
                message
            }
            Err(e @ PreprocessError::Enqueue { .. }) => {
                error!(id = %message.id, error = %e, "Failed to schedule upload");
                message
            }
            Err(e) => {
                warn!(id = %message.id, error = %e, "Cloud upload skipped");
                message
            }
        }
    }

    /// Returns the object URL, or the reason the message passes through.
    async fn try_upload_cloud(
        &self,
        message: &Message,
        now: DateTime<Utc>,
    ) -> Result<String, PreprocessError> {
        let cloud = self.config.cloud_upload_options.as_ref();
        let ignore_host =
            self.env.ignore_host_account || cloud.is_some_and(|c| c.ignore_host_account);
        if message.from_me && ignore_host {
            return Err(PreprocessError::HostAccountIgnored);
        }

        if cloud.is_none() && self.env.provider.is_none() {
            return Err(PreprocessError::NotConfigured);
        }
        let cloud = cloud.cloned().unwrap_or_default();

        let options = match build_upload_options(message, &cloud, &self.env, now) {
            Ok(options) => options,
            Err(e) => {
                // The media is still fetched; only the upload is skipped.
                if let Err(decrypt_err) = self.decryptor.decrypt_media(message).await {
                    debug!(id = %message.id, error = %decrypt_err, "Decrypt failed");
                }
                return Err(e.into());
            }
        };
        let filename = options.filename.clone();

        // Claim before the first await so concurrent calls for the same file
        // cannot both win.
        let mut claimed = self.registry.try_claim(&filename);

        let file = match self.decrypt_payload(message).await {
            Ok(file) => file,
            Err(e) => {
                if claimed {
                    self.registry.release(&filename);
                }
                return Err(e);
            }
        };
        let options = options.with_file(file);
        let url = self.uploader.object_url(&options);

        // An earlier claimer may have released the file after its decrypt failed.
        if !claimed {
            claimed = self.registry.try_claim(&filename);
        }
        if !claimed {
            debug!(id = %message.id, filename = %filename, "Already uploaded or in flight");
            return Ok(url);
        }

        let uploader = Arc::clone(&self.uploader);
        let task = Box::pin(async move { uploader.upload(&options).await });
        if let Err(e) = self.queue.enqueue(filename.clone(), task) {
            self.registry.release(&filename);
            return Err(e);
        }

        info!(id = %message.id, filename = %filename, url = %url, "Upload scheduled");
        Ok(url)
    }

    async fn decrypt_payload(&self, message: &Message) -> Result<Vec<u8>, PreprocessError> {
        let data_url = self.decryptor.decrypt_media(message).await?;
        decode_data_url(&data_url)
    }
}

fn scrub(message: Message) -> Message {
    Message {
        body: String::new(),
        content: String::new(),
        ..message
    }
}

fn body_only(message: Message) -> Message {
    Message {
        content: String::new(),
        ..message
    }
}
