//! Message preprocessing pipeline.
//!
//! Each inbound message passes through one processor before reaching
//! application code:
//! - `SCRUB` / `BODY_ONLY` — blank payload fields
//! - `AUTO_DECRYPT` — inline the decrypted media
//! - `AUTO_DECRYPT_SAVE` — write the media to disk
//! - `UPLOAD_CLOUD` — upload once per file through a rate-limited queue
//!
//! Processors never fail the message: every error degrades to passing the
//! message through.

pub mod dedup;
pub mod directory;
pub mod media;
pub mod options;
pub mod processor;
pub mod queue;
pub mod types;

pub use dedup::DedupRegistry;
pub use directory::DirectoryStrategy;
pub use media::{InlineMediaDecryptor, decode_data_url};
pub use options::{Provider, UploadField, UploadOptions, build_upload_options, media_filename};
pub use processor::Preprocessor;
pub use queue::{QueueStats, UploadQueue, UploadTask};
pub use types::*;
