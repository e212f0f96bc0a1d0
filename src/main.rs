use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use media_preprocess::config::{EnvOverrides, PreprocessorConfig};
use media_preprocess::pipeline::{InlineMediaDecryptor, Message, Preprocessor};
use media_preprocess::storage::FsBlobUploader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries processed messages.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = std::env::var("MEDIA_PREPROCESS_CONFIG")
        .unwrap_or_else(|_| "./preprocess.json".to_string());
    let config = PreprocessorConfig::load(&PathBuf::from(&config_path))?;

    let bucket_root =
        std::env::var("MEDIA_PREPROCESS_BUCKET_ROOT").unwrap_or_else(|_| "./bucket".to_string());

    eprintln!("media-preprocess v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", config_path);
    eprintln!(
        "   Processor: {}",
        config
            .processor
            .map(|p| p.name())
            .unwrap_or("none (pass-through)")
    );
    eprintln!("   Bucket root: {}", bucket_root);

    let preprocessor = Preprocessor::new(
        config,
        EnvOverrides::from_env(),
        Arc::new(InlineMediaDecryptor),
        Arc::new(FsBlobUploader::new(bucket_root)),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Message = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed message line");
                continue;
            }
        };

        let processed = preprocessor.preprocess(message).await;
        let mut out = serde_json::to_vec(&processed)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    // Let scheduled uploads finish before exiting.
    preprocessor.queue().on_idle().await;
    tracing::info!(stats = ?preprocessor.queue().stats(), "Input closed, uploads drained");
    Ok(())
}
