//! On-disk model checkpoints, one file per vocabulary

use crate::error::Result;
use crate::services::training_session::Checkpoint;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sub-folder of the root folder holding checkpoints
pub const MODELS_DIR: &str = "models";

/// Checkpoint files under `<root>/models`
///
/// Each vocabulary's session is the only writer of its file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    models_dir: PathBuf,
    temp_counter: Arc<AtomicU64>,
}

impl CheckpointStore {
    /// Open the store, creating `<root>/models` if needed
    pub async fn open(root_folder: &Path) -> Result<Self> {
        let models_dir = root_folder.join(MODELS_DIR);
        tokio::fs::create_dir_all(&models_dir).await?;
        Ok(Self {
            models_dir,
            temp_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path_for(&self, vocab_name: &str) -> PathBuf {
        self.models_dir.join(format!("{}.ckpt", vocab_name))
    }

    /// Replace the vocabulary's checkpoint file
    ///
    /// Written to a temp file and renamed, so a crash never leaves a
    /// truncated checkpoint behind.
    pub async fn write(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.path_for(checkpoint.vocab_name.as_str());
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("ckpt.tmp{}-{}", std::process::id(), n));

        tokio::fs::write(&tmp, &checkpoint.blob).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::info!(
            vocab = %checkpoint.vocab_name,
            bytes = checkpoint.blob.len(),
            clips_since_last = checkpoint.clips_since_last,
            path = %path.display(),
            "Checkpoint written"
        );

        Ok(path)
    }

    /// The last checkpoint for a vocabulary, if one was ever written
    pub async fn read(&self, vocab_name: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(vocab_name)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
