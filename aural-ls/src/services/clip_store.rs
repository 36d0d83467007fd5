//! Content-addressed clip storage
//!
//! Clip bytes live in `<root>/audio/<hex>.raw`; the `clips` table records
//! every id. Bytes are written (temp file + rename) before the row is
//! inserted, so a listed clip always has its bytes on disk.

use crate::db::clips;
use crate::error::{Error, Result};
use crate::models::{AudioClip, ClipId, AUDIO_CLIP_LEN, SAMPLE_RATE};
use sqlx::SqlitePool;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sub-folder of the root folder holding clip bytes
pub const AUDIO_DIR: &str = "audio";

#[derive(Clone)]
pub struct ClipStore {
    db: SqlitePool,
    audio_dir: PathBuf,
    temp_counter: Arc<AtomicU64>,
}

impl ClipStore {
    /// Open the store, creating `<root>/audio` if needed
    pub async fn open(db: SqlitePool, root_folder: &Path) -> Result<Self> {
        let audio_dir = root_folder.join(AUDIO_DIR);
        tokio::fs::create_dir_all(&audio_dir).await?;

        Ok(Self {
            db,
            audio_dir,
            temp_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Store a clip and return its id
    ///
    /// Idempotent: identical bytes always give the same id.
    pub async fn put(&self, bytes: Vec<u8>) -> Result<ClipId> {
        self.store(bytes).await.map(|(id, _)| id)
    }

    /// Store a clip; the flag is false when the id was already known
    pub async fn store(&self, bytes: Vec<u8>) -> Result<(ClipId, bool)> {
        let clip = AudioClip::from_vec(bytes)?;

        // Hashing 320 KB is CPU work; keep it off the async workers
        let (clip, id) = tokio::task::spawn_blocking(move || {
            let id = clip.id();
            (clip, id)
        })
        .await
        .map_err(|e| Error::Internal(format!("Clip hash task failed: {}", e)))?;

        let path = self.clip_path(&id);
        if !self.has_bytes(&path).await {
            self.write_atomic(&path, clip.as_bytes()).await?;
        }

        let newly_stored = clips::insert_clip(&self.db, &id).await?;

        tracing::debug!(clip_id = %id.short(), newly_stored, "Stored clip");

        Ok((id, newly_stored))
    }

    pub async fn get(&self, id: &ClipId) -> Result<AudioClip> {
        let path = self.clip_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("clip {}", id)));
            }
            Err(e) => return Err(e.into()),
        };

        AudioClip::from_vec(bytes).map_err(|e| {
            Error::StorageFailure(format!("stored clip {} is corrupt: {}", id.short(), e))
        })
    }

    pub async fn contains(&self, id: &ClipId) -> Result<bool> {
        clips::clip_exists(&self.db, id).await
    }

    pub async fn list(&self) -> Result<Vec<ClipId>> {
        clips::list_clips(&self.db).await
    }

    /// The clip wrapped in a RIFF/WAVE header (16 kHz mono 16-bit)
    pub async fn wav(&self, id: &ClipId) -> Result<Vec<u8>> {
        let clip = self.get(id).await?;
        encode_wav(&clip)
    }

    fn clip_path(&self, id: &ClipId) -> PathBuf {
        self.audio_dir.join(format!("{}.raw", id.to_hex()))
    }

    async fn has_bytes(&self, path: &Path) -> bool {
        matches!(
            tokio::fs::metadata(path).await,
            Ok(meta) if meta.len() == AUDIO_CLIP_LEN as u64
        )
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}-{}", std::process::id(), n));

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn encode_wav(clip: &AudioClip) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = Vec::with_capacity(AUDIO_CLIP_LEN + 44);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)
        .map_err(|e| Error::Internal(format!("Failed to create WAV writer: {}", e)))?;
    for sample in clip.samples() {
        writer
            .write_sample(sample)
            .map_err(|e| Error::Internal(format!("Failed to write WAV sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Internal(format!("Failed to finalize WAV: {}", e)))?;

    Ok(buf)
}
