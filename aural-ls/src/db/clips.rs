//! Clip id records

use crate::error::{Error, Result};
use crate::models::ClipId;
use sqlx::{Row, SqlitePool};

/// Record a clip id; returns false if it was already known
pub async fn insert_clip(pool: &SqlitePool, id: &ClipId) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO clips (clip_id, created_at) VALUES (?, ?)")
        .bind(id.to_hex())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn clip_exists(pool: &SqlitePool, id: &ClipId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM clips WHERE clip_id = ?")
        .bind(id.to_hex())
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// All clip ids in upload order
pub async fn list_clips(pool: &SqlitePool) -> Result<Vec<ClipId>> {
    let rows = sqlx::query("SELECT clip_id FROM clips ORDER BY created_at, clip_id")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let hex: String = row.get("clip_id");
            ClipId::from_hex(&hex)
                .map_err(|e| Error::StorageFailure(format!("corrupt clip id '{}': {}", hex, e)))
        })
        .collect()
}
