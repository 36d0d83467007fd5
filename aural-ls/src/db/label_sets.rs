//! Label set rows
//!
//! States are stored as a JSON array of integers. Rows are keyed by
//! (vocab_name, clip_id); writes are upserts so the last write wins.

use crate::error::{Error, Result};
use crate::models::{ClipId, LabelSet, VocabName};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Insert or replace the label set for its (vocabulary, clip) pair
pub async fn upsert_label_set(pool: &SqlitePool, label_set: &LabelSet) -> Result<()> {
    let states = serde_json::to_string(&label_set.states)
        .map_err(|e| Error::Internal(format!("Failed to serialize states: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO label_sets (vocab_name, clip_id, states, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(vocab_name, clip_id) DO UPDATE SET
            states = excluded.states,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(label_set.vocab_name.as_str())
    .bind(label_set.id.to_hex())
    .bind(&states)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_label_set(
    pool: &SqlitePool,
    id: &ClipId,
    vocab_name: &str,
) -> Result<Option<LabelSet>> {
    let row = sqlx::query(
        "SELECT vocab_name, clip_id, states FROM label_sets WHERE vocab_name = ? AND clip_id = ?",
    )
    .bind(vocab_name)
    .bind(id.to_hex())
    .fetch_optional(pool)
    .await?;

    row.map(|row| decode_row(&row)).transpose()
}

/// Every row for a vocabulary, decoded or not
///
/// One SELECT, so the result is a consistent snapshot.
pub async fn load_all_label_sets(
    pool: &SqlitePool,
    vocab_name: &str,
) -> Result<Vec<Result<LabelSet>>> {
    let rows = sqlx::query("SELECT vocab_name, clip_id, states FROM label_sets WHERE vocab_name = ?")
        .bind(vocab_name)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(decode_row).collect())
}

pub async fn count_label_sets(pool: &SqlitePool, vocab_name: &str) -> Result<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM label_sets WHERE vocab_name = ?")
        .bind(vocab_name)
        .fetch_one(pool)
        .await?;

    Ok(count as usize)
}

fn decode_row(row: &SqliteRow) -> Result<LabelSet> {
    let vocab_name: String = row.get("vocab_name");
    let clip_id: String = row.get("clip_id");
    let states: String = row.get("states");

    let id = ClipId::from_hex(&clip_id)
        .map_err(|e| Error::StorageFailure(format!("corrupt clip id '{}': {}", clip_id, e)))?;
    let states: Vec<u32> = serde_json::from_str(&states).map_err(|e| {
        Error::StorageFailure(format!(
            "corrupt states for {}/{}: {}",
            vocab_name,
            id.short(),
            e
        ))
    })?;

    Ok(LabelSet {
        id,
        vocab_name: VocabName::new(vocab_name),
        states,
    })
}
