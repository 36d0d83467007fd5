//! Database access for aural-ls
//!
//! Two tables live in `aural.db` under the root folder: `clips` records every
//! stored clip id, `label_sets` holds one row per (vocabulary, clip).

pub mod clips;
pub mod label_sets;

use crate::error::Result;
use aural_common::db::{init_database, DATABASE_FILE};
use sqlx::SqlitePool;
use std::path::Path;

/// Open the label server database inside `root_folder`
pub async fn init_database_pool(root_folder: &Path) -> Result<SqlitePool> {
    let db_path = root_folder.join(DATABASE_FILE);
    tracing::debug!("Connecting to database: {}", db_path.display());

    let pool = init_database(&db_path).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create aural-ls tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clips (
            clip_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS label_sets (
            vocab_name TEXT NOT NULL,
            clip_id TEXT NOT NULL,
            states TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (vocab_name, clip_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (clips, label_sets)");

    Ok(())
}
