//! Database initialization
//!
//! Opens (or creates) the catalog database and ensures the schema exists.
//! Schema creation is idempotent `CREATE TABLE IF NOT EXISTS` only; there
//! is no migration machinery.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open the catalog database, creating file and schema if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new catalog database: {}", db_path.display());
    } else {
        info!("Opened existing catalog database: {}", db_path.display());
    }

    // Enable foreign keys so tag join rows follow their images
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one worker writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all catalog tables on an already-open pool
///
/// Also used directly by tests running against `sqlite::memory:`.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_image_info_table(pool).await?;
    create_tags_table(pool).await?;
    create_image_info_tag_join_table(pool).await?;

    tracing::debug!("Catalog schema ready (image_info, tags, image_info_tag_join)");

    Ok(())
}

/// Create the image_info table
///
/// One row per cataloged image, keyed by the canonical absolute path.
/// The GPS and taken-at columns stay NULL here; they belong to the
/// persisted record shape read by display tooling.
pub async fn create_image_info_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_path TEXT NOT NULL UNIQUE,
            description TEXT,
            short_title TEXT,
            thumb_nail_name TEXT,
            is_text INTEGER NOT NULL DEFAULT 0,
            text_contents TEXT,
            gps_latitude REAL,
            gps_longitude REAL,
            image_taken_at TEXT,
            file_created_at TEXT,
            file_last_modified TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the tags table
pub async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag_name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the image/tag linking table
pub async fn create_image_info_tag_join_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_info_tag_join (
            image_info_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (image_info_id, tag_id),
            FOREIGN KEY (image_info_id) REFERENCES image_info(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
