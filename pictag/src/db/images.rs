//! Image record persistence
//!
//! Repository functions over a `SqlitePool`. Each write runs in one short
//! transaction so a crashed batch never leaves an image row without its
//! tag links.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db::tags::upsert_tag;

/// A cataloged image with its tags joined in
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: i64,
    pub full_path: String,
    pub description: Option<String>,
    pub short_title: Option<String>,
    pub thumbnail_name: Option<String>,
    pub is_text: bool,
    pub text_contents: Option<String>,
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_last_modified: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

/// Field set produced by the extraction pipeline for insert/update
#[derive(Debug, Clone)]
pub struct NewImage {
    pub full_path: String,
    pub description: String,
    pub short_title: String,
    pub thumbnail_name: Option<String>,
    pub is_text: bool,
    pub text_contents: Option<String>,
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_last_modified: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

/// Load an image record by absolute path, tags included
pub async fn find_by_path(
    pool: &SqlitePool,
    path: &str,
) -> Result<Option<ImageRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, full_path, description, short_title, thumb_nail_name,
               is_text, text_contents, file_created_at, file_last_modified
        FROM image_info
        WHERE full_path = ?
        "#,
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let id: i64 = row.get("id");
            let tags = tags_for_image(pool, id).await?;
            Ok(Some(ImageRecord {
                id,
                full_path: row.get("full_path"),
                description: row.get("description"),
                short_title: row.get("short_title"),
                thumbnail_name: row.get("thumb_nail_name"),
                is_text: row.get("is_text"),
                text_contents: row.get("text_contents"),
                file_created_at: row.get("file_created_at"),
                file_last_modified: row.get("file_last_modified"),
                tags,
            }))
        }
        None => Ok(None),
    }
}

/// Insert a new image with its tag links. Fails on duplicate path;
/// callers check `find_by_path` first.
pub async fn insert_image(pool: &SqlitePool, image: &NewImage) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO image_info
            (full_path, description, short_title, thumb_nail_name,
             is_text, text_contents, file_created_at, file_last_modified)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&image.full_path)
    .bind(&image.description)
    .bind(&image.short_title)
    .bind(&image.thumbnail_name)
    .bind(image.is_text)
    .bind(&image.text_contents)
    .bind(image.file_created_at.map(|t| t.to_rfc3339()))
    .bind(image.file_last_modified.map(|t| t.to_rfc3339()))
    .execute(&mut *tx)
    .await?;

    let image_id = result.last_insert_rowid();

    for tag in &image.tags {
        let tag_id = upsert_tag(&mut tx, tag).await?;
        sqlx::query(
            "INSERT INTO image_info_tag_join (image_info_id, tag_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(image_id)
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(image_id)
}

/// Replace the mutable fields and tag links of an existing record
pub async fn update_image(
    pool: &SqlitePool,
    image_id: i64,
    image: &NewImage,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE image_info
        SET description = ?, short_title = ?, thumb_nail_name = ?,
            is_text = ?, text_contents = ?,
            file_created_at = ?, file_last_modified = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&image.description)
    .bind(&image.short_title)
    .bind(&image.thumbnail_name)
    .bind(image.is_text)
    .bind(&image.text_contents)
    .bind(image.file_created_at.map(|t| t.to_rfc3339()))
    .bind(image.file_last_modified.map(|t| t.to_rfc3339()))
    .bind(image_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM image_info_tag_join WHERE image_info_id = ?")
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

    for tag in &image.tags {
        let tag_id = upsert_tag(&mut tx, tag).await?;
        sqlx::query("INSERT INTO image_info_tag_join (image_info_id, tag_id) VALUES (?, ?)")
            .bind(image_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Load all records newest-first with comma-aggregated tags
pub async fn list_images(pool: &SqlitePool) -> Result<Vec<ImageRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT i.id, i.full_path, i.description, i.short_title, i.thumb_nail_name,
               i.is_text, i.text_contents, i.file_created_at, i.file_last_modified,
               GROUP_CONCAT(t.tag_name, ',') AS tag_list
        FROM image_info i
        LEFT JOIN image_info_tag_join j ON j.image_info_id = i.id
        LEFT JOIN tags t ON t.id = j.tag_id
        GROUP BY i.id
        ORDER BY i.updated_at DESC, i.id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut images = Vec::new();
    for row in rows {
        let tag_list: Option<String> = row.get("tag_list");
        let mut tags: Vec<String> = tag_list
            .map(|list| list.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        tags.sort();

        images.push(ImageRecord {
            id: row.get("id"),
            full_path: row.get("full_path"),
            description: row.get("description"),
            short_title: row.get("short_title"),
            thumbnail_name: row.get("thumb_nail_name"),
            is_text: row.get("is_text"),
            text_contents: row.get("text_contents"),
            file_created_at: row.get("file_created_at"),
            file_last_modified: row.get("file_last_modified"),
            tags,
        });
    }

    Ok(images)
}

/// Count cataloged images
pub async fn count_images(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM image_info")
        .fetch_one(pool)
        .await
}

async fn tags_for_image(pool: &SqlitePool, image_id: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT t.tag_name
        FROM tags t
        JOIN image_info_tag_join j ON j.tag_id = t.id
        WHERE j.image_info_id = ?
        ORDER BY t.tag_name
        "#,
    )
    .bind(image_id)
    .fetch_all(pool)
    .await
}
