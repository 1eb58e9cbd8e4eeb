//! Tag vocabulary operations

use sqlx::{Row, Sqlite, SqlitePool, Transaction};

/// A tag name with how many images carry it
#[derive(Debug, Clone)]
pub struct TagCount {
    pub tag_name: String,
    pub image_count: i64,
}

/// Insert a tag if absent, returning its id either way.
/// The DO UPDATE arm makes RETURNING yield the existing row's id.
pub(crate) async fn upsert_tag(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO tags (tag_name) VALUES (?)
        ON CONFLICT(tag_name) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
}

/// Distinct tag names with usage counts, alphabetical
pub async fn list_tags(pool: &SqlitePool) -> Result<Vec<TagCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT t.tag_name, COUNT(j.image_info_id) AS image_count
        FROM tags t
        LEFT JOIN image_info_tag_join j ON j.tag_id = t.id
        GROUP BY t.id
        ORDER BY t.tag_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TagCount {
            tag_name: row.get("tag_name"),
            image_count: row.get("image_count"),
        })
        .collect())
}
