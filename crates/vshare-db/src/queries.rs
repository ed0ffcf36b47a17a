//! Video and thumbnail queries.
//!
//! All functions take a generic executor so they run against the pool or
//! inside a transaction (`&mut *tx`). Table and column names follow the
//! web application's schema ("Video", "Thumbnail", camelCase columns).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use vshare_models::{ThumbnailId, ThumbnailRecord, VideoId, VideoRecord, VideoStatus};

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
pub struct VideoRow {
    pub id: String,
    pub user_id: String,
    pub object_path: String,
    pub status: String,
    pub duration_sec: Option<i32>,
}

impl VideoRow {
    pub fn into_record(self) -> DbResult<VideoRecord> {
        let status = parse_status(&self.status)?;
        let mut record = VideoRecord::new(
            VideoId::from_string(self.id),
            self.user_id,
            self.object_path,
            status,
        );
        record.duration_sec = self.duration_sec;
        Ok(record)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ThumbnailRow {
    pub id: String,
    pub video_id: String,
    pub object_path: String,
    pub timecode_sec: i32,
    pub created_at: DateTime<Utc>,
}

impl From<ThumbnailRow> for ThumbnailRecord {
    fn from(row: ThumbnailRow) -> Self {
        Self {
            id: ThumbnailId(row.id),
            video_id: VideoId::from_string(row.video_id),
            object_path: row.object_path,
            timecode_sec: u32::try_from(row.timecode_sec).unwrap_or(0),
            created_at: row.created_at,
        }
    }
}

pub fn parse_status(s: &str) -> DbResult<VideoStatus> {
    s.parse().map_err(|_| DbError::InvalidStatus(s.to_string()))
}

/// Fetch a video row.
pub async fn get_video<'e, E>(executor: E, id: &VideoId) -> Result<Option<VideoRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, "userId" AS user_id, "objectPath" AS object_path,
               status::text AS status, "durationSec" AS duration_sec
        FROM "Video"
        WHERE id = $1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(executor)
    .await
}

/// Read the status under a row lock. Only meaningful inside a transaction.
pub async fn lock_status<'e, E>(executor: E, id: &VideoId) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(r#"SELECT status::text FROM "Video" WHERE id = $1 FOR UPDATE"#)
        .bind(id.as_str())
        .fetch_optional(executor)
        .await
}

/// Set `status = to` where the current status is one of `from`.
///
/// Returns the number of rows changed (0 or 1).
pub async fn update_status<'e, E>(
    executor: E,
    id: &VideoId,
    from: &[VideoStatus],
    to: VideoStatus,
    duration_sec: Option<i32>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

    let result = sqlx::query(
        r#"
        UPDATE "Video"
        SET status = $2::"VideoStatus",
            "durationSec" = COALESCE($3, "durationSec"),
            "updatedAt" = NOW()
        WHERE id = $1 AND status::text = ANY($4)
        "#,
    )
    .bind(id.as_str())
    .bind(to.as_str())
    .bind(duration_sec)
    .bind(&from)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Remove every thumbnail row of a video.
pub async fn delete_thumbnails<'e, E>(executor: E, id: &VideoId) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(r#"DELETE FROM "Thumbnail" WHERE "videoId" = $1"#)
        .bind(id.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Insert thumbnail rows in one statement.
pub async fn insert_thumbnails<'e, E>(executor: E, rows: &[ThumbnailRecord]) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let video_ids: Vec<&str> = rows.iter().map(|r| r.video_id.as_str()).collect();
    let paths: Vec<&str> = rows.iter().map(|r| r.object_path.as_str()).collect();
    let timecodes: Vec<i32> = rows
        .iter()
        .map(|r| i32::try_from(r.timecode_sec).unwrap_or(i32::MAX))
        .collect();
    let created: Vec<DateTime<Utc>> = rows.iter().map(|r| r.created_at).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO "Thumbnail" (id, "videoId", "objectPath", "timecodeSec", "createdAt")
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::int4[], $5::timestamptz[])
        "#,
    )
    .bind(&ids)
    .bind(&video_ids)
    .bind(&paths)
    .bind(&timecodes)
    .bind(&created)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Thumbnails of a video ordered by timecode.
pub async fn list_thumbnails<'e, E>(executor: E, id: &VideoId) -> Result<Vec<ThumbnailRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, "videoId" AS video_id, "objectPath" AS object_path,
               "timecodeSec" AS timecode_sec, "createdAt" AS created_at
        FROM "Thumbnail"
        WHERE "videoId" = $1
        ORDER BY "timecodeSec", "objectPath"
        "#,
    )
    .bind(id.as_str())
    .fetch_all(executor)
    .await
}
