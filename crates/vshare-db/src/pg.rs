//! Postgres-backed [`VideoStore`].

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use vshare_models::{ThumbnailRecord, VideoId, VideoRecord, VideoStatus};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::metrics::record_query;
use crate::queries;
use crate::store::{CommitOutcome, VideoStore};

/// [`VideoStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    /// Connect a new pool.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Create from environment variables.
    pub async fn from_env() -> DbResult<Self> {
        let config = DbConfig::from_env()?;
        Self::connect(&config).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn transition(
        &self,
        id: &VideoId,
        from: &[VideoStatus],
        to: VideoStatus,
        operation: &'static str,
    ) -> DbResult<bool> {
        let start = Instant::now();
        let result = queries::update_status(&self.pool, id, from, to, None).await;
        record_query(operation, result.is_ok(), start.elapsed().as_secs_f64());

        let changed = result? == 1;
        debug!(video_id = %id, to = %to, changed, "Status compare-and-set");
        Ok(changed)
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn get_video(&self, id: &VideoId) -> DbResult<Option<VideoRecord>> {
        let start = Instant::now();
        let row = queries::get_video(&self.pool, id).await;
        record_query("get_video", row.is_ok(), start.elapsed().as_secs_f64());

        row?.map(queries::VideoRow::into_record).transpose()
    }

    async fn begin_processing(&self, id: &VideoId) -> DbResult<bool> {
        self.transition(
            id,
            &[VideoStatus::Uploading, VideoStatus::Processing],
            VideoStatus::Processing,
            "begin_processing",
        )
        .await
    }

    async fn revert_to_uploading(&self, id: &VideoId) -> DbResult<bool> {
        self.transition(
            id,
            &[VideoStatus::Processing],
            VideoStatus::Uploading,
            "revert_to_uploading",
        )
        .await
    }

    async fn create_thumbnails(&self, rows: &[ThumbnailRecord]) -> DbResult<()> {
        let start = Instant::now();
        let result = queries::insert_thumbnails(&self.pool, rows).await;
        record_query("create_thumbnails", result.is_ok(), start.elapsed().as_secs_f64());
        result?;
        Ok(())
    }

    async fn complete_processing(
        &self,
        id: &VideoId,
        rows: &[ThumbnailRecord],
        duration_sec: Option<i32>,
    ) -> DbResult<CommitOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let Some(status) = queries::lock_status(&mut *tx, id).await? else {
            tx.rollback().await?;
            return Ok(CommitOutcome::Missing);
        };

        match queries::parse_status(&status)? {
            VideoStatus::Processing => {}
            VideoStatus::Ready => {
                tx.rollback().await?;
                info!(video_id = %id, "Video already READY, discarding this attempt");
                return Ok(CommitOutcome::AlreadyReady);
            }
            actual => {
                tx.rollback().await?;
                warn!(video_id = %id, status = %actual, "Video left PROCESSING during attempt");
                return Err(DbError::status_conflict(id, VideoStatus::Processing, actual));
            }
        }

        let removed = queries::delete_thumbnails(&mut *tx, id).await?;
        queries::insert_thumbnails(&mut *tx, rows).await?;
        queries::update_status(
            &mut *tx,
            id,
            &[VideoStatus::Processing],
            VideoStatus::Ready,
            duration_sec,
        )
        .await?;
        tx.commit().await?;

        record_query("complete_processing", true, start.elapsed().as_secs_f64());
        info!(
            video_id = %id,
            thumbnails = rows.len(),
            replaced = removed,
            "Video marked READY"
        );
        Ok(CommitOutcome::Committed)
    }

    async fn list_thumbnails(&self, id: &VideoId) -> DbResult<Vec<ThumbnailRecord>> {
        let rows = queries::list_thumbnails(&self.pool, id).await?;
        Ok(rows.into_iter().map(ThumbnailRecord::from).collect())
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
