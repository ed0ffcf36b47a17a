//! Thumbnail worker binary.

use std::sync::Arc;

use tracing::{error, info};

use vshare_db::{PgVideoStore, VideoStore};
use vshare_media::{FfmpegTools, ToolPaths};
use vshare_queue::{JobQueue, StatusChannel};
use vshare_storage::{HttpDownloader, ObjectStoreClient, ObjectStoreConfig};
use vshare_worker::logging::init_tracing;
use vshare_worker::metrics::init_metrics;
use vshare_worker::{EventDispatcher, JobExecutor, PipelineSettings, ThumbnailPipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vshare-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let store = PgVideoStore::from_env().await?;
    store.ping().await?;
    info!("Database connection verified");

    let mut store_config = ObjectStoreConfig::from_env()?;
    store_config.upload_timeout = config.upload_timeout;
    let objects = ObjectStoreClient::new(store_config).await?;
    let downloader = HttpDownloader::new(config.download_timeout)?;

    let paths = ToolPaths::from_env();
    info!(ffmpeg = %paths.ffmpeg.display(), ffprobe = %paths.ffprobe.display(), "Media tools");
    let media = FfmpegTools::new(paths)
        .with_frame_options(config.frame_options())
        .with_timeouts(config.probe_timeout, config.extract_timeout);

    let queue = JobQueue::from_env()?;
    config.check_claim_idle(queue.config().claim_min_idle)?;
    let status = StatusChannel::new(&queue.config().redis_url)?;
    let (events, dispatch_failures, _dispatch_task) =
        EventDispatcher::spawn(Arc::new(status), config.event_buffer);

    let pipeline = ThumbnailPipeline::new(
        PipelineSettings::from(&config),
        Arc::new(store),
        Arc::new(objects),
        Arc::new(downloader),
        Arc::new(media),
    )
    .with_events(events);

    let executor = Arc::new(
        JobExecutor::new(config, queue, pipeline).with_dispatch_failures(dispatch_failures),
    );

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
