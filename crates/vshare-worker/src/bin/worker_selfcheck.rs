use std::path::Path;

use vshare_media::{run_tool, Tool, ToolPaths};
use vshare_queue::QueueConfig;
use vshare_storage::ObjectStoreClient;
use vshare_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let paths = ToolPaths::from_env();
    ensure_tool(Tool::Ffmpeg, &paths.ffmpeg).await?;
    ensure_tool(Tool::Ffprobe, &paths.ffprobe).await?;

    ensure_env_present(&[
        "DATABASE_URL",
        "REDIS_URL",
        "S3_ENDPOINT_URL",
        "S3_ACCESS_KEY_ID",
        "S3_SECRET_ACCESS_KEY",
    ])?;

    config.check_claim_idle(QueueConfig::from_env().claim_min_idle)?;

    let objects = ObjectStoreClient::from_env().await?;
    for bucket in [&config.videos_bucket, &config.thumbs_bucket] {
        objects.check_bucket(bucket).await?;
        println!("worker-selfcheck: bucket {} reachable", bucket);
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

async fn ensure_tool(tool: Tool, program: &Path) -> anyhow::Result<()> {
    let args = vec!["-version".to_string()];
    run_tool(tool, program, &args, std::time::Duration::from_secs(10))
        .await
        .map_err(|e| anyhow::anyhow!("{} not usable at {}: {}", tool, program.display(), e))?;
    println!("worker-selfcheck: {} at {}", tool, program.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
