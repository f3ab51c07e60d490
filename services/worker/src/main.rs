mod adapters;
mod config;
mod consumer;
mod deps;
mod handlers;
mod middleware;
mod ports;

use std::sync::Arc;

use control_core::cache::{Cache, RedisCache};
use control_core::queues::TELEGRAM_EVENTS;
use control_core::resilience::{FixedWindowRateLimiter, RateLimitConfig};
use control_core::router::{RouteOptions, Router};
use control_core::shutdown::GracefulShutdown;
use tracing_subscriber::EnvFilter;

use adapters::{LapinPublisher, S3ObjectStore, YtDlpDownloader};
use config::Config;
use deps::WorkerDeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let config = Config::from_env()?;
    let shutdown = GracefulShutdown::new();

    let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(&config.redis_url()).await?);
    let broker: Arc<dyn ports::BrokerPublisher> = Arc::new(LapinPublisher::connect(&config.amqp_url()).await?);
    let object_store: Arc<dyn ports::ObjectStore> = Arc::new(
        S3ObjectStore::connect(&config.s3_endpoint, &config.s3_access_key, &config.s3_secret_key, config.s3_secure, config.s3_bucket.clone()).await,
    );
    let downloads_dir = std::path::PathBuf::from(&config.downloads_dir);
    let downloader: Arc<dyn ports::MediaDownloader> = Arc::new(YtDlpDownloader::new(downloads_dir.clone()));

    let deps = WorkerDeps {
        cache: cache.clone(),
        rate_limiter: Arc::new(FixedWindowRateLimiter::new(cache.clone(), RateLimitConfig::default())),
        broker,
        object_store,
        downloader,
        downloads_dir,
    };

    let mut router: Router<WorkerDeps> = Router::new();
    let with_rate_limit_increment = RouteOptions { middleware_after: vec!["maybe_rate_limit_increment".to_string()], ..Default::default() };
    router.register_middleware("maybe_rate_limit_increment", middleware::maybe_rate_limit_increment)?;
    router.route("events.telegram.raw", 1, with_rate_limit_increment, handlers::command_mapping_handler)?;
    router.route("commands.media.video_download", 1, RouteOptions::default(), handlers::video_download_handler)?;
    router.route("commands.media.audio_download", 1, RouteOptions::default(), handlers::audio_download_handler)?;
    let router = Arc::new(router);

    let amqp_url = config.amqp_url();
    let consumer_deps = deps.clone();
    let consumer_router = router.clone();
    let consumer_shutdown = shutdown.token();
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer::run(&amqp_url, TELEGRAM_EVENTS, &consumer_router, consumer_deps, consumer_shutdown).await {
            tracing::error!(error = %e, "telegram_events consumer exited with an error");
        }
    });

    shutdown.wait().await;
    let _ = consumer_task.await;
    Ok(())
}
