//! Gateway service entrypoint (§4.12): bridges the chat client to the event
//! bus, ingesting raw messages on one side and consuming `gateway_events` on
//! the other.

mod adapters;
mod config;
mod consumer;
mod deps;
mod handlers;
mod ingress;
mod middleware;
mod normalize;
mod optimistic_reply;
mod ports;

use std::sync::Arc;

use control_core::auth::ChatAuthenticator;
use control_core::cache::{Cache, RedisCache};
use control_core::queues::GATEWAY_EVENTS;
use control_core::resilience::{FixedWindowRateLimiter, InterestLock, RateLimitConfig};
use control_core::router::{RouteOptions, Router};
use control_core::shutdown::GracefulShutdown;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

use adapters::{LapinPublisher, S3ObjectStore, TeloxideChat};
use config::Config;
use deps::GatewayDeps;
use normalize::normalize_message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env()?;
    let shutdown = GracefulShutdown::new();

    let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(&config.redis_url()).await?);
    let broker: Arc<dyn ports::BrokerPublisher> = Arc::new(LapinPublisher::connect(&config.amqp_url()).await?);
    let object_store: Arc<dyn ports::ObjectStore> = Arc::new(
        S3ObjectStore::connect(
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
            config.s3_secure,
            config.s3_bucket.clone(),
        )
        .await,
    );
    let chat: Arc<dyn ports::ChatClient> = Arc::new(TeloxideChat::new(config.telegram_bot_token.clone()));

    let deps = GatewayDeps {
        cache: cache.clone(),
        rate_limiter: Arc::new(FixedWindowRateLimiter::new(cache.clone(), RateLimitConfig::default())),
        interest_lock: Arc::new(InterestLock::new(cache.clone())),
        authenticator: Arc::new(ChatAuthenticator::new(cache.clone(), config.telegram_admin_user_id)),
        broker,
        object_store,
        chat,
        downloads_dir: std::path::PathBuf::from(&config.downloads_dir),
    };

    let mut router: Router<GatewayDeps> = Router::new();
    router.register_before_middleware("correlation_guard_prepare", middleware::correlation_guard_prepare)?;
    router.register_after_middleware("correlation_guard_assert", middleware::correlation_guard_assert)?;
    router.register_after_middleware("cleanup_event_counter", middleware::cleanup_event_counter)?;
    router.register_middleware("maybe_cleanup_correlation_redis", middleware::maybe_cleanup_correlation_redis)?;

    let cleanup_redis = RouteOptions {
        middleware_after: vec!["maybe_cleanup_correlation_redis".to_string()],
        ..Default::default()
    };
    router.route("events.dl.video.ready", 1, cleanup_redis.clone(), handlers::video_ready_handler)?;
    router.route("events.dl.audio.ready", 1, cleanup_redis, handlers::audio_ready_handler)?;
    router.route("commands.gateway.reply", 1, RouteOptions::default(), handlers::reply_handler)?;
    router.route("commands.gateway.message-update", 1, RouteOptions::default(), handlers::message_update_handler)?;
    router.route("commands.gateway.downloads-cleanup", 1, RouteOptions::default(), handlers::downloads_cleanup_handler)?;
    router.route("commands.gateway.grace", 1, RouteOptions::default(), handlers::grace_handler)?;
    router.route("commands.gateway.smite", 1, RouteOptions::default(), handlers::smite_handler)?;
    router.route("events.telegram.raw", 1, RouteOptions::default(), handlers::command_mapping_handler)?;
    let router = Arc::new(router);

    let amqp_url = config.amqp_url();
    let consumer_deps = deps.clone();
    let consumer_router = router.clone();
    let consumer_shutdown = shutdown.token();
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer::run(&amqp_url, GATEWAY_EVENTS, &consumer_router, consumer_deps, consumer_shutdown).await {
            tracing::error!(error = %e, "gateway_events consumer exited with an error");
        }
    });

    let bot = Bot::new(config.telegram_bot_token.clone());
    let ingress_deps = deps.clone();
    let mut bot_shutdown = shutdown.token();
    let bot_task = tokio::spawn(async move {
        let handler = Update::filter_message().endpoint(move |message: Message| {
            let deps = ingress_deps.clone();
            async move {
                let normalized = normalize_message(&message);
                if let Err(e) = ingress::handle_incoming_message(&deps, normalized).await {
                    tracing::error!(error = %e, "failed to process incoming message");
                }
                respond(())
            }
        });

        let mut dispatcher = Dispatcher::builder(bot, handler).enable_ctrlc_handler().build();
        tokio::select! {
            _ = dispatcher.dispatch() => {}
            _ = bot_shutdown.cancelled() => {
                tracing::info!("shutdown requested, stopping chat-client dispatcher");
            }
        }
    });

    shutdown.wait().await;
    let _ = tokio::join!(consumer_task, bot_task);
    Ok(())
}
