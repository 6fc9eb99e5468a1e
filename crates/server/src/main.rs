//! weft server entry point.

mod directory;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use fred::prelude::*;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use weft_common::Config;
use weft_db::repositories::{
    DeliveryTargetRepository, FetchTaskRepository, InboxQueueRepository, InboxStatusRepository,
};
use weft_federation::{
    ActorCache, ApClient, ArrivedCache, CacheBackend, Federation, FederationContext,
    FederationSettings, HttpSignatureVerifier, LocalAccount, MemoryCacheBackend,
    RedisCacheBackend, generate_keypair, router,
};
use weft_queue::{
    DeliverContext, DeliverJob, LocalTaskRunner, RunnerConfig, SchedulerConfig, deliver_worker,
    run_scheduler,
};

use crate::directory::MemoryDirectory;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "weft=debug,weft_federation=debug,weft_queue=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// The instance actor, with its key read from disk or created on first start.
async fn instance_account(
    config: &Config,
    settings: &FederationSettings,
) -> anyhow::Result<LocalAccount> {
    let path = &config.federation.instance_key_path;
    let private_key_pem = if tokio::fs::try_exists(path).await? {
        tokio::fs::read_to_string(path).await?
    } else {
        let (private_pem, _) = generate_keypair()?;
        tokio::fs::write(path, &private_pem).await?;
        info!(path = %path, "Generated instance actor key");
        private_pem
    };

    let actor_url = settings.instance_actor();
    Ok(LocalAccount {
        uid: 0,
        followers_url: format!("{actor_url}/followers"),
        key_id: format!("{actor_url}#main-key"),
        actor_url,
        private_key_pem,
        always_bcc: config.delivery.always_bcc,
    })
}

async fn cache_backend(config: &Config) -> anyhow::Result<Arc<dyn CacheBackend>> {
    if config.cache.backend != "redis" {
        return Ok(Arc::new(MemoryCacheBackend::new()));
    }
    let fred_config = fred::types::config::Config::from_url(&config.redis.url)?;
    let client = fred::clients::Client::new(fred_config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;
    info!("Connected to Redis for the actor cache");
    Ok(Arc::new(RedisCacheBackend::new(
        Arc::new(client),
        format!("{}actors", config.redis.prefix),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;
    init_tracing(&config.server.log_format);

    info!("Starting weft server...");

    let db = Arc::new(weft_db::init(&config).await?);
    info!("Connected to database");
    weft_db::migrate(&db).await?;
    info!("Migrations completed");

    let settings = Arc::new(FederationSettings::from_config(&config)?);
    let transport = Arc::new(ApClient::new(
        &config.server.url,
        Duration::from_secs(config.delivery.network_timeout_secs),
    )?);
    let actors = ActorCache::new(
        cache_backend(&config).await?,
        transport.clone(),
        &config.cache,
    );

    info!("Connecting to Redis job queue...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let delivery_storage = RedisStorage::<DeliverJob>::new(redis_conn);
    info!("Connected to Redis job queue");
    let runner =
        LocalTaskRunner::with_delivery_queue(RunnerConfig::default(), delivery_storage.clone());

    let directory = Arc::new(MemoryDirectory::new(
        instance_account(&config, &settings).await?,
    ));
    let queue_repo = Arc::new(InboxQueueRepository::new(db.clone()));

    let ctx = FederationContext {
        settings: settings.clone(),
        queue_store: queue_repo,
        fetch_store: Arc::new(FetchTaskRepository::new(db.clone())),
        delivery_store: Arc::new(DeliveryTargetRepository::new(db.clone())),
        status_store: Arc::new(InboxStatusRepository::new(db.clone())),
        content: directory.clone(),
        contacts: directory,
        verifier: Arc::new(HttpSignatureVerifier::new(actors.clone())),
        transport,
        runner: Arc::new(runner.clone()),
        actors,
        arrived: Arc::new(ArrivedCache::new(Duration::from_secs(
            config.inbox.arrived_window_secs,
        ))),
    };
    let federation = Federation::new(ctx.clone());
    runner.bind(Arc::new(federation.clone()));

    if config.federation.enabled {
        info!("Starting federation workers...");
        let deliver_ctx = DeliverContext::new(federation.clone());
        tokio::spawn(async move {
            let monitor = Monitor::new().register({
                WorkerBuilder::new("deliver")
                    .data(deliver_ctx)
                    .backend(delivery_storage)
                    .build_fn(deliver_worker)
            });

            if let Err(e) = monitor.run().await {
                error!(error = %e, "Delivery worker failed");
            }
        });

        run_scheduler(&SchedulerConfig::from(&config), Arc::new(federation.clone()));

        let relays = federation.clone();
        tokio::spawn(async move {
            match relays.subscribe_relays().await {
                Ok(count) => info!(count, "Relay subscriptions sent"),
                Err(e) => warn!(error = %e, "Relay subscription failed"),
            }
        });
        info!("Federation workers started");
    }

    let app = router(ctx).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
