use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use request_tracker::admission::{CounterStore, MemoryCounterStore, RedisCounterStore};
use request_tracker::api;
use request_tracker::cache::RedisClient;
use request_tracker::config::AppConfig;
use request_tracker::instrumentation::{slow_request_hook, HookRegistry};
use request_tracker::metrics::{self, CounterSink, RedisCounterSink};
use request_tracker::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting request tracker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Prometheus exporter
    let prometheus = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Prometheus exporter not installed: {}", e);
            None
        }
    };

    let hooks = Arc::clone(HookRegistry::global());

    // Counter store and daily counters (Redis), with in-memory fallback
    let redis = match config.redis_url.as_deref() {
        Some(url) => match RedisClient::from_url(url).await {
            Ok(client) => {
                tracing::info!("Redis connected at {}", url);
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-memory rate limit counters", e);
                None
            }
        },
        None => {
            tracing::info!("No Redis configured, using in-memory rate limit counters");
            None
        }
    };

    let mut extra_sinks: Vec<Arc<dyn CounterSink>> = Vec::new();
    let store: Arc<dyn CounterStore> = match &redis {
        Some(client) => {
            let instrumentation = Arc::clone(hooks.instrumentation());
            extra_sinks.push(Arc::new(RedisCounterSink::new(client.clone(), instrumentation.clone())));
            Arc::new(RedisCounterStore::new(client.clone(), instrumentation))
        }
        None => {
            let store = Arc::new(MemoryCounterStore::new());
            store.spawn_cleanup(Duration::from_secs(60));
            store as Arc<dyn CounterStore>
        }
    };

    if let Some(ms) = config.slow_request_ms {
        hooks.register(slow_request_hook(Duration::from_millis(ms)));
        tracing::info!("Slow request logging enabled (> {}ms)", ms);
    }

    let port = config.port;
    let state = Arc::new(AppState::build(config, store, extra_sinks, hooks, prometheus)?);

    tracing::info!(
        "Rate limiting: mode={}, enabled={}",
        state.config.rate_limit.mode,
        state.config.rate_limit.enabled
    );

    spawn_policy_reload(state.clone());

    let app = api::routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Re-read configuration on SIGHUP and swap the rate limit policy
#[cfg(unix)]
fn spawn_policy_reload(state: Arc<AppState>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!("SIGHUP handler not installed, policy reload disabled: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            dotenvy::dotenv().ok();
            match AppConfig::load() {
                Ok(config) => state.tracker.limiter().reload(config.rate_limit.policy()),
                Err(e) => tracing::error!("Configuration reload failed, keeping current policy: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_policy_reload(_state: Arc<AppState>) {}
