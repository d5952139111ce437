use specter::config::Config;
use specter::services::{ChallengeSync, KvStore, PaperTradingService, PriceFeed, RedisKv, SqliteKv};
use specter::{api, AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "specter=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Specter server on {}:{}", config.host, config.port);

    // Select the snapshot store: Redis when configured, SQLite otherwise
    let store: Arc<dyn KvStore> = match config.redis_url.as_deref() {
        Some(url) => match RedisKv::new(url) {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                warn!("Redis unavailable ({}), falling back to SQLite", e);
                Arc::new(SqliteKv::new(&config.sqlite_path)?)
            }
        },
        None => Arc::new(SqliteKv::new(&config.sqlite_path)?),
    };

    // Create the trading service, with the challenge backend attached
    // when one is configured
    let paper = match config.sync.base_url.clone() {
        Some(base_url) => {
            info!("Challenge backend sync enabled: {}", base_url);
            Arc::new(PaperTradingService::with_sync(
                store,
                ChallengeSync::new(base_url, config.sync.token.clone()),
            ))
        }
        None => Arc::new(PaperTradingService::new(store)),
    };

    // Seed the simulated market feed
    let (feed, _price_rx) = PriceFeed::new();
    for symbol in &config.feed.symbols {
        feed.seed_symbol(symbol, config.feed.seed_days);
    }
    info!("Seeded feed for {} symbols", config.feed.symbols.len());

    // Drive price ticks into the matching engine
    {
        let feed = feed.clone();
        let paper = paper.clone();
        let symbols = config.feed.symbols.clone();
        let interval = config.feed.tick_interval_secs;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                for symbol in &symbols {
                    if let Some(price) = feed.step(symbol) {
                        paper.process_symbol_tick(symbol, price);
                    }
                }
            }
        });
    }

    // Create application state
    let state = AppState {
        config: config.clone(),
        paper,
        feed,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = api::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Specter server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
