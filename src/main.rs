use cliquet_pricer::config::AppConfig;
use cliquet_pricer::server;
use cliquet_pricer::state::AppState;
use cliquet_pricer::trades::Trade;
use portable_atomic::Ordering;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("cliquet pricer starting");

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        port = cfg.server_port,
        default_n_paths = cfg.default_n_paths,
        default_n_resets = cfg.default_n_resets,
        bounds_policy = ?cfg.bounds_policy,
        timeout_secs = cfg.pricing_timeout_secs,
        fixed_seed = ?cfg.rng_seed,
        "config loaded"
    );

    let port = cfg.server_port;
    let app_state = AppState::new(cfg);

    // Seed the book with the demo trade
    let demo = Trade::demo();
    let demo_id = demo.trade_id.clone();
    if let Err(e) = app_state.trades.insert(demo).await {
        tracing::error!("failed to seed demo trade: {e}");
        std::process::exit(1);
    }
    app_state.counters.trades_registered.fetch_add(1, Ordering::Relaxed);
    tracing::info!(trade_id = %demo_id, "demo trade seeded");

    let app = server::router(app_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
    }

    tracing::info!("cliquet pricer stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
