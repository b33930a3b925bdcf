//! Load balancer entry point: parse flags, probe the pool once, serve.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shoal::balancer::{proxy, BackendPool, HealthProber, ProxyState};
use shoal::config::BalancerConfig;
use shoal::server::Server;

/// Least-connections HTTP load balancer.
#[derive(Parser)]
#[command(name = "shoal-lb", about = "Least-connections HTTP load balancer")]
struct Args {
    /// Listener port.
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Per-outbound-request deadline in seconds.
    #[arg(long = "timeout-sec", default_value_t = 3)]
    timeout_sec: u64,

    /// Talk to backends over HTTPS.
    #[arg(long)]
    https: bool,

    /// Add an `lb-from` header naming the chosen backend.
    #[arg(long)]
    trace: bool,

    /// Backend address (host:port); repeat once per backend.
    #[arg(long = "backend")]
    backends: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoal=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = BalancerConfig::default();
    config.port = args.port;
    config.timeout = Duration::from_secs(args.timeout_sec);
    config.https = args.https;
    config.trace = args.trace;
    if !args.backends.is_empty() {
        config.backends = args.backends;
    }

    tracing::info!(
        port = config.port,
        scheme = config.scheme(),
        trace = config.trace,
        backends = ?config.backends,
        "starting load balancer"
    );

    let pool = Arc::new(BackendPool::new(config.backends.clone()));
    let client = reqwest::Client::new();

    // one full probe pass before accepting traffic, so the first dispatch
    // sees the true live set
    let prober = HealthProber::new(pool.clone(), client.clone(), &config);
    prober.initial_pass().await;

    let state = ProxyState::new(pool, client, &config);
    let server = Server::bind(config.port).await?;
    prober.spawn();
    server.run(proxy::router(state)).await?;

    Ok(())
}
