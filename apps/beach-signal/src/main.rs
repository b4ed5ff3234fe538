use std::sync::Arc;

use beach_signal::{
    cli::{run_probe, Cli, Commands},
    config::Config,
    engine::WebRtcEngineFactory,
    router, serve,
    websocket::SignalingState,
};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Default to our own info logs plus request traces if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("beach_signal=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Some(Commands::Probe { url, name, wait }) = cli.command.clone() {
        match run_probe(url, name, wait).await {
            Ok(sdp) => println!("{}", sdp),
            Err(e) => {
                error!("Probe failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let config = cli.apply(Config::from_env());
    if let Err(e) = run_server(config).await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Starting Beach Signal on {}", config.listen_addr());
    info!("Serving client assets from {}", config.static_dir.display());
    if config.ice_servers.is_empty() {
        info!("No ICE servers configured; peers will only gather host candidates");
    } else {
        info!("ICE servers: {}", config.ice_servers.join(", "));
    }

    let engines = Arc::new(WebRtcEngineFactory::new(config.rtc_ice_servers()));
    let state = SignalingState::new(engines);
    let app = router(state, &config.static_dir);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    info!("Beach Signal listening on {}", addr);

    serve(listener, app).await?;
    Ok(())
}
