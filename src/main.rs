use anyhow::{Context, Result};
use call_transcriber::{create_router, AppState, Config, WsRecognitionBackend};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "call-transcriber", about = "Live transcription for telephony media streams")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/call-transcriber")]
    config: String,

    /// Address to bind, overrides service.http.bind
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overrides service.http.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Speech: {} ({:?} {}Hz {}), streams renewed every {}s",
        cfg.speech.backend_url,
        cfg.speech.encoding,
        cfg.speech.sample_rate,
        cfg.speech.language,
        cfg.speech.stream_timeout_secs
    );

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let backend = Arc::new(WsRecognitionBackend::new(cfg.speech.backend_url.clone()));
    let app = create_router(AppState::new(cfg, backend));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on: http://{}", addr);
    info!("WebSocket endpoint: ws://{}", addr);
    info!("TwiML endpoint: http://{}/twiml", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
