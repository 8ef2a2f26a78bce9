use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use inkframe_core::{Carousel, FrameConfig, Gallery, PreviewCache, RenderEngine, StatusFacade};
use tracing_subscriber::EnvFilter;

mod gallery;
mod http;
mod render;

use gallery::FsGallery;
use http::AppState;
use render::FrameRenderer;

#[tokio::main]
async fn main() -> inkframe_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::info!(image_dir = %cli.image_dir.display(), "starting inkframe");

    let gallery: Arc<dyn Gallery> = Arc::new(FsGallery::new(&cli.image_dir));
    let engine: Arc<dyn RenderEngine> =
        Arc::new(FrameRenderer::new(&cli.image_dir, (cli.width, cli.height)));
    let carousel = Arc::new(Carousel::new(gallery.clone(), &config.carousel));
    let cache = Arc::new(PreviewCache::new(engine.clone()));
    let status = Arc::new(StatusFacade::new(
        carousel.clone(),
        gallery.clone(),
        engine.clone(),
    ));

    if config.carousel.autostart {
        if let Err(err) = carousel.start(None) {
            tracing::warn!(error = %err, "carousel autostart skipped");
        }
    }

    let state = AppState {
        carousel: carousel.clone(),
        cache,
        status,
        gallery,
        config,
    };

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!(addr = %cli.bind, "listening");
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    carousel.shutdown();
    tracing::info!("shut down cleanly");
    Ok(())
}

fn load_config(cli: &Cli) -> inkframe_core::Result<FrameConfig> {
    let mut config = match &cli.config {
        Some(path) => FrameConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => FrameConfig::default(),
    };
    if let Some(minutes) = cli.minutes {
        config.carousel.minutes = minutes.max(1);
    }
    if cli.autostart {
        config.carousel.autostart = true;
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "E-ink photo frame dashboard server", long_about = None)]
struct Cli {
    /// Directory holding the gallery images.
    #[arg(long, default_value = "images")]
    image_dir: PathBuf,
    /// Address the HTTP API binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
    /// Optional JSON configuration snapshot to load at startup.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the configured rotation interval in minutes.
    #[arg(long)]
    minutes: Option<u64>,
    /// Start rotating as soon as the server boots.
    #[arg(long)]
    autostart: bool,
    /// Display width in pixels.
    #[arg(long, default_value_t = 800)]
    width: u32,
    /// Display height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,
}
