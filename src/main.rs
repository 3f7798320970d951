//! htmlshot - HTML to PNG rendering service.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use htmlshot::{
    config::Config,
    render::ChromeRenderer,
    server::{create_router, AppState, RouterConfig},
    store::{spawn_sweeper, ImageStore},
    upload::{ImageUploader, ImgbbUploader},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    let renderer = ChromeRenderer::new(config.chrome_config());
    let chrome_config = renderer.config();

    info!("Configuration:");
    info!(
        "  Chrome: {}",
        chrome_config
            .chrome_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "auto-detect".to_string())
    );
    info!(
        "  Renders: {} concurrent, {}s timeout, {}ms network idle",
        chrome_config.max_concurrent,
        chrome_config.timeout.as_secs(),
        chrome_config.settle_delay.as_millis()
    );
    info!(
        "  Image store: {}h lifetime, sweep every {}s",
        config.image_ttl_hours, config.sweep_interval_secs
    );
    match config.public_url {
        Some(ref url) => info!("  Public URL: {}", url),
        None => info!("  Public URL: derived from request headers"),
    }

    // External image host
    let uploader: Option<Arc<dyn ImageUploader>> = match config.imgbb_api_key {
        Some(ref key) => match ImgbbUploader::new(key.clone(), config.upload_timeout()) {
            Ok(uploader) => {
                info!("  Uploads: imgbb");
                Some(Arc::new(uploader) as Arc<dyn ImageUploader>)
            }
            Err(e) => {
                error!("Failed to create ImgBB client: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("  Uploads: disabled - returnUrl requests use the local image store");
            None
        }
    };

    // Image store and its sweeper
    let store = Arc::new(ImageStore::new(config.image_ttl()));
    let sweeper = spawn_sweeper(Arc::clone(&store), config.sweep_interval());

    let mut app_state = AppState::new(renderer, store);
    if let Some(uploader) = uploader {
        app_state = app_state.with_uploader(uploader);
    }

    let router = create_router(app_state, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try it:");
    info!(
        "    curl -X POST http://{}/screenshot -H 'Content-Type: application/json' \\",
        addr
    );
    info!("      -d '{{\"html\": \"<h1>Hello</h1>\"}}' -o hello.png");
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("██╗  ██╗████████╗███╗   ███╗██╗     ███████╗██╗  ██╗ ██████╗ ████████╗");
    info!("██║  ██║╚══██╔══╝████╗ ████║██║     ██╔════╝██║  ██║██╔═══██╗╚══██╔══╝");
    info!("███████║   ██║   ██╔████╔██║██║     ███████╗███████║██║   ██║   ██║   ");
    info!("██╔══██║   ██║   ██║╚██╔╝██║██║     ╚════██║██╔══██║██║   ██║   ██║   ");
    info!("██║  ██║   ██║   ██║ ╚═╝ ██║███████╗███████║██║  ██║╚██████╔╝   ██║   ");
    info!("╚═╝  ╚═╝   ╚═╝   ╚═╝     ╚═╝╚══════╝╚══════╝╚═╝  ╚═╝ ╚═════╝    ╚═╝   ");
    info!("");
    info!("                                                            v{}", version);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "htmlshot=debug,tower_http=debug"
    } else {
        "htmlshot=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_max_body_bytes(config.max_body_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    if let Some(ref public_url) = config.public_url {
        router_config = router_config.with_public_url(public_url.clone());
    }

    router_config
}

/// Resolve when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
