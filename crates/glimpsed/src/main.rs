use anyhow::{Context, Result};
use glimpse_core::{ClipModel, PresenceClassifier};
use glimpsed::config::debug_enabled;
use glimpsed::{create_router, spawn_engine, AppState, Config, ImageFetcher};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(debug_enabled(&|key: &str| std::env::var(key).ok()));

    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        debug = config.debug,
        model = %config.model_name,
        model_cache_dir = %config.model_cache_dir.display(),
        "glimpsed starting"
    );

    std::fs::create_dir_all(&config.model_cache_dir).with_context(|| {
        format!("creating model cache dir {}", config.model_cache_dir.display())
    })?;

    // Load model and prompts up front (fail-fast)
    let files = config.model_files();
    let model = ClipModel::load(&files, &config.model_name, config.logit_scale)
        .with_context(|| format!("loading {} from {}", config.model_name, config.model_dir().display()))?;
    tracing::info!(model = %config.model_name, logit_scale = model.logit_scale(), "CLIP model loaded");

    let prompts = config.prompt_set().context("loading prompt set")?;
    let classifier = PresenceClassifier::new(prompts, config.thresholds());
    tracing::info!(
        min_human_score = config.min_human_score,
        dominance_margin = config.dominance_margin,
        "presence classifier ready"
    );

    let engine = spawn_engine(model, classifier)?;
    let fetcher = ImageFetcher::new(config.fetch_timeout(), config.max_body_bytes)?;

    let addr = config.bind_addr();
    let app = create_router(AppState::new(config, engine, fetcher));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "glimpsed ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("glimpsed shutting down");
    Ok(())
}

/// Plain text by default, JSON when `LOG_FORMAT=json`.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
