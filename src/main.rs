//! Entry point for the inference director

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod cli;

use cli::Cli;
use llm_inference_director::config::Config;
use llm_inference_director::director::{Director, DirectorSettings};
use llm_inference_director::metrics::ServiceMetrics;
use llm_inference_director::{admin, server};
use llm_inference_director_core::Metrics;
use llm_inference_director_predictor::HttpPredictor;
use llm_inference_director_scheduling::{
    AdmissionController, QueueAwareScheduler, StaticDatastore, ThresholdSaturationDetector,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(url) = cli.predictor_url {
        config.predictor.base_url = url;
    }
    config.validate()?;

    let datastore = Arc::new(StaticDatastore::new(
        config.inference_pool(),
        config.inference_models(),
    ));
    for pod in &config.pods {
        datastore.upsert_pod(&pod.address, Metrics::default());
    }

    let detector = Arc::new(ThresholdSaturationDetector::new(
        datastore.clone(),
        config.saturation.kv_cache_threshold,
        config.saturation.queue_depth_threshold,
    ));
    let admission = AdmissionController::new(detector);
    let scheduler = Arc::new(QueueAwareScheduler::new(
        config.scheduler.queue_weight,
        config.scheduler.kv_cache_weight,
    ));
    let predictor = Arc::new(
        HttpPredictor::builder()
            .base_url(&config.predictor.base_url)
            .timeout(Duration::from_millis(config.predictor.timeout_ms))
            .build()?,
    );
    let metrics = Arc::new(ServiceMetrics::new()?);

    let settings: DirectorSettings = config.director_settings();
    let director = Arc::new(Director::new(
        datastore,
        scheduler,
        admission,
        predictor,
        metrics.clone(),
        settings,
    ));

    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(shutdown.clone());

    let admin_task = tokio::spawn(admin::serve(
        config.admin_addr.clone(),
        metrics,
        shutdown.clone(),
    ));

    info!(
        pool = %config.pool.name,
        predictor = %config.predictor.base_url,
        "inference director starting"
    );
    server::run(&config.listen_addr, director, shutdown.clone()).await?;

    if let Ok(Err(e)) = admin_task.await {
        error!(error = %e, "admin server exited with error");
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(cli: &Cli) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if cli.verbose > 0 {
        match cli.verbose {
            1 => EnvFilter::new("llm_inference_director=debug"),
            _ => EnvFilter::new("trace"),
        }
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("llm_inference_director=info"))
    };

    let fmt_layer = if cli.json {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        fmt::layer().with_target(false).compact().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Cancel the shutdown token on ctrl-c
fn spawn_shutdown_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("received shutdown signal");
        shutdown.cancel();
    });
}
