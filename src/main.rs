//! Batch entrypoint: load config, run one pipeline pass, print the run
//! summary as JSON. Designed to run from cron; exit code is non-zero only
//! on configuration or state-dir failure, never on per-item failures.

use std::time::Duration;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use travel_content_pipeline::config::{PipelineConfig, RunOverrides};
use travel_content_pipeline::images::UnsplashClient;
use travel_content_pipeline::pipeline::{run_once, PipelineDeps};
use travel_content_pipeline::publish::store::FileContentStore;
use travel_content_pipeline::rewrite::client::HttpRewriteClient;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("travel_content_pipeline=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Per-run overrides from the environment, e.g.
/// `PIPELINE_DAILY_LIMIT=4 PIPELINE_GROUP_QUOTAS=cruise=1`.
fn overrides_from_env() -> RunOverrides {
    let daily_limit = std::env::var("PIPELINE_DAILY_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok());
    let group_quotas = std::env::var("PIPELINE_GROUP_QUOTAS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| {
                    let (name, quota) = pair.split_once('=')?;
                    Some((name.trim().to_string(), quota.trim().parse().ok()?))
                })
                .collect()
        })
        .unwrap_or_default();
    RunOverrides {
        daily_limit,
        group_quotas,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    cfg.apply_overrides(&overrides_from_env());
    cfg.validate().context("validating pipeline config")?;

    let model = std::env::var("REWRITE_MODEL").ok();
    let deps = PipelineDeps {
        fetch: Arc::new(travel_content_pipeline::feeds::fetcher::HttpFeedFetcher::new(
            cfg.rate_limit.fetch_timeout_secs,
        )),
        rewrite: Arc::new(HttpRewriteClient::new(model.as_deref())),
        images: Arc::new(UnsplashClient::new()),
        store: Arc::new(FileContentStore::new(&cfg.content_dir)?),
    };

    let summary = tokio::time::timeout(
        Duration::from_secs(cfg.run_timeout_secs),
        run_once(&cfg, &deps),
    )
    .await
    .context("pipeline run exceeded the configured timeout")??;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
