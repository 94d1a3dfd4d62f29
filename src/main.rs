//! Dev/local entry point for the crawl engine: wires an in-memory KV store
//! and job queue, spawns the configured worker pool, submits one crawl from
//! the command line, and prints each document as it completes.
//!
//! A production deployment does not use this binary directly — it calls
//! `crawl_engine::spawn_engine` (or `Coordinator::new` with durable KV/queue
//! implementations) from behind its own HTTP ingress layer (spec §1, out of
//! scope here).

use std::env;

use anyhow::{Context, Result};
use crawl_engine::{CrawlerOptions, EngineConfig, PageOptions, Plan, TenantId};

/// Environment variables this binary reads (spec §6 "one variable selects
/// local vs remote scheme; one points at the rendering service; one
/// configures the base request timeout").
const ENV_LOCAL: &str = "CRAWL_ENGINE_LOCAL";
const ENV_RENDER_ENDPOINT: &str = "CRAWL_ENGINE_RENDER_ENDPOINT";
const ENV_BASE_TIMEOUT_SECS: &str = "CRAWL_ENGINE_BASE_TIMEOUT_SECS";
const ENV_WORKER_COUNT: &str = "CRAWL_ENGINE_WORKERS";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let origin_url = env::args()
        .nth(1)
        .context("usage: crawl-engine <seed-url>")?;

    let config = config_from_env();
    let local = env::var(ENV_LOCAL).map(|v| v == "1" || v == "true").unwrap_or(false);

    log::info!(
        "starting crawl engine: workers={}, fetch_mode={:?}, local={}",
        config.worker_count(),
        config.fetch_mode(),
        local
    );

    let coordinator = crawl_engine::spawn_engine(&config);

    let id = coordinator
        .submit(
            origin_url.clone(),
            CrawlerOptions::default(),
            PageOptions::default(),
            TenantId("local-dev".to_string()),
            Plan::Free,
            Vec::new(),
            None,
        )
        .await
        .context("crawl submission rejected")?;

    let scheme = if local { "http" } else { "https" };
    log::info!("submitted crawl {id}, resource url: {scheme}://localhost/v1/crawl/{id}");

    let progress = coordinator
        .progress(id)
        .context("progress aggregator missing immediately after submit")?;
    let mut updates = progress.subscribe();

    loop {
        let (current, total) = progress.snapshot();
        if current >= total {
            log::info!("crawl {id} drained: {current}/{total} jobs complete");
            break;
        }
        match updates.recv().await {
            Ok(update) => {
                if let Some(url) = &update.current_document_url {
                    log::info!(
                        "[{}/{}] {:?} {}",
                        update.current,
                        update.total,
                        update.status,
                        url
                    );
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("progress subscriber lagged by {skipped} updates");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    Ok(())
}

fn config_from_env() -> EngineConfig {
    let mut builder = EngineConfig::builder();

    if let Ok(workers) = env::var(ENV_WORKER_COUNT) {
        if let Ok(n) = workers.parse::<usize>() {
            builder = builder.worker_count(n);
        }
    }
    if let Ok(endpoint) = env::var(ENV_RENDER_ENDPOINT) {
        if !endpoint.is_empty() {
            builder = builder.rendering_endpoint(endpoint);
        }
    }
    if let Ok(timeout) = env::var(ENV_BASE_TIMEOUT_SECS) {
        if let Ok(secs) = timeout.parse::<u64>() {
            builder = builder.base_fetch_timeout_secs(secs);
        }
    }

    builder.build()
}
