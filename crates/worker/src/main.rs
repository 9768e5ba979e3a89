//! LiteMaaS background worker
//!
//! Runs the scheduled jobs against the same database and LiteLLM gateway as
//! the API server: model catalogue sync, today's usage refresh and usage
//! cache retention.

mod jobs;

use anyhow::Context;
use litemaas_api::{logging, services::ModelSyncService, state::build_usage_stats, Config};
use litemaas_litellm::LiteLlmClient;
use tokio_cron_scheduler::{Job, JobScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing("info,litemaas_worker=debug");

    let config = Config::from_env().context("Failed to load configuration")?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for the worker")?;
    let pool = litemaas_shared::create_pool(database_url, 5)
        .await
        .context("Failed to connect to database")?;
    let litellm =
        LiteLlmClient::new(config.litellm.clone()).context("Failed to build LiteLLM client")?;

    let model_sync = ModelSyncService::new(pool.clone(), litellm.clone());
    let usage_stats = build_usage_stats(&pool, &config, &litellm);
    let retention_days = config.usage_cache_retention_days;

    let mut scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    {
        let model_sync = model_sync.clone();
        scheduler
            .add(Job::new_async(config.model_sync_cron.as_str(), move |_id, _scheduler| {
                let model_sync = model_sync.clone();
                Box::pin(async move { jobs::sync_models(&model_sync).await })
            })?)
            .await?;
    }

    {
        let usage_stats = usage_stats.clone();
        scheduler
            .add(Job::new_async(config.usage_refresh_cron.as_str(), move |_id, _scheduler| {
                let usage_stats = usage_stats.clone();
                Box::pin(async move { jobs::refresh_usage(&usage_stats).await })
            })?)
            .await?;
    }

    {
        let usage_stats = usage_stats.clone();
        scheduler
            .add(Job::new_async(config.usage_cleanup_cron.as_str(), move |_id, _scheduler| {
                let usage_stats = usage_stats.clone();
                Box::pin(async move {
                    jobs::cleanup_usage_cache(&usage_stats, retention_days).await;
                })
            })?)
            .await?;
    }

    tracing::info!(
        model_sync = %config.model_sync_cron,
        usage_refresh = %config.usage_refresh_cron,
        usage_cleanup = %config.usage_cleanup_cron,
        "Worker started"
    );

    // Populate the catalogue right away instead of waiting for the first tick
    jobs::sync_models(&model_sync).await;

    scheduler.start().await.context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    scheduler.shutdown().await.context("Failed to stop scheduler")?;

    Ok(())
}
