//! Scraping one creator end to end.
//!
//! Resolve the target, prepare the output directory, discover the API host,
//! paginate posts, then download every attachment through the retry passes.
//! The blacklist is flushed whether or not the run succeeds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::context::{PipelineOptions, ScraperContext, Transport};
use super::download::{
    run_with_retries, sweep_partial_files, DownloadService, DownloadTask, EventSink, RunSummary,
};
use crate::api::{
    collect_files, fetch_creator_name, paginate, ApiPageSource, RemoteFile, StopReason,
};
use crate::blacklist::BlacklistStore;
use crate::config::CreatorSettings;
use crate::http_client::HttpClient;
use crate::proxy::ProxyPool;
use crate::target::ResolvedTarget;
use crate::utils::sanitize_file_name;

pub const LAST_UPDATED_FILE_NAME: &str = "lastupdated.txt";

/// What one creator run did.
#[derive(Debug, Clone)]
pub struct CreatorReport {
    pub label: String,
    pub username: String,
    pub output_dir: PathBuf,
    pub posts: usize,
    pub files: usize,
    pub stop_reason: StopReason,
    pub summary: RunSummary,
}

/// Scrape a creator using the host from its settings.
pub async fn scrape_creator(
    settings: &CreatorSettings,
    proxies: Arc<ProxyPool>,
    options: PipelineOptions,
    events: EventSink,
) -> Result<CreatorReport> {
    let target = ResolvedTarget::resolve(&settings.host);
    scrape_with_target(settings, target, proxies, options, events).await
}

/// Scrape a creator against an already-resolved target.
pub async fn scrape_with_target(
    settings: &CreatorSettings,
    target: ResolvedTarget,
    proxies: Arc<ProxyPool>,
    mut options: PipelineOptions,
    events: EventSink,
) -> Result<CreatorReport> {
    tracing::info!(
        "{}: {} site, API at {}, CDN hosts [{}]",
        settings.label(),
        target.family(),
        target.api_origin(),
        target.cdn_hosts().join(", ")
    );

    let http = HttpClient::new(settings.user_agent.as_deref(), settings.request_timeout)?;
    let transport = Transport::new(http, proxies);

    let username = match &settings.username {
        Some(name) => name.clone(),
        None => fetch_creator_name(&transport, &target, &settings.service, &settings.user_id)
            .await
            .unwrap_or_else(|| settings.user_id.clone()),
    };

    let output_dir = settings.output_dir(&sanitize_file_name(&username));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    sweep_partial_files(&output_dir)
        .await
        .with_context(|| format!("Failed to clean partial files in {}", output_dir.display()))?;

    let blacklist = Arc::new(BlacklistStore::load(&output_dir, options.blacklist.clone()).await?);
    if settings.max_posts.is_some() {
        options.pagination.max_posts = settings.max_posts;
    }

    let ctx = Arc::new(ScraperContext::new(
        settings.clone(),
        username,
        target,
        output_dir,
        transport,
        blacklist,
        options,
    ));

    let result = run_creator(&ctx, events).await;

    if let Err(e) = ctx.blacklist().flush().await {
        tracing::error!("Failed to save blacklist for {}: {}", settings.label(), e);
    }

    let report = result?;
    write_last_updated(ctx.output_dir()).await?;
    Ok(report)
}

async fn run_creator(ctx: &Arc<ScraperContext>, events: EventSink) -> Result<CreatorReport> {
    let settings = ctx.settings();
    let api_host = ctx.api_host().await?.to_string();

    let source = ApiPageSource::new(
        ctx.transport(),
        ctx.target(),
        &api_host,
        &settings.service,
        &settings.user_id,
        &ctx.options().discovery,
    );
    let pagination = paginate(&source, &ctx.options().pagination)
        .await
        .with_context(|| format!("Failed to list posts for {}", settings.label()))?;

    let files = collect_files(&pagination.posts);
    let tasks = build_tasks(&files, ctx.output_dir());
    tracing::info!(
        "{}: {} posts, {} files to check",
        settings.label(),
        pagination.posts.len(),
        tasks.len()
    );

    let file_count = tasks.len();
    let service = DownloadService::new(ctx.clone(), events);
    let summary = run_with_retries(&service, tasks).await?;

    Ok(CreatorReport {
        label: settings.label(),
        username: ctx.username().to_string(),
        output_dir: ctx.output_dir().to_path_buf(),
        posts: pagination.posts.len(),
        files: file_count,
        stop_reason: pagination.stop_reason,
        summary,
    })
}

/// Destination `<postId>_<name>` under `output_dir`, one task per destination.
pub fn build_tasks(files: &[RemoteFile], output_dir: &Path) -> Vec<DownloadTask> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter_map(|file| {
            let name = format!("{}_{}", file.post_id, file.file_name);
            let dest = output_dir.join(sanitize_file_name(&name));
            seen.insert(dest.clone())
                .then(|| DownloadTask::new(&file.remote_path, &file.file_name, dest))
        })
        .collect()
}

async fn write_last_updated(output_dir: &Path) -> Result<()> {
    let path = output_dir.join(LAST_UPDATED_FILE_NAME);
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z").to_string();
    tokio::fs::write(&path, format!("{}\n", stamp))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
