//! Scrape command: run the download pipeline for each configured creator.

use std::path::Path;

use console::style;
use tokio::sync::mpsc;

use partyfetch::config::{Config, ConfigOverrides, CreatorSettings};
use partyfetch::proxy::ProxyPool;
use partyfetch::services::download::{DownloadEvent, EventSink, TaskOutcome};
use partyfetch::services::{scrape_creator, CreatorReport, PipelineOptions};
use partyfetch::utils::format_size;

use super::build_proxy_pool;
use crate::cli::icons;
use crate::cli::progress::DownloadProgress;

pub async fn cmd_scrape(
    config_path: Option<&Path>,
    filters: &[String],
    overrides: &ConfigOverrides,
    show_progress: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    config.apply_overrides(overrides);
    config.validate()?;

    let creators: Vec<CreatorSettings> = config
        .creator_settings()
        .into_iter()
        .filter(|c| filters.is_empty() || filters.iter().any(|f| c.matches(f)))
        .collect();

    if creators.is_empty() {
        println!(
            "{} No configured creator matches {}",
            icons::attention(),
            filters.join(", ")
        );
        return Ok(());
    }

    let proxies = build_proxy_pool(&config)?;
    let show_progress = show_progress && console::Term::stderr().is_term();

    let mut failed = Vec::new();
    for settings in &creators {
        println!("{} Scraping {}", icons::heading(), style(settings.label()).bold());

        let (event_tx, event_rx) = mpsc::channel::<DownloadEvent>(100);
        let handler = tokio::spawn(handle_events(event_rx, show_progress));

        let result = scrape_creator(
            settings,
            proxies.clone(),
            PipelineOptions::default(),
            EventSink::new(event_tx),
        )
        .await;

        // The sink is dropped with the pipeline, which ends the handler
        let _ = handler.await;

        match result {
            Ok(report) => print_report(&report, &proxies),
            Err(e) => {
                eprintln!("{} {}: {:#}", icons::failure(), settings.label(), e);
                failed.push(settings.label());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} creators failed: {}",
            failed.len(),
            creators.len(),
            failed.join(", ")
        );
    }

    Ok(())
}

async fn handle_events(mut event_rx: mpsc::Receiver<DownloadEvent>, show_progress: bool) {
    let mut progress = show_progress.then(DownloadProgress::new);

    while let Some(event) = event_rx.recv().await {
        let line = attention_line(&event);
        match &mut progress {
            Some(progress) => {
                progress.handle(&event);
                if let Some(line) = line {
                    progress.println(&line);
                }
            }
            None => {
                if let Some(line) = line {
                    println!("{}", line);
                }
            }
        }
    }

    if let Some(mut progress) = progress {
        progress.finish();
    }
}

/// Line worth keeping in the scrollback for an event, if any.
fn attention_line(event: &DownloadEvent) -> Option<String> {
    match event {
        DownloadEvent::PassStarted {
            pass,
            max_passes,
            tasks,
        } if *pass > 1 => Some(format!(
            "  {} Retry pass {}/{} for {} files",
            icons::detail(),
            pass,
            max_passes,
            tasks
        )),
        DownloadEvent::Finished {
            file_name, outcome, ..
        } => match outcome {
            TaskOutcome::Failed { error } => Some(format!(
                "  {} {}: {}",
                icons::outcome(outcome),
                file_name,
                error
            )),
            TaskOutcome::Blacklisted { reason } => Some(format!(
                "  {} {} blacklisted: {}",
                icons::outcome(outcome),
                file_name,
                reason
            )),
            _ => None,
        },
        _ => None,
    }
}

fn print_report(report: &CreatorReport, proxies: &ProxyPool) {
    let summary = &report.summary;
    println!(
        "{} {}: {} posts, {} files ({})",
        icons::ok(),
        report.username,
        report.posts,
        report.files,
        report.stop_reason
    );
    println!(
        "  {} {} downloaded ({}), {} already present, {} skipped (blacklisted)",
        icons::detail(),
        summary.downloaded,
        format_size(summary.bytes),
        summary.already_present,
        summary.skipped_blacklisted
    );
    if summary.blacklisted > 0 || summary.failed > 0 {
        println!(
            "  {} {} newly blacklisted, {} still failing after retries",
            icons::attention(),
            summary.blacklisted,
            summary.failed
        );
    }
    if !proxies.is_empty() {
        let (total, available) = proxies.availability();
        println!(
            "  {} proxies: {}/{} available",
            icons::detail(),
            available,
            total
        );
        for status in proxies.statuses().iter().filter(|s| !s.available) {
            let remaining = status.cooldown_remaining.unwrap_or_default();
            println!(
                "    {} {} cooling down for {}s after {} failures",
                icons::attention(),
                status.label,
                remaining.as_secs(),
                status.consecutive_failures
            );
        }
    }
    println!(
        "  {} {}",
        icons::detail(),
        style(report.output_dir.display()).dim()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn finished(outcome: TaskOutcome) -> DownloadEvent {
        DownloadEvent::Finished {
            task_id: Uuid::new_v4(),
            file_name: "clip.mp4".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_attention_lines_cover_failures_and_retries_only() {
        let failed = attention_line(&finished(TaskOutcome::Failed {
            error: "HTTP 503".to_string(),
        }))
        .unwrap();
        assert!(failed.contains("clip.mp4: HTTP 503"));

        let blacklisted = attention_line(&finished(TaskOutcome::Blacklisted {
            reason: "HTTP 500".to_string(),
        }))
        .unwrap();
        assert!(blacklisted.contains("clip.mp4 blacklisted: HTTP 500"));

        let retry = attention_line(&DownloadEvent::PassStarted {
            pass: 2,
            max_passes: 3,
            tasks: 4,
        })
        .unwrap();
        assert!(retry.contains("Retry pass 2/3 for 4 files"));

        assert!(attention_line(&finished(TaskOutcome::Downloaded { bytes: 3 })).is_none());
        assert!(attention_line(&finished(TaskOutcome::AlreadyExists)).is_none());
        assert!(attention_line(&DownloadEvent::PassStarted {
            pass: 1,
            max_passes: 3,
            tasks: 4,
        })
        .is_none());
    }
}
