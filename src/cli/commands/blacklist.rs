//! Blacklist commands: inspect and clear a download directory's blacklist.

use std::path::Path;

use console::style;

use partyfetch::blacklist::{BlacklistPolicy, BlacklistStore, BLACKLIST_FILE_NAME};

use crate::cli::icons;

pub async fn cmd_blacklist_list(dir: &Path) -> anyhow::Result<()> {
    if !dir.join(BLACKLIST_FILE_NAME).exists() {
        println!("{} No blacklist in {}", icons::heading(), dir.display());
        return Ok(());
    }

    let store = BlacklistStore::load(dir, BlacklistPolicy::default()).await?;
    let entries = store.entries();
    if entries.is_empty() {
        println!("{} Blacklist is empty", icons::ok());
        return Ok(());
    }

    println!(
        "{} {} blacklisted files in {}",
        icons::heading(),
        entries.len(),
        dir.display()
    );
    for entry in &entries {
        println!("  {} {}", icons::failure(), entry.file_name);
        println!(
            "    {} {}",
            icons::detail(),
            style(&entry.file_path).dim()
        );
        println!(
            "    {} added {}, {} failures, expires {}",
            icons::detail(),
            entry.added_at.format("%Y-%m-%d %H:%M"),
            entry.failure_count,
            store.expires_at(entry).format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

pub async fn cmd_blacklist_clear(dir: &Path, file_path: Option<&str>) -> anyhow::Result<()> {
    let store = BlacklistStore::load(dir, BlacklistPolicy::default()).await?;

    match file_path {
        Some(file_path) => {
            if !store.remove(file_path) {
                println!("{} {} is not blacklisted", icons::attention(), file_path);
                return Ok(());
            }
            store.flush().await?;
            println!("{} Removed {} from the blacklist", icons::ok(), file_path);
        }
        None => {
            let removed = store.clear();
            store.flush().await?;
            println!(
                "{} Cleared {} blacklist entries",
                icons::ok(),
                removed
            );
        }
    }

    Ok(())
}
