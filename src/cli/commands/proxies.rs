//! Proxies command: check and list the configured proxies.
//!
//! Health only exists inside a running scrape, so this shows configuration;
//! live availability is part of each creator's scrape summary.

use std::path::Path;

use console::style;

use partyfetch::config::Config;

use super::build_proxy_pool;
use crate::cli::icons;

pub async fn cmd_proxies(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    for descriptor in &config.proxies.list {
        descriptor
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid proxy {}: {}", descriptor.display_label(), e))?;
    }

    // Building the pool proves every proxy URL is accepted by the HTTP client
    let pool = build_proxy_pool(&config)?;
    if pool.is_empty() {
        println!(
            "{} No proxies configured; requests go out directly",
            icons::heading()
        );
        return Ok(());
    }

    println!(
        "{} {} configured proxies ({:?} rotation, {}s cooldown after a proxy failure)",
        icons::heading(),
        pool.len(),
        config.proxies.rotation,
        config.proxies.cooldown_secs()
    );
    for descriptor in &config.proxies.list {
        let auth = if descriptor.username.is_some() {
            " (authenticated)"
        } else {
            ""
        };
        println!(
            "  {} {}{}",
            icons::ok(),
            descriptor.display_label(),
            style(auth).dim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("partyfetch.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_lists_valid_proxies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
proxies:
  rotation: round-robin
  list:
    - type: socks5h
      host: 127.0.0.1
      port: 9050
    - type: http
      host: proxy.local
      port: 3128
      username: user
      password: secret
"#,
        );
        cmd_proxies(Some(&path)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_proxy_without_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
proxies:
  list:
    - type: http
      host: proxy.local
      port: 0
"#,
        );
        let err = cmd_proxies(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("Invalid proxy"), "{}", err);
    }
}
