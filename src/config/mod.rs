//! Configuration loading for partyfetch.
//!
//! Files are parsed by extension (`.yaml`/`.yml`, `.toml`, otherwise JSON).
//! Top-level values act as defaults for every creator entry; each creator
//! may override host, output directory, post limit and concurrency.

pub mod proxy;

pub use proxy::{ProxyDescriptor, ProxyKind, ProxySettings, RotationMode};

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token replaced by the creator's display name in output paths.
pub const USERNAME_TOKEN: &str = "%username%";

pub const DEFAULT_OUTPUT_DIR: &str = "./downloads/%username%";
pub const DEFAULT_HOST: &str = "kemono.su";
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 2;
pub const MAX_CONCURRENT_DOWNLOADS_LIMIT: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Config file names searched in the working directory.
const LOCAL_CONFIG_NAMES: &[&str] = &["partyfetch.yaml", "partyfetch.yml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("No config file found (tried --config, PARTYFETCH_CONFIG, {})", LOCAL_CONFIG_NAMES.join(", "))]
    NotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A creator entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorConfig {
    pub service: String,
    #[serde(deserialize_with = "crate::utils::string_or_number")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_posts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_host")]
    pub host: String,
    /// Maximum posts per creator (0 = unlimited).
    #[serde(default)]
    pub max_posts: usize,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub creators: Vec<CreatorConfig>,
    #[serde(default)]
    pub proxies: ProxySettings,
    /// File this config was loaded from, used to resolve relative paths.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            host: default_host(),
            max_posts: 0,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: None,
            creators: Vec::new(),
            proxies: ProxySettings::default(),
            source_path: None,
        }
    }
}

/// Values from the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_concurrent_downloads: Option<usize>,
    pub max_posts: Option<usize>,
    pub output_dir: Option<String>,
}

impl Config {
    /// Load configuration, searching the default locations when `explicit` is `None`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => expand_path(path),
            None => Self::discover().ok_or(ConfigError::NotFound)?,
        };
        Self::load_from_path(&path)
    }

    /// Find a config file in the working directory or the user config directory.
    pub fn discover() -> Option<PathBuf> {
        let cwd = env::current_dir().ok();
        let local = cwd
            .iter()
            .flat_map(|dir| LOCAL_CONFIG_NAMES.iter().map(move |name| dir.join(name)));
        let user = dirs::config_dir().map(|dir| dir.join("partyfetch").join("config.yaml"));

        local.chain(user).find(|candidate| candidate.is_file())
    }

    /// Load a config file, choosing the parser from its extension.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut config = Self::parse(&content, &ext)?;
        config.source_path = Some(path.to_path_buf());
        config.proxies = config.proxies.with_env_overrides();
        tracing::debug!(
            "Loaded config from {} ({} creators, {} proxies)",
            path.display(),
            config.creators.len(),
            config.proxies.list.len()
        );
        Ok(config)
    }

    /// Parse config content for the given file extension.
    pub fn parse(content: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            "toml" => toml::from_str(content).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(n) = overrides.max_concurrent_downloads {
            self.max_concurrent_downloads = n;
            for creator in &mut self.creators {
                creator.max_concurrent_downloads = None;
            }
        }
        if let Some(n) = overrides.max_posts {
            self.max_posts = n;
            for creator in &mut self.creators {
                creator.max_posts = None;
            }
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
            for creator in &mut self.creators {
                creator.output_dir = None;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.creators.is_empty() {
            return Err(ConfigError::Invalid("no creators configured".to_string()));
        }

        check_concurrency(self.max_concurrent_downloads, "max_concurrent_downloads")?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (i, creator) in self.creators.iter().enumerate() {
            if creator.service.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "creator #{} has an empty service",
                    i + 1
                )));
            }
            if creator.user_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "creator #{} has an empty user_id",
                    i + 1
                )));
            }
            if let Some(n) = creator.max_concurrent_downloads {
                check_concurrency(
                    n,
                    &format!("creators[{}].max_concurrent_downloads", i),
                )?;
            }
        }

        for descriptor in &self.proxies.list {
            descriptor.validate().map_err(ConfigError::Invalid)?;
        }

        Ok(())
    }

    /// Directory relative paths are resolved against.
    fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Fully resolved settings for every configured creator.
    pub fn creator_settings(&self) -> Vec<CreatorSettings> {
        let base_dir = self.base_dir();
        self.creators
            .iter()
            .map(|c| CreatorSettings {
                service: c.service.trim().to_string(),
                user_id: c.user_id.trim().to_string(),
                username: c.username.clone().filter(|u| !u.trim().is_empty()),
                host: c.host.clone().unwrap_or_else(|| self.host.clone()),
                output_template: c
                    .output_dir
                    .clone()
                    .unwrap_or_else(|| self.output_dir.clone()),
                max_posts: match c.max_posts.unwrap_or(self.max_posts) {
                    0 => None,
                    n => Some(n),
                },
                max_concurrent_downloads: c
                    .max_concurrent_downloads
                    .unwrap_or(self.max_concurrent_downloads),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                user_agent: self.user_agent.clone(),
                base_dir: base_dir.clone(),
            })
            .collect()
    }
}

fn check_concurrency(n: usize, field: &str) -> Result<(), ConfigError> {
    if !(1..=MAX_CONCURRENT_DOWNLOADS_LIMIT).contains(&n) {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1 and {} (got {})",
            field, MAX_CONCURRENT_DOWNLOADS_LIMIT, n
        )));
    }
    Ok(())
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Per-creator parameters after applying top-level defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorSettings {
    pub service: String,
    pub user_id: String,
    pub username: Option<String>,
    pub host: String,
    pub output_template: String,
    pub max_posts: Option<usize>,
    pub max_concurrent_downloads: usize,
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
    pub base_dir: PathBuf,
}

impl CreatorSettings {
    /// Minimal settings for a single creator, used by library callers and tests.
    pub fn new(service: &str, user_id: &str, host: &str, output_template: &str) -> Self {
        Self {
            service: service.to_string(),
            user_id: user_id.to_string(),
            username: None,
            host: host.to_string(),
            output_template: output_template.to_string(),
            max_posts: None,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: None,
            base_dir: PathBuf::from("."),
        }
    }

    /// Human-readable identifier for logs and progress output.
    pub fn label(&self) -> String {
        match &self.username {
            Some(name) => format!("{} ({}/{})", name, self.service, self.user_id),
            None => format!("{}/{}", self.service, self.user_id),
        }
    }

    /// Output directory with `%username%` substituted and `~` expanded.
    pub fn output_dir(&self, username: &str) -> PathBuf {
        let substituted = self.output_template.replace(USERNAME_TOKEN, username);
        let expanded = PathBuf::from(shellexpand::tilde(&substituted).into_owned());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    /// Whether a command-line filter selects this creator.
    pub fn matches(&self, filter: &str) -> bool {
        self.user_id == filter
            || self
                .username
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
output_dir: "~/media/%username%"
max_concurrent_downloads: 4
creators:
  - service: patreon
    user_id: 12345
    username: alice
  - service: fanbox
    user_id: "777"
    host: coomer.su
    output_dir: /srv/archive/%username%
    max_posts: 20
    max_concurrent_downloads: 1
proxies:
  rotation: round-robin
  list:
    - type: socks5
      host: 127.0.0.1
      port: 9050
"#;

    #[test]
    fn test_parse_yaml_defaults_and_overrides() {
        let config = Config::parse(YAML, "yaml").unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.max_posts, 0);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.creators.len(), 2);
        assert_eq!(config.creators[0].user_id, "12345");
        assert_eq!(config.proxies.list.len(), 1);
        config.validate().unwrap();

        let settings = config.creator_settings();
        assert_eq!(settings[0].host, "kemono.su");
        assert_eq!(settings[0].max_posts, None);
        assert_eq!(settings[0].max_concurrent_downloads, 4);
        assert_eq!(settings[1].host, "coomer.su");
        assert_eq!(settings[1].max_posts, Some(20));
        assert_eq!(settings[1].max_concurrent_downloads, 1);
        assert_eq!(
            settings[1].output_dir("bob"),
            PathBuf::from("/srv/archive/bob")
        );
    }

    #[test]
    fn test_parse_toml_and_json() {
        let toml_src = r#"
host = "coomer.party"
[[creators]]
service = "onlyfans"
user_id = "someone"
"#;
        let config = Config::parse(toml_src, "toml").unwrap();
        assert_eq!(config.host, "coomer.party");
        assert_eq!(config.creators[0].service, "onlyfans");

        let json_src = r#"{"creators":[{"service":"patreon","user_id":42}]}"#;
        let config = Config::parse(json_src, "json").unwrap();
        assert_eq!(config.creators[0].user_id, "42");
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse("creators: [", "yml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "YAML", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.creators.push(CreatorConfig {
            service: "patreon".to_string(),
            user_id: "1".to_string(),
            username: None,
            host: None,
            output_dir: None,
            max_posts: None,
            max_concurrent_downloads: None,
        });
        config.validate().unwrap();

        config.max_concurrent_downloads = 11;
        assert!(config.validate().is_err());
        config.max_concurrent_downloads = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_downloads = 10;
        config.validate().unwrap();

        config.creators[0].user_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::parse(YAML, "yaml").unwrap();
        config.apply_overrides(&ConfigOverrides {
            max_concurrent_downloads: Some(7),
            max_posts: Some(5),
            output_dir: Some("/tmp/out/%username%".to_string()),
        });
        let settings = config.creator_settings();
        for s in &settings {
            assert_eq!(s.max_concurrent_downloads, 7);
            assert_eq!(s.max_posts, Some(5));
            assert_eq!(s.output_dir("x"), PathBuf::from("/tmp/out/x"));
        }
    }

    #[test]
    fn test_relative_output_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partyfetch.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "output_dir: out/%username%\ncreators:\n  - service: patreon\n    user_id: 9"
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
        let settings = config.creator_settings();
        assert_eq!(settings[0].output_dir("carol"), dir.path().join("out/carol"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load(Some(Path::new("/nonexistent/partyfetch.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_matches_filter() {
        let mut s = CreatorSettings::new("patreon", "123", "kemono.su", "./%username%");
        assert!(s.matches("123"));
        assert!(!s.matches("alice"));
        s.username = Some("Alice".to_string());
        assert!(s.matches("alice"));
        assert_eq!(s.label(), "Alice (patreon/123)");
    }
}
