use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

/// Server configuration, read from YAML over these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the upstream archive, e.g. `https://archive.example.org/`.
    pub root_uri: String,
    pub listen_address: SocketAddr,
    /// SQLite database file; `:memory:` keeps everything in memory.
    pub db_filepath: PathBuf,
    pub log_level: String,
    /// IANA zone the upstream prints listing timestamps in.
    pub upstream_time_zone: String,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_uri: String::new(),
            listen_address: SocketAddr::from(([127, 0, 0, 1], 9998)),
            db_filepath: PathBuf::from("archivist-data/db.sqlite"),
            log_level: "info".to_owned(),
            upstream_time_zone: "America/New_York".to_owned(),
            http: HttpConfig::default(),
        }
    }
}

/// Upstream HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_idle_connections: usize,
    pub idle_timeout_secs: u64,
    pub cache_max_bytes: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_idle_connections: 100,
            idle_timeout_secs: 90,
            cache_max_bytes: 256 * 1024 * 1024,
            user_agent: "okhttp/4.9.2".to_owned(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validate config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.root_url()?;
        self.time_zone()?;
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be positive");
        }
        if self.db_filepath.as_os_str().is_empty() {
            bail!("db_filepath must not be empty");
        }
        tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("log_level {:?}", self.log_level))?;
        Ok(())
    }

    pub fn root_url(&self) -> anyhow::Result<Url> {
        if self.root_uri.is_empty() {
            bail!("root_uri is required");
        }
        let url = Url::parse(&self.root_uri)
            .with_context(|| format!("root_uri {:?}", self.root_uri))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("root_uri must be http or https: {}", self.root_uri);
        }
        Ok(url)
    }

    pub fn time_zone(&self) -> anyhow::Result<Tz> {
        self.upstream_time_zone
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("upstream_time_zone: {err}"))
    }

    /// The defaults as YAML, with a placeholder upstream.
    pub fn default_yaml() -> anyhow::Result<String> {
        let config = Self {
            root_uri: "https://archive.example.org/".to_owned(),
            ..Self::default()
        };
        serde_yaml::to_string(&config).context("serialize default config")
    }
}
