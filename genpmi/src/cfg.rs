use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::EnumProperty;
use strum_macros::{Display, EnumString};

use crate::bpjson::NodeType;

#[derive(
    Clone, Copy, Debug, ValueEnum, Display, EnumString, EnumProperty, PartialEq, Eq, Hash,
)]
pub enum Network {
    #[value(name = "mainnet")]
    #[strum(
        serialize = "mainnet",
        props(
            chain_url = "https://wax.blokcrafters.io",
            history_url = "https://wax.blokcrafters.io"
        )
    )]
    Mainnet,
    #[value(name = "testnet")]
    #[strum(
        serialize = "testnet",
        props(
            chain_url = "https://testnet.wax.pink.gg",
            history_url = "https://testnet.wax.pink.gg"
        )
    )]
    Testnet,
}

impl Network {
    pub fn default_chain_url(&self) -> &'static str {
        self.get_str("chain_url").unwrap_or_default()
    }

    pub fn default_history_url(&self) -> &'static str {
        self.get_str("history_url").unwrap_or_default()
    }
}

fn default_max_age() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    5
}

fn default_producers_page_size() -> u32 {
    50
}

fn default_actions_limit() -> u32 {
    1000
}

/// Tunables for a run. Every field has a default, so an empty (or absent) file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Chain API to list producers and the schedule from. Defaults per network.
    #[serde(default)]
    pub chain_url: Option<String>,
    /// Hyperion history API the producerjson actions are read from. Defaults per network.
    #[serde(default)]
    pub history_url: Option<String>,
    /// Directory the caches and generated files live in.
    #[serde(default)]
    pub base_dir: PathBuf,
    /// Maximum age, in seconds, of the producers and top21 cache files.
    #[serde(default = "default_max_age")]
    pub producers_max_age: u64,
    /// Maximum age, in seconds, of the producerjson actions cache file.
    #[serde(default = "default_max_age")]
    pub actions_max_age: u64,
    /// How long, in seconds, before producers' bp.json URLs are checked again.
    #[serde(default = "default_max_age")]
    pub urls_max_age: u64,
    /// Timeout, in seconds, for every HTTP request, health checks included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_producers_page_size")]
    pub producers_page_size: u32,
    #[serde(default = "default_actions_limit")]
    pub actions_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain_url: None,
            history_url: None,
            base_dir: PathBuf::from("."),
            producers_max_age: default_max_age(),
            actions_max_age: default_max_age(),
            urls_max_age: default_max_age(),
            request_timeout: default_request_timeout(),
            producers_page_size: default_producers_page_size(),
            actions_limit: default_actions_limit(),
        }
    }
}

impl Config {
    pub async fn from_file(file: &Path) -> Result<Self> {
        let config = tokio::fs::read_to_string(file)
            .await
            .context(format!("Cannot read {}", file.display()))?;
        Self::parse(&config).context(format!(
            "{} does not contain a valid TOML config object",
            file.display()
        ))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        if config.base_dir.as_os_str().is_empty() {
            config.base_dir = PathBuf::from(".");
        }
        Ok(config)
    }
}

/// Which caches the user asked to throw away. Forcing one cache forces everything derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Refresh {
    pub producers: bool,
    pub bpjsons: bool,
    pub logos: bool,
}

impl Refresh {
    pub fn new(producers: bool, bpjsons: bool, logos: bool) -> Self {
        let bpjsons = bpjsons || producers;
        Refresh {
            producers,
            bpjsons,
            logos: logos || bpjsons,
        }
    }
}

/// Everything a run needs to know, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct Settings {
    pub network: Network,
    pub config: Config,
    pub refresh: Refresh,
}

impl Settings {
    pub fn new(network: Network, config: Config, refresh: Refresh) -> Self {
        Settings {
            network,
            config,
            refresh,
        }
    }

    pub fn chain_url(&self) -> &str {
        self.config
            .chain_url
            .as_deref()
            .unwrap_or(self.network.default_chain_url())
            .trim_end_matches('/')
    }

    pub fn history_url(&self) -> &str {
        self.config
            .history_url
            .as_deref()
            .unwrap_or(self.network.default_history_url())
            .trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout)
    }

    pub fn paths(&self) -> CachePaths {
        CachePaths::new(&self.config.base_dir, self.network)
    }
}

/// Where each cache and output file lives for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    base: PathBuf,
    network: Network,
}

impl CachePaths {
    pub fn new(base: &Path, network: Network) -> Self {
        CachePaths {
            base: base.to_path_buf(),
            network,
        }
    }

    pub fn jsons_dir(&self) -> PathBuf {
        self.base.join(format!("{}-jsons", self.network))
    }

    pub fn producers_file(&self) -> PathBuf {
        self.jsons_dir().join("producers.json")
    }

    pub fn top21_file(&self) -> PathBuf {
        self.jsons_dir().join("top21.json")
    }

    pub fn actions_file(&self) -> PathBuf {
        self.jsons_dir().join("producerjson-actions.json")
    }

    pub fn urls_last_checked(&self) -> PathBuf {
        self.jsons_dir().join("urls-last-checked")
    }

    pub fn url_bpjson(&self, owner: &str) -> PathBuf {
        self.jsons_dir().join("url").join(format!("{owner}-bp.json"))
    }

    pub fn chain_bpjson(&self, owner: &str) -> PathBuf {
        self.jsons_dir()
            .join("chain")
            .join(format!("{owner}-bp.json"))
    }

    /// Logo file name without its extension; the extension depends on what the server sends.
    pub fn logo_stem(&self, owner: &str) -> PathBuf {
        self.base
            .join(format!("{}-logos", self.network))
            .join(format!("{owner}-logo_256"))
    }

    pub fn country_table(&self) -> PathBuf {
        self.base
            .join(format!("nodes-by-country-{}.txt", self.network))
    }

    pub fn map_features(&self, node_type: NodeType) -> PathBuf {
        self.base
            .join(format!("pmi-{}-{node_type}.js", self.network))
    }
}
