use std::{fs, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use idp_storage::{BackendConfig, MariaDbConfig, StorageConfig};

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "idp-gc")]
#[command(author, version, about, long_about = None)]
pub struct GcConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    /// `memory` only sees records of its own process; it is meant for
    /// local runs.
    #[clap(long, env)]
    #[arg(value_enum, default_value_t = BackendKind::Mariadb)]
    #[serde(default)]
    pub backend: BackendKind,
    #[clap(long, env)]
    #[serde(default)]
    pub database_url: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = 4)]
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[clap(long, env)]
    #[arg(default_value_t = 1)]
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[clap(long, env)]
    #[arg(default_value_t = false)]
    #[serde(default)]
    pub run_migrations: bool,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("idp_gc=info,idp_storage=info"))]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    /// Seconds between two sweeps.
    #[clap(long, env)]
    #[arg(default_value_t = 300)]
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Seconds a single storage call may take.
    #[clap(long, env)]
    #[arg(default_value_t = 10)]
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Mariadb,
}

fn default_max_size() -> u32 {
    4
}

fn default_min_idle() -> u32 {
    1
}

fn default_rust_log() -> String {
    String::from("idp_gc=info,idp_storage=info")
}

fn default_interval() -> u64 {
    300
}

fn default_timeout() -> u64 {
    10
}

impl GcConfig {
    pub fn interval(&self) -> Result<Duration> {
        if self.interval == 0 {
            bail!("interval must be at least one second");
        }
        Ok(Duration::from_secs(self.interval))
    }

    pub fn storage(&self) -> Result<StorageConfig> {
        if self.timeout == 0 {
            bail!("timeout must be at least one second");
        }
        let backend = match self.backend {
            BackendKind::Memory => BackendConfig::Memory,
            BackendKind::Mariadb => {
                let url = match &self.database_url {
                    Some(url) => url.clone(),
                    None => bail!("database_url is required for mariadb"),
                };
                BackendConfig::Mariadb(MariaDbConfig {
                    url,
                    max_size: self.max_size,
                    min_idle: self.min_idle,
                    run_migrations: self.run_migrations,
                })
            }
        };
        Ok(StorageConfig {
            backend,
            timeout_secs: self.timeout,
        })
    }
}

pub fn load(cfg: &str) -> Result<GcConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    toml::from_str(&content).context("could not parse config file")
}
