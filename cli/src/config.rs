//! Command-line / environment configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, Args};

use richscan_core::{ProfileOverrides, ScanMode};

use crate::schedule::DailySchedule;

/// `auto` classifies the endpoint; anything else forces a mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeSetting(pub Option<ScanMode>);

impl FromStr for ModeSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self(None)),
            other => other.parse::<ScanMode>().map(|m| Self(Some(m))),
        }
    }
}

impl fmt::Display for ModeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(mode) => write!(f, "{mode}"),
            None => f.write_str("auto"),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct IndexerArgs {
    /// Base URL of the Blockbook-style indexer
    #[arg(long, env = "INDEXER_URL")]
    pub indexer_url: String,

    /// Extra indexer URLs to fail over to, comma separated
    #[arg(long = "fallback-url", env = "INDEXER_FALLBACK_URLS", value_delimiter = ',')]
    pub fallback_urls: Vec<String>,
}

impl IndexerArgs {
    /// Primary first, then fallbacks; blanks and duplicates dropped.
    pub fn endpoints(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for url in std::iter::once(&self.indexer_url).chain(&self.fallback_urls) {
            let url = url.trim();
            if !url.is_empty() && !out.iter().any(|u| u == url) {
                out.push(url.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Directory for checkpoint.json and rich-list.json
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Minimum balance (coins) for an address to be listed
    #[arg(long, env = "MIN_BALANCE", default_value_t = 1.0)]
    pub min_balance: f64,

    /// auto | aggressive | conservative
    #[arg(long = "mode", env = "SCANNER_MODE", default_value = "auto")]
    pub scanner_mode: ModeSetting,

    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<u64>,

    #[arg(long, env = "THROTTLE_DELAY_MS")]
    pub throttle_delay_ms: Option<u64>,

    #[arg(long, env = "CHECKPOINT_INTERVAL")]
    pub checkpoint_interval: Option<u64>,

    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    #[arg(long, env = "RETRY_LIMIT")]
    pub retry_limit: Option<u32>,
}

impl ScanArgs {
    pub fn overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            mode: self.scanner_mode.0,
            timeout_ms: self.timeout_ms,
            retry_limit: self.retry_limit,
            batch_size: self.batch_size,
            throttle_delay_ms: self.throttle_delay_ms,
            checkpoint_interval: self.checkpoint_interval,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the snapshot API listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3001")]
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// Daily scan time, HH:MM UTC
    #[arg(long = "schedule", env = "SCAN_SCHEDULE", default_value = "00:00")]
    pub scan_schedule: DailySchedule,

    /// Run a pass immediately at startup
    #[arg(long, env = "SCAN_ON_STARTUP", default_value_t = true, action = ArgAction::Set)]
    pub scan_on_startup: bool,
}
