use serde::{Deserialize, Serialize};
use std::fs;

use crate::core_types::Cents;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    #[serde(default)]
    pub credit: CreditConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub market: MarketConfig,
    /// PostgreSQL connection URL for the production store adapter
    #[serde(default)]
    pub postgres_url: Option<String>,
}

/// Credit feed tuning: debounce for coalescing change bursts, fallback
/// poll cadence, per-fetch timeout.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreditConfig {
    pub debounce_ms: u64,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            poll_interval_secs: 15,
            fetch_timeout_secs: 5,
        }
    }
}

/// Simulated trading bot knobs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    pub symbol: String,
    pub cadence_secs: u64,
    pub jitter_secs: u64,
    /// Skip the cycle when the balance is below this
    pub min_trade_cents: Cents,
    /// Stake per cycle, in basis points of the current balance
    pub stake_bps: u32,
    /// Cap on a single stake
    pub max_stake_cents: Cents,
    /// Fixed profit applied to each buy/sell pair, in basis points
    pub profit_rate_bps: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-EUR".to_string(),
            cadence_secs: 30,
            jitter_secs: 10,
            min_trade_cents: 1_000,
            stake_bps: 1_000, // 10% of balance
            max_stake_cents: 50_000,
            profit_rate_bps: 180, // 1.8% per cycle
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AffiliateConfig {
    pub inviter_bonus_cents: Cents,
    pub invited_bonus_cents: Cents,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            inviter_bonus_cents: 5_000,
            invited_bonus_cents: 2_500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FundingConfig {
    pub min_withdrawal_cents: Cents,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            min_withdrawal_cents: 2_000,
        }
    }
}

/// Market data feed selection. When `ws_url` is empty the simulated feed
/// is used (demo and tests).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MarketConfig {
    pub ws_url: String,
    pub rest_snapshot_url: String,
    pub reconnect_max_backoff_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            rest_snapshot_url: String::new(),
            reconnect_max_backoff_secs: 60,
        }
    }
}

impl Default for AppConfig {
    /// In-process defaults, used by tests and the demo seed path.
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "altivest.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: false,
            credit: CreditConfig::default(),
            bot: BotConfig::default(),
            affiliate: AffiliateConfig::default(),
            funding: FundingConfig::default(),
            market: MarketConfig::default(),
            postgres_url: None,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}
