//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::amount::Amount;

/// Password shipped as default; accepted, but loudly
pub const DEFAULT_WALLET_PASSWORD: &str = "Default-Password-1234";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Local HTTP listener (health, metrics, log level)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_node_endpoint(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_name")]
    pub name: String,
    #[serde(default = "default_wallet_password")]
    pub password: String,
    /// Restore from this mnemonic when the wallet does not exist yet
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default)]
    pub mnemonic_passphrase: String,
    /// Log the mnemonic of a freshly created wallet once
    #[serde(default)]
    pub print_mnemonic: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            name: default_wallet_name(),
            password: default_wallet_password(),
            mnemonic: String::new(),
            mnemonic_passphrase: String::new(),
            print_mnemonic: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Destination of the sweeps; transfers are disabled when empty
    #[serde(default)]
    pub address: String,
    /// Smallest-unit integer
    #[serde(default = "default_min_amount")]
    pub min_amount: String,
    /// Smallest-unit integer; switches from sweep-all to capped transfers
    #[serde(default)]
    pub max_amount: Option<String>,
    #[serde(default = "default_transfer_interval_secs")]
    pub interval_secs: u64,
    /// Run one evaluation before the first tick
    #[serde(default)]
    pub immediate: bool,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
    /// Unbounded when absent
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            min_amount: default_min_amount(),
            max_amount: None,
            interval_secs: default_transfer_interval_secs(),
            immediate: false,
            confirmation_poll_ms: default_confirmation_poll_ms(),
            confirmation_timeout_secs: None,
        }
    }
}

impl TransferConfig {
    pub fn enabled(&self) -> bool {
        !self.address.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MiningConfig {
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_sync_poll_interval_ms")]
    pub sync_poll_interval_ms: u64,
    /// Ask the node to start CPU mining when it is not mining
    #[serde(default)]
    pub auto_start: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            sync_poll_interval_ms: default_sync_poll_interval_ms(),
            auto_start: false,
        }
    }
}

impl MiningConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_balance_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_balance_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_namespace")]
    pub namespace: String,
    #[serde(default = "default_metrics_subsystem")]
    pub subsystem: String,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_metrics_namespace(),
            subsystem: default_metrics_subsystem(),
            path: default_metrics_path(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_node_endpoint() -> String {
    "http://alephium:12973".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_wallet_name() -> String {
    "mining-companion-wallet-1".to_string()
}

fn default_wallet_password() -> String {
    DEFAULT_WALLET_PASSWORD.to_string()
}

fn default_min_amount() -> String {
    "20000000000000000000".to_string()
}

fn default_transfer_interval_secs() -> u64 {
    15 * 60
}

fn default_confirmation_poll_ms() -> u64 {
    1_000
}

fn default_reconcile_interval_secs() -> u64 {
    5 * 60
}

fn default_sync_poll_interval_ms() -> u64 {
    5_000
}

fn default_balance_poll_interval_secs() -> u64 {
    60
}

fn default_metrics_namespace() -> String {
    "alephium".to_string()
}

fn default_metrics_subsystem() -> String {
    "miningcompanion".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables, e.g. COMPANION_TRANSFER__ADDRESS
            .add_source(
                config::Environment::with_prefix("COMPANION")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.wallet.name.is_empty() || self.wallet.password.is_empty() {
            anyhow::bail!("wallet.name and wallet.password are mandatory");
        }

        if self.node.endpoint.is_empty() {
            anyhow::bail!("node.endpoint is mandatory");
        }

        if self.node.timeout_ms == 0 {
            anyhow::bail!("node.timeout_ms must be greater than 0");
        }

        for (name, value) in [
            ("transfer.interval_secs", self.transfer.interval_secs),
            ("transfer.confirmation_poll_ms", self.transfer.confirmation_poll_ms),
            ("mining.reconcile_interval_secs", self.mining.reconcile_interval_secs),
            ("mining.sync_poll_interval_ms", self.mining.sync_poll_interval_ms),
            ("balance.poll_interval_secs", self.balance.poll_interval_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        let min = Amount::parse_raw(&self.transfer.min_amount)
            .context("transfer.min_amount must be an integer amount in smallest units")?;
        if let Some(max) = &self.transfer.max_amount {
            let max = Amount::parse_raw(max)
                .context("transfer.max_amount must be an integer amount in smallest units")?;
            if max < min {
                anyhow::bail!(
                    "transfer.max_amount ({}) is lower than transfer.min_amount ({})",
                    max,
                    min
                );
            }
        }

        if !self.metrics.path.starts_with('/') {
            anyhow::bail!("metrics.path must start with '/': {}", self.metrics.path);
        }

        if self.wallet.password == DEFAULT_WALLET_PASSWORD {
            tracing::warn!(
                "You are using the default wallet password. This is not recommended for production use."
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Server:
    port: {}
    log_level: {}
  Node:
    endpoint: {}
    api_key: {}
    timeout: {}ms
  Wallet:
    name: {}
    password: {}
    mnemonic: {}
    mnemonic_passphrase: {}
  Transfer:
    address: {}
    min_amount: {}
    max_amount: {}
    interval: {}s
    immediate: {}
  Mining:
    reconcile_interval: {}s
    sync_poll_interval: {}ms
    auto_start: {}
  Metrics:
    {}_{} at {}
"#,
            self.server.port,
            self.server.log_level,
            mask_url(&self.node.endpoint),
            mask_secret(&self.node.api_key),
            self.node.timeout_ms,
            self.wallet.name,
            mask_secret(&self.wallet.password),
            mask_secret(&self.wallet.mnemonic),
            mask_secret(&self.wallet.mnemonic_passphrase),
            if self.transfer.enabled() {
                self.transfer.address.as_str()
            } else {
                "(disabled)"
            },
            self.transfer.min_amount,
            self.transfer.max_amount.as_deref().unwrap_or("(sweep all)"),
            self.transfer.interval_secs,
            self.transfer.immediate,
            self.mining.reconcile_interval_secs,
            self.mining.sync_poll_interval_ms,
            self.mining.auto_start,
            self.metrics.namespace,
            self.metrics.subsystem,
            self.metrics.path,
        )
    }
}

fn mask_secret(value: &str) -> &'static str {
    if value.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
