//! Transfer thresholds

use std::time::Duration;

use crate::amount::Amount;
use crate::config::TransferConfig;
use crate::error::{Error, Result};

/// How balances leave the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Sweep every address once the available total reaches the minimum
    SweepAll,
    /// Per-address transfers capped at the maximum, keeping a reserve
    Capped,
}

/// Validated, immutable transfer settings
#[derive(Debug, Clone)]
pub struct TransferPolicy {
    pub address: String,
    pub min_amount: Amount,
    pub max_amount: Option<Amount>,
    pub interval: Duration,
    pub immediate: bool,
    pub confirmation_poll_interval: Duration,
    /// `None` waits for confirmation forever (or until cancelled)
    pub confirmation_timeout: Option<Duration>,
}

impl TransferPolicy {
    /// Validate raw smallest-unit amounts into a policy
    pub fn new(
        address: impl Into<String>,
        min_amount: &str,
        max_amount: Option<&str>,
        interval: Duration,
    ) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(Error::Config("transfer address is empty".to_string()));
        }

        let min_amount = Amount::parse_raw(min_amount)?;
        let max_amount = max_amount.map(Amount::parse_raw).transpose()?;
        if let Some(max) = &max_amount {
            if max < &min_amount {
                return Err(Error::InvalidAmount(format!(
                    "maximum transfer {} is lower than minimum {}",
                    max, min_amount
                )));
            }
        }

        Ok(Self {
            address,
            min_amount,
            max_amount,
            interval,
            immediate: false,
            confirmation_poll_interval: Duration::from_secs(1),
            confirmation_timeout: None,
        })
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self> {
        let mut policy = Self::new(
            config.address.clone(),
            &config.min_amount,
            config.max_amount.as_deref(),
            Duration::from_secs(config.interval_secs),
        )?;
        policy.immediate = config.immediate;
        policy.confirmation_poll_interval = Duration::from_millis(config.confirmation_poll_ms);
        policy.confirmation_timeout = config.confirmation_timeout_secs.map(Duration::from_secs);
        Ok(policy)
    }

    pub fn mode(&self) -> TransferMode {
        if self.max_amount.is_some() {
            TransferMode::Capped
        } else {
            TransferMode::SweepAll
        }
    }
}

/// Amount to move out of `balance`, zero when nothing should move
///
/// With a maximum: only once `balance >= 2 * min`, then
/// `min(balance - min, max)`, so at least `min` always stays behind.
/// Without a maximum: the whole balance once it reaches `min`.
pub fn round_amount(balance: &Amount, min: &Amount, max: Option<&Amount>) -> Amount {
    match max {
        Some(max) => {
            if balance < &min.multiply(2) {
                return Amount::zero();
            }
            let amount = balance.subtract(min);
            if &amount > max {
                max.clone()
            } else {
                amount
            }
        }
        None => {
            if balance >= min {
                balance.clone()
            } else {
                Amount::zero()
            }
        }
    }
}
