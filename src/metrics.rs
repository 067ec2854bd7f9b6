//! Process metrics
//!
//! A small registry of the counters and per-address gauges the companion
//! publishes, rendered in the Prometheus text format by the HTTP server.
//! Every method takes `&self`; the registry is shared as `Arc<Metrics>`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use crate::amount::Amount;
use crate::config::MetricsConfig;
use crate::node::AddressBalance;

pub struct Metrics {
    prefix: String,
    transfer_runs: AtomicU64,
    transfer_amount: Mutex<Amount>,
    total_balance: DashMap<String, f64>,
    locked_balance: DashMap<String, f64>,
    utxo_count: DashMap<String, u64>,
}

impl Metrics {
    pub fn new(namespace: &str, subsystem: &str) -> Self {
        let prefix = [namespace, subsystem]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_");

        Self {
            prefix,
            transfer_runs: AtomicU64::new(0),
            transfer_amount: Mutex::new(Amount::zero()),
            total_balance: DashMap::new(),
            locked_balance: DashMap::new(),
            utxo_count: DashMap::new(),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(&config.namespace, &config.subsystem)
    }

    pub fn inc_transfer_runs(&self) {
        self.transfer_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_runs(&self) -> u64 {
        self.transfer_runs.load(Ordering::Relaxed)
    }

    pub fn add_transferred(&self, amount: &Amount) {
        let mut total = self
            .transfer_amount
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *total = total.add(amount);
    }

    pub fn transferred(&self) -> Amount {
        self.transfer_amount
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_address_balance(&self, address: &str, balance: &AddressBalance) {
        self.total_balance
            .insert(address.to_string(), balance.balance.as_alph_f64());
        self.locked_balance
            .insert(address.to_string(), balance.locked_balance.as_alph_f64());
        self.utxo_count
            .insert(address.to_string(), balance.utxo_count);
    }

    pub fn total_balance(&self, address: &str) -> Option<f64> {
        self.total_balance.get(address).map(|v| *v)
    }

    pub fn locked_balance(&self, address: &str) -> Option<f64> {
        self.locked_balance.get(address).map(|v| *v)
    }

    pub fn utxo_count(&self, address: &str) -> Option<u64> {
        self.utxo_count.get(address).map(|v| *v)
    }

    fn name(&self, metric: &str) -> String {
        if self.prefix.is_empty() {
            metric.to_string()
        } else {
            format!("{}_{}", self.prefix, metric)
        }
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> String {
        let mut out = String::new();

        let runs = self.name("transfer_runs_count");
        let _ = writeln!(out, "# HELP {} Number of transfer runs", runs);
        let _ = writeln!(out, "# TYPE {} counter", runs);
        let _ = writeln!(out, "{} {}", runs, self.transfer_runs());

        let amount = self.name("transfer_amount_total");
        let _ = writeln!(out, "# HELP {} Amount transferred", amount);
        let _ = writeln!(out, "# TYPE {} counter", amount);
        let _ = writeln!(out, "{} {}", amount, self.transferred().to_decimal_string());

        render_gauge(&mut out, &self.name("total_balance"), "Total balance of the address", &self.total_balance);
        render_gauge(&mut out, &self.name("locked_balance"), "Locked balance of the address", &self.locked_balance);
        render_gauge(&mut out, &self.name("utxo_count"), "Number of UTXOs of the address", &self.utxo_count);

        out
    }
}

fn render_gauge<V: Copy + std::fmt::Display>(
    out: &mut String,
    name: &str,
    help: &str,
    values: &DashMap<String, V>,
) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} gauge", name);

    let mut rows: Vec<(String, V)> = values
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    for (address, value) in rows {
        let _ = writeln!(out, "{}{{address=\"{}\"}} {}", name, address, value);
    }
}
