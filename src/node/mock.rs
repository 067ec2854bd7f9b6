//! Scripted in-memory node for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::types::*;
use super::NodeClient;
use crate::amount::Amount;
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MockState {
    pub wallets: Vec<WalletInfo>,
    pub mnemonic: String,
    pub wallet_addresses: Vec<String>,
    pub active_address: String,
    /// `None` means the node has no miner addresses configured
    pub miner_addresses: Option<Vec<String>>,
    pub balances: HashMap<String, AddressBalance>,
    /// Successive peer-info answers; the last one repeats
    pub peer_answers: VecDeque<Vec<PeerInfo>>,
    pub mining: bool,
    /// Status polls answered "pending" before a tx shows as confirmed
    pub pending_polls: u32,
    /// Sweep results returned by `sweep_all`
    pub sweep_results: Vec<TxResult>,
    /// (from address, amount) of every `transfer`
    pub transfers: Vec<(String, Amount)>,
    /// Operations that fail with `RemoteUnavailable`
    pub failing: HashSet<&'static str>,
}

struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[derive(Default)]
pub struct MockNode {
    pub state: Mutex<MockState>,
    calls: Mutex<Vec<&'static str>>,
    wallet_status_gate: Mutex<Option<Gate>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node holding one unlocked wallet called `name`
    pub fn with_wallet(name: &str, locked: bool) -> Self {
        let node = Self::new();
        node.state.lock().unwrap().wallets.push(WalletInfo {
            name: name.to_string(),
            locked,
        });
        node
    }

    pub fn set_balance(&self, address: &str, balance: Amount, locked: Amount, utxos: u64) {
        let mut state = self.state.lock().unwrap();
        if !state.wallet_addresses.iter().any(|a| a == address) {
            state.wallet_addresses.push(address.to_string());
        }
        if state.active_address.is_empty() {
            state.active_address = address.to_string();
        }
        state.balances.insert(
            address.to_string(),
            AddressBalance {
                balance,
                locked_balance: locked,
                utxo_count: utxos,
            },
        );
    }

    pub fn fail(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    /// Park the next `wallet_status` call until `release` is notified.
    /// Returns `(entered, release)`.
    pub fn block_wallet_status(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.wallet_status_gate.lock().unwrap() = Some(Gate {
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        if self.state.lock().unwrap().failing.contains(op) {
            return Err(Error::RemoteUnavailable(format!("{} failed", op)));
        }
        Ok(())
    }

    fn find_wallet(&self, name: &str) -> Result<WalletInfo> {
        self.state
            .lock()
            .unwrap()
            .wallets
            .iter()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("wallet {}", name)))
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn list_wallets(&self) -> Result<Vec<WalletInfo>> {
        self.enter("list_wallets")?;
        Ok(self.state.lock().unwrap().wallets.clone())
    }

    async fn wallet_status(&self, name: &str) -> Result<WalletInfo> {
        self.enter("wallet_status")?;
        let gate = self.wallet_status_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.find_wallet(name)
    }

    async fn create_wallet(
        &self,
        name: &str,
        _password: &str,
        _is_miner: bool,
        _passphrase: Option<&str>,
    ) -> Result<WalletCreated> {
        self.enter("create_wallet")?;
        let mut state = self.state.lock().unwrap();
        state.wallets.push(WalletInfo {
            name: name.to_string(),
            locked: true,
        });
        Ok(WalletCreated {
            name: name.to_string(),
            mnemonic: state.mnemonic.clone(),
        })
    }

    async fn restore_wallet(
        &self,
        _password: &str,
        mnemonic: &str,
        name: &str,
        _is_miner: bool,
        _passphrase: Option<&str>,
    ) -> Result<WalletInfo> {
        self.enter("restore_wallet")?;
        let wallet = WalletInfo {
            name: name.to_string(),
            locked: true,
        };
        let mut state = self.state.lock().unwrap();
        state.mnemonic = mnemonic.to_string();
        state.wallets.push(wallet.clone());
        Ok(wallet)
    }

    async fn unlock_wallet(&self, name: &str, _password: &str, _passphrase: Option<&str>) -> Result<()> {
        self.enter("unlock_wallet")?;
        let mut state = self.state.lock().unwrap();
        let wallet = state
            .wallets
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or_else(|| Error::NotFound(format!("wallet {}", name)))?;
        wallet.locked = false;
        Ok(())
    }

    async fn wallet_addresses(&self, _name: &str) -> Result<WalletAddresses> {
        self.enter("wallet_addresses")?;
        let state = self.state.lock().unwrap();
        Ok(WalletAddresses {
            active_address: state.active_address.clone(),
            addresses: state.wallet_addresses.clone(),
        })
    }

    async fn change_active_address(&self, _name: &str, address: &str) -> Result<()> {
        self.enter("change_active_address")?;
        self.state.lock().unwrap().active_address = address.to_string();
        Ok(())
    }

    async fn wallet_balances(&self, _name: &str) -> Result<Vec<AddressAmount>> {
        self.enter("wallet_balances")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .wallet_addresses
            .iter()
            .filter_map(|address| {
                state.balances.get(address).map(|b| AddressAmount {
                    address: address.clone(),
                    balance: b.balance.clone(),
                })
            })
            .collect())
    }

    async fn miner_addresses(&self) -> Result<Vec<String>> {
        self.enter("miner_addresses")?;
        self.state
            .lock()
            .unwrap()
            .miner_addresses
            .clone()
            .ok_or(Error::MinerAddressesUnset)
    }

    async fn set_miner_addresses(&self, addresses: &[String]) -> Result<()> {
        self.enter("set_miner_addresses")?;
        self.state.lock().unwrap().miner_addresses = Some(addresses.to_vec());
        Ok(())
    }

    async fn node_is_mining(&self) -> Result<bool> {
        self.enter("node_is_mining")?;
        Ok(self.state.lock().unwrap().mining)
    }

    async fn start_mining(&self) -> Result<()> {
        self.enter("start_mining")?;
        self.state.lock().unwrap().mining = true;
        Ok(())
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance> {
        self.enter("address_balance")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(address)
            .cloned()
            .unwrap_or(AddressBalance {
                balance: Amount::zero(),
                locked_balance: Amount::zero(),
                utxo_count: 0,
            }))
    }

    async fn transfer(&self, _wallet: &str, _to: &str, amount: &Amount) -> Result<TxResult> {
        self.enter("transfer")?;
        let mut state = self.state.lock().unwrap();
        let from = state.active_address.clone();
        state.transfers.push((from, amount.clone()));
        Ok(TxResult {
            tx_id: format!("tx-{}", state.transfers.len()),
            from_group: 0,
            to_group: 1,
        })
    }

    async fn sweep_all(&self, _wallet: &str, _to: &str) -> Result<Vec<TxResult>> {
        self.enter("sweep_all")?;
        Ok(self.state.lock().unwrap().sweep_results.clone())
    }

    async fn transaction_status(&self, tx_id: &str, _from_group: u32, _to_group: u32) -> Result<TxStatus> {
        self.enter("transaction_status")?;
        let mut state = self.state.lock().unwrap();
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(TxStatus::pending());
        }
        Ok(TxStatus::confirmed(format!("block-of-{}", tx_id)))
    }

    async fn inter_clique_peer_info(&self) -> Result<Vec<PeerInfo>> {
        self.enter("inter_clique_peer_info")?;
        let mut state = self.state.lock().unwrap();
        if state.peer_answers.len() > 1 {
            Ok(state.peer_answers.pop_front().unwrap_or_default())
        } else {
            Ok(state.peer_answers.front().cloned().unwrap_or_default())
        }
    }
}
