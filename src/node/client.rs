//! HTTP client for the full node REST API
//!
//! Failures are classified here, once, so nothing upstream has to look at
//! error text:
//! - transport failures and timeouts become `RemoteUnavailable`
//! - HTTP 404 becomes `NotFound`
//! - a 400/404 on `GET /miners/addresses` becomes `MinerAddressesUnset`
//! - any other non-2xx becomes `Api { status, detail }`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use super::types::*;
use super::NodeClient;
use crate::amount::Amount;
use crate::config::NodeConfig;
use crate::error::{Error, Result};

const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWalletRequest<'a> {
    password: &'a str,
    wallet_name: &'a str,
    is_miner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mnemonic_passphrase: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RestoreWalletRequest<'a> {
    password: &'a str,
    mnemonic: &'a str,
    wallet_name: &'a str,
    is_miner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mnemonic_passphrase: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreWalletResponse {
    wallet_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlockWalletRequest<'a> {
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mnemonic_passphrase: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WalletAddressEntry {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletAddressesResponse {
    active_address: String,
    addresses: Vec<WalletAddressEntry>,
}

#[derive(Debug, Serialize)]
struct ChangeActiveAddressRequest<'a> {
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct WalletBalancesResponse {
    balances: Vec<AddressAmount>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MinerAddresses {
    addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Destination<'a> {
    address: &'a str,
    atto_alph_amount: &'a Amount,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    destinations: Vec<Destination<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SweepRequest<'a> {
    to_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct SweepResponse {
    results: Vec<TxResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum TxStatusResponse {
    #[serde(rename_all = "camelCase")]
    Confirmed { block_hash: String },
    MemPooled,
    TxNotFound,
}

impl From<TxStatusResponse> for TxStatus {
    fn from(response: TxStatusResponse) -> Self {
        match response {
            TxStatusResponse::Confirmed { block_hash } => TxStatus::confirmed(block_hash),
            TxStatusResponse::MemPooled | TxStatusResponse::TxNotFound => TxStatus::pending(),
        }
    }
}

/// Error body returned by the node
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: String,
}

/// Full node REST client
pub struct HttpNodeClient {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpNodeClient {
    /// Create a client for the node at `endpoint`
    ///
    /// # Arguments
    /// * `endpoint` - Base URL, e.g. `http://alephium:12973`
    /// * `api_key` - Sent as `X-API-KEY` when present
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base = endpoint.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| Error::Config(format!("Invalid node endpoint {}: {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        Self::new(
            &config.endpoint,
            Some(config.api_key.clone()),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base
            .join(path)
            .map_err(|e| Error::Internal(format!("Bad API path {}: {}", path, e)))?;
        trace!("{} {}", method, url);

        let builder = self.client.request(method, url);
        Ok(match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        })
    }

    /// Map a non-2xx response onto the error taxonomy
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.detail)
            .unwrap_or(body);
        debug!("Node answered {}: {}", status, detail);

        if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(detail))
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                detail,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse node response: {}", e)))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn list_wallets(&self) -> Result<Vec<WalletInfo>> {
        self.send_json(self.request(Method::GET, "wallets")?).await
    }

    async fn wallet_status(&self, name: &str) -> Result<WalletInfo> {
        self.send_json(self.request(Method::GET, &format!("wallets/{}", name))?)
            .await
    }

    async fn create_wallet(
        &self,
        name: &str,
        password: &str,
        is_miner: bool,
        passphrase: Option<&str>,
    ) -> Result<WalletCreated> {
        let body = CreateWalletRequest {
            password,
            wallet_name: name,
            is_miner,
            mnemonic_passphrase: passphrase,
        };
        self.send_json(self.request(Method::POST, "wallets")?.json(&body))
            .await
    }

    async fn restore_wallet(
        &self,
        password: &str,
        mnemonic: &str,
        name: &str,
        is_miner: bool,
        passphrase: Option<&str>,
    ) -> Result<WalletInfo> {
        let body = RestoreWalletRequest {
            password,
            mnemonic,
            wallet_name: name,
            is_miner,
            mnemonic_passphrase: passphrase,
        };
        let restored: RestoreWalletResponse = self
            .send_json(self.request(Method::PUT, "wallets")?.json(&body))
            .await?;
        self.wallet_status(&restored.wallet_name).await
    }

    async fn unlock_wallet(&self, name: &str, password: &str, passphrase: Option<&str>) -> Result<()> {
        let body = UnlockWalletRequest {
            password,
            mnemonic_passphrase: passphrase,
        };
        self.send_empty(
            self.request(Method::POST, &format!("wallets/{}/unlock", name))?
                .json(&body),
        )
        .await
    }

    async fn wallet_addresses(&self, name: &str) -> Result<WalletAddresses> {
        let response: WalletAddressesResponse = self
            .send_json(self.request(Method::GET, &format!("wallets/{}/addresses", name))?)
            .await?;
        Ok(WalletAddresses {
            active_address: response.active_address,
            addresses: response.addresses.into_iter().map(|a| a.address).collect(),
        })
    }

    async fn change_active_address(&self, name: &str, address: &str) -> Result<()> {
        self.send_empty(
            self.request(Method::POST, &format!("wallets/{}/change-active-address", name))?
                .json(&ChangeActiveAddressRequest { address }),
        )
        .await
    }

    async fn wallet_balances(&self, name: &str) -> Result<Vec<AddressAmount>> {
        let response: WalletBalancesResponse = self
            .send_json(self.request(Method::GET, &format!("wallets/{}/balances", name))?)
            .await?;
        Ok(response.balances)
    }

    async fn miner_addresses(&self) -> Result<Vec<String>> {
        let result: Result<MinerAddresses> = self
            .send_json(self.request(Method::GET, "miners/addresses")?)
            .await;
        match result {
            Ok(miners) => Ok(miners.addresses),
            Err(Error::NotFound(_)) | Err(Error::Api { status: 400, .. }) => {
                Err(Error::MinerAddressesUnset)
            }
            Err(e) => Err(e),
        }
    }

    async fn set_miner_addresses(&self, addresses: &[String]) -> Result<()> {
        let body = MinerAddresses {
            addresses: addresses.to_vec(),
        };
        self.send_empty(self.request(Method::PUT, "miners/addresses")?.json(&body))
            .await
    }

    async fn node_is_mining(&self) -> Result<bool> {
        self.send_json(self.request(Method::GET, "miners/cpu-mining")?)
            .await
    }

    async fn start_mining(&self) -> Result<()> {
        self.send_empty(
            self.request(Method::POST, "miners/cpu-mining")?
                .query(&[("action", "start-mining")]),
        )
        .await
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance> {
        self.send_json(self.request(Method::GET, &format!("addresses/{}/balance", address))?)
            .await
    }

    async fn transfer(&self, wallet: &str, to: &str, amount: &Amount) -> Result<TxResult> {
        let body = TransferRequest {
            destinations: vec![Destination {
                address: to,
                atto_alph_amount: amount,
            }],
        };
        self.send_json(
            self.request(Method::POST, &format!("wallets/{}/transfer", wallet))?
                .json(&body),
        )
        .await
    }

    async fn sweep_all(&self, wallet: &str, to: &str) -> Result<Vec<TxResult>> {
        let response: SweepResponse = self
            .send_json(
                self.request(Method::POST, &format!("wallets/{}/sweep-all-addresses", wallet))?
                    .json(&SweepRequest { to_address: to }),
            )
            .await?;
        Ok(response.results)
    }

    async fn transaction_status(&self, tx_id: &str, from_group: u32, to_group: u32) -> Result<TxStatus> {
        let response: TxStatusResponse = self
            .send_json(self.request(Method::GET, "transactions/status")?.query(&[
                ("txId", tx_id.to_string()),
                ("fromGroup", from_group.to_string()),
                ("toGroup", to_group.to_string()),
            ]))
            .await?;
        Ok(response.into())
    }

    async fn inter_clique_peer_info(&self) -> Result<Vec<PeerInfo>> {
        self.send_json(self.request(Method::GET, "infos/inter-clique-peer-info")?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_serialization() {
        let amount = Amount::parse_display("15").unwrap();
        let body = TransferRequest {
            destinations: vec![Destination {
                address: "1Dest",
                atto_alph_amount: &amount,
            }],
        };

        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"destinations":[{"address":"1Dest","attoAlphAmount":"15000000000000000000"}]}"#
        );
    }

    #[test]
    fn test_create_wallet_omits_empty_passphrase() {
        let body = CreateWalletRequest {
            password: "pw",
            wallet_name: "miner",
            is_miner: true,
            mnemonic_passphrase: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"isMiner\":true"));
        assert!(!json.contains("mnemonicPassphrase"));
    }

    #[test]
    fn test_tx_status_variants() {
        let confirmed: TxStatusResponse = serde_json::from_str(
            r#"{"type":"Confirmed","blockHash":"00ab","txIndex":0,"chainConfirmations":1,"fromGroupConfirmations":1,"toGroupConfirmations":1}"#,
        )
        .unwrap();
        assert_eq!(TxStatus::from(confirmed), TxStatus::confirmed("00ab"));

        let pooled: TxStatusResponse = serde_json::from_str(r#"{"type":"MemPooled"}"#).unwrap();
        assert_eq!(TxStatus::from(pooled).confirmed, None);
    }

    #[test]
    fn test_sweep_response() {
        let response: SweepResponse = serde_json::from_str(
            r#"{"results":[{"txId":"tx1","fromGroup":0,"toGroup":2}]}"#,
        )
        .unwrap();
        assert_eq!(
            response.results,
            vec![TxResult {
                tx_id: "tx1".to_string(),
                from_group: 0,
                to_group: 2
            }]
        );
    }

    #[test]
    fn test_endpoint_keeps_path_prefix() {
        let client =
            HttpNodeClient::new("http://node:12973/api", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.base.join("wallets").unwrap().as_str(),
            "http://node:12973/api/wallets"
        );
        assert!(HttpNodeClient::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_empty_api_key_is_dropped() {
        let client = HttpNodeClient::new(
            "http://node:12973",
            Some(String::new()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(client.api_key.is_none());
    }
}
