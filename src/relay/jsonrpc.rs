//! JSON-RPC client for the block-engine bundle API
//!
//! All three calls go to `<block engine>/api/v1/bundles`:
//! - `getTipAccounts`
//! - `sendBundle` (base64-encoded transactions)
//! - `getInflightBundleStatuses`

use crate::relay::{BundleId, BundleOutcome, BundleStatus, RelayClient};
use crate::tx_builder::{Bundle, BundleError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const BUNDLES_PATH: &str = "api/v1/bundles";

/// HTTP JSON-RPC relay client
pub struct JsonRpcRelayClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

/// Failure of a single JSON-RPC call
#[derive(Debug)]
enum CallError {
    /// Network, HTTP status or decoding failure
    Transport(String),
    /// The relay answered with a JSON-RPC error object
    Rpc { code: i64, message: String },
}

impl CallError {
    fn into_relay_error(self, method: &str) -> BundleError {
        match self {
            Self::Transport(msg) => BundleError::relay(format!("{}: {}", method, msg)),
            Self::Rpc { code, message } => {
                BundleError::relay(format!("{} failed ({}): {}", method, code, message))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct InflightStatuses {
    context: Option<RpcContext>,
    value: Vec<Option<InflightStatus>>,
}

#[derive(Debug, Deserialize)]
struct RpcContext {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct InflightStatus {
    bundle_id: String,
    status: String,
    landed_slot: Option<u64>,
}

impl JsonRpcRelayClient {
    /// Create a client for the block engine at `base_url`
    ///
    /// # Errors
    ///
    /// [`BundleError::Configuration`] if the URL does not parse or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| BundleError::config(format!("invalid relay URL '{}': {}", base_url, e)))?;
        let endpoint = base
            .join(BUNDLES_PATH)
            .map_err(|e| BundleError::config(format!("invalid relay URL '{}': {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BundleError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> std::result::Result<T, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, endpoint = %self.endpoint, "Relay request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        // Relays report rejections as JSON-RPC errors, sometimes with a 4xx status
        let parsed: RpcResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(CallError::Transport(format!("malformed response: {}", e)))
            }
            Err(_) => return Err(CallError::Transport(format!("HTTP {}", status))),
        };

        if let Some(err) = parsed.error {
            return Err(CallError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| CallError::Transport("response carries neither result nor error".into()))
    }
}

fn parse_outcome(status: &str) -> Result<BundleOutcome> {
    match status {
        "Pending" => Ok(BundleOutcome::Accepted),
        "Landed" => Ok(BundleOutcome::Landed),
        "Failed" => Ok(BundleOutcome::Rejected),
        "Invalid" => Ok(BundleOutcome::Dropped),
        other => Err(BundleError::Serialization(format!(
            "unknown bundle status '{}'",
            other
        ))),
    }
}

#[async_trait]
impl RelayClient for JsonRpcRelayClient {
    async fn get_tip_accounts(&self) -> Result<Vec<Pubkey>> {
        let raw: Vec<String> = self
            .call("getTipAccounts", json!([]))
            .await
            .map_err(|e| e.into_relay_error("getTipAccounts"))?;

        raw.iter()
            .map(|s| {
                Pubkey::from_str(s).map_err(|e| {
                    BundleError::Serialization(format!("invalid tip account '{}': {}", s, e))
                })
            })
            .collect()
    }

    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleId> {
        let encoded = bundle.encode_base64()?;
        let params = json!([encoded, { "encoding": "base64" }]);

        match self.call::<String>("sendBundle", params).await {
            Ok(id) => Ok(BundleId::new(id)),
            Err(CallError::Rpc { code, message }) => {
                Err(BundleError::rejected(format!("({}) {}", code, message)))
            }
            Err(e) => Err(e.into_relay_error("sendBundle")),
        }
    }

    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> Result<Vec<BundleStatus>> {
        let params = json!([ids.iter().map(BundleId::as_str).collect::<Vec<_>>()]);
        let raw: InflightStatuses = self
            .call("getInflightBundleStatuses", params)
            .await
            .map_err(|e| e.into_relay_error("getInflightBundleStatuses"))?;

        let context_slot = raw.context.map(|c| c.slot);
        raw.value
            .into_iter()
            .flatten()
            .map(|s| {
                Ok(BundleStatus {
                    outcome: parse_outcome(&s.status)?,
                    bundle_id: BundleId::new(s.bundle_id),
                    landed_slot: s.landed_slot,
                    context_slot,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use solana_sdk::{hash::Hash, signature::Keypair};

    fn client_for(server: &mockito::ServerGuard) -> JsonRpcRelayClient {
        JsonRpcRelayClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    fn sample_bundle() -> Bundle {
        let signer = Keypair::new();
        let tx = crate::tx_builder::build_payload_transaction(
            &signer,
            b"note",
            Hash::new_unique(),
            None,
        )
        .unwrap();
        crate::tx_builder::assemble_bundle(vec![tx], 5).unwrap()
    }

    #[test]
    fn test_endpoint_joins_bundles_path() {
        let client =
            JsonRpcRelayClient::new("https://relay.example.com", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://relay.example.com/api/v1/bundles"
        );
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = JsonRpcRelayClient::new("not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, BundleError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_get_tip_accounts() {
        let mut server = mockito::Server::new_async().await;
        let accounts = [Pubkey::new_unique(), Pubkey::new_unique()];
        let mock = server
            .mock("POST", "/api/v1/bundles")
            .match_body(Matcher::PartialJson(json!({ "method": "getTipAccounts" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": [accounts[0].to_string(), accounts[1].to_string()],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let tip_accounts = client_for(&server).get_tip_accounts().await.unwrap();
        assert_eq!(tip_accounts, accounts.to_vec());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_bundle_returns_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/bundles")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "method": "sendBundle" })),
                Matcher::Regex(r#"\{"encoding":"base64"\}"#.to_string()),
            ]))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"b1d2"}"#)
            .create_async()
            .await;

        let id = client_for(&server).send_bundle(&sample_bundle()).await.unwrap();
        assert_eq!(id, BundleId::new("b1d2"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_bundle_rpc_error_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .with_status(400)
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bundle contains an expired blockhash"}}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .send_bundle(&sample_bundle())
            .await
            .unwrap_err();
        match err {
            BundleError::SubmissionRejected(msg) => assert!(msg.contains("expired blockhash")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_bundle_http_failure_is_relay_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let err = client_for(&server)
            .send_bundle(&sample_bundle())
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::Relay(_)));
    }

    #[tokio::test]
    async fn test_inflight_statuses_are_mapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .match_body(Matcher::PartialJson(json!({
                "method": "getInflightBundleStatuses",
                "params": [["a", "b", "c"]],
            })))
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "context": { "slot": 280999028 },
                        "value": [
                            { "bundle_id": "a", "status": "Pending", "landed_slot": null },
                            { "bundle_id": "b", "status": "Landed", "landed_slot": 280999027 },
                            null,
                        ],
                    },
                })
                .to_string(),
            )
            .create_async()
            .await;

        let ids = [BundleId::new("a"), BundleId::new("b"), BundleId::new("c")];
        let statuses = client_for(&server).get_bundle_statuses(&ids).await.unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].outcome, BundleOutcome::Accepted);
        assert_eq!(statuses[1].outcome, BundleOutcome::Landed);
        assert_eq!(statuses[1].landed_slot, Some(280999027));
        assert_eq!(statuses[1].context_slot, Some(280999028));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(parse_outcome("Failed").unwrap(), BundleOutcome::Rejected);
        assert_eq!(parse_outcome("Invalid").unwrap(), BundleOutcome::Dropped);
        assert!(parse_outcome("Exploded").is_err());
    }
}
