//! Ledger RPC access
//!
//! Two calls are needed from the ledger: a fresh recency anchor (the
//! latest blockhash) once per submission cycle, and a raw broadcast for
//! transactions sent outside a bundle.

use crate::tx_builder::{BundleError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, signature::Signature};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Ledger collaborator
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Latest blockhash, shared by every transaction of one bundle
    async fn get_recent_anchor(&self) -> Result<Hash>;

    /// Broadcast a bincode-serialized signed transaction
    async fn broadcast_raw(&self, tx_bytes: &[u8]) -> Result<Signature>;
}

/// Ledger client backed by the Solana JSON-RPC API
pub struct RpcLedgerClient {
    rpc: RpcClient,
}

impl RpcLedgerClient {
    /// Create a client using `confirmed` commitment
    pub fn new(rpc_url: &str, request_timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                rpc_url.to_string(),
                request_timeout,
                CommitmentConfig::confirmed(),
            ),
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_recent_anchor(&self) -> Result<Hash> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| BundleError::Anchor(e.to_string()))?;
        debug!(blockhash = %blockhash, "Fetched recency anchor");
        Ok(blockhash)
    }

    async fn broadcast_raw(&self, tx_bytes: &[u8]) -> Result<Signature> {
        let params = json!([
            STANDARD.encode(tx_bytes),
            { "encoding": "base64", "preflightCommitment": "confirmed" }
        ]);
        let signature: String = self
            .rpc
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(|e| BundleError::Broadcast(e.to_string()))?;

        Signature::from_str(&signature)
            .map_err(|e| BundleError::Serialization(format!("invalid signature '{}': {}", signature, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_recent_anchor_from_rpc() {
        let mut server = mockito::Server::new_async().await;
        let blockhash = Hash::new_unique();
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "getLatestBlockhash" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "context": { "slot": 2792 },
                        "value": {
                            "blockhash": blockhash.to_string(),
                            "lastValidBlockHeight": 3090
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let ledger = RpcLedgerClient::new(&server.url(), Duration::from_secs(5));
        assert_eq!(ledger.get_recent_anchor().await.unwrap(), blockhash);
    }

    #[tokio::test]
    async fn test_broadcast_raw_returns_signature() {
        let mut server = mockito::Server::new_async().await;
        let signature = Signature::from([3u8; 64]);
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "sendTransaction" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "jsonrpc": "2.0", "id": 1, "result": signature.to_string() }).to_string(),
            )
            .create_async()
            .await;

        let ledger = RpcLedgerClient::new(&server.url(), Duration::from_secs(5));
        assert_eq!(ledger.broadcast_raw(&[1, 2, 3]).await.unwrap(), signature);
    }

    #[tokio::test]
    async fn test_anchor_failure_maps_to_anchor_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let ledger = RpcLedgerClient::new(&server.url(), Duration::from_secs(5));
        let err = ledger.get_recent_anchor().await.unwrap_err();
        assert!(matches!(err, BundleError::Anchor(_)));
    }
}
