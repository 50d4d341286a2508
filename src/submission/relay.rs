//! Private-relay HTTP client.
//!
//! No teacher counterpart — the teacher only ever posts Discord webhooks
//! over `reqwest` (see `telemetry`'s predecessor in the original crate).
//! This reuses that same `reqwest::Client` dependency for a
//! Flashbots-compatible `eth_sendBundle` JSON-RPC call instead, auth-signed
//! per spec.md §6: "an ECDSA signature over the request body using a
//! dedicated signing key distinct from the wallet key" — the
//! `X-Flashbots-Signature: <address>:<signature>` header convention.

use crate::error::{EngineError, EngineResult};
use alloy::primitives::keccak256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use serde_json::{json, Value};

pub struct RelayClient {
    http: reqwest::Client,
    relay_url: String,
    signer: PrivateKeySigner,
}

impl RelayClient {
    pub fn new(relay_url: String, signing_key: &str) -> EngineResult<Self> {
        let signer: PrivateKeySigner = signing_key
            .parse()
            .map_err(|e| EngineError::MissingSecret(format!("invalid relay signing key: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            relay_url,
            signer,
        })
    }

    /// Signs `body` the Flashbots way: the hex-encoded keccak256 digest of
    /// the raw body bytes, signed as an EIP-191 personal message, rendered
    /// as `<signer-address>:<signature>`.
    async fn auth_header(&self, body: &[u8]) -> EngineResult<String> {
        let digest = keccak256(body);
        let digest_hex = format!("0x{}", alloy::primitives::hex::encode(digest));
        let signature = self
            .signer
            .sign_message(digest_hex.as_bytes())
            .await
            .map_err(|e| EngineError::SubmissionFailed(format!("relay auth signing failed: {e}")))?;
        Ok(format!(
            "{}:0x{}",
            self.signer.address(),
            alloy::primitives::hex::encode(signature.as_bytes())
        ))
    }

    async fn post(&self, method: &str, params: Value) -> EngineResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        });
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|e| EngineError::SubmissionFailed(format!("encoding relay request: {e}")))?;
        let auth = self.auth_header(&body_bytes).await?;

        let resp = self
            .http
            .post(&self.relay_url)
            .header("X-Flashbots-Signature", auth)
            .header("Content-Type", "application/json")
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| EngineError::SubmissionFailed(format!("relay request failed: {e}")))?;

        resp.json::<Value>()
            .await
            .map_err(|e| EngineError::SubmissionFailed(format!("relay response decode failed: {e}")))
    }

    /// `eth_sendBundle`: submits the signed raw transaction targeted at
    /// `target_block`. Returns the relay's opaque bundle id.
    pub async fn submit_bundle(&self, raw_transaction_hex: &str, target_block: u64) -> EngineResult<String> {
        let params = json!({
            "txs": [raw_transaction_hex],
            "blockNumber": format!("0x{:x}", target_block),
        });
        let response = self.post("eth_sendBundle", params).await?;
        response
            .get("result")
            .and_then(|r| r.get("bundleHash"))
            .and_then(|h| h.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::SubmissionFailed("relay response missing bundleHash".into()))
    }

    /// `eth_callBundle`: pre-submission simulation against the relay's own
    /// node, separate from the Planner's local `eth_call` simulation.
    pub async fn simulate_bundle(&self, raw_transaction_hex: &str, target_block: u64) -> EngineResult<bool> {
        let params = json!({
            "txs": [raw_transaction_hex],
            "blockNumber": format!("0x{:x}", target_block),
        });
        let response = self.post("eth_callBundle", params).await?;
        Ok(response.get("error").is_none())
    }

    /// `flashbots_getBundleStats`: inclusion status for a previously
    /// submitted bundle.
    pub async fn bundle_stats(&self, bundle_hash: &str, target_block: u64) -> EngineResult<Value> {
        let params = json!({
            "bundleHash": bundle_hash,
            "blockNumber": format!("0x{:x}", target_block),
        });
        self.post("flashbots_getBundleStats", params).await
    }
}
