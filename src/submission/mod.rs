//! MEV-Protected Submission Pipeline — wraps a simulated `ExecutionPlan`
//! into a signed single-tx bundle, submits it to a private relay, escalates
//! the bid on non-inclusion, and scans the public mempool for sandwich
//! risk.
//!
//! The teacher's `mempool` module already does pending-transaction
//! subscription and calldata decoding for *observation*; `sandwich.rs`
//! repurposes that same machinery for the sandwich-risk scan. Bundle
//! construction and the private-relay HTTP client have no teacher
//! counterpart (**supplemented in full**, see SPEC_FULL.md §4.H) and are
//! modeled on a Flashbots-compatible `eth_sendBundle` JSON-RPC call.

pub mod bundle;
pub mod relay;
pub mod sandwich;

use crate::chain::ChainClient;
use crate::config::{BotConfig, SandwichDetectionPolicy};
use crate::error::{EngineError, EngineResult};
use crate::telemetry;
use crate::types::{BundleState, ExecutionPlan};
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use relay::RelayClient;
use sandwich::PendingObservation;

/// Outcome of one submission attempt, reported back to the Orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Included { tx_hash: String, block: u64 },
    Cancelled { reason: String },
    Expired,
}

/// Builds, signs, and RLP-encodes the single EIP-1559 transaction that
/// invokes the chosen flash-loan provider's entrypoint with `calldata`.
async fn sign_raw_transaction(
    chain: &ChainClient,
    config: &BotConfig,
    to: Address,
    calldata: Bytes,
    priority_fee: U256,
) -> EngineResult<Bytes> {
    let signer: PrivateKeySigner = config
        .private_key
        .parse()
        .map_err(|e| EngineError::MissingSecret(format!("invalid wallet private key: {e}")))?;
    let wallet = EthereumWallet::from(signer);

    let nonce = chain
        .nonce_manager()
        .reserve(chain.rpc())
        .await
        .map_err(|e| EngineError::SubmissionFailed(format!("reserving nonce: {e}")))?;
    let fees = chain
        .rpc()
        .estimate_eip1559_fees()
        .await
        .map_err(|e| EngineError::Transport {
            endpoint: "http".into(),
            source: Box::new(e),
        })?;

    let tx = TransactionRequest::default()
        .with_to(to)
        .with_input(calldata)
        .with_nonce(nonce)
        .with_chain_id(config.chain_id)
        .with_max_priority_fee_per_gas(priority_fee.to::<u128>())
        .with_max_fee_per_gas(fees.max_fee_per_gas.saturating_add(priority_fee.to::<u128>()))
        .with_gas_limit(2_000_000);

    let envelope: TxEnvelope = tx
        .build(&wallet)
        .await
        .map_err(|e| EngineError::SubmissionFailed(format!("signing transaction: {e}")))?;
    Ok(Bytes::from(envelope.encoded_2718()))
}

/// Submits `plan` (already `SimulatedOk`) to the configured private relay,
/// escalating the bid once per missed block up to `inclusion_window_blocks`
/// attempts, and checking the public mempool for sandwich risk before each
/// (re)submission per spec.md §4.H.
pub async fn submit(
    plan: &ExecutionPlan,
    calldata: Bytes,
    to: Address,
    chain: &ChainClient,
    config: &BotConfig,
    head: u64,
    pending: &[PendingObservation],
) -> EngineResult<SubmissionOutcome> {
    let relay_url = config
        .relay_url
        .clone()
        .ok_or_else(|| EngineError::MissingConfig("relay_url not configured".into()))?;
    let signing_key = config
        .relay_signing_key
        .as_deref()
        .ok_or_else(|| EngineError::MissingSecret("relay_signing_key not configured".into()))?;
    let relay = RelayClient::new(relay_url, signing_key)?;

    let mut priority_fee = bundle::dynamic_bid(config, plan.opportunity.net_profit);

    if let Some((token_in, token_out)) = first_hop_pair(plan) {
        if let Some(reason) = check_sandwich_risk(config, token_in, token_out, &mut priority_fee, pending) {
            return Ok(SubmissionOutcome::Cancelled { reason });
        }
    }

    let raw_tx = match sign_raw_transaction(chain, config, to, calldata, priority_fee).await {
        Ok(tx) => tx,
        Err(err) => {
            // A failed signing/nonce-fetch attempt leaves the reserved
            // nonce unused on-chain — resync so the next cycle re-reads
            // the real chain nonce rather than skipping ahead.
            chain.nonce_manager().resync().await;
            return Err(err);
        }
    };
    let raw_tx_hex = format!("0x{}", alloy::primitives::hex::encode(&raw_tx));

    let mut active = bundle::build(config, raw_tx.to_vec(), head, plan.opportunity.net_profit);

    for attempt in 0..config.inclusion_window_blocks {
        let target_block = active.target_block_range.0 + attempt;

        let bundle_hash = match relay.submit_bundle(&raw_tx_hex, target_block).await {
            Ok(hash) => hash,
            Err(err) => {
                if attempt == 0 {
                    // The relay rejected our very first attempt at this
                    // nonce (often a stale-nonce revert) — resync before
                    // the next cycle reserves one.
                    chain.nonce_manager().resync().await;
                }
                return Err(err);
            }
        };
        active.relay_bundle_id = Some(bundle_hash.clone());
        active.submission_timestamps.push((target_block, crate::types::now_unix()));
        telemetry::bundle_submitted(&bundle_hash, target_block, active.min_effective_tip);

        let current_head = chain.current_block().await?;
        if bundle::is_expired(&active, current_head) {
            active.state = BundleState::Expired;
            telemetry::bundle_expired(&bundle_hash, target_block);
            return Ok(SubmissionOutcome::Expired);
        }

        let stats = relay.bundle_stats(&bundle_hash, target_block).await?;
        if let Some(included_block) = stats
            .get("result")
            .and_then(|r| r.get("includedInBlock"))
            .and_then(|b| b.as_u64())
        {
            active.state = BundleState::Included {
                tx_hash: bundle_hash.clone(),
                block: included_block,
            };
            telemetry::bundle_included(&bundle_hash, included_block, &plan.opportunity.net_profit.to_string());
            return Ok(SubmissionOutcome::Included {
                tx_hash: bundle_hash,
                block: included_block,
            });
        }

        bundle::escalate(config, &mut active, target_block + 1, 1_000);
    }

    active.state = BundleState::Expired;
    if let Some(id) = &active.relay_bundle_id {
        telemetry::bundle_expired(id, active.target_block_range.1);
    }
    Ok(SubmissionOutcome::Expired)
}

fn first_hop_pair(plan: &ExecutionPlan) -> Option<(Address, Address)> {
    let hop = plan.opportunity.path.hops.first()?;
    Some((hop.input_token, hop.output_token))
}

/// Applies the configured `sandwich_detection` policy once a pending
/// transaction trading the same direction is observed above the confidence
/// threshold. Returns `Some(reason)` when the cycle should be cancelled,
/// bumps `priority_fee` on escalation, otherwise leaves the caller to
/// proceed (reroute is decided one layer up, by the Path Finder re-running
/// without the sandwiched pool — this function only flags the need).
fn check_sandwich_risk(
    config: &BotConfig,
    token_in: Address,
    token_out: Address,
    priority_fee: &mut U256,
    pending: &[PendingObservation],
) -> Option<String> {
    let confidence = sandwich::confidence_for(token_in, token_out, pending);
    if confidence < config.sandwich_confidence_threshold {
        return None;
    }
    telemetry::sandwich_risk_detected(token_in, &format!("confidence={confidence:.2}"));
    match config.sandwich_detection {
        SandwichDetectionPolicy::Off => None,
        SandwichDetectionPolicy::Escalate => {
            *priority_fee = (*priority_fee * U256::from(11_000u32)) / U256::from(10_000u32);
            None
        }
        SandwichDetectionPolicy::Reroute => Some("sandwich risk: route reshuffle required".into()),
        SandwichDetectionPolicy::Abort => Some(format!("sandwich risk above threshold ({confidence:.2})")),
    }
}
