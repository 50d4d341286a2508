//! Configuration loading.
//!
//! Layered the way the teacher's `load_config()` did it, widened to
//! three layers instead of one: `.env` (via `dotenv`) for secrets and
//! per-deployment values, an optional TOML file for the larger structural
//! config (token list, intermediate tokens, per-protocol addresses), and
//! a handful of `clap` CLI flags for what changes between invocations of
//! the same deployment (dry-run, log level, config file path).

use crate::types::Token;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Submission's response to detecting a same-pool, same-direction
/// transaction ahead of ours in the public mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandwichDetectionPolicy {
    Off,
    Escalate,
    Reroute,
    Abort,
}

impl FromStr for SandwichDetectionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "escalate" => Ok(Self::Escalate),
            "reroute" => Ok(Self::Reroute),
            "abort" => Ok(Self::Abort),
            other => Err(anyhow::anyhow!("unknown sandwich_detection policy: {other}")),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "arb-engine", about = "Cross-DEX flash-loan arbitrage engine")]
pub struct Cli {
    /// Path to the TOML file carrying token list / addresses / tuning knobs.
    #[arg(long, env = "ARB_CONFIG_PATH", default_value = "config.toml")]
    pub config_path: PathBuf,

    /// Build and simulate plans but never submit a bundle.
    #[arg(long, env = "ARB_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// `tracing-subscriber` env-filter directive, e.g. "info" or
    /// "arb_engine=debug,alloy=warn".
    #[arg(long, env = "ARB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Structural configuration loaded from the TOML override file: token
/// universe, base tokens to run independent cycles for, and per-protocol
/// contract addresses. Kept out of `.env` because it is large and
/// version-controlled alongside a deployment, not a secret.
#[derive(Debug, Deserialize)]
pub struct TomlConfig {
    pub tokens: Vec<TokenSpec>,
    pub base_tokens: Vec<String>,
    pub intermediate_tokens: Vec<String>,
    pub uniswap_v2_router: String,
    pub uniswap_v2_factory: String,
    pub sushiswap_v2_router: String,
    pub sushiswap_v2_factory: String,
    pub uniswap_v3_factory: String,
    pub uniswap_v3_quoter_v2: String,
    pub arb_executor: String,
    pub aave_pool: Option<String>,
    pub balancer_vault: Option<String>,
    #[serde(default)]
    pub cache_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenSpec {
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
}

/// One RPC endpoint in the Chain Client's ordered provider list: a WS
/// handle for the new-head subscription and an HTTP handle for
/// request/response calls, matching `ChainClient`'s per-provider split.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub ws_url: String,
    pub http_url: String,
}

/// Fully resolved configuration the rest of the engine is built against.
#[derive(Debug, Clone)]
pub struct BotConfig {
    // chain / transport
    /// Ordered by priority — index 0 is tried first, later entries are
    /// only used once the Chain Client has failed over to them.
    pub provider_urls: Vec<ProviderEndpoint>,
    pub chain_id: u64,
    pub private_key: String,
    pub max_reconnects: u32,

    // token universe
    pub tokens: Vec<Token>,
    pub base_tokens: Vec<Address>,
    pub intermediate_tokens: Vec<Address>,

    // protocol addresses
    pub uniswap_v2_router: Address,
    pub uniswap_v2_factory: Address,
    pub sushiswap_v2_router: Address,
    pub sushiswap_v2_factory: Address,
    pub uniswap_v3_factory: Address,
    pub uniswap_v3_quoter_v2: Address,
    pub arb_executor: Address,
    pub aave_pool: Option<Address>,
    pub balancer_vault: Option<Address>,

    // evaluation / risk
    pub min_profit_usd: f64,
    pub max_trade_size_usd: f64,
    pub max_slippage_bps: u32,
    pub max_gas_price_gwei: u64,
    pub max_hops: usize,
    pub v3_max_ticks_simulated: u32,
    /// Fractional price-impact ceiling (e.g. 0.05 = 5%) the Path Finder
    /// prunes edges above, at the probe amount.
    pub price_impact_ceiling: f64,
    pub sandwich_confidence_threshold: f64,
    /// Minimum net profit, expressed in basis points of `amount_in`, for an
    /// opportunity to advance past the Evaluator.
    pub min_profit_bps: u32,
    /// Minimum `gross_out / (gas_units * gas_price)` ratio for an
    /// opportunity to advance, independent of the absolute profit floor.
    pub min_gross_to_gas_ratio: f64,
    /// Amount-sizing binary search iteration budget (spec default 6).
    pub amount_sizing_iterations: u32,
    /// Marginal-improvement dust threshold (bps of amount_in) at which
    /// amount-sizing stops refining early.
    pub amount_sizing_dust_bps: u32,
    pub min_amount_in: alloy::primitives::U256,
    pub max_amount_in: alloy::primitives::U256,
    /// Gas-unit baseline per swap hop, before the Planner's concrete
    /// `estimate_gas` refines it against real calldata.
    pub gas_units_base: u64,
    pub gas_units_per_hop: u64,
    pub gas_price_gwei_estimate: u64,
    /// Flash-loan fee the Evaluator sizes against before a provider is
    /// actually chosen (the Planner re-derives the real fee for whichever
    /// provider it picks).
    pub flash_loan_fee_bps_estimate: u32,

    // registry / scanner
    pub pool_failure_cooldown_threshold: u32,
    pub max_parallel_requests: usize,
    pub poll_interval_ms: u64,

    // submission
    pub relay_url: Option<String>,
    pub relay_signing_key: Option<String>,
    pub inclusion_window_blocks: u64,
    /// Floor and ceiling for the per-bundle priority fee, wei-denominated;
    /// the dynamic bid (`net_profit * bid_fraction`) is clamped between
    /// these before a bundle is (re)submitted.
    pub bid_floor_wei: U256,
    pub bid_ceiling_wei: U256,
    pub bid_fraction: f64,
    pub max_blocks_ahead: u64,
    pub sandwich_detection: SandwichDetectionPolicy,

    // cache
    pub cache_path: Option<PathBuf>,

    // runtime
    pub dry_run: bool,
}

impl BotConfig {
    /// Load CLI flags, `.env`, and the TOML override file and merge them
    /// into a single `BotConfig`. Panics become `anyhow::Error` here —
    /// this is the process boundary, there is no caller left to retry.
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        dotenv::dotenv().ok();

        let toml_str = std::fs::read_to_string(&cli.config_path)
            .with_context(|| format!("reading config file {}", cli.config_path.display()))?;
        let toml_cfg: TomlConfig =
            toml::from_str(&toml_str).context("parsing TOML configuration")?;

        let tokens: Vec<Token> = toml_cfg
            .tokens
            .iter()
            .map(|t| {
                Ok(Token::new(
                    parse_address(&t.address)?,
                    t.decimals,
                    t.symbol.clone(),
                ))
            })
            .collect::<Result<_>>()?;

        let symbol_to_address = |symbol: &str| -> Result<Address> {
            tokens
                .iter()
                .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
                .map(|t| t.address)
                .with_context(|| format!("unknown token symbol in config: {symbol}"))
        };

        let base_tokens = toml_cfg
            .base_tokens
            .iter()
            .map(|s| symbol_to_address(s))
            .collect::<Result<_>>()?;
        let intermediate_tokens = toml_cfg
            .intermediate_tokens
            .iter()
            .map(|s| symbol_to_address(s))
            .collect::<Result<_>>()?;

        let ws_urls = required_env_list("RPC_WS_URLS")?;
        let http_urls = required_env_list("RPC_HTTP_URLS")?;
        if ws_urls.len() != http_urls.len() {
            anyhow::bail!(
                "RPC_WS_URLS ({} entries) and RPC_HTTP_URLS ({} entries) must list the same number of providers, in priority order",
                ws_urls.len(),
                http_urls.len()
            );
        }
        let provider_urls = ws_urls
            .into_iter()
            .zip(http_urls)
            .map(|(ws_url, http_url)| ProviderEndpoint { ws_url, http_url })
            .collect();

        Ok(BotConfig {
            provider_urls,
            chain_id: required_env("CHAIN_ID")?.parse().context("CHAIN_ID")?,
            private_key: required_env("PRIVATE_KEY")?,
            max_reconnects: env_or("MAX_RECONNECTS", 50)?,

            tokens,
            base_tokens,
            intermediate_tokens,

            uniswap_v2_router: parse_address(&toml_cfg.uniswap_v2_router)?,
            uniswap_v2_factory: parse_address(&toml_cfg.uniswap_v2_factory)?,
            sushiswap_v2_router: parse_address(&toml_cfg.sushiswap_v2_router)?,
            sushiswap_v2_factory: parse_address(&toml_cfg.sushiswap_v2_factory)?,
            uniswap_v3_factory: parse_address(&toml_cfg.uniswap_v3_factory)?,
            uniswap_v3_quoter_v2: parse_address(&toml_cfg.uniswap_v3_quoter_v2)?,
            arb_executor: parse_address(&toml_cfg.arb_executor)?,
            aave_pool: toml_cfg.aave_pool.as_deref().map(parse_address).transpose()?,
            balancer_vault: toml_cfg
                .balancer_vault
                .as_deref()
                .map(parse_address)
                .transpose()?,

            min_profit_usd: env_or("MIN_PROFIT_USD", 10.0)?,
            max_trade_size_usd: env_or("MAX_TRADE_SIZE_USD", 50_000.0)?,
            max_slippage_bps: env_or("MAX_SLIPPAGE_BPS", 50)?,
            max_gas_price_gwei: env_or("MAX_GAS_PRICE_GWEI", 150)?,
            max_hops: env_or("MAX_HOPS", 4)?,
            v3_max_ticks_simulated: env_or("V3_MAX_TICKS_SIMULATED", 5)?,
            price_impact_ceiling: env_or("PRICE_IMPACT_CEILING", 0.05)?,
            sandwich_confidence_threshold: env_or("SANDWICH_CONFIDENCE_THRESHOLD", 0.75)?,
            min_profit_bps: env_or("MIN_PROFIT_BPS", 10)?,
            min_gross_to_gas_ratio: env_or("MIN_GROSS_TO_GAS_RATIO", 3.0)?,
            amount_sizing_iterations: env_or("AMOUNT_SIZING_ITERATIONS", 6)?,
            amount_sizing_dust_bps: env_or("AMOUNT_SIZING_DUST_BPS", 1)?,
            min_amount_in: alloy::primitives::U256::from(env_or::<u128>("MIN_AMOUNT_IN", 1_000_000_000_000_000u128)?),
            max_amount_in: alloy::primitives::U256::from(env_or::<u128>("MAX_AMOUNT_IN", 50_000_000_000_000_000_000u128)?),
            gas_units_base: env_or("GAS_UNITS_BASE", 120_000)?,
            gas_units_per_hop: env_or("GAS_UNITS_PER_HOP", 90_000)?,
            gas_price_gwei_estimate: env_or("GAS_PRICE_GWEI_ESTIMATE", 30)?,
            flash_loan_fee_bps_estimate: env_or("FLASH_LOAN_FEE_BPS_ESTIMATE", 0)?,

            pool_failure_cooldown_threshold: env_or("POOL_FAILURE_COOLDOWN_THRESHOLD", 3)?,
            max_parallel_requests: env_or("MAX_PARALLEL_REQUESTS", 16)?,
            poll_interval_ms: env_or("POLL_INTERVAL_MS", 500)?,

            relay_url: std::env::var("RELAY_URL").ok(),
            relay_signing_key: std::env::var("RELAY_SIGNING_KEY").ok(),
            inclusion_window_blocks: env_or("INCLUSION_WINDOW_BLOCKS", 3)?,
            bid_floor_wei: U256::from(env_or::<u128>("BID_FLOOR_WEI", 1_500_000_000u128)?),
            bid_ceiling_wei: U256::from(env_or::<u128>("BID_CEILING_WEI", 50_000_000_000u128)?),
            bid_fraction: env_or("BID_FRACTION", 0.10)?,
            max_blocks_ahead: env_or("MAX_BLOCKS_AHEAD", 3)?,
            sandwich_detection: env_or("SANDWICH_DETECTION", SandwichDetectionPolicy::Escalate)?,

            cache_path: toml_cfg.cache_path.map(PathBuf::from),

            dry_run: cli.dry_run,
        })
    }

    pub fn is_quote_token(&self, token: &Address) -> bool {
        self.base_tokens.contains(token)
    }
}

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).with_context(|| format!("invalid address: {s}"))
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} not set"))
}

/// Parses a required comma-separated env var into an ordered, non-empty
/// list of trimmed entries — used for the provider priority list, where
/// order carries meaning and can't be expressed with a single env var.
fn required_env_list(key: &str) -> Result<Vec<String>> {
    let raw = required_env(key)?;
    let list: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if list.is_empty() {
        anyhow::bail!("{key} must list at least one provider URL");
    }
    Ok(list)
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
