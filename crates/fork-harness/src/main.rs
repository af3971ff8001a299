//! Fork harness CLI
//!
//! Quotes and executes declared swap routes, funds pools and creates
//! metapools against a forked node, printing a JSON report.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::U256;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fork_harness::{
    AssetHandle, ChainReceipt, ChainSession, DepositPlan, DepositReceipt, HarnessConfig, LiquidityBootstrapper,
    LiquidityPool, PoolLifecycleManager,
};

#[derive(Parser)]
#[command(name = "fork-harness")]
#[command(about = "Multi-hop swaps and liquidity bootstrapping against a forked EVM chain")]
struct Cli {
    /// Address table (defaults to the embedded mainnet table)
    #[arg(short, long)]
    config: Option<String>,

    /// Override chain.rpc_url
    #[arg(long)]
    rpc_url: Option<String>,

    /// Signing key of the funded account
    #[arg(long, env = "HARNESS_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Override log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expected output of a route, no transactions
    Quote {
        route: String,
        /// Input amount in whole units of the route's input asset
        amount: String,
    },
    /// Execute a route
    Swap {
        route: String,
        amount: String,
        /// Minimum final output in whole units (default: quote less slippage)
        #[arg(long)]
        min_out: Option<String>,
    },
    /// Deposit into a pool, one amount per coin
    Fund {
        pool: String,
        #[arg(required = true)]
        amounts: Vec<String>,
        /// Deposit without reading reserves (no slippage floor)
        #[arg(long)]
        skip_quote: bool,
    },
    /// Deploy a metapool pairing `coin` with the base pool LP token and seed it
    CreatePool {
        coin: String,
        name: String,
        /// Amounts of `coin` and the base LP token
        #[arg(num_args = 2, required = true)]
        amounts: Vec<String>,
        /// Amplification coefficient
        #[arg(long = "a", default_value_t = 200)]
        amplification: u64,
        #[arg(long, default_value_t = 4)]
        fee_bps: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => HarnessConfig::mainnet()?,
    };
    if let Some(url) = cli.rpc_url.clone() {
        config = config.with_rpc_url(url);
    }

    let session = ChainSession::connect(&config, &[cli.private_key.clone()]).await?;
    let signer = session.signer()?;

    let report = match cli.command {
        Command::Quote { route, amount } => {
            let chain = session.route(&route)?;
            let amount_in = parse_amount(&amount, chain.input_asset().as_ref())?;
            let expected = chain.quote(amount_in).await?;
            json!({
                "route": route,
                "amount_in": amount_in.to_string(),
                "expected_out": expected.to_string(),
                "expected_out_units": format_units(expected, chain.output_asset().decimals())?,
            })
        }
        Command::Swap { route, amount, min_out } => {
            let chain = session.route(&route)?;
            let amount_in = parse_amount(&amount, chain.input_asset().as_ref())?;
            let min_final_out = match min_out {
                Some(min_out) => parse_amount(&min_out, chain.output_asset().as_ref())?,
                None => session.slippage().floor(chain.quote(amount_in).await?),
            };
            info!(%route, %amount_in, %min_final_out, "executing route");
            let receipt = chain.execute(signer, amount_in, min_final_out).await?;
            let mut report = chain_report(&receipt);
            report["route"] = json!(route);
            report["amount_out_units"] = json!(format_units(receipt.amount_out, chain.output_asset().decimals())?);
            report
        }
        Command::Fund {
            pool,
            amounts,
            skip_quote,
        } => {
            let handle = session.liquidity_pool(&pool)?;
            let amounts = parse_amounts(&amounts, handle.coins())?;
            let bootstrapper = LiquidityBootstrapper::new(session.slippage());
            let receipt = bootstrapper
                .fund(signer, handle.as_ref(), &amounts, signer, skip_quote)
                .await?;
            let mut report = deposit_report(&receipt);
            report["pool"] = json!(pool);
            report
        }
        Command::CreatePool {
            coin,
            name,
            amounts,
            amplification,
            fee_bps,
        } => {
            let params = session.metapool_params(&coin, &name, amplification, fee_bps)?;
            let amounts = parse_amounts(&amounts, &params.coins())?;
            let mut manager = PoolLifecycleManager::new(
                session.metapool_factory()?,
                LiquidityBootstrapper::new(session.slippage()),
            );
            let (pool, receipt) = manager.create_and_fund(signer, &params, &amounts, signer).await?;
            let mut report = deposit_report(&receipt);
            report["pool"] = json!(pool.address().to_string());
            report["symbol"] = json!(params.symbol());
            report
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let log_level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fork_harness={},alloy=warn", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

fn parse_amount(value: &str, asset: &dyn AssetHandle) -> Result<U256> {
    let parsed = parse_units(value, asset.decimals())
        .with_context(|| format!("invalid amount {} for {}", value, asset.address()))?;
    if parsed.is_negative() {
        bail!("amount {} must not be negative", value);
    }
    Ok(parsed.get_absolute())
}

fn parse_amounts(values: &[String], coins: &[Arc<dyn AssetHandle>]) -> Result<Vec<U256>> {
    if values.len() != coins.len() {
        bail!("expected {} amounts, got {}", coins.len(), values.len());
    }
    values
        .iter()
        .zip(coins)
        .map(|(value, coin)| parse_amount(value, coin.as_ref()))
        .collect()
}

fn chain_report(receipt: &ChainReceipt) -> Value {
    let hops: Vec<Value> = receipt
        .hops
        .iter()
        .map(|hop| {
            json!({
                "pool": hop.pool.to_string(),
                "amount_in": hop.amount_in.to_string(),
                "amount_out": hop.amount_out.to_string(),
                "balance_before": hop.balance_before.to_string(),
                "balance_after": hop.balance_after.to_string(),
            })
        })
        .collect();
    json!({ "hops": hops, "amount_out": receipt.amount_out.to_string() })
}

fn deposit_report(receipt: &DepositReceipt) -> Value {
    let plan = match &receipt.plan {
        DepositPlan::Virgin => json!({ "kind": "virgin" }),
        DepositPlan::Unquoted => json!({ "kind": "unquoted" }),
        DepositPlan::Quoted { quoted, minimum } => json!({
            "kind": "quoted",
            "quoted": quoted.to_string(),
            "minimum": minimum.to_string(),
        }),
    };
    let reserves: Vec<String> = receipt.reserves_before.iter().map(|r| r.to_string()).collect();
    json!({
        "plan": plan,
        "minted": receipt.minted.to_string(),
        "reserves_before": reserves,
    })
}
