use std::collections::BTreeMap;
use std::fs;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

const MAINNET_TABLE: &str = include_str!("../config/mainnet.toml");

/// Basis point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Harness configuration loaded from a TOML address table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Forked node connection
    pub chain: ChainConfig,

    /// Deposit slippage policy
    #[serde(default)]
    pub liquidity: LiquidityConfig,

    /// Assets by logical name
    pub assets: BTreeMap<String, AssetConfig>,

    /// Pools by logical name
    pub pools: BTreeMap<String, PoolConfig>,

    /// Metapool factory used for pool creation
    #[serde(default)]
    pub factory: Option<FactoryConfig>,

    /// Declared swap routes by name
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the fork
    pub rpc_url: String,

    /// Expected chain id, checked on connect when set
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Block the fork is pinned to (informational, the fork is managed externally)
    #[serde(default)]
    pub fork_block: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiquidityConfig {
    /// Accepted LP shortfall against the pool's own quote
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetConfig {
    pub address: String,
    pub decimals: u8,
    /// Native coin, balance is read from the account rather than a token contract
    #[serde(default)]
    pub native: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolKind {
    /// StableSwap pool with int128 coin indices
    Stable,
    /// CryptoSwap pool with uint256 coin indices
    Crypto,
    /// Wrapped native token seen as a two-coin pool
    WrappedNative,
    /// Three-coin base pool with an external LP token
    Base,
    /// Two-coin metapool that is its own LP token
    Meta,
}

impl PoolKind {
    /// Whether the pool mints an LP token that can be the output of a hop
    pub fn mints_lp(&self) -> bool {
        matches!(self, PoolKind::Base | PoolKind::Meta)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    pub address: String,
    pub kind: PoolKind,
    /// Asset names in pool index order
    pub coins: Vec<String>,
    /// Asset name of the LP token
    #[serde(default)]
    pub lp_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FactoryConfig {
    pub address: String,
    /// Pool name of the base pool new metapools pair against
    pub base_pool: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub hops: Vec<HopConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HopConfig {
    pub pool: String,
    pub from: String,
    pub to: String,
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> HarnessResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("Failed to read config file {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Address table for an Ethereum mainnet fork
    pub fn mainnet() -> HarnessResult<Self> {
        Self::from_toml(MAINNET_TABLE)
    }

    pub fn with_rpc_url(mut self, url: String) -> Self {
        self.chain.rpc_url = url;
        self
    }

    pub fn slippage(&self) -> HarnessResult<SlippageTolerance> {
        SlippageTolerance::from_bps(self.liquidity.slippage_bps)
    }

    /// Validate configuration
    pub fn validate(&self) -> HarnessResult<()> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(HarnessError::Config("chain.rpc_url cannot be empty".to_string()));
        }

        self.slippage()?;

        for (name, asset) in &self.assets {
            if asset.decimals > 36 {
                return Err(HarnessError::Config(format!(
                    "asset {} declares {} decimals, at most 36 supported",
                    name, asset.decimals
                )));
            }
        }

        for (name, pool) in &self.pools {
            if pool.coins.len() < 2 {
                return Err(HarnessError::Config(format!("pool {} needs at least 2 coins", name)));
            }
            for coin in pool.coins.iter().chain(pool.lp_token.iter()) {
                self.require_asset(coin, &format!("pool {}", name))?;
            }
            if pool.kind.mints_lp() && pool.lp_token.is_none() {
                return Err(HarnessError::Config(format!(
                    "pool {} of kind {:?} must declare lp_token",
                    name, pool.kind
                )));
            }
        }

        if let Some(factory) = &self.factory {
            let base = self.pools.get(&factory.base_pool).ok_or_else(|| {
                HarnessError::Config(format!("factory base_pool {} is not a declared pool", factory.base_pool))
            })?;
            if base.kind != PoolKind::Base {
                return Err(HarnessError::Config(format!(
                    "factory base_pool {} must be of kind base",
                    factory.base_pool
                )));
            }
        }

        for (name, route) in &self.routes {
            if route.hops.is_empty() {
                return Err(HarnessError::Config(format!("route {} has no hops", name)));
            }
            for hop in &route.hops {
                if !self.pools.contains_key(&hop.pool) {
                    return Err(HarnessError::Config(format!(
                        "route {} refers to unknown pool {}",
                        name, hop.pool
                    )));
                }
                self.require_asset(&hop.from, &format!("route {}", name))?;
                self.require_asset(&hop.to, &format!("route {}", name))?;
            }
        }

        Ok(())
    }

    fn require_asset(&self, asset: &str, owner: &str) -> HarnessResult<()> {
        if self.assets.contains_key(asset) {
            Ok(())
        } else {
            Err(HarnessError::Config(format!("{} refers to unknown asset {}", owner, asset)))
        }
    }
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            slippage_bps: SlippageTolerance::DEFAULT_BPS,
        }
    }
}

/// Fraction by which a quoted amount may be undershot, in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageTolerance {
    bps: u16,
}

impl SlippageTolerance {
    /// 1%
    pub const DEFAULT_BPS: u16 = 100;

    pub fn from_bps(bps: u16) -> HarnessResult<Self> {
        if bps == 0 || u64::from(bps) >= BPS_DENOMINATOR {
            return Err(HarnessError::Config(format!(
                "slippage tolerance must be between 0 and {} bps exclusive, got {}",
                BPS_DENOMINATOR, bps
            )));
        }
        Ok(Self { bps })
    }

    pub fn bps(&self) -> u16 {
        self.bps
    }

    /// Minimum accepted amount for a quote. A non-zero quote always loses at
    /// least one unit so the floor stays strictly below it.
    pub fn floor(&self, expected: U256) -> U256 {
        if expected.is_zero() {
            return U256::ZERO;
        }
        let deduction = expected * U256::from(self.bps) / U256::from(BPS_DENOMINATOR);
        expected - deduction.max(U256::from(1))
    }
}

impl Default for SlippageTolerance {
    fn default() -> Self {
        Self {
            bps: Self::DEFAULT_BPS,
        }
    }
}
