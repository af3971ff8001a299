//! Pool registry
//!
//! Immutable view of the address table. Built once per session from a
//! [`HarnessConfig`] and passed by reference to whatever binds handles.
//! Routes are declared in the table and only resolved here; there is no
//! path finding.

use std::collections::BTreeMap;
use std::str::FromStr;

use alloy::primitives::Address;

use crate::config::{HarnessConfig, PoolKind};
use crate::error::{HarnessError, HarnessResult};

/// Resolved asset entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub name: String,
    pub address: Address,
    pub decimals: u8,
    pub native: bool,
}

/// Resolved pool entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub name: String,
    pub address: Address,
    pub kind: PoolKind,
    /// Asset names in pool index order
    pub coins: Vec<String>,
    pub lp_token: Option<String>,
}

impl PoolEntry {
    /// Index of an asset in this pool. The LP token of a minting pool sits
    /// one past the last coin.
    pub fn index_of(&self, asset: &str) -> Option<usize> {
        if let Some(index) = self.coins.iter().position(|c| c == asset) {
            return Some(index);
        }
        match &self.lp_token {
            Some(lp) if lp == asset && self.kind.mints_lp() => Some(self.coins.len()),
            _ => None,
        }
    }

    pub fn is_lp_index(&self, index: usize) -> bool {
        self.kind.mints_lp() && index == self.coins.len()
    }
}

/// One resolved hop of a declared route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopPlan {
    pub pool: String,
    pub input: String,
    pub output: String,
    pub input_index: usize,
    pub output_index: usize,
}

#[derive(Debug, Clone)]
pub struct FactoryEntry {
    pub address: Address,
    pub base_pool: String,
}

/// Static mapping of logical names to chain addresses
#[derive(Debug, Clone)]
pub struct PoolRegistry {
    assets: BTreeMap<String, AssetEntry>,
    pools: BTreeMap<String, PoolEntry>,
    routes: BTreeMap<String, Vec<(String, String, String)>>,
    factory: Option<FactoryEntry>,
}

fn parse_address(value: &str, owner: &str) -> HarnessResult<Address> {
    Address::from_str(value)
        .map_err(|e| HarnessError::Config(format!("{} has invalid address {}: {}", owner, value, e)))
}

impl PoolRegistry {
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        let mut assets = BTreeMap::new();
        for (name, asset) in &config.assets {
            let address = parse_address(&asset.address, &format!("asset {}", name))?;
            assets.insert(
                name.clone(),
                AssetEntry {
                    name: name.clone(),
                    address,
                    decimals: asset.decimals,
                    native: asset.native,
                },
            );
        }

        let mut pools = BTreeMap::new();
        for (name, pool) in &config.pools {
            let address = parse_address(&pool.address, &format!("pool {}", name))?;
            pools.insert(
                name.clone(),
                PoolEntry {
                    name: name.clone(),
                    address,
                    kind: pool.kind,
                    coins: pool.coins.clone(),
                    lp_token: pool.lp_token.clone(),
                },
            );
        }

        let factory = match &config.factory {
            Some(factory) => Some(FactoryEntry {
                address: parse_address(&factory.address, "factory")?,
                base_pool: factory.base_pool.clone(),
            }),
            None => None,
        };

        let routes = config
            .routes
            .iter()
            .map(|(name, route)| {
                let hops = route
                    .hops
                    .iter()
                    .map(|h| (h.pool.clone(), h.from.clone(), h.to.clone()))
                    .collect();
                (name.clone(), hops)
            })
            .collect();

        let registry = Self {
            assets,
            pools,
            routes,
            factory,
        };

        // Surface composition errors at load time rather than at first use
        for name in registry.routes.keys() {
            registry.route(name)?;
        }

        Ok(registry)
    }

    pub fn asset(&self, name: &str) -> HarnessResult<&AssetEntry> {
        self.assets
            .get(name)
            .ok_or_else(|| HarnessError::Config(format!("unknown asset {}", name)))
    }

    pub fn pool(&self, name: &str) -> HarnessResult<&PoolEntry> {
        self.pools
            .get(name)
            .ok_or_else(|| HarnessError::Config(format!("unknown pool {}", name)))
    }

    pub fn factory(&self) -> HarnessResult<&FactoryEntry> {
        self.factory
            .as_ref()
            .ok_or_else(|| HarnessError::Config("no factory configured".to_string()))
    }

    pub fn route_names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Resolve a declared route into indexed hops.
    ///
    /// No hop may output the native coin: gas is paid from the same balance,
    /// so its delta would not measure what the pool paid out.
    pub fn route(&self, name: &str) -> HarnessResult<Vec<HopPlan>> {
        let hops = self
            .routes
            .get(name)
            .ok_or_else(|| HarnessError::InvalidRoute(format!("unknown route {}", name)))?;

        let mut plans: Vec<HopPlan> = Vec::with_capacity(hops.len());
        for (pool_name, from, to) in hops {
            if let Some(previous) = plans.last() {
                if &previous.output != from {
                    return Err(HarnessError::InvalidRoute(format!(
                        "route {}: hop through {} takes {} but the previous hop produces {}",
                        name, pool_name, from, previous.output
                    )));
                }
            }

            let pool = self.pool(pool_name)?;
            let input_index = pool.index_of(from).ok_or_else(|| {
                HarnessError::InvalidRoute(format!("route {}: pool {} does not hold {}", name, pool_name, from))
            })?;
            let output_index = pool.index_of(to).ok_or_else(|| {
                HarnessError::InvalidRoute(format!("route {}: pool {} does not hold {}", name, pool_name, to))
            })?;
            if input_index == output_index {
                return Err(HarnessError::InvalidRoute(format!(
                    "route {}: hop through {} swaps {} for itself",
                    name, pool_name, from
                )));
            }
            if self.assets.get(to).map_or(false, |asset| asset.native) {
                return Err(HarnessError::InvalidRoute(format!(
                    "route {}: hop through {} outputs the native coin {}",
                    name, pool_name, to
                )));
            }
            if pool.is_lp_index(input_index) {
                return Err(HarnessError::InvalidRoute(format!(
                    "route {}: redeeming {} through {} is not supported",
                    name, from, pool_name
                )));
            }

            plans.push(HopPlan {
                pool: pool_name.clone(),
                input: from.clone(),
                output: to.clone(),
                input_index,
                output_index,
            });
        }

        Ok(plans)
    }
}
