//! Capability traits for the contracts the harness drives
//!
//! Each role (asset, exchange pool, liquidity pool, factory) is an explicit
//! trait. RPC-backed implementations live in [`rpc`]; an in-memory double
//! lives in [`crate::testing`].

pub mod contracts;
pub mod mint;
pub mod rpc;
pub mod session;

use std::sync::Arc;

use alloy::primitives::{address, Address, U256};
use async_trait::async_trait;

use crate::error::{HarnessError, HarnessResult};

pub use mint::LiquidityMintVenue;
pub use session::ChainSession;

/// Sentinel address for the chain's native coin
pub const NATIVE_ASSET: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// ERC20-like balance surface for one asset
#[async_trait]
pub trait AssetHandle: Send + Sync {
    fn address(&self) -> Address;

    fn decimals(&self) -> u8;

    async fn balance_of(&self, owner: Address) -> HarnessResult<U256>;

    /// Allow `spender` to pull `amount` from `owner`. A no-op for the native coin.
    async fn approve(&self, owner: Address, spender: Address, amount: U256) -> HarnessResult<()>;

    async fn transfer(&self, owner: Address, to: Address, amount: U256) -> HarnessResult<()>;
}

/// A pool that converts one of its coins into another
#[async_trait]
pub trait ExchangePool: Send + Sync {
    fn address(&self) -> Address;

    fn n_coins(&self) -> usize;

    /// Address of the coin at `index`, read from the pool
    async fn coin(&self, index: usize) -> HarnessResult<Address>;

    /// Read-only quote of `exchange`
    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256>;

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, min_dy: U256) -> HarnessResult<()>;
}

/// A pool that accepts deposits and mints an LP token
#[async_trait]
pub trait LiquidityPool: Send + Sync {
    fn address(&self) -> Address;

    /// Address of the LP token the pool mints
    fn lp_token(&self) -> Address;

    /// Constituent assets in the order this handle was bound with
    fn coins(&self) -> &[Arc<dyn AssetHandle>];

    /// Address of the coin at `index`, read from the pool
    async fn coin(&self, index: usize) -> HarnessResult<Address>;

    /// Reserve of the coin at `index`
    async fn balances(&self, index: usize) -> HarnessResult<U256>;

    /// Expected LP tokens for a deposit of `amounts`
    async fn calc_token_amount(&self, amounts: &[U256]) -> HarnessResult<U256>;

    async fn add_liquidity(
        &self,
        from: Address,
        amounts: &[U256],
        min_mint: U256,
        receiver: Address,
    ) -> HarnessResult<()>;

    async fn lp_balance_of(&self, owner: Address) -> HarnessResult<U256>;
}

/// Parameters handed to a metapool factory
#[derive(Debug, Clone)]
pub struct MetapoolDeployment {
    pub base_pool: Address,
    pub name: String,
    pub symbol: String,
    pub coin: Address,
    pub amplification: U256,
    pub fee: U256,
}

/// Deploys and locates two-coin metapools
#[async_trait]
pub trait PoolFactory: Send + Sync {
    type Pool: LiquidityPool;

    async fn deploy_metapool(&self, from: Address, deployment: &MetapoolDeployment) -> HarnessResult<()>;

    /// Pool holding both coins, if any
    async fn find_pool_for_coins(&self, coin_a: Address, coin_b: Address) -> HarnessResult<Option<Address>>;

    /// Bind a handle to a pool at `address` with the given constituent assets
    fn pool_at(&self, address: Address, coins: Vec<Arc<dyn AssetHandle>>) -> Self::Pool;
}

/// Check the bound coins sit at the same indices on the pool itself
pub async fn verify_coin_order<P: LiquidityPool + ?Sized>(pool: &P) -> HarnessResult<()> {
    for (index, asset) in pool.coins().iter().enumerate() {
        let coin = pool.coin(index).await?;
        if coin != asset.address() {
            return Err(HarnessError::InvalidPool(format!(
                "pool {} holds {} at index {}, expected {}",
                pool.address(),
                coin,
                index,
                asset.address()
            )));
        }
    }
    Ok(())
}

/// Reserves of every constituent, read in index order
pub async fn read_reserves<P: LiquidityPool + ?Sized>(pool: &P) -> HarnessResult<Vec<U256>> {
    let mut reserves = Vec::with_capacity(pool.coins().len());
    for index in 0..pool.coins().len() {
        reserves.push(pool.balances(index).await?);
    }
    Ok(reserves)
}
