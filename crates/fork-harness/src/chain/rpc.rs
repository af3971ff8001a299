//! JSON-RPC backed capability handles

use std::sync::Arc;

use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::debug;

use super::contracts::{
    IBasePool, IBasePool::IBasePoolInstance, ICryptoSwap, ICryptoSwap::ICryptoSwapInstance, IERC20,
    IERC20::IERC20Instance, IMetapool, IMetapool::IMetapoolInstance, IMetapoolFactory,
    IMetapoolFactory::IMetapoolFactoryInstance, IStableSwap, IStableSwap::IStableSwapInstance,
    IWrappedNative, IWrappedNative::IWrappedNativeInstance,
};
use super::{AssetHandle, ExchangePool, LiquidityPool, MetapoolDeployment, PoolFactory, NATIVE_ASSET};
use crate::error::{HarnessError, HarnessResult};

/// Wait for a submitted transaction to be mined and require a success status
async fn mined(
    submitted: Result<PendingTransactionBuilder<Ethereum>, alloy::contract::Error>,
    context: &str,
) -> HarnessResult<()> {
    let pending = submitted.map_err(HarnessError::from_contract)?;
    let receipt = pending.get_receipt().await?;
    debug!(
        context,
        tx = %receipt.transaction_hash,
        gas_used = receipt.gas_used,
        "transaction mined"
    );
    if !receipt.status() {
        return Err(HarnessError::TransactionFailed(format!(
            "{} reverted in {}",
            context, receipt.transaction_hash
        )));
    }
    Ok(())
}

fn check_index(index: usize, n_coins: usize, pool: Address) -> HarnessResult<()> {
    if index >= n_coins {
        return Err(HarnessError::InvalidPool(format!(
            "pool {} has {} coins, index {} out of range",
            pool, n_coins, index
        )));
    }
    Ok(())
}

/// ERC20 token
#[derive(Clone)]
pub struct Erc20Asset {
    contract: IERC20Instance<DynProvider>,
    decimals: u8,
}

impl Erc20Asset {
    pub fn new(address: Address, decimals: u8, provider: DynProvider) -> Self {
        Self {
            contract: IERC20::new(address, provider),
            decimals,
        }
    }
}

#[async_trait]
impl AssetHandle for Erc20Asset {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    async fn balance_of(&self, owner: Address) -> HarnessResult<U256> {
        self.contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn approve(&self, owner: Address, spender: Address, amount: U256) -> HarnessResult<()> {
        mined(
            self.contract.approve(spender, amount).from(owner).send().await,
            "approve",
        )
        .await
    }

    async fn transfer(&self, owner: Address, to: Address, amount: U256) -> HarnessResult<()> {
        mined(self.contract.transfer(to, amount).from(owner).send().await, "transfer").await
    }
}

/// The chain's native coin
#[derive(Clone)]
pub struct NativeAsset {
    provider: DynProvider,
}

impl NativeAsset {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AssetHandle for NativeAsset {
    fn address(&self) -> Address {
        NATIVE_ASSET
    }

    fn decimals(&self) -> u8 {
        18
    }

    async fn balance_of(&self, owner: Address) -> HarnessResult<U256> {
        Ok(self.provider.get_balance(owner).await?)
    }

    async fn approve(&self, _owner: Address, _spender: Address, _amount: U256) -> HarnessResult<()> {
        Ok(())
    }

    async fn transfer(&self, owner: Address, to: Address, amount: U256) -> HarnessResult<()> {
        let tx = TransactionRequest::default()
            .with_from(owner)
            .with_to(to)
            .with_value(amount);
        let receipt = self.provider.send_transaction(tx).await?.get_receipt().await?;
        if !receipt.status() {
            return Err(HarnessError::TransactionFailed(format!(
                "native transfer reverted in {}",
                receipt.transaction_hash
            )));
        }
        Ok(())
    }
}

/// StableSwap pool, int128 coin indices
#[derive(Clone)]
pub struct StableSwapPool {
    contract: IStableSwapInstance<DynProvider>,
    n_coins: usize,
}

impl StableSwapPool {
    pub fn new(address: Address, n_coins: usize, provider: DynProvider) -> Self {
        Self {
            contract: IStableSwap::new(address, provider),
            n_coins,
        }
    }
}

#[async_trait]
impl ExchangePool for StableSwapPool {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn n_coins(&self) -> usize {
        self.n_coins
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        check_index(index, self.n_coins, self.address())?;
        self.contract
            .coins(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        self.contract
            .get_dy(i as i128, j as i128, dx)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, min_dy: U256) -> HarnessResult<()> {
        mined(
            self.contract
                .exchange(i as i128, j as i128, dx, min_dy)
                .from(from)
                .send()
                .await,
            "stableswap exchange",
        )
        .await
    }
}

/// CryptoSwap pool, uint256 coin indices
#[derive(Clone)]
pub struct CryptoSwapPool {
    contract: ICryptoSwapInstance<DynProvider>,
    n_coins: usize,
}

impl CryptoSwapPool {
    pub fn new(address: Address, n_coins: usize, provider: DynProvider) -> Self {
        Self {
            contract: ICryptoSwap::new(address, provider),
            n_coins,
        }
    }
}

#[async_trait]
impl ExchangePool for CryptoSwapPool {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn n_coins(&self) -> usize {
        self.n_coins
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        check_index(index, self.n_coins, self.address())?;
        self.contract
            .coins(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        self.contract
            .get_dy(U256::from(i), U256::from(j), dx)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, min_dy: U256) -> HarnessResult<()> {
        mined(
            self.contract
                .exchange(U256::from(i), U256::from(j), dx, min_dy)
                .from(from)
                .send()
                .await,
            "cryptoswap exchange",
        )
        .await
    }
}

/// Wrapped native token as a two-coin pool: index 0 is the native coin,
/// index 1 the wrapped token.
#[derive(Clone)]
pub struct WrappedNativePool {
    contract: IWrappedNativeInstance<DynProvider>,
}

impl WrappedNativePool {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: IWrappedNative::new(address, provider),
        }
    }

    fn direction(&self, i: usize, j: usize) -> HarnessResult<bool> {
        match (i, j) {
            (0, 1) => Ok(true),
            (1, 0) => Ok(false),
            _ => Err(HarnessError::InvalidPool(format!(
                "wrapper {} only converts between index 0 and 1, got {} -> {}",
                self.address(),
                i,
                j
            ))),
        }
    }
}

#[async_trait]
impl ExchangePool for WrappedNativePool {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn n_coins(&self) -> usize {
        2
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        match index {
            0 => Ok(NATIVE_ASSET),
            1 => Ok(self.address()),
            _ => Err(HarnessError::InvalidPool(format!(
                "wrapper {} has 2 coins, index {} out of range",
                self.address(),
                index
            ))),
        }
    }

    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        self.direction(i, j)?;
        Ok(dx)
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, _min_dy: U256) -> HarnessResult<()> {
        if self.direction(i, j)? {
            mined(
                self.contract.deposit().from(from).value(dx).send().await,
                "wrap deposit",
            )
            .await
        } else {
            mined(
                self.contract.withdraw(dx).from(from).send().await,
                "wrap withdraw",
            )
            .await
        }
    }
}

/// Three-coin base pool with an external LP token
#[derive(Clone)]
pub struct BasePool {
    contract: IBasePoolInstance<DynProvider>,
    lp: Erc20Asset,
    coins: Vec<Arc<dyn AssetHandle>>,
}

impl BasePool {
    pub fn new(address: Address, lp: Erc20Asset, coins: Vec<Arc<dyn AssetHandle>>, provider: DynProvider) -> Self {
        Self {
            contract: IBasePool::new(address, provider),
            lp,
            coins,
        }
    }

    fn fixed_amounts(&self, amounts: &[U256]) -> HarnessResult<[U256; 3]> {
        amounts.try_into().map_err(|_| {
            HarnessError::InvalidPool(format!(
                "base pool {} takes 3 amounts, got {}",
                self.address(),
                amounts.len()
            ))
        })
    }
}

#[async_trait]
impl LiquidityPool for BasePool {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn lp_token(&self) -> Address {
        self.lp.address()
    }

    fn coins(&self) -> &[Arc<dyn AssetHandle>] {
        &self.coins
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        check_index(index, self.coins.len(), self.address())?;
        self.contract
            .coins(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn balances(&self, index: usize) -> HarnessResult<U256> {
        check_index(index, self.coins.len(), self.address())?;
        self.contract
            .balances(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn calc_token_amount(&self, amounts: &[U256]) -> HarnessResult<U256> {
        let amounts = self.fixed_amounts(amounts)?;
        self.contract
            .calc_token_amount(amounts, true)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn add_liquidity(
        &self,
        from: Address,
        amounts: &[U256],
        min_mint: U256,
        receiver: Address,
    ) -> HarnessResult<()> {
        if receiver != from {
            return Err(HarnessError::InvalidParameters(format!(
                "base pool {} mints to the depositor only",
                self.address()
            )));
        }
        let amounts = self.fixed_amounts(amounts)?;
        mined(
            self.contract
                .add_liquidity(amounts, min_mint)
                .from(from)
                .send()
                .await,
            "base pool add_liquidity",
        )
        .await
    }

    async fn lp_balance_of(&self, owner: Address) -> HarnessResult<U256> {
        self.lp.balance_of(owner).await
    }
}

/// Two-coin factory metapool
#[derive(Clone)]
pub struct Metapool {
    contract: IMetapoolInstance<DynProvider>,
    coins: Vec<Arc<dyn AssetHandle>>,
}

impl Metapool {
    pub fn new(address: Address, coins: Vec<Arc<dyn AssetHandle>>, provider: DynProvider) -> Self {
        Self {
            contract: IMetapool::new(address, provider),
            coins,
        }
    }

    fn fixed_amounts(&self, amounts: &[U256]) -> HarnessResult<[U256; 2]> {
        amounts.try_into().map_err(|_| {
            HarnessError::InvalidPool(format!(
                "metapool {} takes 2 amounts, got {}",
                self.address(),
                amounts.len()
            ))
        })
    }
}

#[async_trait]
impl LiquidityPool for Metapool {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    fn lp_token(&self) -> Address {
        self.address()
    }

    fn coins(&self) -> &[Arc<dyn AssetHandle>] {
        &self.coins
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        check_index(index, self.coins.len(), self.address())?;
        self.contract
            .coins(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn balances(&self, index: usize) -> HarnessResult<U256> {
        check_index(index, self.coins.len(), self.address())?;
        self.contract
            .balances(U256::from(index))
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn calc_token_amount(&self, amounts: &[U256]) -> HarnessResult<U256> {
        let amounts = self.fixed_amounts(amounts)?;
        self.contract
            .calc_token_amount(amounts, true)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }

    async fn add_liquidity(
        &self,
        from: Address,
        amounts: &[U256],
        min_mint: U256,
        receiver: Address,
    ) -> HarnessResult<()> {
        let amounts = self.fixed_amounts(amounts)?;
        mined(
            self.contract
                .add_liquidity(amounts, min_mint, receiver)
                .from(from)
                .send()
                .await,
            "metapool add_liquidity",
        )
        .await
    }

    async fn lp_balance_of(&self, owner: Address) -> HarnessResult<U256> {
        self.contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(HarnessError::from_contract)
    }
}

/// Metapool factory
#[derive(Clone)]
pub struct MetapoolFactory {
    contract: IMetapoolFactoryInstance<DynProvider>,
    provider: DynProvider,
}

impl MetapoolFactory {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: IMetapoolFactory::new(address, provider.clone()),
            provider,
        }
    }
}

#[async_trait]
impl PoolFactory for MetapoolFactory {
    type Pool = Metapool;

    async fn deploy_metapool(&self, from: Address, deployment: &MetapoolDeployment) -> HarnessResult<()> {
        mined(
            self.contract
                .deploy_metapool(
                    deployment.base_pool,
                    deployment.name.clone(),
                    deployment.symbol.clone(),
                    deployment.coin,
                    deployment.amplification,
                    deployment.fee,
                )
                .from(from)
                .send()
                .await,
            "deploy_metapool",
        )
        .await
    }

    async fn find_pool_for_coins(&self, coin_a: Address, coin_b: Address) -> HarnessResult<Option<Address>> {
        let pool = self
            .contract
            .find_pool_for_coins(coin_a, coin_b)
            .call()
            .await
            .map_err(HarnessError::from_contract)?;
        Ok((!pool.is_zero()).then_some(pool))
    }

    fn pool_at(&self, address: Address, coins: Vec<Arc<dyn AssetHandle>>) -> Metapool {
        Metapool::new(address, coins, self.provider.clone())
    }
}
