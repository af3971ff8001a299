//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use fork_harness::chain::LiquidityMintVenue;
use fork_harness::testing::{SimChain, SimPool, SimToken, SimWrapper};
use fork_harness::{AssetHandle, ExchangePool, LiquidityPool, SwapChain, SwapHop};

/// Deposit `amounts` into `pool` from a throwaway liquidity provider
pub async fn seed(chain: &SimChain, pool: &SimPool, coins: &[SimToken], amounts: &[U256]) -> Result<()> {
    let provider = chain.account();
    for (coin, amount) in coins.iter().zip(amounts) {
        chain.mint(coin, provider, *amount);
        coin.approve(provider, ExchangePool::address(pool), *amount).await?;
    }
    LiquidityPool::add_liquidity(pool, provider, amounts, U256::from(1), provider).await?;
    Ok(())
}

pub fn asset(token: &SimToken) -> Arc<dyn AssetHandle> {
    Arc::new(token.clone())
}

/// Mainnet-shaped fork: native -> wrapped -> stable -> base LP -> target stable
pub struct Fork {
    pub chain: SimChain,
    pub signer: Address,
    pub eth: SimToken,
    pub weth: SimToken,
    pub usdt: SimToken,
    pub wbtc: SimToken,
    pub dai: SimToken,
    pub usdc: SimToken,
    pub three_crv: SimToken,
    pub lusd: SimToken,
    pub wrapper: SimWrapper,
    pub tricrypto: SimPool,
    pub three_pool: SimPool,
    pub lusd_pool: SimPool,
}

impl Fork {
    pub async fn new() -> Result<Self> {
        let chain = SimChain::new();
        let signer = chain.account();
        let eth = chain.native();
        let (weth, wrapper) = chain.wrapper();
        let usdt = chain.token("USDT", 6);
        let wbtc = chain.token("WBTC", 8);
        let dai = chain.token("DAI", 18);
        let usdc = chain.token("USDC", 6);
        let three_crv = chain.token("3CRV", 18);
        let lusd = chain.token("LUSD", 18);

        let tricrypto = chain.pool(&[usdt.clone(), wbtc.clone(), weth.clone()], &[1, 20_000, 1_500], 4);
        seed(
            &chain,
            &tricrypto,
            &[usdt.clone(), wbtc.clone(), weth.clone()],
            &[usdt.units(1_000_000), wbtc.units(50), weth.units(1_000)],
        )
        .await?;

        let three_pool = chain.pool_with_lp(&[dai.clone(), usdc.clone(), usdt.clone()], &[1, 1, 1], 1, &three_crv);
        seed(
            &chain,
            &three_pool,
            &[dai.clone(), usdc.clone(), usdt.clone()],
            &[dai.units(1_000_000), usdc.units(1_000_000), usdt.units(1_000_000)],
        )
        .await?;

        let lusd_pool = chain.pool(&[lusd.clone(), three_crv.clone()], &[1, 1], 4);
        seed(
            &chain,
            &lusd_pool,
            &[lusd.clone(), three_crv.clone()],
            &[lusd.units(1_000_000), three_crv.units(1_000_000)],
        )
        .await?;

        chain.mint(&eth, signer, eth.units(1));

        Ok(Self {
            chain,
            signer,
            eth,
            weth,
            usdt,
            wbtc,
            dai,
            usdc,
            three_crv,
            lusd,
            wrapper,
            tricrypto,
            three_pool,
            lusd_pool,
        })
    }

    pub fn wrap_hop(&self) -> Result<SwapHop> {
        Ok(SwapHop::new(
            asset(&self.eth),
            asset(&self.weth),
            Arc::new(self.wrapper.clone()),
            0,
            1,
        )?)
    }

    pub fn weth_to_usdt_hop(&self) -> Result<SwapHop> {
        Ok(SwapHop::new(
            asset(&self.weth),
            asset(&self.usdt),
            Arc::new(self.tricrypto.clone()),
            2,
            0,
        )?)
    }

    pub fn usdt_to_three_crv_hop(&self) -> Result<SwapHop> {
        let venue = LiquidityMintVenue::new(Arc::new(self.three_pool.clone()));
        Ok(SwapHop::new(
            asset(&self.usdt),
            asset(&self.three_crv),
            Arc::new(venue),
            2,
            3,
        )?)
    }

    pub fn three_crv_to_lusd_hop(&self) -> Result<SwapHop> {
        Ok(SwapHop::new(
            asset(&self.three_crv),
            asset(&self.lusd),
            Arc::new(self.lusd_pool.clone()),
            1,
            0,
        )?)
    }

    pub fn eth_to_lusd(&self) -> Result<SwapChain> {
        Ok(SwapChain::new(vec![
            self.wrap_hop()?,
            self.weth_to_usdt_hop()?,
            self.usdt_to_three_crv_hop()?,
            self.three_crv_to_lusd_hop()?,
        ])?)
    }
}
