use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::{ExchangePool, LiquidityPool};
use crate::error::{HarnessError, HarnessResult};

/// Exposes a liquidity pool as an exchange whose last index is the LP token.
///
/// `exchange(i, n, dx, min)` deposits `dx` of coin `i` alone and mints LP
/// tokens to the sender. Redeeming LP tokens is not supported.
#[derive(Clone)]
pub struct LiquidityMintVenue {
    pool: Arc<dyn LiquidityPool>,
}

impl LiquidityMintVenue {
    pub fn new(pool: Arc<dyn LiquidityPool>) -> Self {
        Self { pool }
    }

    fn lp_index(&self) -> usize {
        self.pool.coins().len()
    }

    fn one_hot(&self, i: usize, j: usize, dx: U256) -> HarnessResult<Vec<U256>> {
        if j != self.lp_index() || i >= self.lp_index() {
            return Err(HarnessError::InvalidRoute(format!(
                "pool {} can only mint its LP token (index {}), got {} -> {}",
                self.pool.address(),
                self.lp_index(),
                i,
                j
            )));
        }
        let mut amounts = vec![U256::ZERO; self.lp_index()];
        amounts[i] = dx;
        Ok(amounts)
    }
}

#[async_trait]
impl ExchangePool for LiquidityMintVenue {
    fn address(&self) -> Address {
        self.pool.address()
    }

    fn n_coins(&self) -> usize {
        self.lp_index() + 1
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        if index == self.lp_index() {
            return Ok(self.pool.lp_token());
        }
        if index > self.lp_index() {
            return Err(HarnessError::InvalidPool(format!(
                "pool {} has {} coins, index {} out of range",
                self.pool.address(),
                self.lp_index(),
                index
            )));
        }
        self.pool.coin(index).await
    }

    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        let amounts = self.one_hot(i, j, dx)?;
        self.pool.calc_token_amount(&amounts).await
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, min_dy: U256) -> HarnessResult<()> {
        let amounts = self.one_hot(i, j, dx)?;
        self.pool.add_liquidity(from, &amounts, min_dy, from).await
    }
}
