//! Pool creation followed by the first deposit
//!
//! `Uninitialized -> Created -> Funded`. `Funded` is terminal; asking for a
//! pool that already holds reserves fails with
//! [`HarnessError::PoolAlreadyInitialized`] before any transaction is sent.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{info, instrument};

use crate::chain::{read_reserves, AssetHandle, LiquidityPool, MetapoolDeployment, PoolFactory};
use crate::error::{HarnessError, HarnessResult};
use crate::liquidity::{DepositReceipt, LiquidityBootstrapper};

/// Factory fee precision (1e10 = 100%)
const FEE_PRECISION_PER_BPS: u64 = 1_000_000;
const MAX_SYMBOL_LEN: usize = 10;
const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    Uninitialized,
    /// Pool address known, reserves not yet checked
    Created { pool: Address },
    Funded { pool: Address, reserves: Vec<U256> },
}

/// What to deploy
#[derive(Clone)]
pub struct MetapoolParams {
    pub base_pool: Address,
    /// LP token of the base pool, second coin of the new pool
    pub base_lp: Arc<dyn AssetHandle>,
    /// First coin of the new pool
    pub new_asset: Arc<dyn AssetHandle>,
    pub name: String,
    pub amplification: u64,
    pub fee_bps: u16,
}

impl MetapoolParams {
    /// Upper-cased alphanumerics of the name
    pub fn symbol(&self) -> String {
        self.name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .take(MAX_SYMBOL_LEN)
            .collect()
    }

    pub fn coins(&self) -> Vec<Arc<dyn AssetHandle>> {
        vec![self.new_asset.clone(), self.base_lp.clone()]
    }

    pub fn deployment(&self) -> HarnessResult<MetapoolDeployment> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(HarnessError::InvalidParameters(format!(
                "pool name must be 1 to {} characters, got {:?}",
                MAX_NAME_LEN, self.name
            )));
        }
        let symbol = self.symbol();
        if symbol.is_empty() {
            return Err(HarnessError::InvalidParameters(format!(
                "pool name {:?} yields an empty symbol",
                self.name
            )));
        }
        if self.amplification == 0 {
            return Err(HarnessError::InvalidParameters("amplification must be positive".to_string()));
        }

        Ok(MetapoolDeployment {
            base_pool: self.base_pool,
            name: self.name.clone(),
            symbol,
            coin: self.new_asset.address(),
            amplification: U256::from(self.amplification),
            fee: U256::from(self.fee_bps) * U256::from(FEE_PRECISION_PER_BPS),
        })
    }
}

/// Creates a pool through a factory and seeds it once
pub struct PoolLifecycleManager<F: PoolFactory> {
    factory: F,
    bootstrapper: LiquidityBootstrapper,
    state: PoolState,
}

impl<F: PoolFactory> PoolLifecycleManager<F> {
    pub fn new(factory: F, bootstrapper: LiquidityBootstrapper) -> Self {
        Self {
            factory,
            bootstrapper,
            state: PoolState::Uninitialized,
        }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Locate an existing pool for the pair and fail if it holds reserves
    async fn guard_existing(&self, params: &MetapoolParams) -> HarnessResult<Option<F::Pool>> {
        let found = self
            .factory
            .find_pool_for_coins(params.new_asset.address(), params.base_lp.address())
            .await?;
        let Some(address) = found else {
            return Ok(None);
        };

        let pool = self.factory.pool_at(address, params.coins());
        let reserves = read_reserves(&pool).await?;
        if reserves.iter().any(|r| !r.is_zero()) {
            return Err(HarnessError::PoolAlreadyInitialized {
                pool: address,
                reserves,
            });
        }
        Ok(Some(pool))
    }

    /// Deploy the pool (unless an empty one already exists for the pair),
    /// then make its first deposit of `amounts`.
    #[instrument(skip(self, params, amounts), fields(name = %params.name))]
    pub async fn create_and_fund(
        &mut self,
        signer: Address,
        params: &MetapoolParams,
        amounts: &[U256],
        receiver: Address,
    ) -> HarnessResult<(F::Pool, DepositReceipt)> {
        if let PoolState::Funded { pool, reserves } = &self.state {
            return Err(HarnessError::PoolAlreadyInitialized {
                pool: *pool,
                reserves: reserves.clone(),
            });
        }
        let deployment = params.deployment()?;

        let pool = match self.guard_existing(params).await? {
            Some(pool) => {
                info!(pool = %pool.address(), "reusing empty pool for pair");
                pool
            }
            None => {
                self.factory.deploy_metapool(signer, &deployment).await?;
                let address = self
                    .factory
                    .find_pool_for_coins(params.new_asset.address(), params.base_lp.address())
                    .await?
                    .ok_or_else(|| {
                        HarnessError::InvalidPool(format!(
                            "factory has no pool for {} / {} after deployment",
                            params.new_asset.address(),
                            params.base_lp.address()
                        ))
                    })?;
                info!(pool = %address, symbol = %deployment.symbol, "metapool deployed");
                self.factory.pool_at(address, params.coins())
            }
        };
        self.state = PoolState::Created { pool: pool.address() };

        // The pool was found empty above; re-read right before funding anyway
        let reserves = read_reserves(&pool).await?;
        if reserves.iter().any(|r| !r.is_zero()) {
            return Err(HarnessError::PoolAlreadyInitialized {
                pool: pool.address(),
                reserves,
            });
        }

        let receipt = self.bootstrapper.fund(signer, &pool, amounts, receiver, false).await?;

        let reserves = read_reserves(&pool).await?;
        self.state = PoolState::Funded {
            pool: pool.address(),
            reserves,
        };
        Ok((pool, receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimChain;

    #[test]
    fn test_symbol_and_fee_derivation() {
        let chain = SimChain::new();
        let params = MetapoolParams {
            base_pool: Address::repeat_byte(0x33),
            base_lp: Arc::new(chain.token("3CRV", 18)),
            new_asset: Arc::new(chain.token("MOCK", 18)),
            name: "Mock USD stable-coin".to_string(),
            amplification: 200,
            fee_bps: 4,
        };
        let deployment = params.deployment().unwrap();
        assert_eq!(deployment.symbol, "MOCKUSDSTA");
        assert_eq!(deployment.fee, U256::from(4_000_000u64));
        assert_eq!(deployment.amplification, U256::from(200u64));
    }

    #[test]
    fn test_empty_name_rejected() {
        let chain = SimChain::new();
        let params = MetapoolParams {
            base_pool: Address::repeat_byte(0x33),
            base_lp: Arc::new(chain.token("3CRV", 18)),
            new_asset: Arc::new(chain.token("MOCK", 18)),
            name: "--".to_string(),
            amplification: 200,
            fee_bps: 4,
        };
        assert!(matches!(params.deployment(), Err(HarnessError::InvalidParameters(_))));
    }
}
