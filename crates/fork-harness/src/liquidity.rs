//! Slippage-bounded deposits into two-or-more asset pools

use alloy::primitives::{Address, U256};
use tracing::{info, instrument, warn};

use crate::chain::{read_reserves, verify_coin_order, LiquidityPool};
use crate::config::SlippageTolerance;
use crate::error::{HarnessError, HarnessResult, RevertReason};

/// How the minimum accepted LP amount was decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositPlan {
    /// All reserves zero, there is no price to slip against
    Virgin,
    /// Reserves were not read (`skip_quoting`)
    Unquoted,
    /// Seeded pool, floor derived from the pool's own quote
    Quoted { quoted: U256, minimum: U256 },
}

impl DepositPlan {
    pub fn minimum(&self) -> U256 {
        match self {
            DepositPlan::Virgin | DepositPlan::Unquoted => U256::from(1),
            DepositPlan::Quoted { minimum, .. } => *minimum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub plan: DepositPlan,
    pub minted: U256,
    /// Empty when reserves were not read
    pub reserves_before: Vec<U256>,
}

/// Funds pools, branching on whether they already hold reserves
#[derive(Debug, Clone, Copy, Default)]
pub struct LiquidityBootstrapper {
    tolerance: SlippageTolerance,
}

impl LiquidityBootstrapper {
    pub fn new(tolerance: SlippageTolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> SlippageTolerance {
        self.tolerance
    }

    /// Decide the LP floor from live reserves. Returns the reserves the
    /// decision was made on.
    pub async fn plan<P: LiquidityPool + ?Sized>(
        &self,
        pool: &P,
        amounts: &[U256],
        skip_quoting: bool,
    ) -> HarnessResult<(DepositPlan, Vec<U256>)> {
        if skip_quoting {
            return Ok((DepositPlan::Unquoted, Vec::new()));
        }

        let reserves = read_reserves(pool).await?;
        if reserves.iter().all(|r| r.is_zero()) {
            return Ok((DepositPlan::Virgin, reserves));
        }

        let quoted = pool.calc_token_amount(amounts).await?;
        if quoted.is_zero() {
            return Err(HarnessError::InvalidPool(format!(
                "pool {} quoted zero LP tokens for a deposit into non-empty reserves {:?}",
                pool.address(),
                reserves
            )));
        }
        let minimum = self.tolerance.floor(quoted);
        Ok((DepositPlan::Quoted { quoted, minimum }, reserves))
    }

    /// Approve every constituent, pick the LP floor from live reserves and
    /// deposit. Fails rather than accept fewer LP tokens than the floor.
    #[instrument(skip(self, pool, amounts), fields(pool = %pool.address()))]
    pub async fn fund<P: LiquidityPool + ?Sized>(
        &self,
        signer: Address,
        pool: &P,
        amounts: &[U256],
        receiver: Address,
        skip_quoting: bool,
    ) -> HarnessResult<DepositReceipt> {
        let coins = pool.coins();
        if amounts.len() != coins.len() {
            return Err(HarnessError::InvalidPool(format!(
                "pool {} has {} coins, got {} amounts",
                pool.address(),
                coins.len(),
                amounts.len()
            )));
        }
        if amounts.iter().all(|a| a.is_zero()) {
            return Err(HarnessError::InvalidParameters("deposit amounts are all zero".to_string()));
        }

        verify_coin_order(pool).await?;

        for (coin, amount) in coins.iter().zip(amounts) {
            let available = coin.balance_of(signer).await?;
            if available < *amount {
                return Err(HarnessError::InsufficientBalance {
                    asset: coin.address(),
                    required: *amount,
                    available,
                });
            }
        }

        for (coin, amount) in coins.iter().zip(amounts) {
            if !amount.is_zero() {
                coin.approve(signer, pool.address(), *amount).await?;
            }
        }

        if skip_quoting {
            warn!("reserve read skipped, depositing with no slippage floor");
        }
        let (plan, reserves_before) = self.plan(pool, amounts, skip_quoting).await?;
        let minimum = plan.minimum();

        let lp_before = pool.lp_balance_of(receiver).await?;
        if let Err(err) = pool.add_liquidity(signer, amounts, minimum, receiver).await {
            return Err(self.translate_revert(signer, pool, amounts, minimum, err).await);
        }
        let lp_after = pool.lp_balance_of(receiver).await?;

        if lp_after <= lp_before {
            return Err(HarnessError::StaleReadAssumption {
                context: format!("liquidity deposit into {}", pool.address()),
                asset: pool.lp_token(),
                before: lp_before,
                after: lp_after,
            });
        }
        let minted = lp_after - lp_before;
        if minted < minimum {
            return Err(HarnessError::SlippageExceeded {
                context: format!("liquidity deposit into {}", pool.address()),
                minimum,
                actual: Some(minted),
            });
        }

        info!(?plan, %minted, "liquidity deposited");

        Ok(DepositReceipt {
            plan,
            minted,
            reserves_before,
        })
    }

    /// Map a deposit revert onto the domain error it stands for
    async fn translate_revert<P: LiquidityPool + ?Sized>(
        &self,
        signer: Address,
        pool: &P,
        amounts: &[U256],
        minimum: U256,
        err: HarnessError,
    ) -> HarnessError {
        match err.revert_reason().cloned() {
            Some(RevertReason::Slippage) => HarnessError::SlippageExceeded {
                context: format!("liquidity deposit into {}", pool.address()),
                minimum,
                actual: None,
            },
            Some(RevertReason::InsufficientFunds) => {
                for (coin, amount) in pool.coins().iter().zip(amounts) {
                    match coin.balance_of(signer).await {
                        Ok(available) if available < *amount => {
                            return HarnessError::InsufficientBalance {
                                asset: coin.address(),
                                required: *amount,
                                available,
                            }
                        }
                        Ok(_) => {}
                        Err(read_err) => return read_err,
                    }
                }
                err
            }
            _ => err,
        }
    }
}
