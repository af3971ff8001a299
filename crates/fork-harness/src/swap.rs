//! Multi-hop swaps
//!
//! A [`SwapHop`] performs one approval-then-exchange on one pool and
//! measures what it received. A [`SwapChain`] runs hops strictly in order,
//! feeding each realized output into the next hop.
//!
//! Chains are NOT atomic. Every hop is its own transaction: when hop `k`
//! fails, hops `0..k` stay mined and their outputs stay in the signer's
//! account. The error reports how many hops completed
//! ([`HarnessError::HopFailed`]); unwinding is the caller's decision.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument};

use crate::chain::{AssetHandle, ExchangePool};
use crate::error::{HarnessError, HarnessResult, RevertReason};

/// Outcome of one mined hop.
///
/// Balances are the signer's holdings of the hop's output asset. Gas is paid
/// in the native coin and is not accounted for, so routes never output it
/// (see [`PoolRegistry::route`](crate::registry::PoolRegistry::route)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopReceipt {
    pub pool: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub balance_before: U256,
    pub balance_after: U256,
}

/// Outcome of a whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub hops: Vec<HopReceipt>,
    pub amount_out: U256,
}

/// One exchange on one pool
#[derive(Clone)]
pub struct SwapHop {
    input: Arc<dyn AssetHandle>,
    output: Arc<dyn AssetHandle>,
    pool: Arc<dyn ExchangePool>,
    input_index: usize,
    output_index: usize,
    min_amount_out: Option<U256>,
}

impl std::fmt::Debug for SwapHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapHop")
            .field("input", &self.input.address())
            .field("output", &self.output.address())
            .field("pool", &self.pool.address())
            .field("input_index", &self.input_index)
            .field("output_index", &self.output_index)
            .finish()
    }
}

impl SwapHop {
    pub fn new(
        input: Arc<dyn AssetHandle>,
        output: Arc<dyn AssetHandle>,
        pool: Arc<dyn ExchangePool>,
        input_index: usize,
        output_index: usize,
    ) -> HarnessResult<Self> {
        let n_coins = pool.n_coins();
        if input_index == output_index || input_index >= n_coins || output_index >= n_coins {
            return Err(HarnessError::InvalidPool(format!(
                "pool {} with {} coins cannot exchange index {} for {}",
                pool.address(),
                n_coins,
                input_index,
                output_index
            )));
        }
        if input.address() == output.address() {
            return Err(HarnessError::InvalidRoute(format!(
                "hop through {} swaps {} for itself",
                pool.address(),
                input.address()
            )));
        }

        Ok(Self {
            input,
            output,
            pool,
            input_index,
            output_index,
            min_amount_out: None,
        })
    }

    /// Tighter bound than the chain default for this hop
    pub fn with_min_amount_out(mut self, min_amount_out: U256) -> Self {
        self.min_amount_out = Some(min_amount_out);
        self
    }

    pub fn input(&self) -> &Arc<dyn AssetHandle> {
        &self.input
    }

    pub fn output(&self) -> &Arc<dyn AssetHandle> {
        &self.output
    }

    pub fn pool(&self) -> &Arc<dyn ExchangePool> {
        &self.pool
    }

    /// Check the pool reports this hop's assets at its indices
    pub async fn verify_indices(&self) -> HarnessResult<()> {
        for (index, asset) in [(self.input_index, &self.input), (self.output_index, &self.output)] {
            let coin = self.pool.coin(index).await?;
            if coin != asset.address() {
                return Err(HarnessError::InvalidPool(format!(
                    "pool {} holds {} at index {}, expected {}",
                    self.pool.address(),
                    coin,
                    index,
                    asset.address()
                )));
            }
        }
        Ok(())
    }

    /// Read-only quote of this hop
    pub async fn quote(&self, amount_in: U256) -> HarnessResult<U256> {
        self.pool
            .get_dy(self.input_index, self.output_index, amount_in)
            .await
    }

    /// Approve and exchange `amount_in`, returning the realized output.
    ///
    /// The pool enforces `min_amount_out`; independently the signer's output
    /// balance must strictly increase across the call.
    #[instrument(
        skip(self),
        fields(pool = %self.pool.address(), i = self.input_index, j = self.output_index)
    )]
    pub async fn execute(&self, signer: Address, amount_in: U256, min_amount_out: U256) -> HarnessResult<HopReceipt> {
        if amount_in.is_zero() {
            return Err(HarnessError::InvalidParameters("hop amount_in must be positive".to_string()));
        }
        let min_amount_out = self.min_amount_out.map_or(min_amount_out, |own| own.max(min_amount_out));

        // Native input is checked against `amount_in` only; a gas shortfall
        // surfaces from the node as a transport error.
        let available = self.input.balance_of(signer).await?;
        if available < amount_in {
            return Err(HarnessError::InsufficientBalance {
                asset: self.input.address(),
                required: amount_in,
                available,
            });
        }

        let balance_before = self.output.balance_of(signer).await?;

        self.input.approve(signer, self.pool.address(), amount_in).await?;
        self.pool
            .exchange(signer, self.input_index, self.output_index, amount_in, min_amount_out)
            .await
            .map_err(|err| match err.revert_reason().cloned() {
                Some(RevertReason::Slippage) => HarnessError::SlippageExceeded {
                    context: format!("exchange on {}", self.pool.address()),
                    minimum: min_amount_out,
                    actual: None,
                },
                Some(RevertReason::InsufficientFunds) => HarnessError::InsufficientBalance {
                    asset: self.input.address(),
                    required: amount_in,
                    available,
                },
                _ => err,
            })?;

        let balance_after = self.output.balance_of(signer).await?;
        if balance_after <= balance_before {
            return Err(HarnessError::StaleReadAssumption {
                context: format!("exchange on {}", self.pool.address()),
                asset: self.output.address(),
                before: balance_before,
                after: balance_after,
            });
        }

        let amount_out = balance_after - balance_before;
        if amount_out < min_amount_out {
            return Err(HarnessError::SlippageExceeded {
                context: format!("exchange on {}", self.pool.address()),
                minimum: min_amount_out,
                actual: Some(amount_out),
            });
        }

        debug!(%amount_in, %amount_out, "hop mined");

        Ok(HopReceipt {
            pool: self.pool.address(),
            amount_in,
            amount_out,
            balance_before,
            balance_after,
        })
    }
}

/// Ordered hops executed by a single signer
#[derive(Debug, Clone)]
pub struct SwapChain {
    hops: Vec<SwapHop>,
}

impl SwapChain {
    /// Build a chain. Each hop must take the asset the previous hop produces.
    pub fn new(hops: Vec<SwapHop>) -> HarnessResult<Self> {
        if hops.is_empty() {
            return Err(HarnessError::InvalidRoute("a chain needs at least one hop".to_string()));
        }
        for (k, pair) in hops.windows(2).enumerate() {
            let produced = pair[0].output.address();
            let consumed = pair[1].input.address();
            if produced != consumed {
                return Err(HarnessError::InvalidRoute(format!(
                    "hop {} takes {} but hop {} produces {}",
                    k + 1,
                    consumed,
                    k,
                    produced
                )));
            }
        }
        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[SwapHop] {
        &self.hops
    }

    pub fn input_asset(&self) -> &Arc<dyn AssetHandle> {
        &self.hops[0].input
    }

    pub fn output_asset(&self) -> &Arc<dyn AssetHandle> {
        &self.hops[self.hops.len() - 1].output
    }

    /// Check every hop's pool/index mapping against on-chain coin addresses
    pub async fn verify_indices(&self) -> HarnessResult<()> {
        for hop in &self.hops {
            hop.verify_indices().await?;
        }
        Ok(())
    }

    /// Expected final output for `amount_in`, no transactions sent
    pub async fn quote(&self, amount_in: U256) -> HarnessResult<U256> {
        let mut amount = amount_in;
        for hop in &self.hops {
            amount = hop.quote(amount).await?;
        }
        Ok(amount)
    }

    /// Run every hop in order. Intermediate hops accept any positive output;
    /// `min_final_out` applies to the last hop only.
    #[instrument(skip(self), fields(hops = self.hops.len()))]
    pub async fn execute(&self, signer: Address, amount_in: U256, min_final_out: U256) -> HarnessResult<ChainReceipt> {
        self.verify_indices().await?;

        let last = self.hops.len() - 1;
        let floor = U256::from(1);
        let mut receipts = Vec::with_capacity(self.hops.len());
        let mut amount = amount_in;

        for (k, hop) in self.hops.iter().enumerate() {
            let min_out = if k == last { min_final_out.max(floor) } else { floor };
            let receipt = hop
                .execute(signer, amount, min_out)
                .await
                .map_err(|source| HarnessError::HopFailed {
                    hop: k,
                    completed: k,
                    source: Box::new(source),
                })?;
            amount = receipt.amount_out;
            receipts.push(receipt);
        }

        info!(%amount_in, amount_out = %amount, "swap chain completed");

        Ok(ChainReceipt {
            hops: receipts,
            amount_out: amount,
        })
    }
}
