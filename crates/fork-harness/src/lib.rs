//! Swap and liquidity bootstrap orchestration against a forked EVM chain
//!
//! Drives multi-hop exchanges across heterogeneous AMM pools and seeds new
//! or existing pools with slippage-bounded deposits. Every on-chain
//! interaction goes through the capability traits in [`chain`], so the same
//! orchestration runs against a live fork ([`chain::ChainSession`]) or the
//! in-memory double in [`testing`].

pub mod chain;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod liquidity;
pub mod registry;
pub mod swap;
pub mod testing;

pub use chain::{AssetHandle, ChainSession, ExchangePool, LiquidityPool, PoolFactory, NATIVE_ASSET};
pub use config::{HarnessConfig, SlippageTolerance};
pub use error::{HarnessError, HarnessResult, RevertReason};
pub use lifecycle::{MetapoolParams, PoolLifecycleManager, PoolState};
pub use liquidity::{DepositPlan, DepositReceipt, LiquidityBootstrapper};
pub use registry::PoolRegistry;
pub use swap::{ChainReceipt, HopReceipt, SwapChain, SwapHop};
