//! Harness error types

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Harness error type
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Signer lacks funds for a hop or deposit
    #[error("Insufficient balance of {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        required: U256,
        available: U256,
    },

    /// Realized or quoted output fell below the accepted minimum
    #[error("Slippage exceeded in {context}: minimum {minimum}, actual {actual:?}")]
    SlippageExceeded {
        context: String,
        minimum: U256,
        actual: Option<U256>,
    },

    /// Pool already holds reserves, creation must not run again
    #[error("Pool {pool} already created/funded (reserves {reserves:?}), use fund() instead")]
    PoolAlreadyInitialized { pool: Address, reserves: Vec<U256> },

    /// A mined transaction did not move the balance it was supposed to move
    #[error("Stale read assumption in {context}: balance of {asset} went from {before} to {after}")]
    StaleReadAssumption {
        context: String,
        asset: Address,
        before: U256,
        after: U256,
    },

    /// Pool is empty, missing, or does not match the expected coin layout
    #[error("Invalid pool: {0}")]
    InvalidPool(String),

    /// Hops do not compose into a chain
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Contract call reverted for a reason that has no domain meaning
    #[error("Execution reverted ({reason:?}): {message}")]
    Reverted { reason: RevertReason, message: String },

    /// Transaction mined with a failed status
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A chain stopped at `hop`; `completed` earlier hops stay mined
    #[error("Hop {hop} failed after {completed} completed hop(s): {source}")]
    HopFailed {
        hop: usize,
        completed: usize,
        #[source]
        source: Box<HarnessError>,
    },

    #[error(transparent)]
    Contract(#[from] alloy::contract::Error),

    #[error(transparent)]
    Transport(#[from] alloy::transports::TransportError),

    #[error(transparent)]
    PendingTransaction(#[from] alloy::providers::PendingTransactionError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Classified revert message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    Slippage,
    InsufficientFunds,
    Other(String),
}

impl RevertReason {
    /// Classify a revert message. Returns `None` when the message is not a revert.
    pub fn parse(message: &str) -> Option<Self> {
        let lower = message.to_ascii_lowercase();
        if !lower.contains("revert") {
            return None;
        }

        let reason = if lower.contains("slippage") || lower.contains("fewer coins than expected") {
            RevertReason::Slippage
        } else if lower.contains("insufficient")
            || lower.contains("exceeds balance")
            || lower.contains("exceeds allowance")
        {
            RevertReason::InsufficientFunds
        } else {
            let detail = message
                .split_once("reverted")
                .map(|(_, rest)| rest.trim_start_matches(':').trim())
                .unwrap_or(message);
            RevertReason::Other(detail.to_string())
        };
        Some(reason)
    }
}

impl HarnessError {
    /// The originating error beneath any `HopFailed` wrappers
    pub fn root(&self) -> &HarnessError {
        match self {
            HarnessError::HopFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Translate a contract error, keeping non-revert failures untouched
    pub fn from_contract(err: alloy::contract::Error) -> Self {
        let message = err.to_string();
        match RevertReason::parse(&message) {
            Some(reason) => HarnessError::Reverted { reason, message },
            None => HarnessError::Contract(err),
        }
    }

    /// Revert reason, if this error is an untranslated revert
    pub fn revert_reason(&self) -> Option<&RevertReason> {
        match self.root() {
            HarnessError::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_classification() {
        assert_eq!(
            RevertReason::parse("server returned an error response: execution reverted: Slippage screwed you"),
            Some(RevertReason::Slippage)
        );
        assert_eq!(
            RevertReason::parse("execution reverted: Exchange resulted in fewer coins than expected"),
            Some(RevertReason::Slippage)
        );
        assert_eq!(
            RevertReason::parse("execution reverted: ERC20: transfer amount exceeds balance"),
            Some(RevertReason::InsufficientFunds)
        );
        assert_eq!(
            RevertReason::parse("execution reverted: dev: paused"),
            Some(RevertReason::Other("dev: paused".to_string()))
        );
        assert_eq!(RevertReason::parse("connection refused"), None);
    }

    #[test]
    fn test_root_unwraps_hop_failures() {
        let inner = HarnessError::SlippageExceeded {
            context: "hop".to_string(),
            minimum: U256::from(10),
            actual: None,
        };
        let wrapped = HarnessError::HopFailed {
            hop: 2,
            completed: 2,
            source: Box::new(HarnessError::HopFailed {
                hop: 0,
                completed: 0,
                source: Box::new(inner),
            }),
        };
        assert!(matches!(wrapped.root(), HarnessError::SlippageExceeded { .. }));
    }
}
