//! Liquidity bootstrap integration tests against the in-memory fork

mod common;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use fork_harness::testing::{PoolFaults, SimChain, SimPool, SimToken};
use fork_harness::{AssetHandle, DepositPlan, HarnessError, LiquidityBootstrapper, LiquidityPool, SlippageTolerance};

struct TwoAssetPool {
    chain: SimChain,
    signer: Address,
    a: SimToken,
    b: SimToken,
    pool: SimPool,
}

fn two_asset_pool() -> TwoAssetPool {
    let chain = SimChain::new();
    let signer = chain.account();
    let a = chain.token("A", 18);
    let b = chain.token("B", 18);
    let pool = chain.pool(&[a.clone(), b.clone()], &[1, 1], 4);
    chain.mint(&a, signer, U256::from(1_000u64));
    chain.mint(&b, signer, U256::from(1_000u64));
    TwoAssetPool {
        chain,
        signer,
        a,
        b,
        pool,
    }
}

fn hundreds() -> Vec<U256> {
    vec![U256::from(100u64), U256::from(100u64)]
}

#[tokio::test]
async fn test_virgin_pool_accepts_first_deposit() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();

    let receipt = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    assert_eq!(receipt.plan, DepositPlan::Virgin);
    assert_eq!(receipt.reserves_before, vec![U256::ZERO, U256::ZERO]);
    assert_eq!(setup.pool.reserves(), hundreds());
    assert!(receipt.minted > U256::ZERO);
    assert_eq!(setup.pool.lp_balance_of(setup.signer).await?, receipt.minted);
    // No quote was taken for an empty pool
    assert_eq!(setup.pool.quote_calls(), 0);
    assert_eq!(setup.a.balance_of(setup.signer).await?, U256::from(900u64));
    Ok(())
}

#[tokio::test]
async fn test_seeded_pool_deposit_uses_quote_floor() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    let receipt = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    match receipt.plan {
        DepositPlan::Quoted { quoted, minimum } => {
            assert_eq!(quoted, U256::from(200u64));
            assert_eq!(minimum, quoted - quoted / U256::from(100u64));
            assert!(receipt.minted >= minimum);
        }
        other => panic!("expected a quoted plan, got {:?}", other),
    }
    assert_eq!(receipt.reserves_before, hundreds());
    assert_eq!(setup.pool.reserves(), vec![U256::from(200u64), U256::from(200u64)]);
    assert_eq!(setup.pool.quote_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pool_reverts_below_floor() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;
    setup.pool.set_faults(PoolFaults {
        lp_haircut_bps: 200,
        ..PoolFaults::default()
    });

    let err = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await
        .unwrap_err();

    match err {
        HarnessError::SlippageExceeded { minimum, actual, .. } => {
            assert_eq!(minimum, U256::from(198u64));
            assert_eq!(actual, None);
        }
        other => panic!("expected SlippageExceeded, got {:?}", other),
    }
    assert_eq!(setup.pool.reserves(), hundreds());
    Ok(())
}

#[tokio::test]
async fn test_receipt_below_floor_rejected_when_pool_ignores_minimum() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;
    setup.pool.set_faults(PoolFaults {
        ignore_minimums: true,
        lp_haircut_bps: 200,
        ..PoolFaults::default()
    });

    let err = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::SlippageExceeded { actual: Some(actual), .. } if actual == U256::from(196u64)
    ));
    Ok(())
}

#[tokio::test]
async fn test_haircut_within_tolerance_accepted() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;
    setup.pool.set_faults(PoolFaults {
        lp_haircut_bps: 50,
        ..PoolFaults::default()
    });

    let receipt = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    assert_eq!(receipt.minted, U256::from(199u64));
    Ok(())
}

#[tokio::test]
async fn test_wider_tolerance_accepts_larger_haircut() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::new(SlippageTolerance::from_bps(500)?);
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;
    setup.pool.set_faults(PoolFaults {
        lp_haircut_bps: 200,
        ..PoolFaults::default()
    });

    let receipt = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    assert_eq!(receipt.plan.minimum(), U256::from(190u64));
    assert_eq!(receipt.minted, U256::from(196u64));
    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_sends_nothing() -> Result<()> {
    let setup = two_asset_pool();
    let before = setup.chain.transactions();

    let err = LiquidityBootstrapper::default()
        .fund(
            setup.signer,
            &setup.pool,
            &[U256::from(100u64), U256::from(5_000u64)],
            setup.signer,
            false,
        )
        .await
        .unwrap_err();

    match err {
        HarnessError::InsufficientBalance {
            asset,
            required,
            available,
        } => {
            assert_eq!(asset, setup.b.address());
            assert_eq!(required, U256::from(5_000u64));
            assert_eq!(available, U256::from(1_000u64));
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }
    assert_eq!(setup.chain.transactions(), before);
    Ok(())
}

#[tokio::test]
async fn test_amount_count_must_match_coins() -> Result<()> {
    let setup = two_asset_pool();

    let err = LiquidityBootstrapper::default()
        .fund(setup.signer, &setup.pool, &[U256::from(100u64)], setup.signer, false)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::InvalidPool(_)));
    Ok(())
}

#[tokio::test]
async fn test_all_zero_amounts_rejected() -> Result<()> {
    let setup = two_asset_pool();

    let err = LiquidityBootstrapper::default()
        .fund(setup.signer, &setup.pool, &[U256::ZERO, U256::ZERO], setup.signer, false)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::InvalidParameters(_)));
    Ok(())
}

#[tokio::test]
async fn test_skip_quoting_deposits_without_reading_reserves() -> Result<()> {
    let setup = two_asset_pool();
    let bootstrapper = LiquidityBootstrapper::default();
    bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await?;

    let receipt = bootstrapper
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, true)
        .await?;

    assert_eq!(receipt.plan, DepositPlan::Unquoted);
    assert!(receipt.reserves_before.is_empty());
    assert_eq!(setup.pool.quote_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_nothing_minted_is_stale_read() -> Result<()> {
    let setup = two_asset_pool();
    setup.pool.set_faults(PoolFaults {
        ignore_minimums: true,
        lp_haircut_bps: 10_000,
        ..PoolFaults::default()
    });

    let err = LiquidityBootstrapper::default()
        .fund(setup.signer, &setup.pool, &hundreds(), setup.signer, false)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::StaleReadAssumption { .. }));
    Ok(())
}

#[tokio::test]
async fn test_deposit_credits_separate_receiver() -> Result<()> {
    let setup = two_asset_pool();
    let receiver = setup.chain.account();

    let receipt = LiquidityBootstrapper::default()
        .fund(setup.signer, &setup.pool, &hundreds(), receiver, false)
        .await?;

    assert_eq!(setup.pool.lp_balance_of(receiver).await?, receipt.minted);
    assert_eq!(setup.pool.lp_balance_of(setup.signer).await?, U256::ZERO);
    Ok(())
}
