//! Multi-hop swap integration tests against the in-memory fork

mod common;

use alloy::primitives::U256;
use anyhow::Result;
use common::{asset, Fork};
use fork_harness::chain::LiquidityMintVenue;
use fork_harness::testing::PoolFaults;
use fork_harness::{AssetHandle, ExchangePool, HarnessError, PoolFactory, SwapChain, SwapHop};
use std::sync::Arc;

#[tokio::test]
async fn test_four_hop_native_to_target_stable() -> Result<()> {
    let fork = Fork::new().await?;
    let chain = fork.eth_to_lusd()?;
    let amount_in = fork.eth.units(1);

    let quoted = chain.quote(amount_in).await?;
    let receipt = chain.execute(fork.signer, amount_in, U256::from(1)).await?;

    assert_eq!(receipt.hops.len(), 4);
    for hop in &receipt.hops {
        assert!(hop.balance_after > hop.balance_before);
        assert_eq!(hop.amount_out, hop.balance_after - hop.balance_before);
    }
    for pair in receipt.hops.windows(2) {
        assert_eq!(pair[1].amount_in, pair[0].amount_out);
    }

    assert_eq!(receipt.amount_out, quoted);
    assert_eq!(fork.lusd.balance_of(fork.signer).await?, receipt.amount_out);
    assert_eq!(fork.eth.balance_of(fork.signer).await?, U256::ZERO);
    // Roughly 1500 LUSD for one ETH after three fees
    assert!(receipt.amount_out > fork.lusd.units(1_490));
    assert!(receipt.amount_out < fork.lusd.units(1_500));
    Ok(())
}

#[tokio::test]
async fn test_broken_composition_rejected_before_any_transaction() -> Result<()> {
    let fork = Fork::new().await?;
    let before = fork.chain.transactions();

    let err = SwapChain::new(vec![fork.wrap_hop()?, fork.three_crv_to_lusd_hop()?]).unwrap_err();

    assert!(matches!(err, HarnessError::InvalidRoute(_)));
    assert_eq!(fork.chain.transactions(), before);
    Ok(())
}

#[tokio::test]
async fn test_wrong_index_mapping_rejected_before_any_transaction() -> Result<()> {
    let fork = Fork::new().await?;
    // tricrypto holds USDT at 0 and WETH at 2
    let misindexed = SwapHop::new(
        asset(&fork.weth),
        asset(&fork.usdt),
        Arc::new(fork.tricrypto.clone()),
        0,
        2,
    )?;
    let chain = SwapChain::new(vec![fork.wrap_hop()?, misindexed])?;
    let before = fork.chain.transactions();

    let err = chain.execute(fork.signer, fork.eth.units(1), U256::from(1)).await.unwrap_err();

    assert!(matches!(err, HarnessError::InvalidPool(_)));
    assert_eq!(fork.chain.transactions(), before);
    assert_eq!(fork.eth.balance_of(fork.signer).await?, fork.eth.units(1));
    Ok(())
}

#[tokio::test]
async fn test_noop_pool_is_stale_read() -> Result<()> {
    let fork = Fork::new().await?;
    fork.tricrypto.set_faults(PoolFaults {
        noop_exchange: true,
        ..PoolFaults::default()
    });
    let chain = SwapChain::new(vec![fork.wrap_hop()?, fork.weth_to_usdt_hop()?])?;

    let err = chain.execute(fork.signer, fork.eth.units(1), U256::from(1)).await.unwrap_err();

    match &err {
        HarnessError::HopFailed { hop, completed, .. } => {
            assert_eq!(*hop, 1);
            assert_eq!(*completed, 1);
        }
        other => panic!("expected HopFailed, got {:?}", other),
    }
    assert!(matches!(
        err.root(),
        HarnessError::StaleReadAssumption { before, after, .. } if before == after
    ));
    // The wrap hop stays mined
    assert_eq!(fork.weth.balance_of(fork.signer).await?, fork.weth.units(1));
    Ok(())
}

#[tokio::test]
async fn test_final_minimum_enforced_by_pool() -> Result<()> {
    let fork = Fork::new().await?;
    let chain = fork.eth_to_lusd()?;
    let amount_in = fork.eth.units(1);
    let quoted = chain.quote(amount_in).await?;

    let err = chain.execute(fork.signer, amount_in, quoted + U256::from(1)).await.unwrap_err();

    assert!(matches!(err, HarnessError::HopFailed { hop: 3, completed: 3, .. }));
    assert!(matches!(
        err.root(),
        HarnessError::SlippageExceeded { actual: None, .. }
    ));
    // Hops 0..3 stay mined: the signer now holds 3CRV
    assert!(fork.three_crv.balance_of(fork.signer).await? > U256::ZERO);
    assert_eq!(fork.lusd.balance_of(fork.signer).await?, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn test_final_minimum_enforced_when_pool_ignores_it() -> Result<()> {
    let fork = Fork::new().await?;
    fork.lusd_pool.set_faults(PoolFaults {
        ignore_minimums: true,
        ..PoolFaults::default()
    });
    let chain = fork.eth_to_lusd()?;
    let amount_in = fork.eth.units(1);
    let quoted = chain.quote(amount_in).await?;

    let err = chain.execute(fork.signer, amount_in, quoted + U256::from(1)).await.unwrap_err();

    match err.root() {
        HarnessError::SlippageExceeded { minimum, actual, .. } => {
            assert_eq!(*minimum, quoted + U256::from(1));
            assert_eq!(*actual, Some(quoted));
        }
        other => panic!("expected SlippageExceeded, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_insufficient_input_balance() -> Result<()> {
    let fork = Fork::new().await?;
    let chain = fork.eth_to_lusd()?;
    let before = fork.chain.transactions();

    let err = chain.execute(fork.signer, fork.eth.units(2), U256::from(1)).await.unwrap_err();

    assert!(matches!(err, HarnessError::HopFailed { hop: 0, completed: 0, .. }));
    match err.root() {
        HarnessError::InsufficientBalance { required, available, .. } => {
            assert_eq!(*required, fork.eth.units(2));
            assert_eq!(*available, fork.eth.units(1));
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }
    assert_eq!(fork.chain.transactions(), before);
    Ok(())
}

#[tokio::test]
async fn test_hop_rejects_same_asset_and_bad_indices() -> Result<()> {
    let fork = Fork::new().await?;

    let same = SwapHop::new(asset(&fork.usdt), asset(&fork.usdt), Arc::new(fork.tricrypto.clone()), 0, 1);
    assert!(matches!(same, Err(HarnessError::InvalidRoute(_))));

    let out_of_range = SwapHop::new(asset(&fork.weth), asset(&fork.usdt), Arc::new(fork.tricrypto.clone()), 2, 3);
    assert!(matches!(out_of_range, Err(HarnessError::InvalidPool(_))));

    assert!(matches!(SwapChain::new(Vec::new()), Err(HarnessError::InvalidRoute(_))));
    Ok(())
}

#[tokio::test]
async fn test_per_hop_minimum_tightens_intermediate_hop() -> Result<()> {
    let fork = Fork::new().await?;
    let wrap_quote = fork.wrap_hop()?.quote(fork.eth.units(1)).await?;
    let usdt_quote = fork.weth_to_usdt_hop()?.quote(wrap_quote).await?;
    let chain = SwapChain::new(vec![
        fork.wrap_hop()?,
        fork.weth_to_usdt_hop()?.with_min_amount_out(usdt_quote + U256::from(1)),
        fork.usdt_to_three_crv_hop()?,
    ])?;

    let err = chain.execute(fork.signer, fork.eth.units(1), U256::from(1)).await.unwrap_err();

    assert!(matches!(err, HarnessError::HopFailed { hop: 1, .. }));
    assert!(matches!(err.root(), HarnessError::SlippageExceeded { .. }));
    Ok(())
}

#[tokio::test]
async fn test_mint_venue_reports_coins_from_pool() -> Result<()> {
    let fork = Fork::new().await?;
    // Handle bound as [3CRV, LUSD] over a pool holding [LUSD, 3CRV]
    let swapped = fork
        .chain
        .factory(&fork.three_crv)
        .pool_at(fork.lusd_pool.address(), vec![asset(&fork.three_crv), asset(&fork.lusd)]);
    let venue = LiquidityMintVenue::new(Arc::new(swapped));

    assert_eq!(venue.coin(0).await?, fork.lusd.address());
    assert_eq!(venue.coin(1).await?, fork.three_crv.address());
    assert_eq!(venue.coin(2).await?, fork.lusd_pool.address());

    let hop = SwapHop::new(asset(&fork.three_crv), asset(&fork.lusd), Arc::new(venue), 0, 2)?;
    let err = hop.verify_indices().await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidPool(_)));
    Ok(())
}
