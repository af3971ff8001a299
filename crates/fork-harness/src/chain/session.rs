//! Connection to a forked node plus the registry it is read through

use std::str::FromStr;
use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use tracing::{info, warn};

use super::rpc::{
    BasePool, CryptoSwapPool, Erc20Asset, Metapool, MetapoolFactory, NativeAsset, StableSwapPool, WrappedNativePool,
};
use super::{AssetHandle, ExchangePool, LiquidityMintVenue, LiquidityPool};
use crate::config::{HarnessConfig, PoolKind, SlippageTolerance};
use crate::error::{HarnessError, HarnessResult};
use crate::lifecycle::MetapoolParams;
use crate::registry::PoolRegistry;
use crate::swap::{SwapChain, SwapHop};

/// Binds registry entries to RPC-backed handles
#[derive(Clone)]
pub struct ChainSession {
    provider: DynProvider,
    registry: PoolRegistry,
    signers: Vec<Address>,
    slippage: SlippageTolerance,
}

impl ChainSession {
    /// Connect to `config.chain.rpc_url` signing with `keys`. The first key
    /// is the default signer.
    pub async fn connect(config: &HarnessConfig, keys: &[String]) -> HarnessResult<Self> {
        config.validate()?;
        let registry = PoolRegistry::from_config(config)?;

        let mut signers = Vec::with_capacity(keys.len());
        let mut wallet: Option<EthereumWallet> = None;
        for key in keys {
            let signer = PrivateKeySigner::from_str(key.trim())
                .map_err(|e| HarnessError::Config(format!("invalid private key: {}", e)))?;
            signers.push(signer.address());
            match wallet.as_mut() {
                Some(wallet) => wallet.register_signer(signer),
                None => wallet = Some(EthereumWallet::from(signer)),
            }
        }
        let wallet = wallet.ok_or_else(|| HarnessError::Config("at least one private key is required".to_string()))?;

        let url = Url::parse(&config.chain.rpc_url)
            .map_err(|e| HarnessError::Config(format!("invalid rpc url {}: {}", config.chain.rpc_url, e)))?;
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url).erased();

        let chain_id = provider.get_chain_id().await?;
        let block = provider.get_block_number().await?;
        if let Some(expected) = config.chain.chain_id {
            if expected != chain_id {
                return Err(HarnessError::Config(format!(
                    "node reports chain id {}, config expects {}",
                    chain_id, expected
                )));
            }
        }
        if let Some(fork_block) = config.chain.fork_block {
            if block < fork_block {
                warn!(block, fork_block, "node head is behind the configured fork block");
            }
        }
        info!(rpc = %config.chain.rpc_url, chain_id, block, signer = %signers[0], "connected");

        Ok(Self::from_provider(provider, registry, signers, config.slippage()?))
    }

    /// Session over an existing provider, no connectivity checks
    pub fn from_provider(
        provider: DynProvider,
        registry: PoolRegistry,
        signers: Vec<Address>,
        slippage: SlippageTolerance,
    ) -> Self {
        Self {
            provider,
            registry,
            signers,
            slippage,
        }
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn slippage(&self) -> SlippageTolerance {
        self.slippage
    }

    /// Default signer
    pub fn signer(&self) -> HarnessResult<Address> {
        self.signers
            .first()
            .copied()
            .ok_or_else(|| HarnessError::Config("session has no signer".to_string()))
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    pub fn asset(&self, name: &str) -> HarnessResult<Arc<dyn AssetHandle>> {
        let entry = self.registry.asset(name)?;
        if entry.native {
            return Ok(Arc::new(NativeAsset::new(self.provider.clone())));
        }
        Ok(Arc::new(Erc20Asset::new(entry.address, entry.decimals, self.provider.clone())))
    }

    fn erc20(&self, name: &str) -> HarnessResult<Erc20Asset> {
        let entry = self.registry.asset(name)?;
        Ok(Erc20Asset::new(entry.address, entry.decimals, self.provider.clone()))
    }

    fn coins(&self, names: &[String]) -> HarnessResult<Vec<Arc<dyn AssetHandle>>> {
        names.iter().map(|name| self.asset(name)).collect()
    }

    /// Deposit surface of a minting pool
    pub fn liquidity_pool(&self, name: &str) -> HarnessResult<Arc<dyn LiquidityPool>> {
        let entry = self.registry.pool(name)?;
        let coins = self.coins(&entry.coins)?;
        match entry.kind {
            PoolKind::Base => {
                let lp_name = entry
                    .lp_token
                    .as_deref()
                    .ok_or_else(|| HarnessError::Config(format!("pool {} has no lp_token", name)))?;
                let lp = self.erc20(lp_name)?;
                Ok(Arc::new(BasePool::new(entry.address, lp, coins, self.provider.clone())))
            }
            PoolKind::Meta => Ok(Arc::new(Metapool::new(entry.address, coins, self.provider.clone()))),
            kind => Err(HarnessError::InvalidPool(format!(
                "pool {} of kind {:?} does not accept deposits",
                name, kind
            ))),
        }
    }

    /// Exchange surface of a pool for a hop ending at `output_index`
    pub fn exchange_pool(&self, name: &str, output_index: usize) -> HarnessResult<Arc<dyn ExchangePool>> {
        let entry = self.registry.pool(name)?;
        if entry.is_lp_index(output_index) {
            return Ok(Arc::new(LiquidityMintVenue::new(self.liquidity_pool(name)?)));
        }
        let n_coins = entry.coins.len();
        let pool: Arc<dyn ExchangePool> = match entry.kind {
            PoolKind::Stable | PoolKind::Base | PoolKind::Meta => {
                Arc::new(StableSwapPool::new(entry.address, n_coins, self.provider.clone()))
            }
            PoolKind::Crypto => Arc::new(CryptoSwapPool::new(entry.address, n_coins, self.provider.clone())),
            PoolKind::WrappedNative => Arc::new(WrappedNativePool::new(entry.address, self.provider.clone())),
        };
        Ok(pool)
    }

    /// Bind a declared route to live handles
    pub fn route(&self, name: &str) -> HarnessResult<SwapChain> {
        let plans = self.registry.route(name)?;
        let mut hops = Vec::with_capacity(plans.len());
        for plan in plans {
            hops.push(SwapHop::new(
                self.asset(&plan.input)?,
                self.asset(&plan.output)?,
                self.exchange_pool(&plan.pool, plan.output_index)?,
                plan.input_index,
                plan.output_index,
            )?);
        }
        SwapChain::new(hops)
    }

    pub fn metapool_factory(&self) -> HarnessResult<MetapoolFactory> {
        let factory = self.registry.factory()?;
        Ok(MetapoolFactory::new(factory.address, self.provider.clone()))
    }

    /// Metapool parameters pairing `coin` with the factory's base pool LP token
    pub fn metapool_params(
        &self,
        coin: &str,
        name: &str,
        amplification: u64,
        fee_bps: u16,
    ) -> HarnessResult<MetapoolParams> {
        let factory = self.registry.factory()?;
        let base = self.registry.pool(&factory.base_pool)?;
        let lp_name = base
            .lp_token
            .as_deref()
            .ok_or_else(|| HarnessError::Config(format!("base pool {} has no lp_token", base.name)))?;
        Ok(MetapoolParams {
            base_pool: base.address,
            base_lp: self.asset(lp_name)?,
            new_asset: self.asset(coin)?,
            name: name.to_string(),
            amplification,
            fee_bps,
        })
    }
}
