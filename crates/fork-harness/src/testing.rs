//! In-memory stand-in for a forked chain
//!
//! Implements every capability trait over a shared ledger so swap chains,
//! deposits and pool creation can be exercised without a node. Pricing is
//! a fixed-rate exchange with a flat fee and LP tokens are minted pro rata
//! to deposited value; it is not an AMM.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::chain::{AssetHandle, ExchangePool, LiquidityPool, MetapoolDeployment, PoolFactory, NATIVE_ASSET};
use crate::config::BPS_DENOMINATOR;
use crate::error::{HarnessError, HarnessResult, RevertReason};

/// Value scale: `rate = price * 10^(VALUE_DECIMALS - decimals)`
const VALUE_DECIMALS: u8 = 36;

/// Misbehaviour a pool can be told to exhibit
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolFaults {
    /// `exchange` succeeds without moving any balance
    pub noop_exchange: bool,
    /// `min_dy` / `min_mint` are not enforced
    pub ignore_minimums: bool,
    /// Mint this much less than `calc_token_amount` promised
    pub lp_haircut_bps: u16,
}

#[derive(Debug, Clone)]
struct SimPoolState {
    coins: Vec<Address>,
    rates: Vec<U256>,
    reserves: Vec<U256>,
    lp_token: Address,
    lp_supply: U256,
    fee_bps: u16,
    faults: PoolFaults,
    quote_calls: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    decimals: HashMap<Address, u8>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    pools: HashMap<Address, SimPoolState>,
    transactions: u64,
}

fn revert(message: &str) -> HarnessError {
    let message = format!("execution reverted: {}", message);
    let reason = RevertReason::parse(&message).unwrap_or(RevertReason::Other(message.clone()));
    HarnessError::Reverted { reason, message }
}

fn unit_rate(price: u64, decimals: u8) -> U256 {
    U256::from(price) * U256::from(10u64).pow(U256::from(VALUE_DECIMALS - decimals))
}

impl Ledger {
    fn allocate(&mut self) -> Address {
        self.next_id += 1;
        let mut bytes = [0u8; 20];
        bytes[0] = 0x5a;
        bytes[12..].copy_from_slice(&self.next_id.to_be_bytes());
        Address::from(bytes)
    }

    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: Address, owner: Address, amount: U256) {
        let entry = self.balances.entry((token, owner)).or_default();
        *entry += amount;
    }

    fn debit(&mut self, token: Address, owner: Address, amount: U256) -> HarnessResult<()> {
        let balance = self.balance(token, owner);
        if balance < amount {
            return Err(revert("transfer amount exceeds balance"));
        }
        self.balances.insert((token, owner), balance - amount);
        Ok(())
    }

    /// Pull `amount` of `token` from `owner` into `spender` using an allowance
    fn pull(&mut self, token: Address, owner: Address, spender: Address, amount: U256) -> HarnessResult<()> {
        if token != NATIVE_ASSET {
            let allowance = self.allowances.get(&(token, owner, spender)).copied().unwrap_or_default();
            if allowance < amount {
                return Err(revert("insufficient allowance"));
            }
            self.allowances.insert((token, owner, spender), allowance - amount);
        }
        self.debit(token, owner, amount)
    }

    fn pool(&self, address: Address) -> HarnessResult<&SimPoolState> {
        self.pools
            .get(&address)
            .ok_or_else(|| HarnessError::InvalidPool(format!("no pool deployed at {}", address)))
    }

    fn pool_mut(&mut self, address: Address) -> HarnessResult<&mut SimPoolState> {
        self.pools
            .get_mut(&address)
            .ok_or_else(|| HarnessError::InvalidPool(format!("no pool deployed at {}", address)))
    }
}

impl SimPoolState {
    fn value_of(&self, amounts: &[U256]) -> U256 {
        let scale = U256::from(10u64).pow(U256::from(VALUE_DECIMALS - 18));
        amounts
            .iter()
            .zip(&self.rates)
            .fold(U256::ZERO, |acc, (amount, rate)| acc + *amount * *rate / scale)
    }

    fn expected_mint(&self, amounts: &[U256]) -> U256 {
        let deposit = self.value_of(amounts);
        if self.lp_supply.is_zero() {
            return deposit;
        }
        let held = self.value_of(&self.reserves);
        if held.is_zero() {
            return deposit;
        }
        deposit * self.lp_supply / held
    }

    fn expected_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        if i >= self.coins.len() || j >= self.coins.len() || i == j {
            return Err(revert("invalid coin index"));
        }
        let gross = dx * self.rates[i] / self.rates[j];
        Ok(gross - gross * U256::from(self.fee_bps) / U256::from(BPS_DENOMINATOR))
    }
}

/// Shared in-memory chain
#[derive(Clone, Default)]
pub struct SimChain {
    ledger: Arc<Mutex<Ledger>>,
}

impl SimChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh account address
    pub fn account(&self) -> Address {
        self.ledger().allocate()
    }

    /// Deploy a token with `decimals`
    pub fn token(&self, _symbol: &str, decimals: u8) -> SimToken {
        let mut ledger = self.ledger();
        let address = ledger.allocate();
        ledger.decimals.insert(address, decimals);
        SimToken {
            chain: self.clone(),
            address,
            decimals,
        }
    }

    pub fn native(&self) -> SimToken {
        SimToken {
            chain: self.clone(),
            address: NATIVE_ASSET,
            decimals: 18,
        }
    }

    pub fn mint(&self, token: &SimToken, owner: Address, amount: U256) {
        self.ledger().credit(token.address, owner, amount);
    }

    /// Number of state-changing calls so far
    pub fn transactions(&self) -> u64 {
        self.ledger().transactions
    }

    /// Deploy a pool minting its own LP token. `prices` are per whole token.
    pub fn pool(&self, coins: &[SimToken], prices: &[u64], fee_bps: u16) -> SimPool {
        let address = self.ledger().allocate();
        self.install_pool(address, address, coins, prices, fee_bps)
    }

    /// Deploy a pool minting into a separate LP token
    pub fn pool_with_lp(&self, coins: &[SimToken], prices: &[u64], fee_bps: u16, lp: &SimToken) -> SimPool {
        let address = self.ledger().allocate();
        self.install_pool(address, lp.address, coins, prices, fee_bps)
    }

    fn install_pool(
        &self,
        address: Address,
        lp_token: Address,
        coins: &[SimToken],
        prices: &[u64],
        fee_bps: u16,
    ) -> SimPool {
        let state = SimPoolState {
            coins: coins.iter().map(|c| c.address).collect(),
            rates: coins
                .iter()
                .zip(prices)
                .map(|(coin, price)| unit_rate(*price, coin.decimals))
                .collect(),
            reserves: vec![U256::ZERO; coins.len()],
            lp_token,
            lp_supply: U256::ZERO,
            fee_bps,
            faults: PoolFaults::default(),
            quote_calls: 0,
        };
        self.ledger().pools.insert(address, state);
        SimPool {
            chain: self.clone(),
            address,
            lp_token,
            coins: coins
                .iter()
                .map(|c| Arc::new(c.clone()) as Arc<dyn AssetHandle>)
                .collect(),
        }
    }

    /// Wrapped native token and its wrapper venue
    pub fn wrapper(&self) -> (SimToken, SimWrapper) {
        let wrapped = self.token("WETH", 18);
        let venue = SimWrapper {
            chain: self.clone(),
            wrapped: wrapped.address,
        };
        (wrapped, venue)
    }

    /// Metapool factory pairing new coins with `base_lp`
    pub fn factory(&self, base_lp: &SimToken) -> SimFactory {
        SimFactory {
            chain: self.clone(),
            base_lp: base_lp.address,
            registry: Arc::new(Mutex::new(HashMap::new())),
            deployments: Arc::new(Mutex::new(0)),
        }
    }
}

/// Token handle
#[derive(Clone)]
pub struct SimToken {
    chain: SimChain,
    address: Address,
    decimals: u8,
}

impl SimToken {
    /// `whole` tokens in smallest units
    pub fn units(&self, whole: u64) -> U256 {
        U256::from(whole) * U256::from(10u64).pow(U256::from(self.decimals))
    }
}

#[async_trait]
impl AssetHandle for SimToken {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    async fn balance_of(&self, owner: Address) -> HarnessResult<U256> {
        Ok(self.chain.ledger().balance(self.address, owner))
    }

    async fn approve(&self, owner: Address, spender: Address, amount: U256) -> HarnessResult<()> {
        if self.address == NATIVE_ASSET {
            return Ok(());
        }
        let mut ledger = self.chain.ledger();
        ledger.transactions += 1;
        ledger.allowances.insert((self.address, owner, spender), amount);
        Ok(())
    }

    async fn transfer(&self, owner: Address, to: Address, amount: U256) -> HarnessResult<()> {
        let mut ledger = self.chain.ledger();
        ledger.transactions += 1;
        ledger.debit(self.address, owner, amount)?;
        ledger.credit(self.address, to, amount);
        Ok(())
    }
}

/// Pool handle, exchange and liquidity surfaces
#[derive(Clone)]
pub struct SimPool {
    chain: SimChain,
    address: Address,
    lp_token: Address,
    coins: Vec<Arc<dyn AssetHandle>>,
}

impl std::fmt::Debug for SimPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimPool")
            .field("address", &self.address)
            .field("lp_token", &self.lp_token)
            .field("coins", &self.coins.iter().map(|c| c.address()).collect::<Vec<_>>())
            .finish()
    }
}

impl SimPool {
    pub fn set_faults(&self, faults: PoolFaults) {
        if let Ok(pool) = self.chain.ledger().pool_mut(self.address) {
            pool.faults = faults;
        }
    }

    pub fn reserves(&self) -> Vec<U256> {
        self.chain
            .ledger()
            .pool(self.address)
            .map(|p| p.reserves.clone())
            .unwrap_or_default()
    }

    /// How many times `calc_token_amount` was called
    pub fn quote_calls(&self) -> u64 {
        self.chain
            .ledger()
            .pool(self.address)
            .map(|p| p.quote_calls)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExchangePool for SimPool {
    fn address(&self) -> Address {
        self.address
    }

    fn n_coins(&self) -> usize {
        self.coins.len()
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        let ledger = self.chain.ledger();
        let pool = ledger.pool(self.address)?;
        pool.coins.get(index).copied().ok_or_else(|| revert("invalid coin index"))
    }

    async fn get_dy(&self, i: usize, j: usize, dx: U256) -> HarnessResult<U256> {
        self.chain.ledger().pool(self.address)?.expected_dy(i, j, dx)
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, min_dy: U256) -> HarnessResult<()> {
        let mut ledger = self.chain.ledger();
        ledger.transactions += 1;
        let pool = ledger.pool(self.address)?.clone();
        let dy = pool.expected_dy(i, j, dx)?;
        if pool.faults.noop_exchange {
            return Ok(());
        }
        if dy < min_dy && !pool.faults.ignore_minimums {
            return Err(revert("Exchange resulted in fewer coins than expected"));
        }
        if dy > pool.reserves[j] {
            return Err(revert("pool reserves exhausted"));
        }

        ledger.pull(pool.coins[i], from, self.address, dx)?;
        ledger.credit(pool.coins[j], from, dy);
        let state = ledger.pool_mut(self.address)?;
        state.reserves[i] += dx;
        state.reserves[j] -= dy;
        Ok(())
    }
}

#[async_trait]
impl LiquidityPool for SimPool {
    fn address(&self) -> Address {
        self.address
    }

    fn lp_token(&self) -> Address {
        self.lp_token
    }

    fn coins(&self) -> &[Arc<dyn AssetHandle>] {
        &self.coins
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        ExchangePool::coin(self, index).await
    }

    async fn balances(&self, index: usize) -> HarnessResult<U256> {
        let ledger = self.chain.ledger();
        let pool = ledger.pool(self.address)?;
        pool.reserves.get(index).copied().ok_or_else(|| revert("invalid coin index"))
    }

    async fn calc_token_amount(&self, amounts: &[U256]) -> HarnessResult<U256> {
        let mut ledger = self.chain.ledger();
        let pool = ledger.pool_mut(self.address)?;
        if amounts.len() != pool.coins.len() {
            return Err(revert("wrong number of amounts"));
        }
        pool.quote_calls += 1;
        Ok(pool.expected_mint(amounts))
    }

    async fn add_liquidity(
        &self,
        from: Address,
        amounts: &[U256],
        min_mint: U256,
        receiver: Address,
    ) -> HarnessResult<()> {
        let mut ledger = self.chain.ledger();
        ledger.transactions += 1;
        let pool = ledger.pool(self.address)?.clone();
        if amounts.len() != pool.coins.len() {
            return Err(revert("wrong number of amounts"));
        }

        let expected = pool.expected_mint(amounts);
        let minted = expected - expected * U256::from(pool.faults.lp_haircut_bps) / U256::from(BPS_DENOMINATOR);
        if minted < min_mint && !pool.faults.ignore_minimums {
            return Err(revert("Slippage screwed you"));
        }

        for (coin, amount) in pool.coins.iter().zip(amounts) {
            if !amount.is_zero() {
                ledger.pull(*coin, from, self.address, *amount)?;
            }
        }
        ledger.credit(pool.lp_token, receiver, minted);
        let state = ledger.pool_mut(self.address)?;
        for (reserve, amount) in state.reserves.iter_mut().zip(amounts) {
            *reserve += *amount;
        }
        state.lp_supply += minted;
        Ok(())
    }

    async fn lp_balance_of(&self, owner: Address) -> HarnessResult<U256> {
        Ok(self.chain.ledger().balance(self.lp_token, owner))
    }
}

/// Native coin wrapper: index 0 native, index 1 wrapped
#[derive(Clone)]
pub struct SimWrapper {
    chain: SimChain,
    wrapped: Address,
}

#[async_trait]
impl ExchangePool for SimWrapper {
    fn address(&self) -> Address {
        self.wrapped
    }

    fn n_coins(&self) -> usize {
        2
    }

    async fn coin(&self, index: usize) -> HarnessResult<Address> {
        match index {
            0 => Ok(NATIVE_ASSET),
            1 => Ok(self.wrapped),
            _ => Err(revert("invalid coin index")),
        }
    }

    async fn get_dy(&self, _i: usize, _j: usize, dx: U256) -> HarnessResult<U256> {
        Ok(dx)
    }

    async fn exchange(&self, from: Address, i: usize, j: usize, dx: U256, _min_dy: U256) -> HarnessResult<()> {
        let (source, target) = match (i, j) {
            (0, 1) => (NATIVE_ASSET, self.wrapped),
            (1, 0) => (self.wrapped, NATIVE_ASSET),
            _ => return Err(revert("invalid coin index")),
        };
        let mut ledger = self.chain.ledger();
        ledger.transactions += 1;
        ledger.debit(source, from, dx)?;
        ledger.credit(target, from, dx);
        Ok(())
    }
}

/// Metapool factory keyed by coin pair
#[derive(Clone)]
pub struct SimFactory {
    chain: SimChain,
    base_lp: Address,
    registry: Arc<Mutex<HashMap<(Address, Address), Address>>>,
    deployments: Arc<Mutex<u64>>,
}

fn pair_key(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl SimFactory {
    pub fn deployments(&self) -> u64 {
        *self.deployments.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PoolFactory for SimFactory {
    type Pool = SimPool;

    async fn deploy_metapool(&self, _from: Address, deployment: &MetapoolDeployment) -> HarnessResult<()> {
        let decimals = {
            let ledger = self.chain.ledger();
            [
                ledger.decimals.get(&deployment.coin).copied(),
                ledger.decimals.get(&self.base_lp).copied(),
            ]
        };
        let [Some(coin_decimals), Some(lp_decimals)] = decimals else {
            return Err(revert("coin not deployed"));
        };
        let coins = [
            SimToken {
                chain: self.chain.clone(),
                address: deployment.coin,
                decimals: coin_decimals,
            },
            SimToken {
                chain: self.chain.clone(),
                address: self.base_lp,
                decimals: lp_decimals,
            },
        ];
        let pool = self.chain.pool(&coins, &[1, 1], 4);
        self.chain.ledger().transactions += 1;

        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pair_key(deployment.coin, self.base_lp), pool.address);
        *self.deployments.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }

    async fn find_pool_for_coins(&self, coin_a: Address, coin_b: Address) -> HarnessResult<Option<Address>> {
        Ok(self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&pair_key(coin_a, coin_b))
            .copied())
    }

    fn pool_at(&self, address: Address, coins: Vec<Arc<dyn AssetHandle>>) -> SimPool {
        SimPool {
            chain: self.chain.clone(),
            address,
            lp_token: address,
            coins,
        }
    }
}
