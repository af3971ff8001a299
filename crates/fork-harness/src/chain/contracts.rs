//! Solidity bindings for the contracts reached over JSON-RPC

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    interface IWrappedNative {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
    }

    /// StableSwap pools index coins with int128
    #[sol(rpc)]
    interface IStableSwap {
        function coins(uint256 i) external view returns (address);
        function balances(uint256 i) external view returns (uint256);
        function get_dy(int128 i, int128 j, uint256 dx) external view returns (uint256);
        function exchange(int128 i, int128 j, uint256 dx, uint256 min_dy) external returns (uint256);
    }

    /// CryptoSwap pools index coins with uint256
    #[sol(rpc)]
    interface ICryptoSwap {
        function coins(uint256 i) external view returns (address);
        function get_dy(uint256 i, uint256 j, uint256 dx) external view returns (uint256);
        function exchange(uint256 i, uint256 j, uint256 dx, uint256 min_dy) external;
    }

    /// Three-coin base pool, LP token is a separate contract
    #[sol(rpc)]
    interface IBasePool {
        function coins(uint256 i) external view returns (address);
        function balances(uint256 i) external view returns (uint256);
        function calc_token_amount(uint256[3] amounts, bool is_deposit) external view returns (uint256);
        function add_liquidity(uint256[3] amounts, uint256 min_mint_amount) external;
    }

    /// Two-coin factory metapool, the pool is its own LP token
    #[sol(rpc)]
    interface IMetapool {
        function coins(uint256 i) external view returns (address);
        function balances(uint256 i) external view returns (uint256);
        function calc_token_amount(uint256[2] amounts, bool is_deposit) external view returns (uint256);
        function add_liquidity(uint256[2] amounts, uint256 min_mint_amount, address receiver) external returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IMetapoolFactory {
        function deploy_metapool(
            address base_pool,
            string name,
            string symbol,
            address coin,
            uint256 A,
            uint256 fee
        ) external returns (address);
        function find_pool_for_coins(address from, address to) external view returns (address);
    }
}
