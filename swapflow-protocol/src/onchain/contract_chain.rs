// Contract for the smart-contract escrow chain (ETH-style swap contract).

use crate::data_structures::{Address, Amount, Secret, SecretHash, TxHash};
use crate::onchain::{ChainError, HashCallback};
use async_trait::async_trait;
use thiserror::Error;

/// Arguments for creating and funding the escrow entry.
#[derive(Clone, Debug)]
pub struct ContractCreateArgs {
    pub participant_address: Address,
    pub secret_hash: SecretHash,
    pub amount: Amount,
    /// Optional destination override recorded in the contract; the owner
    /// verifies it before withdrawing.
    pub target_wallet: Option<Address>,
}

/// Outcome of validating the escrow entry against the agreed terms.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BalanceCheckError {
    #[error("contract balance {actual} below expected {expected}")]
    ValueMismatch { expected: Amount, actual: Amount },
    #[error("contract hashlock {actual} does not match expected {expected}")]
    HashMismatch { expected: String, actual: String },
    #[error("{0}")]
    Other(String),
}

/// Expectations the owner checks the participant's escrow entry against
/// before revealing the secret.
#[derive(Clone, Debug)]
pub struct ContractBalanceExpectations {
    pub owner_address: Address,
    pub participant_address: Address,
    pub expected_value: Amount,
    pub expected_hash: SecretHash,
}

/// Adapter for the chain where funds are held by an escrow contract keyed
/// by the creator's address and unlocked by revealing the secret.
#[async_trait]
pub trait ContractChainAdapter: Send + Sync {
    /// Create and fund the escrow entry. `on_hash` fires when the creation
    /// transaction id is first known, before it confirms.
    async fn create(
        &self,
        args: &ContractCreateArgs,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError>;

    /// Whether an entry for this (owner, participant) pair already exists.
    async fn check_swap_exists(
        &self,
        owner_address: &str,
        participant_address: &str,
    ) -> Result<bool, ChainError>;

    /// Balance held by the escrow entry created by `owner_address`.
    async fn get_balance(&self, owner_address: &str) -> Result<Amount, ChainError>;

    /// Plain account balance (used for the participant's funding check).
    async fn fetch_balance(&self, address: &str) -> Result<Amount, ChainError>;

    /// Validate the escrow entry against the agreed amount and hashlock.
    async fn check_balance(
        &self,
        expected: &ContractBalanceExpectations,
    ) -> Result<(), BalanceCheckError>;

    /// Whether this contract records a target wallet that withdrawals are
    /// routed to.
    fn has_target_wallet(&self) -> bool;

    async fn get_target_wallet(&self, owner_address: &str) -> Result<Address, ChainError>;

    /// Fee required for a withdrawal transaction.
    async fn calc_withdraw_gas(
        &self,
        owner_address: &str,
        secret: &Secret,
    ) -> Result<Amount, ChainError>;

    /// Withdraw from the entry created by `owner_address`, revealing the
    /// secret on chain.
    async fn withdraw(
        &self,
        owner_address: &str,
        secret: &Secret,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError>;

    /// Fee-sponsored withdrawal performed on behalf of `participant_address`
    /// (the funds still go to the entry's recorded recipient).
    async fn withdraw_no_money(
        &self,
        participant_address: &str,
        secret: &Secret,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError>;

    /// Secret recorded in contract storage after a withdrawal, if any.
    async fn get_secret(&self, participant_address: &str) -> Result<Option<Secret>, ChainError>;

    /// Extract the revealed secret from a withdrawal transaction. `None`
    /// when the transaction is not yet visible.
    async fn get_secret_from_txhash(&self, tx_hash: &str) -> Result<Option<Secret>, ChainError>;

    /// Whether the entry guarded by `secret_hash` was already refunded.
    async fn was_refunded(&self, secret_hash: &SecretHash) -> Result<bool, ChainError>;

    /// Refund the entry created by the local party. `Ok(None)` means the
    /// chain refused the refund (timeout not reached).
    async fn refund(&self, participant_address: &str) -> Result<Option<TxHash>, ChainError>;
}
