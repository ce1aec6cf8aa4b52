// Contract for the script-based lock chain (BTC-style HTLC script).

use crate::data_structures::{Address, Amount, ScriptValues, Secret, TxHash, Unspent};
use crate::onchain::{ChainError, HashCallback};
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of validating an on-chain script against what the local party
/// expects. Structured so callers can distinguish "peer already refunded"
/// from "still waiting for funding".
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScriptCheckError {
    /// The script's lock time is not what was agreed, or is already in the
    /// past relative to the reference time. The counterparty can refund.
    #[error("script lock time {actual} not acceptable at reference time {reference}")]
    LockTimeMismatch { reference: u64, actual: u64 },
    /// The script holds less than the expected value. Usually transient:
    /// the funding transaction has not confirmed yet.
    #[error("script value {actual} below expected {expected}")]
    ValueMismatch { expected: Amount, actual: Amount },
    /// The script is not redeemable by the expected recipient key.
    #[error("script recipient key mismatch: {0}")]
    RecipientMismatch(String),
    #[error("{0}")]
    Other(String),
}

/// Expectations the participant checks the owner's script against.
#[derive(Clone, Debug)]
pub struct ScriptCheckExpectations {
    pub value: Amount,
    pub recipient_public_key: String,
    /// Reference "now" (unix seconds); a lock time at or before this is a
    /// `LockTimeMismatch`.
    pub lock_time: u64,
    /// Required confirmation confidence, 0.0 - 1.0.
    pub confidence: f64,
}

#[derive(Clone, Debug)]
pub struct LockWithdrawArgs {
    pub script_values: ScriptValues,
    pub secret: Secret,
    /// Overrides the local wallet as the withdrawal destination.
    pub destination_address: Option<Address>,
}

/// Adapter for the chain where funds are held by a redeem/refund script.
#[async_trait]
pub trait LockChainAdapter: Send + Sync {
    /// Derive the script address. Deterministic; both parties compute it
    /// independently from the same `ScriptValues`.
    fn create_script(&self, script_values: &ScriptValues) -> Result<Address, ChainError>;

    /// Build, sign and broadcast the funding transaction for the script.
    async fn fund_script(
        &self,
        script_values: &ScriptValues,
        amount: Amount,
    ) -> Result<TxHash, ChainError>;

    async fn fetch_unspents(&self, address: &str) -> Result<Vec<Unspent>, ChainError>;

    /// Confirmed balance held by the script.
    async fn get_balance(&self, script_values: &ScriptValues) -> Result<Amount, ChainError>;

    /// Fee estimate for a swap-sized transaction from `address`.
    async fn estimate_fee_value(&self, address: &str) -> Result<Amount, ChainError>;

    /// Validate the on-chain script against `expected`. `Ok(())` means the
    /// script is funded, confirmed to the requested confidence, and
    /// redeemable under the expected terms.
    async fn check_script(
        &self,
        script_values: &ScriptValues,
        expected: &ScriptCheckExpectations,
    ) -> Result<(), ScriptCheckError>;

    /// Redeem the script with the secret. `on_hash` fires when the
    /// transaction id is first known.
    async fn withdraw(
        &self,
        args: &LockWithdrawArgs,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError>;

    /// Reclaim the script after its lock time. `Ok(None)` means the chain
    /// refused the refund (typically: timeout not reached yet).
    async fn refund(
        &self,
        script_values: &ScriptValues,
        secret: &Secret,
    ) -> Result<Option<TxHash>, ChainError>;

    /// Pre-signed refund transaction as raw hex, for out-of-band recovery.
    async fn get_refund_hex_transaction(
        &self,
        script_values: &ScriptValues,
        secret: &Secret,
    ) -> Result<String, ChainError>;
}
