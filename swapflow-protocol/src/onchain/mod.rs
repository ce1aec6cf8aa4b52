// Chain adapter contracts. The protocol core never builds or signs
// transactions itself; it drives these interfaces and classifies their
// failures. Implementations (real nodes, relayers, simulators) live outside
// this crate.

pub mod contract_chain;
pub mod lock_chain;

pub use contract_chain::{
    BalanceCheckError, ContractBalanceExpectations, ContractChainAdapter, ContractCreateArgs,
};
pub use lock_chain::{
    LockChainAdapter, LockWithdrawArgs, ScriptCheckError, ScriptCheckExpectations,
};

use thiserror::Error;

/// Structured classification of chain-side failures. Adapters are required
/// to map their transport's raw rejection reasons ("known transaction",
/// "out of gas", "insufficient funds for gas", ...) onto these kinds so the
/// protocol core never string-matches error messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The transaction was already submitted; resubmission is a success.
    #[error("transaction already known: {0}")]
    AlreadyKnown(String),
    /// Execution reverted, typically a chain-side race rather than a
    /// protocol bug (e.g. a wrong-secret-style rejection).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// The sending account cannot cover the network fee.
    #[error("insufficient funds for network fee: {0}")]
    FeeInsufficient(String),
    /// Anything else: RPC failures, malformed requests, unknown rejections.
    #[error("{0}")]
    Other(String),
}

/// Invoked as soon as a transaction hash is known, before confirmation.
/// Lets the flow publish the hash to the peer while the send is in flight.
pub type HashCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);
