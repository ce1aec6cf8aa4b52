// Scriptable in-memory chain adapters. Both flows in a test share one
// instance per chain, so what one side broadcasts the other observes,
// like on a real network. Error queues let tests inject classified
// failures for individual calls.

use crate::data_structures::{Address, Amount, ScriptValues, Secret, SecretHash, TxHash, Unspent};
use crate::onchain::{
    BalanceCheckError, ChainError, ContractBalanceExpectations, ContractChainAdapter,
    ContractCreateArgs, HashCallback, LockChainAdapter, LockWithdrawArgs, ScriptCheckError,
    ScriptCheckExpectations,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock of the script-based lock chain.
#[derive(Default)]
pub struct MockLockChain {
    pub unspents: Mutex<HashMap<Address, Vec<Unspent>>>,
    pub script_balance: Mutex<Amount>,
    pub fee: Mutex<Amount>,
    /// Per-call overrides for `check_script`; empty means dynamic behavior
    /// derived from the script balance and lock time.
    pub check_script_results: Mutex<VecDeque<Result<(), ScriptCheckError>>>,
    /// Per-call overrides for `withdraw`; empty means success.
    pub withdraw_results: Mutex<VecDeque<Result<TxHash, ChainError>>>,
    pub fund_calls: AtomicUsize,
    pub withdraw_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
}

impl MockLockChain {
    pub fn new() -> Self {
        let chain = MockLockChain::default();
        *chain.fee.lock().unwrap() = 1_000;
        chain
    }

    pub fn set_unspents(&self, address: &str, satoshis: Amount) {
        self.unspents.lock().unwrap().insert(
            address.to_string(),
            vec![Unspent {
                txid: format!("utxo_{address}"),
                satoshis,
            }],
        );
    }

    pub fn push_withdraw_result(&self, result: Result<TxHash, ChainError>) {
        self.withdraw_results.lock().unwrap().push_back(result);
    }

    pub fn push_check_script_result(&self, result: Result<(), ScriptCheckError>) {
        self.check_script_results.lock().unwrap().push_back(result);
    }

    fn script_address(script_values: &ScriptValues) -> Address {
        format!("script_{}", &script_values.secret_hash.to_hex()[..8])
    }
}

#[async_trait]
impl LockChainAdapter for MockLockChain {
    fn create_script(&self, script_values: &ScriptValues) -> Result<Address, ChainError> {
        Ok(Self::script_address(script_values))
    }

    async fn fund_script(
        &self,
        script_values: &ScriptValues,
        amount: Amount,
    ) -> Result<TxHash, ChainError> {
        self.fund_calls.fetch_add(1, Ordering::SeqCst);
        *self.script_balance.lock().unwrap() = amount;
        let address = Self::script_address(script_values);
        self.unspents.lock().unwrap().insert(
            address,
            vec![Unspent {
                txid: "btc_fund_tx".to_string(),
                satoshis: amount,
            }],
        );
        Ok("btc_fund_tx".to_string())
    }

    async fn fetch_unspents(&self, address: &str) -> Result<Vec<Unspent>, ChainError> {
        Ok(self
            .unspents
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_balance(&self, _script_values: &ScriptValues) -> Result<Amount, ChainError> {
        Ok(*self.script_balance.lock().unwrap())
    }

    async fn estimate_fee_value(&self, _address: &str) -> Result<Amount, ChainError> {
        Ok(*self.fee.lock().unwrap())
    }

    async fn check_script(
        &self,
        script_values: &ScriptValues,
        expected: &ScriptCheckExpectations,
    ) -> Result<(), ScriptCheckError> {
        if let Some(result) = self.check_script_results.lock().unwrap().pop_front() {
            return result;
        }
        if script_values.lock_time <= expected.lock_time {
            return Err(ScriptCheckError::LockTimeMismatch {
                reference: expected.lock_time,
                actual: script_values.lock_time,
            });
        }
        if script_values.recipient_public_key != expected.recipient_public_key {
            return Err(ScriptCheckError::RecipientMismatch(
                script_values.recipient_public_key.clone(),
            ));
        }
        let balance = *self.script_balance.lock().unwrap();
        if balance < expected.value {
            return Err(ScriptCheckError::ValueMismatch {
                expected: expected.value,
                actual: balance,
            });
        }
        Ok(())
    }

    async fn withdraw(
        &self,
        _args: &LockWithdrawArgs,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.withdraw_results.lock().unwrap().pop_front() {
            if let Ok(hash) = &result {
                on_hash(hash);
            }
            return result;
        }
        on_hash("btc_withdraw_tx");
        *self.script_balance.lock().unwrap() = 0;
        Ok("btc_withdraw_tx".to_string())
    }

    async fn refund(
        &self,
        _script_values: &ScriptValues,
        _secret: &Secret,
    ) -> Result<Option<TxHash>, ChainError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        let mut balance = self.script_balance.lock().unwrap();
        if *balance == 0 {
            return Ok(None);
        }
        *balance = 0;
        Ok(Some("btc_refund_tx".to_string()))
    }

    async fn get_refund_hex_transaction(
        &self,
        _script_values: &ScriptValues,
        _secret: &Secret,
    ) -> Result<String, ChainError> {
        Ok("0200000001deadbeef".to_string())
    }
}

struct ContractEntry {
    participant: Address,
    secret_hash: SecretHash,
    balance: Amount,
    target_wallet: Option<Address>,
}

/// Mock of the contract escrow chain. Entries are keyed by their creator's
/// address; `signer` is who `create` records entries under.
#[derive(Default)]
pub struct MockContractChain {
    pub signer: Mutex<Address>,
    pub account_balances: Mutex<HashMap<Address, Amount>>,
    entries: Mutex<HashMap<Address, ContractEntry>>,
    pub swap_exists: AtomicBool,
    pub target_wallet_supported: AtomicBool,
    pub withdraw_gas: Mutex<Amount>,
    pub create_results: Mutex<VecDeque<Result<TxHash, ChainError>>>,
    pub withdraw_results: Mutex<VecDeque<Result<TxHash, ChainError>>>,
    revealed_secret: Mutex<Option<Secret>>,
    tx_secrets: Mutex<HashMap<TxHash, Secret>>,
    pub refunded: AtomicBool,
    pub create_calls: AtomicUsize,
    pub withdraw_calls: AtomicUsize,
    pub sponsored_withdraw_calls: AtomicUsize,
}

impl MockContractChain {
    pub fn new(signer: &str) -> Self {
        let chain = MockContractChain::default();
        *chain.signer.lock().unwrap() = signer.to_string();
        *chain.withdraw_gas.lock().unwrap() = 21_000;
        chain
    }

    pub fn set_account_balance(&self, address: &str, amount: Amount) {
        self.account_balances
            .lock()
            .unwrap()
            .insert(address.to_string(), amount);
    }

    pub fn push_create_result(&self, result: Result<TxHash, ChainError>) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn push_withdraw_result(&self, result: Result<TxHash, ChainError>) {
        self.withdraw_results.lock().unwrap().push_back(result);
    }

    /// Seed an escrow entry directly, as if `create` had already run.
    pub fn seed_entry(
        &self,
        owner_address: &str,
        participant_address: &str,
        secret_hash: SecretHash,
        balance: Amount,
    ) {
        self.entries.lock().unwrap().insert(
            owner_address.to_string(),
            ContractEntry {
                participant: participant_address.to_string(),
                secret_hash,
                balance,
                target_wallet: None,
            },
        );
    }

    /// Record a target wallet on an existing entry.
    pub fn set_target_wallet(&self, owner_address: &str, wallet: &str) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(owner_address) {
            entry.target_wallet = Some(wallet.to_string());
        }
    }

    fn reveal(&self, tx_hash: &str, secret: Secret) {
        *self.revealed_secret.lock().unwrap() = Some(secret);
        self.tx_secrets
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), secret);
    }
}

#[async_trait]
impl ContractChainAdapter for MockContractChain {
    async fn create(
        &self,
        args: &ContractCreateArgs,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.create_results.lock().unwrap().pop_front() {
            if let Ok(hash) = &result {
                on_hash(hash);
            }
            return result;
        }

        let signer = self.signer.lock().unwrap().clone();
        self.entries.lock().unwrap().insert(
            signer,
            ContractEntry {
                participant: args.participant_address.clone(),
                secret_hash: args.secret_hash,
                balance: args.amount,
                target_wallet: args.target_wallet.clone(),
            },
        );
        on_hash("eth_create_tx");
        Ok("eth_create_tx".to_string())
    }

    async fn check_swap_exists(
        &self,
        _owner_address: &str,
        _participant_address: &str,
    ) -> Result<bool, ChainError> {
        Ok(self.swap_exists.load(Ordering::SeqCst))
    }

    async fn get_balance(&self, owner_address: &str) -> Result<Amount, ChainError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(owner_address)
            .map(|e| e.balance)
            .unwrap_or(0))
    }

    async fn fetch_balance(&self, address: &str) -> Result<Amount, ChainError> {
        Ok(self
            .account_balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn check_balance(
        &self,
        expected: &ContractBalanceExpectations,
    ) -> Result<(), BalanceCheckError> {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(&expected.owner_address) else {
            return Err(BalanceCheckError::Other(format!(
                "no entry created by {}",
                expected.owner_address
            )));
        };
        if entry.balance < expected.expected_value {
            return Err(BalanceCheckError::ValueMismatch {
                expected: expected.expected_value,
                actual: entry.balance,
            });
        }
        if entry.secret_hash != expected.expected_hash {
            return Err(BalanceCheckError::HashMismatch {
                expected: expected.expected_hash.to_hex(),
                actual: entry.secret_hash.to_hex(),
            });
        }
        Ok(())
    }

    fn has_target_wallet(&self) -> bool {
        self.target_wallet_supported.load(Ordering::SeqCst)
    }

    async fn get_target_wallet(&self, owner_address: &str) -> Result<Address, ChainError> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(owner_address)
            .ok_or_else(|| ChainError::Other(format!("no entry created by {owner_address}")))?;
        entry
            .target_wallet
            .clone()
            .ok_or_else(|| ChainError::Other("no target wallet recorded".to_string()))
    }

    async fn calc_withdraw_gas(
        &self,
        _owner_address: &str,
        _secret: &Secret,
    ) -> Result<Amount, ChainError> {
        Ok(*self.withdraw_gas.lock().unwrap())
    }

    async fn withdraw(
        &self,
        owner_address: &str,
        secret: &Secret,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.withdraw_results.lock().unwrap().pop_front() {
            if let Ok(hash) = &result {
                self.reveal(hash, *secret);
                on_hash(hash);
            }
            return result;
        }

        if let Some(entry) = self.entries.lock().unwrap().get_mut(owner_address) {
            entry.balance = 0;
        }
        self.reveal("eth_withdraw_tx", *secret);
        on_hash("eth_withdraw_tx");
        Ok("eth_withdraw_tx".to_string())
    }

    async fn withdraw_no_money(
        &self,
        participant_address: &str,
        secret: &Secret,
        on_hash: HashCallback<'_>,
    ) -> Result<TxHash, ChainError> {
        self.sponsored_withdraw_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .values_mut()
            .find(|e| e.participant == participant_address)
            .ok_or_else(|| {
                ChainError::Other(format!("no entry for participant {participant_address}"))
            })?;
        entry.balance = 0;
        drop(entries);

        self.reveal("eth_sponsored_tx", *secret);
        on_hash("eth_sponsored_tx");
        Ok("eth_sponsored_tx".to_string())
    }

    async fn get_secret(&self, _participant_address: &str) -> Result<Option<Secret>, ChainError> {
        Ok(*self.revealed_secret.lock().unwrap())
    }

    async fn get_secret_from_txhash(&self, tx_hash: &str) -> Result<Option<Secret>, ChainError> {
        Ok(self.tx_secrets.lock().unwrap().get(tx_hash).copied())
    }

    async fn was_refunded(&self, _secret_hash: &SecretHash) -> Result<bool, ChainError> {
        Ok(self.refunded.load(Ordering::SeqCst))
    }

    async fn refund(&self, participant_address: &str) -> Result<Option<TxHash>, ChainError> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries
            .values_mut()
            .find(|e| e.participant == participant_address)
        else {
            return Ok(None);
        };
        if entry.balance == 0 {
            return Ok(None);
        }
        entry.balance = 0;
        self.refunded.store(true, Ordering::SeqCst);
        Ok(Some("eth_refund_tx".to_string()))
    }
}

/// Two mirrored sessions for the same swap: the owner sells on the lock
/// chain and buys on the contract chain; the participant is the inverse.
pub fn test_session_pair() -> (
    crate::data_structures::SwapSession,
    crate::data_structures::SwapSession,
) {
    use crate::data_structures::{ContractChainIdentity, LockChainIdentity, SwapSession};

    let owner_lock = LockChainIdentity {
        address: "btc_addr_owner".to_string(),
        public_key: "02aaaa".to_string(),
    };
    let owner_contract = ContractChainIdentity {
        address: "0xowner".to_string(),
    };
    let participant_lock = LockChainIdentity {
        address: "btc_addr_participant".to_string(),
        public_key: "02bbbb".to_string(),
    };
    let participant_contract = ContractChainIdentity {
        address: "0xparticipant".to_string(),
    };

    let owner_session = SwapSession {
        id: "swap-test".to_string(),
        my_lock_chain: owner_lock.clone(),
        my_contract_chain: owner_contract.clone(),
        participant_lock_chain: participant_lock.clone(),
        participant_contract_chain: participant_contract.clone(),
        sell_amount: 100_000,
        buy_amount: 2_000_000,
        destination_buy_address: None,
        destination_sell_address: None,
    };
    let participant_session = SwapSession {
        id: "swap-test".to_string(),
        my_lock_chain: participant_lock,
        my_contract_chain: participant_contract,
        participant_lock_chain: owner_lock,
        participant_contract_chain: owner_contract,
        sell_amount: 2_000_000,
        buy_amount: 100_000,
        destination_buy_address: None,
        destination_sell_address: None,
    };
    (owner_session, participant_session)
}
