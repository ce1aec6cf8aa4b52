// Mutable per-swap state and its patch reducer. The state is the full
// persisted snapshot of one flow instance; patches touch only the fields
// they list, everything else is untouched.

use crate::data_structures::{Address, Amount, ScriptValues, Secret, SecretHash, TxHash};
use serde::{Deserialize, Serialize};

/// Everything one flow instance knows about its swap. Persisted as a whole
/// on every step transition (and on selected patches), so a restarted
/// process can resume from the recorded step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    /// Index of the currently active step. Advanced only by the engine,
    /// monotonically.
    pub step: usize,

    pub is_stopped_swap: bool,
    pub is_swap_exist: bool,

    pub is_sign_fetching: bool,
    pub is_me_signed: bool,
    pub is_participant_signed: bool,

    pub secret: Option<Secret>,
    pub secret_hash: Option<SecretHash>,
    pub script_values: Option<ScriptValues>,
    pub script_address: Option<Address>,
    pub script_balance: Option<Amount>,
    pub btc_script_verified: bool,

    pub balance: Option<Amount>,
    pub is_balance_fetching: bool,
    pub is_balance_enough: bool,

    pub btc_script_creating_transaction_hash: Option<TxHash>,
    pub eth_swap_creation_transaction_hash: Option<TxHash>,
    pub btc_swap_withdraw_transaction_hash: Option<TxHash>,
    pub eth_swap_withdraw_transaction_hash: Option<TxHash>,
    pub refund_transaction_hash: Option<TxHash>,
    pub refund_tx_hex: Option<String>,

    pub can_create_eth_transaction: bool,
    pub is_eth_contract_funded: bool,
    pub is_btc_script_funded: bool,
    pub is_eth_withdrawn: bool,
    pub is_btc_withdrawn: bool,
    pub is_refunded: bool,
    pub is_finished: bool,

    pub withdraw_fee: Option<Amount>,
    pub require_withdraw_fee: bool,
    pub require_withdraw_fee_sent: bool,
    pub withdraw_request_incoming: bool,
    pub withdraw_request_accepted: bool,
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState {
            step: 0,
            is_stopped_swap: false,
            is_swap_exist: false,
            is_sign_fetching: false,
            is_me_signed: false,
            is_participant_signed: false,
            secret: None,
            secret_hash: None,
            script_values: None,
            script_address: None,
            script_balance: None,
            btc_script_verified: false,
            balance: None,
            is_balance_fetching: false,
            // until a balance check says otherwise, assume funded
            is_balance_enough: true,
            btc_script_creating_transaction_hash: None,
            eth_swap_creation_transaction_hash: None,
            btc_swap_withdraw_transaction_hash: None,
            eth_swap_withdraw_transaction_hash: None,
            refund_transaction_hash: None,
            refund_tx_hex: None,
            can_create_eth_transaction: true,
            is_eth_contract_funded: false,
            is_btc_script_funded: false,
            is_eth_withdrawn: false,
            is_btc_withdrawn: false,
            is_refunded: false,
            is_finished: false,
            withdraw_fee: None,
            require_withdraw_fee: false,
            require_withdraw_fee_sent: false,
            withdraw_request_incoming: false,
            withdraw_request_accepted: false,
        }
    }
}

/// Partial update for `FlowState`. `None` fields are left alone; the step
/// index is never patchable (only `FlowEngine::finish_step` moves it).
#[derive(Clone, Debug, Default)]
pub struct StatePatch {
    pub is_swap_exist: Option<bool>,
    pub is_sign_fetching: Option<bool>,
    pub is_me_signed: Option<bool>,
    pub is_participant_signed: Option<bool>,

    pub secret: Option<Secret>,
    pub secret_hash: Option<SecretHash>,
    pub script_values: Option<ScriptValues>,
    pub script_address: Option<Address>,
    pub script_balance: Option<Amount>,
    pub btc_script_verified: Option<bool>,

    pub balance: Option<Amount>,
    pub is_balance_fetching: Option<bool>,
    pub is_balance_enough: Option<bool>,

    pub btc_script_creating_transaction_hash: Option<TxHash>,
    pub eth_swap_creation_transaction_hash: Option<TxHash>,
    pub btc_swap_withdraw_transaction_hash: Option<TxHash>,
    pub eth_swap_withdraw_transaction_hash: Option<TxHash>,
    pub refund_transaction_hash: Option<TxHash>,
    pub refund_tx_hex: Option<String>,

    pub can_create_eth_transaction: Option<bool>,
    pub is_eth_contract_funded: Option<bool>,
    pub is_btc_script_funded: Option<bool>,
    pub is_eth_withdrawn: Option<bool>,
    pub is_btc_withdrawn: Option<bool>,
    pub is_refunded: Option<bool>,
    pub is_finished: Option<bool>,

    pub withdraw_fee: Option<Amount>,
    pub require_withdraw_fee: Option<bool>,
    pub require_withdraw_fee_sent: Option<bool>,
    pub withdraw_request_incoming: Option<bool>,
    pub withdraw_request_accepted: Option<bool>,
}

impl FlowState {
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(v) = patch.is_swap_exist {
            self.is_swap_exist = v;
        }
        if let Some(v) = patch.is_sign_fetching {
            self.is_sign_fetching = v;
        }
        if let Some(v) = patch.is_me_signed {
            self.is_me_signed = v;
        }
        if let Some(v) = patch.is_participant_signed {
            self.is_participant_signed = v;
        }
        if let Some(v) = patch.secret {
            self.secret = Some(v);
        }
        if let Some(v) = patch.secret_hash {
            self.secret_hash = Some(v);
        }
        if let Some(v) = patch.script_values {
            self.script_values = Some(v);
        }
        if let Some(v) = patch.script_address {
            self.script_address = Some(v);
        }
        if let Some(v) = patch.script_balance {
            self.script_balance = Some(v);
        }
        if let Some(v) = patch.btc_script_verified {
            self.btc_script_verified = v;
        }
        if let Some(v) = patch.balance {
            self.balance = Some(v);
        }
        if let Some(v) = patch.is_balance_fetching {
            self.is_balance_fetching = v;
        }
        if let Some(v) = patch.is_balance_enough {
            self.is_balance_enough = v;
        }
        if let Some(v) = patch.btc_script_creating_transaction_hash {
            self.btc_script_creating_transaction_hash = Some(v);
        }
        if let Some(v) = patch.eth_swap_creation_transaction_hash {
            self.eth_swap_creation_transaction_hash = Some(v);
        }
        if let Some(v) = patch.btc_swap_withdraw_transaction_hash {
            self.btc_swap_withdraw_transaction_hash = Some(v);
        }
        if let Some(v) = patch.eth_swap_withdraw_transaction_hash {
            self.eth_swap_withdraw_transaction_hash = Some(v);
        }
        if let Some(v) = patch.refund_transaction_hash {
            self.refund_transaction_hash = Some(v);
        }
        if let Some(v) = patch.refund_tx_hex {
            self.refund_tx_hex = Some(v);
        }
        if let Some(v) = patch.can_create_eth_transaction {
            self.can_create_eth_transaction = v;
        }
        if let Some(v) = patch.is_eth_contract_funded {
            self.is_eth_contract_funded = v;
        }
        if let Some(v) = patch.is_btc_script_funded {
            self.is_btc_script_funded = v;
        }
        if let Some(v) = patch.is_eth_withdrawn {
            self.is_eth_withdrawn = v;
        }
        if let Some(v) = patch.is_btc_withdrawn {
            self.is_btc_withdrawn = v;
        }
        if let Some(v) = patch.is_refunded {
            self.is_refunded = v;
        }
        if let Some(v) = patch.is_finished {
            self.is_finished = v;
        }
        if let Some(v) = patch.withdraw_fee {
            self.withdraw_fee = Some(v);
        }
        if let Some(v) = patch.require_withdraw_fee {
            self.require_withdraw_fee = v;
        }
        if let Some(v) = patch.require_withdraw_fee_sent {
            self.require_withdraw_fee_sent = v;
        }
        if let Some(v) = patch.withdraw_request_incoming {
            self.withdraw_request_incoming = v;
        }
        if let Some(v) = patch.withdraw_request_accepted {
            self.withdraw_request_accepted = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::Secret;

    #[test]
    fn defaults_are_optimistic() {
        let state = FlowState::default();
        assert_eq!(state.step, 0);
        assert!(state.is_balance_enough);
        assert!(state.can_create_eth_transaction);
        assert!(!state.is_finished);
    }

    #[test]
    fn patch_touches_only_listed_fields() {
        let mut state = FlowState::default();
        let secret = Secret([9u8; 32]);

        state.apply(StatePatch {
            secret: Some(secret),
            is_balance_enough: Some(false),
            ..Default::default()
        });

        assert_eq!(state.secret, Some(secret));
        assert!(!state.is_balance_enough);
        // untouched fields keep their values
        assert!(state.can_create_eth_transaction);
        assert!(state.script_values.is_none());
        assert_eq!(state.step, 0);
    }

    #[test]
    fn patch_never_clears_an_option() {
        let mut state = FlowState::default();
        state.eth_swap_withdraw_transaction_hash = Some("0xabc".to_string());

        state.apply(StatePatch {
            is_eth_withdrawn: Some(true),
            ..Default::default()
        });

        assert_eq!(
            state.eth_swap_withdraw_transaction_hash.as_deref(),
            Some("0xabc")
        );
        assert!(state.is_eth_withdrawn);
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = FlowState::default();
        state.step = 5;
        state.secret = Some(Secret([3u8; 32]));
        state.secret_hash = Some(Secret([3u8; 32]).hash());
        state.is_eth_contract_funded = true;

        let json = serde_json::to_string(&state).unwrap();
        let back: FlowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
