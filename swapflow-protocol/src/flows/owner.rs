// Lock-chain owner's side of the swap: generates the secret, funds the
// HTLC script, waits for the counterparty's contract deposit, then redeems
// it by revealing the secret.

use crate::config::SwapConfig;
use crate::data_structures::{utc_now, ScriptValues, Secret, SecretHash, SwapSession, TxHash};
use crate::engine::state::StatePatch;
use crate::engine::{FlowEngine, FlowError, FlowEvent, FlowProtocol};
use crate::onchain::{
    ChainError, ContractBalanceExpectations, ContractChainAdapter, LockChainAdapter,
};
use crate::peer::{events, PeerChannel, PeerMessage};
use crate::persist::SwapStorage;
use crate::poller::{poll_until, PollerHandle};
use rand::RngCore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

pub const OWNER_STEPS: &[&str] = &[
    "sign",
    "submit-secret",
    "sync-balance",
    "lock-btc",
    "wait-lock-eth",
    "withdraw-eth",
    "finish",
    "end",
];

pub struct OwnerFlow {
    me: Weak<OwnerFlow>,
    engine: Arc<FlowEngine>,
    session: SwapSession,
    lock_chain: Arc<dyn LockChainAdapter>,
    contract_chain: Arc<dyn ContractChainAdapter>,
    room: Arc<dyn PeerChannel>,
    config: SwapConfig,
}

impl OwnerFlow {
    pub fn new(
        session: SwapSession,
        lock_chain: Arc<dyn LockChainAdapter>,
        contract_chain: Arc<dyn ContractChainAdapter>,
        room: Arc<dyn PeerChannel>,
        storage: Option<Arc<dyn SwapStorage>>,
        config: SwapConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<FlowEvent>), FlowError> {
        if !session.is_valid() {
            return Err(FlowError::Construction(format!(
                "incomplete session {}",
                session.id
            )));
        }

        let (engine, events_rx) = FlowEngine::new("owner", &session.id, OWNER_STEPS, storage);
        let flow = Arc::new_cyclic(|me| OwnerFlow {
            me: me.clone(),
            engine,
            session,
            lock_chain,
            contract_chain,
            room,
            config,
        });
        Ok((flow, events_rx))
    }

    /// Run the flow to completion (or until stopped). Message handlers and
    /// side operations stay functional while this future is parked.
    pub async fn run(&self) {
        self.engine.drive(self).await;
    }

    pub fn state(&self) -> crate::engine::state::FlowState {
        self.engine.state()
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    // -- step 1: sign -------------------------------------------------------

    async fn step_sign(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.once(
            events::SWAP_SIGN,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                if flow.engine.current_step() >= 1 {
                    return;
                }
                // if the peer later refunds its contract, reclaim the script
                let me = flow.me.clone();
                flow.room.once(
                    events::ETH_REFUND_COMPLETED,
                    Box::new(move |_| {
                        if let Some(flow) = me.upgrade() {
                            tokio::spawn(async move {
                                let _ = flow.try_refund().await;
                            });
                        }
                    }),
                );
                flow.engine.finish_step(
                    StatePatch {
                        is_participant_signed: Some(true),
                        ..Default::default()
                    },
                    "sign",
                    true,
                );
            }),
        );

        let me = self.me.clone();
        self.room.once(
            events::SWAP_EXISTS,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                log::warn!("[owner] peer reports the swap already exists on chain");
                flow.engine.set_state(
                    StatePatch {
                        is_swap_exist: Some(true),
                        ..Default::default()
                    },
                    true,
                );
                flow.stop_swap_process();
            }),
        );

        self.room.send_message(PeerMessage::new(events::REQUEST_SIGN));
        Ok(())
    }

    // -- step 2: submit-secret ----------------------------------------------

    /// Generate the swap secret and derive the HTLC script from its hash.
    /// Called by the embedding application once the peer has signed; the
    /// flow waits at this step until then.
    pub async fn submit_secret(&self) -> Result<SecretHash, FlowError> {
        let state = self.engine.state();
        if state.secret.is_some() {
            return Err(FlowError::SecretAlreadySubmitted);
        }
        if !state.is_participant_signed {
            return Err(FlowError::PeerNotSigned);
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = Secret(bytes);
        let secret_hash = secret.hash();
        log::debug!("[owner] secret submitted, hashlock {secret_hash}");

        self.create_work_script(secret_hash)?;
        self.engine.finish_step(
            StatePatch {
                secret: Some(secret),
                secret_hash: Some(secret_hash),
                ..Default::default()
            },
            "submit-secret",
            false,
        );
        Ok(secret_hash)
    }

    fn create_work_script(&self, secret_hash: SecretHash) -> Result<(), FlowError> {
        if self.engine.state().script_values.is_some() {
            log::debug!("[owner] script already generated");
            return Ok(());
        }

        let script_values = ScriptValues {
            secret_hash,
            owner_public_key: self.session.my_lock_chain.public_key.clone(),
            recipient_public_key: self.session.participant_lock_chain.public_key.clone(),
            lock_time: utc_now() + self.config.lock_time_window_secs,
        };
        let script_address = self.lock_chain.create_script(&script_values)?;
        log::debug!("[owner] script address {script_address}");

        self.engine.set_state(
            StatePatch {
                script_values: Some(script_values),
                script_address: Some(script_address),
                script_balance: Some(0),
                ..Default::default()
            },
            false,
        );
        Ok(())
    }

    // -- step 3: sync-balance -----------------------------------------------

    /// Check the local lock-chain wallet covers the sold amount plus the
    /// network fee. Re-runnable; the step finishes only when funds suffice.
    pub async fn sync_balance(&self) -> Result<(), FlowError> {
        self.engine.set_state(
            StatePatch {
                is_balance_fetching: Some(true),
                ..Default::default()
            },
            false,
        );

        let address = &self.session.my_lock_chain.address;
        let tx_fee = self.lock_chain.estimate_fee_value(address).await?;
        let unspents = self.lock_chain.fetch_unspents(address).await?;
        let balance: u128 = unspents.iter().map(|u| u.satoshis).sum();
        let needed = self.session.sell_amount + tx_fee;
        let enough = balance >= needed;

        let patch = StatePatch {
            balance: Some(balance),
            is_balance_fetching: Some(false),
            is_balance_enough: Some(enough),
            ..Default::default()
        };
        if enough {
            self.engine.finish_step(patch, "sync-balance", false);
        } else {
            log::warn!("[owner] wallet balance {balance} below required {needed}");
            self.engine.set_state(patch, true);
        }
        Ok(())
    }

    /// Skip the funding check, e.g. when the wallet is topped up out of
    /// band. The step finishes without marking the balance sufficient.
    pub fn skip_sync_balance(&self) {
        self.engine
            .finish_step(Default::default(), "sync-balance", false);
    }

    // -- step 4: lock-btc ---------------------------------------------------

    async fn step_lock_btc(&self) -> Result<(), FlowError> {
        let state = self.engine.state();
        let script_values = state
            .script_values
            .clone()
            .ok_or(FlowError::MissingScript("lock-btc"))?;

        if state.is_balance_enough && state.btc_script_creating_transaction_hash.is_none() {
            self.lock_chain
                .fund_script(&script_values, self.session.sell_amount)
                .await?;
        }

        // observe the chain rather than trust our own broadcast
        let stop = self.engine.stop_signal().clone();
        let funded = poll_until(self.poll_interval(), &stop, |_| {
            self.observe_script_funding(&script_values)
        })
        .await;

        let Some(funding_txid) = funded else {
            return Ok(());
        };
        self.on_script_funded(&funding_txid);

        if !self.engine.is_stopped() {
            self.engine.finish_step(
                StatePatch {
                    is_btc_script_funded: Some(true),
                    ..Default::default()
                },
                "lock-btc",
                false,
            );
        }
        Ok(())
    }

    async fn observe_script_funding(&self, script_values: &ScriptValues) -> Option<TxHash> {
        let address = match self.lock_chain.create_script(script_values) {
            Ok(address) => address,
            Err(err) => {
                log::error!("[owner] cannot derive script address: {err}");
                return None;
            }
        };
        let unspents = match self.lock_chain.fetch_unspents(&address).await {
            Ok(unspents) if !unspents.is_empty() => unspents,
            Ok(_) => return None,
            Err(err) => {
                log::debug!("[owner] unspents lookup failed: {err}");
                return None;
            }
        };
        let balance = match self.lock_chain.get_balance(script_values).await {
            Ok(balance) => balance,
            Err(err) => {
                log::debug!("[owner] script balance lookup failed: {err}");
                return None;
            }
        };
        if balance < self.session.sell_amount {
            return None;
        }
        self.engine.set_state(
            StatePatch {
                script_balance: Some(balance),
                ..Default::default()
            },
            false,
        );
        Some(unspents[0].txid.clone())
    }

    /// Record the funding transaction once and announce the script to the
    /// peer. Repeated script requests are answered for the rest of the swap.
    fn on_script_funded(&self, funding_txid: &str) {
        if self
            .engine
            .state()
            .btc_script_creating_transaction_hash
            .is_some()
        {
            return;
        }
        self.engine.set_state(
            StatePatch {
                btc_script_creating_transaction_hash: Some(funding_txid.to_string()),
                ..Default::default()
            },
            true,
        );
        self.send_script_message();

        let me = self.me.clone();
        self.room.on(
            events::REQUEST_BTC_SCRIPT,
            Box::new(move |_| {
                if let Some(flow) = me.upgrade() {
                    flow.send_script_message();
                }
            }),
        );
    }

    fn send_script_message(&self) {
        let state = self.engine.state();
        let Some(script_values) = state.script_values else {
            return;
        };
        let data = serde_json::json!({
            "scriptValues": script_values,
            "btcScriptCreatingTransactionHash": state.btc_script_creating_transaction_hash,
        });
        self.room
            .send_message(PeerMessage::with_data(events::CREATE_BTC_SCRIPT, data));
    }

    // -- step 5: wait-lock-eth ----------------------------------------------

    async fn step_wait_lock_eth(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.on(
            events::CREATE_ETH_CONTRACT,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = data
                    .get("ethSwapCreationTransactionHash")
                    .and_then(|v| v.as_str())
                else {
                    return;
                };
                flow.engine.set_state(
                    StatePatch {
                        eth_swap_creation_transaction_hash: Some(hash.to_string()),
                        ..Default::default()
                    },
                    true,
                );
            }),
        );

        // covers resumption: the funding-time handler is gone after restart
        let me = self.me.clone();
        self.room.once(
            events::REQUEST_BTC_SCRIPT,
            Box::new(move |_| {
                if let Some(flow) = me.upgrade() {
                    flow.send_script_message();
                }
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::REQUEST_ETH_CONTRACT));

        let contract_owner = self.session.participant_contract_chain.address.clone();
        let stop = self.engine.stop_signal().clone();
        let funded = poll_until(self.poll_interval(), &stop, |_| {
            let contract_chain = self.contract_chain.clone();
            let contract_owner = contract_owner.clone();
            async move {
                match contract_chain.get_balance(&contract_owner).await {
                    Ok(balance) if balance > 0 => Some(()),
                    Ok(_) => None,
                    Err(err) => {
                        log::debug!("[owner] contract balance lookup failed: {err}");
                        None
                    }
                }
            }
        })
        .await;

        if funded.is_some() {
            self.engine.finish_step(
                StatePatch {
                    is_eth_contract_funded: Some(true),
                    ..Default::default()
                },
                "wait-lock-eth",
                false,
            );
        }
        Ok(())
    }

    // -- step 6: withdraw-eth -----------------------------------------------

    async fn step_withdraw_eth(&self) -> Result<(), FlowError> {
        let state = self.engine.state();
        let secret = state.secret.ok_or(FlowError::MissingSecret("withdraw-eth"))?;
        let secret_hash = state
            .secret_hash
            .ok_or(FlowError::MissingSecret("withdraw-eth"))?;
        let contract_owner = self.session.participant_contract_chain.address.clone();

        // escrow must match the agreed terms before the secret goes on chain
        if let Err(err) = self
            .contract_chain
            .check_balance(&ContractBalanceExpectations {
                owner_address: contract_owner.clone(),
                participant_address: self.session.my_contract_chain.address.clone(),
                expected_value: self.session.buy_amount,
                expected_hash: secret_hash,
            })
            .await
        {
            log::error!("[owner] contract deposit check failed: {err}");
            self.engine
                .dispatch(FlowEvent::ContractCheckFailed(err.to_string()));
            return Ok(());
        }

        if self.contract_chain.has_target_wallet() {
            let target_wallet = self.contract_chain.get_target_wallet(&contract_owner).await?;
            let needed = self
                .session
                .destination_buy_address
                .clone()
                .unwrap_or_else(|| self.session.my_contract_chain.address.clone());
            if target_wallet != needed {
                self.engine.dispatch(FlowEvent::TargetWalletMismatch {
                    needed: needed.clone(),
                    got: target_wallet.clone(),
                });
                return Err(FlowError::TargetWalletMismatch {
                    needed,
                    got: target_wallet,
                });
            }
        }

        let stop = self.engine.stop_signal().clone();
        let withdrawn = poll_until(self.poll_interval(), &stop, |handle| {
            self.try_withdraw_contract(secret, handle)
        })
        .await;

        if withdrawn == Some(true) {
            self.on_withdraw_ready();
        }
        Ok(())
    }

    async fn try_withdraw_contract(&self, secret: Secret, handle: PollerHandle) -> Option<bool> {
        if self.engine.state().is_eth_withdrawn {
            handle.stop();
            return Some(true);
        }

        let contract_owner = self.session.participant_contract_chain.address.clone();

        if self.engine.state().withdraw_fee.is_none() {
            match self
                .contract_chain
                .calc_withdraw_gas(&contract_owner, &secret)
                .await
            {
                Ok(fee) => {
                    log::debug!("[owner] withdrawal fee {fee}");
                    self.engine.set_state(
                        StatePatch {
                            withdraw_fee: Some(fee),
                            ..Default::default()
                        },
                        false,
                    );
                }
                Err(err) => {
                    log::warn!("[owner] fee estimation failed: {err}");
                    return None;
                }
            }
        }

        let engine = self.engine.clone();
        let room = self.room.clone();
        let on_hash = move |hash: &str| {
            engine.set_state(
                StatePatch {
                    is_eth_withdrawn: Some(true),
                    eth_swap_withdraw_transaction_hash: Some(hash.to_string()),
                    can_create_eth_transaction: Some(true),
                    require_withdraw_fee: Some(false),
                    ..Default::default()
                },
                true,
            );
            room.send_message(PeerMessage::with_data(
                events::ETH_WITHDRAW_TX_HASH,
                serde_json::json!({ "ethSwapWithdrawTransactionHash": hash }),
            ));
        };

        match self
            .contract_chain
            .withdraw(&contract_owner, &secret, &on_hash)
            .await
        {
            Ok(_) => {
                handle.stop();
                Some(true)
            }
            Err(ChainError::AlreadyKnown(msg)) => {
                // resubmission of our own transaction: treat as success
                log::error!("[owner] transaction already known: {msg}");
                handle.stop();
                Some(true)
            }
            Err(ChainError::ExecutionFailed(msg)) => {
                log::error!("[owner] withdrawal execution failed, will retry: {msg}");
                self.engine.set_state(
                    StatePatch {
                        can_create_eth_transaction: Some(false),
                        ..Default::default()
                    },
                    false,
                );
                None
            }
            Err(ChainError::FeeInsufficient(msg)) => {
                log::error!("[owner] cannot cover the withdrawal fee: {msg}");
                self.enter_fee_sponsorship();
                handle.stop();
                None
            }
            Err(err) => {
                log::error!("[owner] withdrawal failed: {err}");
                self.engine.set_state(
                    StatePatch {
                        can_create_eth_transaction: Some(false),
                        ..Default::default()
                    },
                    false,
                );
                handle.stop();
                None
            }
        }
    }

    /// Flag that the peer must sponsor the withdrawal fee, and adopt the
    /// sponsored transaction when it lands.
    fn enter_fee_sponsorship(&self) {
        if self.engine.state().require_withdraw_fee {
            return;
        }

        let me = self.me.clone();
        self.room.once(
            events::WITHDRAW_READY,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = data
                    .get("ethSwapWithdrawTransactionHash")
                    .and_then(|v| v.as_str())
                else {
                    return;
                };
                log::info!("[owner] adopting sponsored withdrawal {hash}");
                flow.engine.set_state(
                    StatePatch {
                        eth_swap_withdraw_transaction_hash: Some(hash.to_string()),
                        require_withdraw_fee: Some(false),
                        ..Default::default()
                    },
                    true,
                );
                flow.on_withdraw_ready();
            }),
        );

        self.engine.set_state(
            StatePatch {
                require_withdraw_fee: Some(true),
                can_create_eth_transaction: Some(false),
                ..Default::default()
            },
            true,
        );
    }

    /// Ask the peer to sponsor the withdrawal fee. No-op unless the fee
    /// shortage was flagged; sent at most once.
    pub fn send_withdraw_request(&self) {
        let state = self.engine.state();
        if !state.require_withdraw_fee || state.require_withdraw_fee_sent {
            return;
        }
        self.engine.set_state(
            StatePatch {
                require_withdraw_fee_sent: Some(true),
                ..Default::default()
            },
            false,
        );

        let me = self.me.clone();
        self.room.on(
            events::ACCEPT_WITHDRAW_REQUEST,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                let Some(secret) = flow.engine.state().secret else {
                    return;
                };
                flow.room.send_message(PeerMessage::with_data(
                    events::DO_WITHDRAW,
                    serde_json::json!({ "secret": secret.to_hex() }),
                ));
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::REQUEST_WITHDRAW));
    }

    fn on_withdraw_ready(&self) {
        let me = self.me.clone();
        self.room.on(
            events::REQUEST_ETH_WITHDRAW_TX_HASH,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = flow.engine.state().eth_swap_withdraw_transaction_hash else {
                    return;
                };
                flow.room.send_message(PeerMessage::with_data(
                    events::ETH_WITHDRAW_TX_HASH,
                    serde_json::json!({ "ethSwapWithdrawTransactionHash": hash }),
                ));
            }),
        );

        self.engine.finish_step(
            StatePatch {
                is_eth_withdrawn: Some(true),
                ..Default::default()
            },
            "withdraw-eth",
            true,
        );
    }

    // -- step 7: finish -----------------------------------------------------

    async fn step_finish(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.once(
            events::SWAP_FINISHED,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = data
                    .get("btcSwapWithdrawTransactionHash")
                    .and_then(|v| v.as_str())
                else {
                    return;
                };
                flow.engine.set_state(
                    StatePatch {
                        btc_swap_withdraw_transaction_hash: Some(hash.to_string()),
                        ..Default::default()
                    },
                    true,
                );
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::REQUEST_SWAP_FINISHED));
        self.engine.finish_step(
            StatePatch {
                is_finished: Some(true),
                ..Default::default()
            },
            "finish",
            false,
        );
        Ok(())
    }

    // -- side operations ----------------------------------------------------

    /// Reclaim the script funds after the lock time. Returns `Ok(false)`
    /// when the refund is not (or not yet) possible.
    pub async fn try_refund(&self) -> Result<bool, FlowError> {
        let state = self.engine.state();
        if state.is_refunded {
            log::warn!("[owner] already refunded");
            return Ok(false);
        }
        let (Some(script_values), Some(secret)) = (state.script_values, state.secret) else {
            log::warn!("[owner] nothing to refund yet");
            return Ok(false);
        };

        match self.lock_chain.refund(&script_values, &secret).await {
            Ok(Some(hash)) => {
                log::info!("[owner] refunded, tx {hash}");
                self.room
                    .send_message(PeerMessage::new(events::BTC_REFUND_COMPLETED));
                self.engine.set_state(
                    StatePatch {
                        refund_transaction_hash: Some(hash),
                        is_refunded: Some(true),
                        is_swap_exist: Some(false),
                        ..Default::default()
                    },
                    true,
                );
                Ok(true)
            }
            Ok(None) => {
                log::debug!("[owner] refund refused, lock time not reached");
                Ok(false)
            }
            Err(err) => {
                log::warn!("[owner] refund failed: {err}");
                Ok(false)
            }
        }
    }

    /// Pre-signed refund transaction for out-of-band recovery. Cached in
    /// state once built.
    pub async fn get_refund_tx_hex(&self) -> Result<String, FlowError> {
        let state = self.engine.state();
        if let Some(hex) = state.refund_tx_hex {
            return Ok(hex);
        }
        let script_values = state
            .script_values
            .ok_or(FlowError::MissingScript("refund-hex"))?;
        let secret = state.secret.ok_or(FlowError::MissingSecret("refund-hex"))?;

        let hex = self
            .lock_chain
            .get_refund_hex_transaction(&script_values, &secret)
            .await?;
        self.engine.set_state(
            StatePatch {
                refund_tx_hex: Some(hex.clone()),
                ..Default::default()
            },
            true,
        );
        Ok(hex)
    }

    /// Manual withdrawal with an externally supplied secret. Mismatches
    /// against recorded state are reported but do not block the attempt;
    /// the chain is the final arbiter.
    pub async fn try_withdraw(&self, secret: Secret) -> Result<(), FlowError> {
        let state = self.engine.state();
        if let Some(known) = state.secret {
            if known != secret {
                log::warn!("[owner] supplied secret differs from the recorded one");
            }
        }
        if state.is_eth_withdrawn {
            log::warn!("[owner] contract funds look already withdrawn");
        }
        let supplied_hash = secret.hash();
        if let Some(expected) = state.secret_hash {
            if expected != supplied_hash {
                log::warn!(
                    "[owner] hashlock mismatch: recorded {expected}, supplied {supplied_hash}"
                );
                self.engine.dispatch(FlowEvent::SecretHashMismatch {
                    expected: expected.to_hex(),
                    supplied: supplied_hash.to_hex(),
                });
            }
        }

        let contract_owner = self.session.participant_contract_chain.address.clone();
        let engine = self.engine.clone();
        let on_hash = move |hash: &str| {
            engine.set_state(
                StatePatch {
                    eth_swap_withdraw_transaction_hash: Some(hash.to_string()),
                    can_create_eth_transaction: Some(true),
                    ..Default::default()
                },
                false,
            );
        };
        self.contract_chain
            .withdraw(&contract_owner, &secret, &on_hash)
            .await?;

        self.engine.finish_step(
            StatePatch {
                is_eth_withdrawn: Some(true),
                ..Default::default()
            },
            "withdraw-eth",
            false,
        );
        Ok(())
    }

    /// Permanently stop this swap. The flow stalls at its current step;
    /// refund and manual withdrawal remain available.
    pub fn stop_swap_process(&self) {
        self.engine.stop_swap();
    }
}

#[async_trait::async_trait]
impl FlowProtocol for OwnerFlow {
    fn flow_name(&self) -> &'static str {
        "owner"
    }

    fn steps(&self) -> &'static [&'static str] {
        OWNER_STEPS
    }

    async fn run_step(&self, name: &'static str) -> Result<(), FlowError> {
        match name {
            "sign" => self.step_sign().await,
            "submit-secret" => {
                // waits for the embedding application to call submit_secret
                log::debug!("[owner] waiting for the secret to be submitted");
                Ok(())
            }
            "sync-balance" => self.sync_balance().await,
            "lock-btc" => self.step_lock_btc().await,
            "wait-lock-eth" => self.step_wait_lock_eth().await,
            "withdraw-eth" => self.step_withdraw_eth().await,
            "finish" => self.step_finish().await,
            "end" => Ok(()),
            other => {
                log::error!("[owner] unknown step '{other}'");
                Ok(())
            }
        }
    }
}
