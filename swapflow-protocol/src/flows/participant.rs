// Counter-chain participant's side of the swap: waits for the owner's HTLC
// script, verifies it, funds the escrow contract, recovers the revealed
// secret, and redeems the script with it.

use crate::config::SwapConfig;
use crate::data_structures::{utc_now, ScriptValues, Secret, SwapSession, TxHash};
use crate::engine::state::StatePatch;
use crate::engine::{FlowEngine, FlowError, FlowEvent, FlowProtocol};
use crate::onchain::{
    ChainError, ContractChainAdapter, ContractCreateArgs, LockChainAdapter, LockWithdrawArgs,
    ScriptCheckError, ScriptCheckExpectations,
};
use crate::peer::{events, PeerChannel, PeerMessage};
use crate::persist::SwapStorage;
use crate::poller::{poll_until, PollerHandle};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PARTICIPANT_STEPS: &[&str] = &[
    "sign",
    "wait-lock-btc",
    "verify-script",
    "sync-balance",
    "lock-eth",
    "wait-withdraw-eth",
    "withdraw-btc",
    "finish",
    "end",
];

pub struct ParticipantFlow {
    me: Weak<ParticipantFlow>,
    engine: Arc<FlowEngine>,
    session: SwapSession,
    lock_chain: Arc<dyn LockChainAdapter>,
    contract_chain: Arc<dyn ContractChainAdapter>,
    room: Arc<dyn PeerChannel>,
    config: SwapConfig,
}

impl ParticipantFlow {
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

        let (engine, events_rx) =
            FlowEngine::new("participant", &session.id, PARTICIPANT_STEPS, storage);
        let flow = Arc::new_cyclic(|me| ParticipantFlow {
            me: me.clone(),
            engine,
            session,
            lock_chain,
            contract_chain,
            room,
            config,
        });
        flow.register_base_handlers();
        Ok((flow, events_rx))
    }

    /// Handlers that must exist for the whole life of the flow, regardless
    /// of the current step.
    fn register_base_handlers(self: &Arc<Self>) {
        // fee-sponsorship request from a peer that cannot pay its own gas
        let me = self.me.clone();
        self.room.once(
            events::REQUEST_WITHDRAW,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                log::info!("[participant] peer requests a sponsored withdrawal");
                flow.engine.set_state(
                    StatePatch {
                        withdraw_request_incoming: Some(true),
                        ..Default::default()
                    },
                    true,
                );
            }),
        );
    }

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

    /// Guard against a stale contract entry for this pair, then exchange
    /// sign messages with the peer. Runs automatically when the flow starts.
    pub async fn sign(&self) -> Result<bool, FlowError> {
        let exists = self
            .contract_chain
            .check_swap_exists(
                &self.session.my_contract_chain.address,
                &self.session.participant_contract_chain.address,
            )
            .await?;
        if exists {
            log::error!("[participant] swap already exists on chain, refusing to start");
            // a peer that asks to sign after our notice went out still must
            // learn the swap is unusable
            let me = self.me.clone();
            self.room.on(
                events::REQUEST_SIGN,
                Box::new(move |_| {
                    if let Some(flow) = me.upgrade() {
                        flow.room
                            .send_message(PeerMessage::new(events::SWAP_EXISTS));
                    }
                }),
            );
            self.room
                .send_message(PeerMessage::new(events::SWAP_EXISTS));
            self.engine.set_state(
                StatePatch {
                    is_swap_exist: Some(true),
                    ..Default::default()
                },
                true,
            );
            self.stop_swap_process();
            return Ok(false);
        }

        let state = self.engine.state();
        if state.is_sign_fetching || state.is_me_signed {
            return Ok(true);
        }
        self.engine.set_state(
            StatePatch {
                is_sign_fetching: Some(true),
                ..Default::default()
            },
            false,
        );

        // if the peer reclaims its script, release our contract entry too
        let me = self.me.clone();
        self.room.once(
            events::BTC_REFUND_COMPLETED,
            Box::new(move |_| {
                if let Some(flow) = me.upgrade() {
                    tokio::spawn(async move {
                        let _ = flow.try_refund().await;
                    });
                }
            }),
        );

        // answer sign requests for as long as the swap runs
        let me = self.me.clone();
        self.room.on(
            events::REQUEST_SIGN,
            Box::new(move |_| {
                if let Some(flow) = me.upgrade() {
                    flow.room
                        .send_message(PeerMessage::new(events::SWAP_SIGN));
                }
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::SWAP_SIGN));
        self.engine.finish_step(
            StatePatch {
                is_me_signed: Some(true),
                is_sign_fetching: Some(false),
                ..Default::default()
            },
            "sign",
            true,
        );
        Ok(true)
    }

    // -- step 2: wait-lock-btc ----------------------------------------------

    async fn step_wait_lock_btc(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.on(
            events::CREATE_BTC_SCRIPT,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                // duplicated announcements after the script is recorded
                if flow.engine.current_step() >= 2 {
                    return;
                }
                let Some(script_values) = data
                    .get("scriptValues")
                    .and_then(|v| serde_json::from_value::<ScriptValues>(v.clone()).ok())
                else {
                    log::warn!("[participant] malformed script announcement");
                    return;
                };
                let funding_txid: Option<TxHash> = data
                    .get("btcScriptCreatingTransactionHash")
                    .and_then(|v| v.as_str())
                    .map(String::from);

                log::debug!(
                    "[participant] received script, hashlock {}",
                    script_values.secret_hash
                );
                flow.engine.finish_step(
                    StatePatch {
                        secret_hash: Some(script_values.secret_hash),
                        script_values: Some(script_values),
                        btc_script_creating_transaction_hash: funding_txid,
                        ..Default::default()
                    },
                    "wait-lock-btc",
                    true,
                );
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::REQUEST_BTC_SCRIPT));
        Ok(())
    }

    // -- step 3: verify-script ----------------------------------------------

    /// Accept the announced script parameters. Called by the embedding
    /// application (or an auto-accept policy) after its own review; the
    /// flow waits at this step until then.
    pub fn verify_btc_script(&self) -> Result<bool, FlowError> {
        let state = self.engine.state();
        if state.btc_script_verified {
            return Ok(true);
        }
        let script_values = state
            .script_values
            .ok_or(FlowError::MissingScript("verify-script"))?;

        // structural sanity; the on-chain check happens before funding
        if script_values.owner_public_key.is_empty()
            || script_values.recipient_public_key.is_empty()
            || script_values.lock_time == 0
        {
            return Err(FlowError::MissingScript("verify-script"));
        }
        if script_values.recipient_public_key != self.session.my_lock_chain.public_key {
            log::warn!("[participant] script recipient key is not ours");
        }

        self.engine.finish_step(
            StatePatch {
                btc_script_verified: Some(true),
                ..Default::default()
            },
            "verify-script",
            false,
        );
        Ok(true)
    }

    // -- step 4: sync-balance -----------------------------------------------

    pub async fn sync_balance(&self) -> Result<(), FlowError> {
        self.engine.set_state(
            StatePatch {
                is_balance_fetching: Some(true),
                ..Default::default()
            },
            false,
        );

        let balance = self
            .contract_chain
            .fetch_balance(&self.session.my_contract_chain.address)
            .await?;
        let enough = balance >= self.session.sell_amount;

        let patch = StatePatch {
            balance: Some(balance),
            is_balance_fetching: Some(false),
            is_balance_enough: Some(enough),
            ..Default::default()
        };
        if enough {
            self.engine.finish_step(patch, "sync-balance", false);
        } else {
            log::warn!(
                "[participant] account balance {balance} below required {}",
                self.session.sell_amount
            );
            self.engine.set_state(patch, true);
        }
        Ok(())
    }

    pub fn skip_sync_balance(&self) {
        self.engine
            .finish_step(Default::default(), "sync-balance", false);
    }

    // -- step 5: lock-eth ---------------------------------------------------

    async fn step_lock_eth(&self) -> Result<(), FlowError> {
        let state = self.engine.state();
        let secret_hash = state
            .secret_hash
            .ok_or(FlowError::MissingScript("lock-eth"))?;

        // the owner's script must be funded and redeemable before we commit
        let stop = self.engine.stop_signal().clone();
        let script_ok = poll_until(self.poll_interval(), &stop, |handle| {
            self.check_owner_script(handle)
        })
        .await;
        if script_ok != Some(true) {
            return Ok(());
        }

        // answer contract-transaction requests for the rest of the swap
        let me = self.me.clone();
        self.room.on(
            events::REQUEST_ETH_CONTRACT,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = flow.engine.state().eth_swap_creation_transaction_hash else {
                    return;
                };
                flow.room.send_message(PeerMessage::with_data(
                    events::CREATE_ETH_CONTRACT,
                    serde_json::json!({ "ethSwapCreationTransactionHash": hash }),
                ));
            }),
        );

        let args = ContractCreateArgs {
            participant_address: self.session.participant_contract_chain.address.clone(),
            secret_hash,
            amount: self.session.sell_amount,
            target_wallet: self.session.destination_sell_address.clone(),
        };
        let funded = poll_until(self.poll_interval(), &stop, |handle| {
            self.try_create_contract(args.clone(), handle)
        })
        .await;

        if funded == Some(true) && !self.engine.is_stopped() {
            self.engine.finish_step(
                StatePatch {
                    is_eth_contract_funded: Some(true),
                    ..Default::default()
                },
                "lock-eth",
                false,
            );
        }
        Ok(())
    }

    async fn check_owner_script(&self, handle: PollerHandle) -> Option<bool> {
        let Some(script_values) = self.engine.state().script_values else {
            log::error!("[participant] no script values in state");
            handle.stop();
            return None;
        };

        let expected = ScriptCheckExpectations {
            value: self.session.buy_amount,
            recipient_public_key: self.session.my_lock_chain.public_key.clone(),
            lock_time: utc_now(),
            confidence: self.config.script_confidence,
        };
        match self.lock_chain.check_script(&script_values, &expected).await {
            Ok(()) => Some(true),
            Err(ScriptCheckError::LockTimeMismatch { reference, actual }) => {
                // refund window already open: funding now would hand the
                // owner both sides
                log::error!(
                    "[participant] script is already refundable \
                     (lock time {actual}, now {reference}), aborting"
                );
                self.stop_swap_process();
                handle.stop();
                None
            }
            Err(ScriptCheckError::ValueMismatch { expected, actual }) => {
                log::debug!("[participant] script holds {actual}, waiting for {expected}");
                None
            }
            Err(err) => {
                log::warn!("[participant] script check failed: {err}");
                self.engine
                    .dispatch(FlowEvent::ScriptCheckFailed(err.to_string()));
                None
            }
        }
    }

    async fn try_create_contract(
        &self,
        args: ContractCreateArgs,
        handle: PollerHandle,
    ) -> Option<bool> {
        if self.engine.state().is_eth_contract_funded {
            handle.stop();
            return Some(true);
        }

        let engine = self.engine.clone();
        let room = self.room.clone();
        let on_hash = move |hash: &str| {
            engine.set_state(
                StatePatch {
                    eth_swap_creation_transaction_hash: Some(hash.to_string()),
                    can_create_eth_transaction: Some(true),
                    ..Default::default()
                },
                true,
            );
            room.send_message(PeerMessage::with_data(
                events::CREATE_ETH_CONTRACT,
                serde_json::json!({ "ethSwapCreationTransactionHash": hash }),
            ));
        };

        match self.contract_chain.create(&args, &on_hash).await {
            Ok(_) => Some(true),
            Err(ChainError::AlreadyKnown(msg)) => {
                log::error!("[participant] transaction already known: {msg}");
                Some(true)
            }
            Err(ChainError::ExecutionFailed(msg)) => {
                log::error!("[participant] contract creation failed, will retry: {msg}");
                self.engine.set_state(
                    StatePatch {
                        can_create_eth_transaction: Some(false),
                        ..Default::default()
                    },
                    false,
                );
                None
            }
            Err(err) => {
                log::error!("[participant] cannot fund the contract: {err}");
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

    // -- step 6: wait-withdraw-eth ------------------------------------------

    /// Recover the revealed secret from either of two independent sources:
    /// the peer's withdrawal transaction id, or contract storage directly.
    /// Whichever lands first wins; the step transition is idempotent.
    async fn step_wait_withdraw_eth(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.once(
            events::ETH_WITHDRAW_TX_HASH,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                let Some(hash) = data
                    .get("ethSwapWithdrawTransactionHash")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                else {
                    return;
                };
                flow.engine.set_state(
                    StatePatch {
                        eth_swap_withdraw_transaction_hash: Some(hash.clone()),
                        ..Default::default()
                    },
                    true,
                );
                tokio::spawn(async move {
                    flow.resolve_secret_from_txhash(hash).await;
                });
            }),
        );
        self.room
            .send_message(PeerMessage::new(events::REQUEST_ETH_WITHDRAW_TX_HASH));

        let stop = self.engine.stop_signal().clone();
        let secret = poll_until(self.poll_interval(), &stop, |handle| {
            self.check_contract_secret(handle)
        })
        .await;

        if let Some(secret) = secret {
            self.finish_secret_recovery(secret, "contract storage");
        }
        Ok(())
    }

    async fn check_contract_secret(&self, handle: PollerHandle) -> Option<Secret> {
        let state = self.engine.state();
        if state.is_eth_withdrawn || state.is_refunded {
            handle.stop();
            return None;
        }
        match self
            .contract_chain
            .get_secret(&self.session.participant_contract_chain.address)
            .await
        {
            Ok(secret) => secret,
            Err(err) => {
                log::debug!("[participant] secret lookup failed: {err}");
                None
            }
        }
    }

    async fn resolve_secret_from_txhash(self: Arc<Self>, tx_hash: String) {
        let stop = self.engine.stop_signal().clone();
        let secret = poll_until(self.poll_interval(), &stop, |handle| {
            let flow = self.clone();
            let tx_hash = tx_hash.clone();
            async move {
                let state = flow.engine.state();
                if state.is_eth_withdrawn || state.is_refunded {
                    handle.stop();
                    return None;
                }
                match flow.contract_chain.get_secret_from_txhash(&tx_hash).await {
                    Ok(secret) => secret,
                    Err(err) => {
                        log::debug!("[participant] tx secret lookup failed: {err}");
                        None
                    }
                }
            }
        })
        .await;

        if let Some(secret) = secret {
            self.finish_secret_recovery(secret, "withdraw transaction");
        }
    }

    fn finish_secret_recovery(&self, secret: Secret, source: &str) {
        log::debug!("[participant] secret recovered from {source}");
        self.engine.finish_step(
            StatePatch {
                secret: Some(secret),
                is_eth_withdrawn: Some(true),
                ..Default::default()
            },
            "wait-withdraw-eth",
            true,
        );
    }

    // -- step 7: withdraw-btc -----------------------------------------------

    async fn step_withdraw_btc(&self) -> Result<(), FlowError> {
        let stop = self.engine.stop_signal().clone();
        let outcome = poll_until(self.poll_interval(), &stop, |handle| {
            self.try_withdraw_script(handle)
        })
        .await;

        match outcome {
            Some(Ok(())) => {
                self.engine.finish_step(
                    StatePatch {
                        is_btc_withdrawn: Some(true),
                        ..Default::default()
                    },
                    "withdraw-btc",
                    false,
                );
                Ok(())
            }
            Some(Err(err)) => {
                // already drained: someone (possibly an earlier run of this
                // process) redeemed it; the swap itself is complete
                self.engine.finish_step(
                    StatePatch {
                        is_btc_withdrawn: Some(true),
                        ..Default::default()
                    },
                    "withdraw-btc",
                    false,
                );
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn try_withdraw_script(&self, handle: PollerHandle) -> Option<Result<(), FlowError>> {
        let state = self.engine.state();
        if state.btc_swap_withdraw_transaction_hash.is_some() {
            handle.stop();
            return Some(Ok(()));
        }
        let Some(script_values) = state.script_values else {
            log::error!("[participant] no script values in state, cannot redeem");
            handle.stop();
            return None;
        };
        let Some(secret) = state.secret else {
            log::error!("[participant] no secret in state, cannot redeem");
            handle.stop();
            return None;
        };

        match self.lock_chain.get_balance(&script_values).await {
            Ok(0) => {
                let address = self
                    .lock_chain
                    .create_script(&script_values)
                    .unwrap_or_default();
                handle.stop();
                return Some(Err(FlowError::AlreadyWithdrawn(address)));
            }
            Ok(_) => {}
            Err(err) => {
                log::debug!("[participant] script balance lookup failed: {err}");
                return None;
            }
        }

        let args = LockWithdrawArgs {
            script_values,
            secret,
            destination_address: self.session.destination_buy_address.clone(),
        };
        let engine = self.engine.clone();
        let on_hash = move |hash: &str| {
            engine.set_state(
                StatePatch {
                    btc_swap_withdraw_transaction_hash: Some(hash.to_string()),
                    ..Default::default()
                },
                true,
            );
        };
        match self.lock_chain.withdraw(&args, &on_hash).await {
            Ok(hash) => {
                log::info!("[participant] script redeemed, tx {hash}");
                self.engine.set_state(
                    StatePatch {
                        btc_swap_withdraw_transaction_hash: Some(hash),
                        ..Default::default()
                    },
                    true,
                );
                Some(Ok(()))
            }
            Err(err) => {
                log::warn!("[participant] script redemption failed, will retry: {err}");
                None
            }
        }
    }

    // -- step 8: finish -----------------------------------------------------

    async fn step_finish(&self) -> Result<(), FlowError> {
        let me = self.me.clone();
        self.room.on(
            events::REQUEST_SWAP_FINISHED,
            Box::new(move |_| {
                let Some(flow) = me.upgrade() else { return };
                let state = flow.engine.state();
                flow.room.send_message(PeerMessage::with_data(
                    events::SWAP_FINISHED,
                    serde_json::json!({
                        "btcSwapWithdrawTransactionHash":
                            state.btc_swap_withdraw_transaction_hash,
                    }),
                ));
            }),
        );

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

    /// Agree to sponsor the peer's withdrawal fee: ask for the secret, and
    /// when it arrives perform the fee-sponsored withdrawal on the peer's
    /// behalf. Funds still go to the contract's recorded recipient.
    pub fn accept_withdraw_request(&self) {
        let state = self.engine.state();
        if !state.withdraw_request_incoming || state.withdraw_request_accepted {
            return;
        }
        self.engine.set_state(
            StatePatch {
                withdraw_request_accepted: Some(true),
                ..Default::default()
            },
            true,
        );

        let me = self.me.clone();
        self.room.once(
            events::DO_WITHDRAW,
            Box::new(move |data| {
                let Some(flow) = me.upgrade() else { return };
                let Some(secret) = data
                    .get("secret")
                    .and_then(|v| v.as_str())
                    .and_then(Secret::from_hex)
                else {
                    log::warn!("[participant] malformed sponsored-withdrawal secret");
                    return;
                };
                tokio::spawn(async move {
                    let room = flow.room.clone();
                    let on_hash = move |hash: &str| {
                        room.send_message(PeerMessage::with_data(
                            events::WITHDRAW_READY,
                            serde_json::json!({ "ethSwapWithdrawTransactionHash": hash }),
                        ));
                    };
                    if let Err(err) = flow
                        .contract_chain
                        .withdraw_no_money(
                            &flow.session.participant_contract_chain.address,
                            &secret,
                            &on_hash,
                        )
                        .await
                    {
                        log::warn!("[participant] sponsored withdrawal failed: {err}");
                    }
                });
            }),
        );

        self.room
            .send_message(PeerMessage::new(events::ACCEPT_WITHDRAW_REQUEST));
    }

    /// Reclaim the contract deposit. `Ok(false)` when there is nothing to
    /// refund or the chain refuses (timeout not reached).
    pub async fn try_refund(&self) -> Result<bool, FlowError> {
        let state = self.engine.state();
        if !state.is_eth_contract_funded {
            log::warn!("[participant] contract was never funded, nothing to refund");
            return Ok(false);
        }
        if state.is_refunded {
            log::warn!("[participant] already refunded");
            return Ok(false);
        }
        let Some(secret_hash) = state.secret_hash else {
            return Ok(false);
        };

        // an earlier run may have refunded without recording it
        match self.contract_chain.was_refunded(&secret_hash).await {
            Ok(true) => {
                log::debug!("[participant] contract entry was already refunded");
                self.on_refund_done(None);
                return Ok(true);
            }
            Ok(false) => {}
            Err(err) => {
                log::warn!("[participant] refund state lookup failed: {err}");
                return Ok(false);
            }
        }

        match self
            .contract_chain
            .refund(&self.session.participant_contract_chain.address)
            .await
        {
            Ok(Some(hash)) => {
                log::info!("[participant] refunded, tx {hash}");
                self.on_refund_done(Some(hash));
                Ok(true)
            }
            Ok(None) => {
                log::debug!("[participant] refund refused, timeout not reached");
                Ok(false)
            }
            Err(err) => {
                log::warn!("[participant] refund failed: {err}");
                Ok(false)
            }
        }
    }

    fn on_refund_done(&self, hash: Option<TxHash>) {
        self.room
            .send_message(PeerMessage::new(events::ETH_REFUND_COMPLETED));
        self.engine.set_state(
            StatePatch {
                refund_transaction_hash: hash,
                is_refunded: Some(true),
                is_swap_exist: Some(false),
                ..Default::default()
            },
            true,
        );
    }

    /// Manual script redemption with an externally supplied secret.
    /// Mismatches against recorded state are reported but do not block the
    /// attempt; the chain is the final arbiter.
    pub async fn try_withdraw(&self, secret: Secret) -> Result<(), FlowError> {
        let state = self.engine.state();
        let script_values = state
            .script_values
            .ok_or(FlowError::MissingScript("try-withdraw"))?;
        if let Some(known) = state.secret {
            if known != secret {
                log::warn!("[participant] supplied secret differs from the recorded one");
            }
        }
        let supplied_hash = secret.hash();
        if let Some(expected) = state.secret_hash {
            if expected != supplied_hash {
                log::warn!(
                    "[participant] hashlock mismatch: recorded {expected}, supplied {supplied_hash}"
                );
                self.engine.dispatch(FlowEvent::SecretHashMismatch {
                    expected: expected.to_hex(),
                    supplied: supplied_hash.to_hex(),
                });
            }
        }

        let address = self.lock_chain.create_script(&script_values)?;
        let balance = self.lock_chain.get_balance(&script_values).await?;
        log::debug!("[participant] script {address} holds {balance}");
        if balance == 0 {
            self.engine.finish_step(
                StatePatch {
                    is_btc_withdrawn: Some(true),
                    ..Default::default()
                },
                "withdraw-btc",
                true,
            );
            return Err(FlowError::AlreadyWithdrawn(address));
        }

        let args = LockWithdrawArgs {
            script_values,
            secret,
            destination_address: self.session.destination_buy_address.clone(),
        };
        let engine = self.engine.clone();
        let on_hash = move |hash: &str| {
            engine.set_state(
                StatePatch {
                    btc_swap_withdraw_transaction_hash: Some(hash.to_string()),
                    ..Default::default()
                },
                true,
            );
        };
        self.lock_chain.withdraw(&args, &on_hash).await?;

        self.engine.finish_step(
            StatePatch {
                secret: Some(secret),
                is_btc_withdrawn: Some(true),
                ..Default::default()
            },
            "withdraw-btc",
            false,
        );
        Ok(())
    }

    pub fn stop_swap_process(&self) {
        self.engine.stop_swap();
    }
}

#[async_trait::async_trait]
impl FlowProtocol for ParticipantFlow {
    fn flow_name(&self) -> &'static str {
        "participant"
    }

    fn steps(&self) -> &'static [&'static str] {
        PARTICIPANT_STEPS
    }

    async fn run_step(&self, name: &'static str) -> Result<(), FlowError> {
        match name {
            "sign" => self.sign().await.map(|_| ()),
            "wait-lock-btc" => self.step_wait_lock_btc().await,
            "verify-script" => {
                // waits for the embedding application to accept the script
                log::debug!("[participant] waiting for script verification");
                Ok(())
            }
            "sync-balance" => self.sync_balance().await,
            "lock-eth" => self.step_lock_eth().await,
            "wait-withdraw-eth" => self.step_wait_withdraw_eth().await,
            "withdraw-btc" => self.step_withdraw_btc().await,
            "finish" => self.step_finish().await,
            "end" => Ok(()),
            other => {
                log::error!("[participant] unknown step '{other}'");
                Ok(())
            }
        }
    }
}
