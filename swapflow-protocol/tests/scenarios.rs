// Targeted scenarios: resumption from a persisted snapshot, chain-error
// classification at the withdrawal steps, refund paths, and the
// fee-sponsorship round trip.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use swapflow_protocol::config::SwapConfig;
use swapflow_protocol::data_structures::{utc_now, ScriptValues, Secret, SwapSession};
use swapflow_protocol::engine::state::{FlowState, StatePatch};
use swapflow_protocol::engine::{FlowError, FlowEvent};
use swapflow_protocol::flows::{OwnerFlow, ParticipantFlow, OWNER_STEPS, PARTICIPANT_STEPS};
use swapflow_protocol::onchain::ChainError;
use swapflow_protocol::peer::{events, MemoryRoom, PeerChannel, PeerMessage};
use swapflow_protocol::persist::{InMemoryStorage, SwapStorage};
use swapflow_protocol::test_utils::{test_session_pair, MockContractChain, MockLockChain};
use tokio::time::timeout;

fn fast_config() -> SwapConfig {
    SwapConfig {
        poll_interval_ms: 10,
        ..Default::default()
    }
}

fn step_index(steps: &[&str], name: &str) -> usize {
    steps.iter().position(|s| *s == name).unwrap()
}

fn test_script_values(secret: &Secret) -> ScriptValues {
    ScriptValues {
        secret_hash: secret.hash(),
        owner_public_key: "02aaaa".to_string(),
        recipient_public_key: "02bbbb".to_string(),
        lock_time: utc_now() + 3 * 3600,
    }
}

/// Snapshot of an owner mid-swap: script funded, contract funded, waiting
/// to withdraw.
fn owner_at_withdraw(secret: Secret) -> FlowState {
    let mut state = FlowState::default();
    state.step = step_index(OWNER_STEPS, "withdraw-eth");
    state.secret = Some(secret);
    state.secret_hash = Some(secret.hash());
    state.script_values = Some(test_script_values(&secret));
    state.is_me_signed = true;
    state.is_participant_signed = true;
    state.is_btc_script_funded = true;
    state.is_eth_contract_funded = true;
    state
}

fn seeded_storage(swap_id: &str, state: &FlowState) -> Arc<dyn SwapStorage> {
    let storage = InMemoryStorage::new();
    storage.save(swap_id, state);
    Arc::new(storage)
}

fn build_owner(
    session: SwapSession,
    lock_chain: Arc<MockLockChain>,
    contract_chain: Arc<MockContractChain>,
    room: Arc<MemoryRoom>,
    storage: Option<Arc<dyn SwapStorage>>,
) -> (
    Arc<OwnerFlow>,
    tokio::sync::mpsc::UnboundedReceiver<FlowEvent>,
) {
    OwnerFlow::new(
        session,
        lock_chain,
        contract_chain,
        room,
        storage,
        fast_config(),
    )
    .unwrap()
}

#[tokio::test]
async fn known_transaction_rejection_counts_as_success() {
    let (owner_session, _) = test_session_pair();
    let secret = Secret([7u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.seed_entry("0xparticipant", "0xowner", secret.hash(), 2_000_000);
    // withdrawal was broadcast by an earlier run: the node knows it already
    contract_chain.push_withdraw_result(Err(ChainError::AlreadyKnown(
        "known transaction: 0xf00".to_string(),
    )));

    let storage = seeded_storage(&owner_session.id, &owner_at_withdraw(secret));
    let (_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(
        owner_session,
        lock_chain,
        contract_chain.clone(),
        owner_room,
        Some(storage),
    );

    timeout(Duration::from_secs(5), owner.run())
        .await
        .expect("flow must run to completion");

    let state = owner.state();
    assert!(state.is_eth_withdrawn);
    assert!(state.is_finished);
    // no blind retry after the already-known rejection
    assert_eq!(contract_chain.withdraw_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn execution_failure_is_retried_until_it_clears() {
    let (owner_session, _) = test_session_pair();
    let secret = Secret([8u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.seed_entry("0xparticipant", "0xowner", secret.hash(), 2_000_000);
    contract_chain.push_withdraw_result(Err(ChainError::ExecutionFailed(
        "always failing transaction".to_string(),
    )));
    // second attempt goes through (default behavior)

    let storage = seeded_storage(&owner_session.id, &owner_at_withdraw(secret));
    let (_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(
        owner_session,
        lock_chain,
        contract_chain.clone(),
        owner_room,
        Some(storage),
    );

    timeout(Duration::from_secs(5), owner.run())
        .await
        .expect("flow must run to completion");

    assert!(owner.state().is_eth_withdrawn);
    assert_eq!(contract_chain.withdraw_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn participant_aborts_when_refund_window_already_open() {
    let (_, participant_session) = test_session_pair();
    let secret = Secret([9u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    *lock_chain.script_balance.lock().unwrap() = 100_000;
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.set_account_balance("0xparticipant", 10_000_000);

    // script whose refund window is already open
    let mut script_values = test_script_values(&secret);
    script_values.lock_time = utc_now() - 100;

    let mut state = FlowState::default();
    state.step = step_index(PARTICIPANT_STEPS, "lock-eth");
    state.secret_hash = Some(secret.hash());
    state.script_values = Some(script_values);
    state.is_me_signed = true;
    state.btc_script_verified = true;

    let storage = seeded_storage(&participant_session.id, &state);
    let (_room, participant_room) = MemoryRoom::pair();
    let (participant, mut events) = ParticipantFlow::new(
        participant_session,
        lock_chain,
        contract_chain.clone(),
        participant_room,
        Some(storage),
        fast_config(),
    )
    .unwrap();

    timeout(Duration::from_secs(5), participant.run())
        .await
        .expect("flow must stop, not hang");

    let state = participant.state();
    assert!(state.is_stopped_swap);
    assert!(!state.is_eth_contract_funded);
    // no funds were committed to a refundable script
    assert_eq!(contract_chain.create_calls.load(Ordering::SeqCst), 0);

    let mut saw_stop = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, FlowEvent::SwapStopped) {
            saw_stop = true;
        }
    }
    assert!(saw_stop);
}

#[tokio::test]
async fn fee_sponsorship_round_trip() {
    let (owner_session, participant_session) = test_session_pair();
    let secret = Secret([11u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.seed_entry("0xparticipant", "0xowner", secret.hash(), 2_000_000);
    // the owner's account cannot cover its own gas
    contract_chain.push_withdraw_result(Err(ChainError::FeeInsufficient(
        "insufficient funds for gas * price + value".to_string(),
    )));

    let (owner_room, participant_room) = MemoryRoom::pair();
    let storage = seeded_storage(&owner_session.id, &owner_at_withdraw(secret));
    let (owner, _owner_events) = build_owner(
        owner_session,
        lock_chain.clone(),
        contract_chain.clone(),
        owner_room,
        Some(storage),
    );
    // the participant is not driven; only its message handlers and the
    // manual accept operation take part
    let (participant, _participant_events) = ParticipantFlow::new(
        participant_session,
        lock_chain,
        contract_chain.clone(),
        participant_room,
        None,
        fast_config(),
    )
    .unwrap();

    let owner_task = tokio::spawn({
        let owner = owner.clone();
        async move { owner.run().await }
    });

    // the failed attempt flags the shortage
    timeout(Duration::from_secs(5), async {
        while !owner.state().require_withdraw_fee {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("fee shortage must be flagged");

    owner.send_withdraw_request();

    timeout(Duration::from_secs(5), async {
        while !participant.state().withdraw_request_incoming {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request must reach the participant");

    participant.accept_withdraw_request();

    timeout(Duration::from_secs(5), owner_task)
        .await
        .expect("owner must finish via the sponsored withdrawal")
        .unwrap();

    let state = owner.state();
    assert!(state.is_eth_withdrawn);
    assert!(!state.require_withdraw_fee);
    assert_eq!(
        state.eth_swap_withdraw_transaction_hash.as_deref(),
        Some("eth_sponsored_tx")
    );
    assert_eq!(
        contract_chain.sponsored_withdraw_calls.load(Ordering::SeqCst),
        1
    );
    // the escrow entry is drained
    assert_eq!(
        swapflow_protocol::onchain::ContractChainAdapter::get_balance(
            contract_chain.as_ref(),
            "0xparticipant"
        )
        .await
        .unwrap(),
        0
    );
}

#[tokio::test]
async fn wrong_target_wallet_blocks_the_withdrawal() {
    let (owner_session, _) = test_session_pair();
    let secret = Secret([21u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.seed_entry("0xparticipant", "0xowner", secret.hash(), 2_000_000);
    // the contract pays out somewhere other than the agreed destination
    contract_chain.set_target_wallet("0xparticipant", "0xattacker");
    contract_chain
        .target_wallet_supported
        .store(true, Ordering::SeqCst);

    let storage = seeded_storage(&owner_session.id, &owner_at_withdraw(secret));
    let (_room, owner_room) = MemoryRoom::pair();
    let (owner, mut events) = build_owner(
        owner_session,
        lock_chain,
        contract_chain.clone(),
        owner_room,
        Some(storage),
    );

    let owner_task = tokio::spawn({
        let owner = owner.clone();
        async move { owner.run().await }
    });

    let (needed, got) = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(FlowEvent::TargetWalletMismatch { needed, got }) => break (needed, got),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("mismatch must be reported");
    assert_eq!(needed, "0xowner");
    assert_eq!(got, "0xattacker");

    // the secret never went on chain and the flow is stalled, not advanced
    assert_eq!(contract_chain.withdraw_calls.load(Ordering::SeqCst), 0);
    assert!(!owner.state().is_eth_withdrawn);
    assert_eq!(
        owner.engine().current_step(),
        step_index(OWNER_STEPS, "withdraw-eth")
    );
    assert!(!owner_task.is_finished());
    owner_task.abort();
}

#[tokio::test]
async fn owner_manual_withdraw_reports_hash_mismatch_but_proceeds() {
    let (owner_session, _) = test_session_pair();
    let recorded = Secret([22u8; 32]);
    let supplied = Secret([23u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    contract_chain.seed_entry("0xparticipant", "0xowner", recorded.hash(), 2_000_000);

    let (_room, owner_room) = MemoryRoom::pair();
    let (owner, mut events) = build_owner(
        owner_session,
        lock_chain,
        contract_chain.clone(),
        owner_room,
        None,
    );
    owner.engine().set_state(
        StatePatch {
            secret: Some(recorded),
            secret_hash: Some(recorded.hash()),
            ..Default::default()
        },
        false,
    );

    owner.try_withdraw(supplied).await.unwrap();

    // the mismatch is surfaced, the chain still gets the attempt
    let mut saw_mismatch = false;
    while let Ok(event) = events.try_recv() {
        if let FlowEvent::SecretHashMismatch { expected, .. } = event {
            assert_eq!(expected, recorded.hash().to_hex());
            saw_mismatch = true;
        }
    }
    assert!(saw_mismatch);
    assert_eq!(contract_chain.withdraw_calls.load(Ordering::SeqCst), 1);

    let state = owner.state();
    assert!(state.is_eth_withdrawn);
    assert_eq!(
        state.eth_swap_withdraw_transaction_hash.as_deref(),
        Some("eth_withdraw_tx")
    );
}

#[tokio::test]
async fn participant_manual_withdraw_reports_hash_mismatch_but_proceeds() {
    let (_, participant_session) = test_session_pair();
    let recorded = Secret([24u8; 32]);
    let supplied = Secret([25u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    *lock_chain.script_balance.lock().unwrap() = 100_000;
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));

    let (_room, participant_room) = MemoryRoom::pair();
    let (participant, mut events) = ParticipantFlow::new(
        participant_session,
        lock_chain.clone(),
        contract_chain,
        participant_room,
        None,
        fast_config(),
    )
    .unwrap();
    participant.engine().set_state(
        StatePatch {
            secret_hash: Some(recorded.hash()),
            script_values: Some(test_script_values(&recorded)),
            ..Default::default()
        },
        false,
    );

    participant.try_withdraw(supplied).await.unwrap();

    let mut saw_mismatch = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, FlowEvent::SecretHashMismatch { .. }) {
            saw_mismatch = true;
        }
    }
    assert!(saw_mismatch);
    assert_eq!(lock_chain.withdraw_calls.load(Ordering::SeqCst), 1);

    let state = participant.state();
    assert!(state.is_btc_withdrawn);
    assert_eq!(
        state.btc_swap_withdraw_transaction_hash.as_deref(),
        Some("btc_withdraw_tx")
    );
}

#[tokio::test]
async fn drained_script_counts_as_already_withdrawn() {
    let (_, participant_session) = test_session_pair();
    let secret = Secret([26u8; 32]);

    // script balance stays at zero: someone already redeemed it
    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));

    let (_room, participant_room) = MemoryRoom::pair();
    let (participant, _events) = ParticipantFlow::new(
        participant_session,
        lock_chain.clone(),
        contract_chain,
        participant_room,
        None,
        fast_config(),
    )
    .unwrap();
    participant.engine().set_state(
        StatePatch {
            secret_hash: Some(secret.hash()),
            script_values: Some(test_script_values(&secret)),
            ..Default::default()
        },
        false,
    );

    let result = participant.try_withdraw(secret).await;
    assert!(matches!(result, Err(FlowError::AlreadyWithdrawn(_))));

    // no redemption was attempted, but the step still counts as done
    assert_eq!(lock_chain.withdraw_calls.load(Ordering::SeqCst), 0);
    let state = participant.state();
    assert!(state.is_btc_withdrawn);
    assert_eq!(
        participant.engine().current_step(),
        step_index(PARTICIPANT_STEPS, "withdraw-btc") + 1
    );
}

#[tokio::test]
async fn refunds_work_on_both_sides() {
    let (owner_session, participant_session) = test_session_pair();
    let secret = Secret([13u8; 32]);

    // owner side: script funded, peer never locked
    let lock_chain = Arc::new(MockLockChain::new());
    *lock_chain.script_balance.lock().unwrap() = 100_000;
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));

    let (_peer_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(
        owner_session,
        lock_chain.clone(),
        contract_chain.clone(),
        owner_room,
        None,
    );
    owner.engine().set_state(
        StatePatch {
            secret: Some(secret),
            secret_hash: Some(secret.hash()),
            script_values: Some(test_script_values(&secret)),
            ..Default::default()
        },
        false,
    );

    assert!(owner.try_refund().await.unwrap());
    let state = owner.state();
    assert!(state.is_refunded);
    assert!(!state.is_swap_exist);
    assert_eq!(
        state.refund_transaction_hash.as_deref(),
        Some("btc_refund_tx")
    );
    // a second refund is a no-op
    assert!(!owner.try_refund().await.unwrap());
    assert_eq!(lock_chain.refund_calls.load(Ordering::SeqCst), 1);

    // participant side: contract funded, secret never revealed
    contract_chain.seed_entry("0xparticipant", "0xowner", secret.hash(), 2_000_000);
    let (_peer_room, participant_room) = MemoryRoom::pair();
    let (participant, _events) = ParticipantFlow::new(
        participant_session,
        lock_chain,
        contract_chain.clone(),
        participant_room,
        None,
        fast_config(),
    )
    .unwrap();
    participant.engine().set_state(
        StatePatch {
            secret_hash: Some(secret.hash()),
            is_eth_contract_funded: Some(true),
            ..Default::default()
        },
        false,
    );

    assert!(participant.try_refund().await.unwrap());
    let state = participant.state();
    assert!(state.is_refunded);
    assert_eq!(
        state.refund_transaction_hash.as_deref(),
        Some("eth_refund_tx")
    );
    assert!(!participant.try_refund().await.unwrap());
}

#[tokio::test]
async fn refund_notice_triggers_counterparty_refund() {
    // participant's refund notice makes a mid-swap owner reclaim its script
    let (owner_session, _) = test_session_pair();
    let secret = Secret([17u8; 32]);

    let lock_chain = Arc::new(MockLockChain::new());
    lock_chain.set_unspents("btc_addr_owner", 10_000_000);
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));

    let (peer_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(
        owner_session,
        lock_chain.clone(),
        contract_chain,
        owner_room,
        None,
    );

    // answer the owner's sign request so the refund listener gets armed
    let responder = peer_room.clone();
    peer_room.on(
        events::REQUEST_SIGN,
        Box::new(move |_| {
            responder.send_message(PeerMessage::new(events::SWAP_SIGN));
        }),
    );

    let owner_task = tokio::spawn({
        let owner = owner.clone();
        async move { owner.run().await }
    });

    timeout(Duration::from_secs(5), async {
        while !owner.state().is_participant_signed {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("handshake must complete");

    owner.submit_secret().await.unwrap();
    // the script gets funded while the flow is in its lock step
    timeout(Duration::from_secs(5), async {
        while owner.state().btc_script_creating_transaction_hash.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("script must be funded");

    peer_room.send_message(PeerMessage::new(events::ETH_REFUND_COMPLETED));
    timeout(Duration::from_secs(5), async {
        while !owner.state().is_refunded {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("owner must refund after the peer's notice");

    assert_eq!(lock_chain.refund_calls.load(Ordering::SeqCst), 1);
    owner_task.abort();
}

#[tokio::test]
async fn secret_submission_preconditions() {
    let (owner_session, _) = test_session_pair();
    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    let (_peer_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(owner_session, lock_chain, contract_chain, owner_room, None);

    // peer has not signed yet
    assert!(matches!(
        owner.submit_secret().await,
        Err(FlowError::PeerNotSigned)
    ));

    owner.engine().set_state(
        StatePatch {
            is_participant_signed: Some(true),
            ..Default::default()
        },
        false,
    );
    owner.submit_secret().await.unwrap();

    // and only once
    assert!(matches!(
        owner.submit_secret().await,
        Err(FlowError::SecretAlreadySubmitted)
    ));
}

#[tokio::test]
async fn refund_hex_is_built_once_and_cached() {
    let (owner_session, _) = test_session_pair();
    let secret = Secret([19u8; 32]);
    let lock_chain = Arc::new(MockLockChain::new());
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    let (_peer_room, owner_room) = MemoryRoom::pair();
    let (owner, _events) = build_owner(owner_session, lock_chain, contract_chain, owner_room, None);

    // nothing to build from yet
    assert!(owner.get_refund_tx_hex().await.is_err());

    owner.engine().set_state(
        StatePatch {
            secret: Some(secret),
            script_values: Some(test_script_values(&secret)),
            ..Default::default()
        },
        false,
    );

    let hex = owner.get_refund_tx_hex().await.unwrap();
    assert_eq!(hex, "0200000001deadbeef");
    assert_eq!(owner.state().refund_tx_hex.as_deref(), Some(hex.as_str()));
    // second call served from state
    assert_eq!(owner.get_refund_tx_hex().await.unwrap(), hex);
}
