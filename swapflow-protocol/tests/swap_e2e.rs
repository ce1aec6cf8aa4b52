// Two-party end-to-end runs: both flows against shared mock chains and a
// linked in-process message room.

use std::sync::Arc;
use std::time::Duration;
use swapflow_protocol::config::SwapConfig;
use swapflow_protocol::flows::{OwnerFlow, ParticipantFlow};
use swapflow_protocol::onchain::ContractChainAdapter;
use swapflow_protocol::peer::MemoryRoom;
use swapflow_protocol::test_utils::{test_session_pair, MockContractChain, MockLockChain};
use tokio::time::timeout;

fn fast_config() -> SwapConfig {
    SwapConfig {
        poll_interval_ms: 10,
        ..Default::default()
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

struct Harness {
    lock_chain: Arc<MockLockChain>,
    contract_chain: Arc<MockContractChain>,
    owner: Arc<OwnerFlow>,
    participant: Arc<ParticipantFlow>,
}

fn build_harness(duplicate_delivery: bool) -> Harness {
    let lock_chain = Arc::new(MockLockChain::new());
    // the participant is the one who creates the escrow entry
    let contract_chain = Arc::new(MockContractChain::new("0xparticipant"));
    let (owner_room, participant_room) = MemoryRoom::pair();
    owner_room.set_duplicate_delivery(duplicate_delivery);
    participant_room.set_duplicate_delivery(duplicate_delivery);

    lock_chain.set_unspents("btc_addr_owner", 10_000_000);
    contract_chain.set_account_balance("0xparticipant", 10_000_000);

    let (owner_session, participant_session) = test_session_pair();
    let (owner, _owner_events) = OwnerFlow::new(
        owner_session,
        lock_chain.clone(),
        contract_chain.clone(),
        owner_room,
        None,
        fast_config(),
    )
    .unwrap();
    let (participant, _participant_events) = ParticipantFlow::new(
        participant_session,
        lock_chain.clone(),
        contract_chain.clone(),
        participant_room,
        None,
        fast_config(),
    )
    .unwrap();

    Harness {
        lock_chain,
        contract_chain,
        owner,
        participant,
    }
}

async fn run_happy_path(harness: &Harness) {
    let owner_task = tokio::spawn({
        let owner = harness.owner.clone();
        async move { owner.run().await }
    });
    let participant_task = tokio::spawn({
        let participant = harness.participant.clone();
        async move { participant.run().await }
    });

    // handshake completes on its own, then the owner commits the secret
    let owner = harness.owner.clone();
    wait_for(move || owner.state().is_participant_signed).await;
    let secret_hash = harness.owner.submit_secret().await.unwrap();

    // the participant accepts the announced script once it arrives
    let participant = harness.participant.clone();
    wait_for(move || participant.state().script_values.is_some()).await;
    harness.participant.verify_btc_script().unwrap();

    timeout(Duration::from_secs(10), owner_task)
        .await
        .expect("owner flow must complete")
        .unwrap();
    timeout(Duration::from_secs(10), participant_task)
        .await
        .expect("participant flow must complete")
        .unwrap();

    let owner_state = harness.owner.state();
    let participant_state = harness.participant.state();

    assert!(owner_state.is_finished);
    assert!(owner_state.is_btc_script_funded);
    assert!(owner_state.is_eth_contract_funded);
    assert!(owner_state.is_eth_withdrawn);
    assert_eq!(
        owner_state.eth_swap_withdraw_transaction_hash.as_deref(),
        Some("eth_withdraw_tx")
    );

    assert!(participant_state.is_finished);
    assert!(participant_state.is_eth_withdrawn);
    assert!(participant_state.is_btc_withdrawn);
    assert_eq!(
        participant_state
            .btc_swap_withdraw_transaction_hash
            .as_deref(),
        Some("btc_withdraw_tx")
    );

    // the participant learned the owner's secret through the chain
    assert_eq!(participant_state.secret_hash, Some(secret_hash));
    assert_eq!(participant_state.secret, owner_state.secret);
    assert!(participant_state.secret.is_some());

    // both escrows are drained
    assert_eq!(
        harness
            .contract_chain
            .get_balance("0xparticipant")
            .await
            .unwrap(),
        0
    );
    assert_eq!(*harness.lock_chain.script_balance.lock().unwrap(), 0);
}

#[tokio::test]
async fn full_swap_happy_path() {
    let harness = build_harness(false);
    run_happy_path(&harness).await;
}

#[tokio::test]
async fn full_swap_with_duplicated_messages() {
    // every peer message is delivered twice; all handlers must be
    // idempotent for the swap to come out identical
    let harness = build_harness(true);
    run_happy_path(&harness).await;

    // the script was funded exactly once despite the duplicates
    assert_eq!(
        harness
            .lock_chain
            .fund_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn stops_both_sides_when_swap_already_exists() {
    let harness = build_harness(false);
    harness
        .contract_chain
        .swap_exists
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let owner_task = tokio::spawn({
        let owner = harness.owner.clone();
        async move { owner.run().await }
    });
    let participant_task = tokio::spawn({
        let participant = harness.participant.clone();
        async move { participant.run().await }
    });

    // both drivers exit once the stop latch is set
    timeout(Duration::from_secs(5), participant_task)
        .await
        .expect("participant must stop")
        .unwrap();
    timeout(Duration::from_secs(5), owner_task)
        .await
        .expect("owner must stop")
        .unwrap();

    let owner_state = harness.owner.state();
    let participant_state = harness.participant.state();
    assert!(participant_state.is_swap_exist);
    assert!(participant_state.is_stopped_swap);
    assert!(owner_state.is_swap_exist);
    assert!(owner_state.is_stopped_swap);

    // neither side committed any funds
    assert_eq!(
        harness
            .lock_chain
            .fund_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert_eq!(
        harness
            .contract_chain
            .create_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}
