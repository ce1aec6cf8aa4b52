// Peer messaging seam. The two flows never call each other directly; all
// coordination happens through messages on this channel plus independent
// chain observation.
//
// Delivery contract: at-least-once, possibly duplicated, no ordering
// guarantee across event names. Every consuming handler must be idempotent.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Event names exchanged between the two parties.
pub mod events {
    pub const SWAP_SIGN: &str = "swap sign";
    pub const REQUEST_SIGN: &str = "request sign";
    pub const SWAP_EXISTS: &str = "swap exists";
    pub const CREATE_BTC_SCRIPT: &str = "create btc script";
    pub const REQUEST_BTC_SCRIPT: &str = "request btc script";
    pub const CREATE_ETH_CONTRACT: &str = "create eth contract";
    pub const REQUEST_ETH_CONTRACT: &str = "request eth contract";
    pub const ETH_WITHDRAW_TX_HASH: &str = "ethWithdrawTxHash";
    pub const REQUEST_ETH_WITHDRAW_TX_HASH: &str = "request ethWithdrawTxHash";
    pub const SWAP_FINISHED: &str = "swap finished";
    pub const REQUEST_SWAP_FINISHED: &str = "request swap finished";
    pub const BTC_REFUND_COMPLETED: &str = "btc refund completed";
    pub const ETH_REFUND_COMPLETED: &str = "eth refund completed";
    pub const REQUEST_WITHDRAW: &str = "request withdraw";
    pub const ACCEPT_WITHDRAW_REQUEST: &str = "accept withdraw request";
    pub const DO_WITHDRAW: &str = "do withdraw";
    pub const WITHDRAW_READY: &str = "withdraw ready";
}

/// A message sent to the counterparty.
#[derive(Clone, Debug)]
pub struct PeerMessage {
    pub event: String,
    pub data: Value,
}

impl PeerMessage {
    pub fn new(event: &str) -> Self {
        PeerMessage {
            event: event.to_string(),
            data: Value::Null,
        }
    }

    pub fn with_data(event: &str, data: Value) -> Self {
        PeerMessage {
            event: event.to_string(),
            data,
        }
    }
}

pub type MessageHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Pub/sub channel between the two swap parties.
pub trait PeerChannel: Send + Sync {
    fn send_message(&self, message: PeerMessage);
    /// Persistent subscription: fires on every delivery of `event`.
    fn on(&self, event: &str, handler: MessageHandler);
    /// Single-fire subscription: fires at most once, then is dropped.
    fn once(&self, event: &str, handler: MessageHandler);
}

#[derive(Default)]
struct HandlerRegistry {
    persistent: HashMap<String, Vec<Arc<MessageHandler>>>,
    single: HashMap<String, Vec<MessageHandler>>,
}

/// In-process channel endpoint, two of which form a linked pair. Delivery
/// is synchronous on the sender's stack. Used by tests and simulations;
/// real deployments plug in a transport-backed `PeerChannel`.
pub struct MemoryRoom {
    local: Arc<Mutex<HandlerRegistry>>,
    remote: Arc<Mutex<HandlerRegistry>>,
    duplicate_delivery: AtomicBool,
}

impl MemoryRoom {
    /// Create two linked endpoints; what one sends, the other receives.
    pub fn pair() -> (Arc<MemoryRoom>, Arc<MemoryRoom>) {
        let a = Arc::new(Mutex::new(HandlerRegistry::default()));
        let b = Arc::new(Mutex::new(HandlerRegistry::default()));
        (
            Arc::new(MemoryRoom {
                local: a.clone(),
                remote: b.clone(),
                duplicate_delivery: AtomicBool::new(false),
            }),
            Arc::new(MemoryRoom {
                local: b,
                remote: a,
                duplicate_delivery: AtomicBool::new(false),
            }),
        )
    }

    /// When enabled, every persistent handler on the receiving side is
    /// invoked twice per send, exercising the at-least-once contract.
    /// `once` subscriptions still fire at most once.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    fn deliver(registry: &Mutex<HandlerRegistry>, event: &str, data: &Value, duplicates: bool) {
        // Snapshot handlers before invoking so a handler may register new
        // subscriptions (or send messages) without deadlocking.
        let (persistent, single) = {
            let mut reg = registry.lock().unwrap();
            (
                reg.persistent.get(event).cloned().unwrap_or_default(),
                reg.single.remove(event).unwrap_or_default(),
            )
        };

        for handler in &persistent {
            (handler.as_ref())(data.clone());
            if duplicates {
                (handler.as_ref())(data.clone());
            }
        }
        for handler in single {
            handler(data.clone());
        }
    }
}

impl PeerChannel for MemoryRoom {
    fn send_message(&self, message: PeerMessage) {
        log::trace!("room: sending '{}'", message.event);
        Self::deliver(
            &self.remote,
            &message.event,
            &message.data,
            self.duplicate_delivery.load(Ordering::SeqCst),
        );
    }

    fn on(&self, event: &str, handler: MessageHandler) {
        self.local
            .lock()
            .unwrap()
            .persistent
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    fn once(&self, event: &str, handler: MessageHandler) {
        self.local
            .lock()
            .unwrap()
            .single
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }
}
