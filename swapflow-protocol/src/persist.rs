// Snapshot persistence. The engine saves the full state synchronously at
// every step transition so a restarted process resumes at the recorded
// step instead of replaying completed chain actions.

use crate::engine::state::FlowState;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage seam for flow snapshots, keyed by swap id. Implementations must
/// be usable from multiple threads; saves happen from whichever task
/// finishes a step.
pub trait SwapStorage: Send + Sync {
    fn save(&self, swap_id: &str, state: &FlowState);
    fn load(&self, swap_id: &str) -> Option<FlowState>;
    fn remove(&self, swap_id: &str);
}

/// Snapshot store backed by a process-local map. Snapshots go through JSON
/// so this exercises the same serialization path a durable backend would.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    snapshots: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Default::default()
    }
}

impl SwapStorage for InMemoryStorage {
    fn save(&self, swap_id: &str, state: &FlowState) {
        match serde_json::to_value(state) {
            Ok(value) => {
                self.snapshots
                    .lock()
                    .unwrap()
                    .insert(swap_id.to_string(), value);
            }
            Err(err) => log::error!("failed to serialize snapshot for {swap_id}: {err}"),
        }
    }

    fn load(&self, swap_id: &str) -> Option<FlowState> {
        let snapshots = self.snapshots.lock().unwrap();
        let value = snapshots.get(swap_id)?;
        match serde_json::from_value(value.clone()) {
            Ok(state) => Some(state),
            Err(err) => {
                log::error!("corrupt snapshot for {swap_id}: {err}");
                None
            }
        }
    }

    fn remove(&self, swap_id: &str) {
        self.snapshots.lock().unwrap().remove(swap_id);
    }
}
