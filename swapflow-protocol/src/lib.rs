// Cross-chain atomic swap orchestration: two step-sequenced peer flows
// (lock-chain owner and contract-chain participant) coordinated via an
// async peer channel and independent chain observation.

pub mod config;
pub mod data_structures;
pub mod engine;
pub mod flows;
pub mod onchain;
pub mod peer;
pub mod persist;
pub mod poller;
pub mod test_utils;
