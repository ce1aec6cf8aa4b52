// The two sides of the swap protocol. Each flow owns an engine, the two
// chain adapters and the peer channel; the owner additionally owns the
// secret.

pub mod owner;
pub mod participant;

pub use owner::{OwnerFlow, OWNER_STEPS};
pub use participant::{ParticipantFlow, PARTICIPANT_STEPS};
