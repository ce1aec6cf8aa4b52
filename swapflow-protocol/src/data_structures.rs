// Core data types shared by both protocol flows.

use ripemd::{Digest, Ripemd160};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

/// Amount in base units: satoshi-like on the lock chain, wei-like on the
/// contract chain. Conversions to display units are the caller's concern.
pub type Amount = u128;

/// Transaction identifier on either chain.
pub type TxHash = String;

/// Chain address, hex or base58 depending on the chain.
pub type Address = String;

// A party's identity on the script-based lock chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockChainIdentity {
    pub address: Address,
    pub public_key: String,
}

// A party's identity on the contract chain. Only the account address is
// needed there; the escrow contract keys entries by address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractChainIdentity {
    pub address: Address,
}

/// Immutable description of one two-party exchange. Each side holds its own
/// copy populated from order negotiation; `me` and `participant` are from the
/// local party's point of view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSession {
    pub id: String,
    pub my_lock_chain: LockChainIdentity,
    pub my_contract_chain: ContractChainIdentity,
    pub participant_lock_chain: LockChainIdentity,
    pub participant_contract_chain: ContractChainIdentity,
    /// What the local party gives away.
    pub sell_amount: Amount,
    /// What the local party receives.
    pub buy_amount: Amount,
    /// Optional override for where bought funds should land.
    pub destination_buy_address: Option<Address>,
    /// Optional override for the escrow's target wallet on the sell side.
    pub destination_sell_address: Option<Address>,
}

impl SwapSession {
    /// Derive a deterministic session id from the two contract-chain
    /// addresses, for callers that did not negotiate an explicit one.
    pub fn derive_id(owner_address: &str, participant_address: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(owner_address.as_bytes());
        hasher.update(participant_address.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Structural validity check performed at flow construction.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.my_lock_chain.public_key.is_empty()
            && !self.my_contract_chain.address.is_empty()
            && !self.participant_lock_chain.public_key.is_empty()
            && !self.participant_contract_chain.address.is_empty()
            && self.sell_amount > 0
            && self.buy_amount > 0
    }
}

/// The HTLC script descriptor. Computed once by the owner, sent to the
/// participant, and used by both sides to independently derive the script
/// address. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptValues {
    pub secret_hash: SecretHash,
    pub owner_public_key: String,
    pub recipient_public_key: String,
    /// Unix timestamp (seconds) after which the owner may refund.
    pub lock_time: u64,
}

/// An unspent output on the lock chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub txid: TxHash,
    pub satoshis: Amount,
}

/// The swap secret. Generated once by the owner; revealing it on either
/// chain is what authorizes redemption on both.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(pub [u8; 32]);

impl Secret {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Secret(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn hash(&self) -> SecretHash {
        let mut hasher = Ripemd160::new();
        hasher.update(self.0);
        SecretHash(hasher.finalize().into())
    }
}

// Keep the secret out of Debug output; state structs derive Debug freely.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(..)")
    }
}

/// RIPEMD160 of the secret. Safe to share; it is the hashlock both chains
/// enforce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretHash(pub [u8; 20]);

impl SecretHash {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(SecretHash(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHash({})", self.to_hex())
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Current unix time in seconds.
pub fn utc_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    pub fn create_test_session(id: &str) -> SwapSession {
        SwapSession {
            id: id.to_string(),
            my_lock_chain: LockChainIdentity {
                address: "btc_addr_me".to_string(),
                public_key: "02aaaa".to_string(),
            },
            my_contract_chain: ContractChainIdentity {
                address: "0xme".to_string(),
            },
            participant_lock_chain: LockChainIdentity {
                address: "btc_addr_peer".to_string(),
                public_key: "02bbbb".to_string(),
            },
            participant_contract_chain: ContractChainIdentity {
                address: "0xpeer".to_string(),
            },
            sell_amount: 100_000,
            buy_amount: 2_000_000,
            destination_buy_address: None,
            destination_sell_address: None,
        }
    }

    #[test]
    fn secret_hash_relation() {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = Secret(bytes);
        let hash = secret.hash();

        // RIPEMD160 output is 20 bytes and deterministic
        assert_eq!(hash.to_hex().len(), 40);
        assert_eq!(hash, secret.hash());

        // A different secret gives a different hash
        bytes[0] ^= 0xFF;
        assert_ne!(Secret(bytes).hash(), hash);
    }

    #[test]
    fn secret_hex_round_trip() {
        let secret = Secret([7u8; 32]);
        let hex_str = secret.to_hex();
        assert_eq!(Secret::from_hex(&hex_str), Some(secret));
        // 0x prefix tolerated
        assert_eq!(Secret::from_hex(&format!("0x{}", hex_str)), Some(secret));
        assert!(Secret::from_hex("abcd").is_none());
    }

    #[test]
    fn session_validity() {
        let session = create_test_session("swap-1");
        assert!(session.is_valid());

        let mut bad = session.clone();
        bad.sell_amount = 0;
        assert!(!bad.is_valid());

        let mut bad = session;
        bad.participant_lock_chain.public_key.clear();
        assert!(!bad.is_valid());
    }

    #[test]
    fn derive_id_is_deterministic() {
        let a = SwapSession::derive_id("0xme", "0xpeer");
        let b = SwapSession::derive_id("0xme", "0xpeer");
        let c = SwapSession::derive_id("0xpeer", "0xme");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn script_values_serde_round_trip() {
        let values = ScriptValues {
            secret_hash: Secret([1u8; 32]).hash(),
            owner_public_key: "02aaaa".to_string(),
            recipient_public_key: "02bbbb".to_string(),
            lock_time: utc_now() + 3 * 3600,
        };
        let json = serde_json::to_value(&values).unwrap();
        let back: ScriptValues = serde_json::from_value(json).unwrap();
        assert_eq!(back, values);
    }
}
