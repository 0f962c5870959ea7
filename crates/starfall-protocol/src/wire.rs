use rmp_serde::{decode, encode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::PublicRoomState;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Compact MessagePack encoding (named fields, so enums and optional fields survive round trips).
pub fn to_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec_named(value)?)
}

pub fn from_msgpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, WireError> {
    Ok(serde_json::to_string(value)?)
}

pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, WireError> {
    Ok(serde_json::from_str(text)?)
}

/// Deterministic hash of a room view, for replay and determinism checks.
///
/// Hashes the MessagePack-encoded view using FNV-1a 64-bit.
pub fn state_hash(state: &PublicRoomState) -> Result<u64, WireError> {
    let bytes = to_msgpack(state)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Orders, PowerupOrder, SystemId};

    #[test]
    fn fnv_reference_values() {
        assert_eq!(hash_bytes_fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(hash_bytes_fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn orders_survive_msgpack() {
        let mut orders = Orders::default();
        orders.placements.insert(SystemId(4), 2);
        orders.powerups.push(PowerupOrder::Wormhole {
            from: SystemId(1),
            to: SystemId(9),
        });

        let bytes = to_msgpack(&orders).unwrap();
        let decoded: Orders = from_msgpack(&bytes).unwrap();
        assert_eq!(decoded, orders);
    }
}
