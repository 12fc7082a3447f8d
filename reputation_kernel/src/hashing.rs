//! Kernel v2: Canonical State Hashing
//!
//! Deterministic serialization of a whole store + SHA-256.
//! Produces byte-identical output across platforms.
//!
//! Rules:
//!   - Entries in ascending key order
//!   - Each entry framed as len(key) u32 LE, key, len(value) u32 LE, value
//!   - Prefixed with KERNEL_VERSION and ENCODING_VERSION (u32 LE each)

use sha2::{Digest, Sha256};

use crate::kv::KvStore;
use crate::{ENCODING_VERSION, KERNEL_VERSION};

/// Canonical byte stream of every entry in the store.
pub fn canonical_serialize<S: KvStore>(store: &S) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&KERNEL_VERSION.to_le_bytes());
    out.extend_from_slice(&ENCODING_VERSION.to_le_bytes());
    for (key, value) in store.range(&[], None) {
        out.extend_from_slice(&frame_len(&key).to_le_bytes());
        out.extend_from_slice(&key);
        out.extend_from_slice(&frame_len(&value).to_le_bytes());
        out.extend_from_slice(&value);
    }
    out
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn canonical_hash<S: KvStore>(store: &S) -> String {
    let digest = Sha256::digest(canonical_serialize(store));
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

fn frame_len(bytes: &[u8]) -> u32 {
    u32::try_from(bytes.len())
        .unwrap_or_else(|_| panic!("Store entry of {} bytes cannot be framed", bytes.len()))
}
