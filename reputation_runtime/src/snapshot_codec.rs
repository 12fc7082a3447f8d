//! Snapshot Codec: reputation table encoder/decoder.
//!
//! Pure codec layer. No side-effects, no timestamps, no envelope.
//!
//! - `encode_table`:  UserReputationTable → canonical JSON string
//! - `decode_table`:  JSON string → UserReputationTable (strict, no defaults)
//! - `export_table_to_file` / `import_table_from_file`: file I/O
//! - `table_hash`:    SHA-256 of canonical JSON (lowercase hex)

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

use reputation_kernel::arithmetic::int_add;
use reputation_kernel::domain::UserReputationTable;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("SerializationError: {0}")]
    Serialization(#[source] serde_json::Error),
    /// Malformed JSON, missing fields or unknown fields.
    #[error("DeserializationError: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("IoError: {0}")]
    Io(#[from] io::Error),
}

/// Canonical JSON of a table. Byte-identical for identical tables.
pub fn encode_table(table: &UserReputationTable) -> Result<String, SnapshotError> {
    serde_json::to_string(table).map_err(SnapshotError::Serialization)
}

/// Rows whose `customer_score + free_score` is negative are rejected.
pub fn decode_table(json: &str) -> Result<UserReputationTable, SnapshotError> {
    let table: UserReputationTable =
        serde_json::from_str(json).map_err(SnapshotError::Deserialization)?;
    for row in &table.reputations {
        if int_add(&row.customer_score, &row.free_score).is_negative() {
            return Err(SnapshotError::Deserialization(serde::de::Error::custom(
                format!("negative reputation for user {:?}", row.username),
            )));
        }
    }
    Ok(table)
}

/// Write the table to `path`, creating parent directories, and fsync.
pub fn export_table_to_file(table: &UserReputationTable, path: &Path) -> Result<(), SnapshotError> {
    let json = encode_table(table)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

pub fn import_table_from_file(path: &Path) -> Result<UserReputationTable, SnapshotError> {
    let content = fs::read_to_string(path)?;
    decode_table(&content)
}

/// SHA-256 of the canonical JSON encoding. Lowercase hex string.
///
/// Integrity check for exported files; unrelated to the store hash.
pub fn table_hash(table: &UserReputationTable) -> Result<String, SnapshotError> {
    let json = encode_table(table)?;
    let digest = Sha256::digest(json.as_bytes());
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
