//! Append-only action journal: binary protobuf log.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only: entries are never rewritten or reordered
//!   - fsync after every write
//!   - Sequence starts at 1 and increases by exactly 1 per entry

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use reputation_kernel::actions::EngineAction;

use crate::proto_bridge::{action_to_proto, proto_to_action};
use crate::proto_types::ProtoActionEnvelope;

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub struct ActionLog {
    path: PathBuf,
    last_sequence: u64,
}

impl ActionLog {
    /// Open or create a journal at `path`. Existing frames are read once to
    /// recover the last sequence number.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            let envelopes = read_all_from_file(path)?;
            envelopes.last().map(|e| e.sequence).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Append `action` under the next sequence number and return it.
    pub fn append(&mut self, action: &EngineAction) -> io::Result<u64> {
        let envelope = action_to_proto(self.last_sequence + 1, action);
        self.append_envelope(&envelope)?;
        debug!(sequence = envelope.sequence, kind = action.kind(), "action journaled");
        Ok(envelope.sequence)
    }

    /// Append a pre-built envelope. Its sequence must be exactly one past
    /// the last stored entry.
    pub fn append_envelope(&mut self, envelope: &ProtoActionEnvelope) -> io::Result<()> {
        let expected = self.last_sequence + 1;
        if envelope.sequence != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Sequence violation in action log: expected {}, got {}",
                    expected, envelope.sequence
                ),
            ));
        }

        let buf = envelope.encode_to_vec();
        if buf.is_empty() || buf.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Frame of {} bytes cannot be journaled", buf.len()),
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&(buf.len() as u32).to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = envelope.sequence;
        Ok(())
    }

    /// All envelopes in file order.
    pub fn load_envelopes(&self) -> io::Result<Vec<ProtoActionEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_all_from_file(&self.path)
    }

    /// All actions in sequence order.
    pub fn load_actions(&self) -> io::Result<Vec<EngineAction>> {
        self.load_envelopes()?
            .iter()
            .map(|e| proto_to_action(e).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)))
            .collect()
    }
}

/// Read and validate every frame of a journal file.
fn read_all_from_file(path: &Path) -> io::Result<Vec<ProtoActionEnvelope>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut envelopes: Vec<ProtoActionEnvelope> = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid frame length: {}", len),
            ));
        }

        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Truncated frame after sequence {}: {}", envelopes.len(), e),
            )
        })?;

        let envelope = ProtoActionEnvelope::decode(frame.as_slice()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Protobuf decode error: {}", e),
            )
        })?;

        let expected = envelopes.len() as u64 + 1;
        if envelope.sequence != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Out-of-order frame: expected sequence {}, found {}",
                    expected, envelope.sequence
                ),
            ));
        }
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reputation_kernel::Int;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("reputation_journal_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("actions.log")
    }

    fn donate(amount: i64) -> EngineAction {
        EngineAction::Donate {
            user: "u".to_string(),
            post: "p".to_string(),
            amount: Int::from(amount),
        }
    }

    #[test]
    fn append_then_reopen_restores_sequence() {
        let path = temp_path("reopen");
        let mut log = ActionLog::open(&path).unwrap();
        assert_eq!(log.append(&donate(1)).unwrap(), 1);
        assert_eq!(log.append(&EngineAction::Update { now: 9 }).unwrap(), 2);

        let reopened = ActionLog::open(&path).unwrap();
        assert_eq!(reopened.last_sequence(), 2);
        assert_eq!(
            reopened.load_actions().unwrap(),
            vec![donate(1), EngineAction::Update { now: 9 }]
        );
    }

    #[test]
    fn sequence_gap_is_rejected() {
        let path = temp_path("gap");
        let mut log = ActionLog::open(&path).unwrap();
        let err = log.append_envelope(&action_to_proto(2, &donate(1))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(log.last_sequence(), 0);
    }

    #[test]
    fn truncated_file_is_invalid_data() {
        let path = temp_path("truncated");
        let mut log = ActionLog::open(&path).unwrap();
        log.append(&donate(1)).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 1);
        std::fs::write(&path, &bytes).unwrap();

        let err = ActionLog::open(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_length_prefix_is_invalid_data() {
        let path = temp_path("oversized");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, ((MAX_FRAME_LEN + 1) as u32).to_le_bytes()).unwrap();
        let err = ActionLog::open(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn missing_file_loads_empty() {
        let log = ActionLog::open(&temp_path("missing")).unwrap();
        assert!(log.load_actions().unwrap().is_empty());
    }
}
