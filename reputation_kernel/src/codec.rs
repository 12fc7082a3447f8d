//! Kernel v2: Record Codec
//!
//! Canonical encoding of the four persisted record kinds.
//! Compact UTF-8 JSON, fields in declaration order, integers as
//! decimal strings. Identical values always produce identical bytes.
//!
//! Any change here is a chain-halting format change and must bump
//! `ENCODING_VERSION`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{GameRecord, RoundPostRecord, RoundRecord, UserRecord};
use crate::error::CodecError;

/// A record kind that can be stored under a reputation key.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

impl Record for UserRecord {
    const KIND: &'static str = "user";
}

impl Record for RoundRecord {
    const KIND: &'static str = "round";
}

impl Record for RoundPostRecord {
    const KIND: &'static str = "round_post";
}

impl Record for GameRecord {
    const KIND: &'static str = "game";
}

/// Canonical bytes of a record.
pub fn encode<R: Record>(record: &R) -> Vec<u8> {
    serde_json::to_vec(record)
        .unwrap_or_else(|e| panic!("Encoding {} record failed: {}", R::KIND, e))
}

/// Strict decode. Unknown or missing fields are errors.
pub fn try_decode<R: Record>(bytes: &[u8]) -> Result<R, CodecError> {
    serde_json::from_slice(bytes).map_err(|source| CodecError::Malformed {
        kind: R::KIND,
        source,
    })
}

/// Decode a value read from the store. `None` means the key is absent.
///
/// Panics on undecodable bytes: a corrupt record must never be silently
/// replaced by a default.
pub fn decode<R: Record>(bytes: Option<&[u8]>) -> Option<R> {
    bytes.map(|b| match try_decode(b) {
        Ok(record) => record,
        Err(e) => panic!("Corrupt store value: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::Int;
    use crate::domain::{Donation, PostImpact};

    fn sample_user() -> UserRecord {
        UserRecord {
            consumption: Int::from(0),
            hold: Int::from(0),
            reputation: Int::from(123),
            last_settled_round: 3,
            last_donation_round: 3,
            unsettled: vec![
                Donation {
                    pid: "post1".to_string(),
                    amount: Int::from(3),
                    impact: Int::from(2),
                },
                Donation {
                    pid: "post2".to_string(),
                    amount: Int::from(4),
                    impact: Int::from(7),
                },
            ],
        }
    }

    #[test]
    fn user_record_bytes_are_canonical() {
        let bytes = encode(&sample_user());
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            concat!(
                r#"{"cs":"0","hold":"0","rep":"123","ls":3,"ldr":3,"ust":["#,
                r#"{"pid":"post1","amount":"3","impact":"2"},"#,
                r#"{"pid":"post2","amount":"4","impact":"7"}]}"#
            )
        );
    }

    #[test]
    fn round_record_bytes_are_canonical() {
        let round = RoundRecord {
            result: vec!["xzz".to_string()],
            sum_if: Int::from(234134),
            start_at: 342,
            top_n: vec![PostImpact {
                pid: "post1".to_string(),
                sum_if: Int::from(234235311),
            }],
        };
        assert_eq!(
            String::from_utf8(encode(&round)).unwrap(),
            r#"{"result":["xzz"],"sum_if":"234134","start_at":342,"top_n":[{"pid":"post1","sum_if":"234235311"}]}"#
        );
        assert_eq!(
            String::from_utf8(encode(&RoundPostRecord { sum_if: Int::from(5) })).unwrap(),
            r#"{"dp":"5"}"#
        );
        assert_eq!(
            String::from_utf8(encode(&GameRecord { current_round: 443 })).unwrap(),
            r#"{"current_round":443}"#
        );
    }

    #[test]
    fn decode_restores_record() {
        let user = sample_user();
        let back: UserRecord = decode(Some(encode(&user).as_slice())).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn absent_key_decodes_to_none() {
        assert!(decode::<GameRecord>(None).is_none());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = try_decode::<GameRecord>(br#"{"current_round":1,"extra":2}"#).unwrap_err();
        assert!(err.to_string().contains("malformed game record"));
    }

    #[test]
    #[should_panic(expected = "Corrupt store value")]
    fn corrupt_bytes_are_fatal() {
        decode::<RoundPostRecord>(Some(b"\x00\x01garbage"));
    }
}
