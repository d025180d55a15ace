//! Session Serialization Protocol
//!
//! Turns a session's metadata and attribute set into the byte blob stored in
//! the cache, and back. The blob is framed as metadata first, then the
//! attribute body, each decoded strictly in the order written. Splitting the
//! two sections lets decoded metadata be copied field-by-field into a live
//! session object without replacing its identity, since other parts of the
//! host may hold references to it.
//!
//! The module also computes the attribute fingerprint the host compares
//! against the previous save to skip redundant network writes. Most requests
//! do not mutate session state, so this check eliminates the bulk of cache
//! round-trips at high request volume.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::SessionCacheError;

/// Attribute type tag handled by the built-in JSON resolver.
pub const JSON_TAG: &str = "json";

/// Session bookkeeping persisted alongside the attribute body.
///
/// Timestamps are Unix millis; `max_inactive_interval` is in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub creation_time: i64,
    pub last_accessed_time: i64,
    pub max_inactive_interval: i32,
}

impl SessionMetadata {
    /// Overwrite every field of a live instance from a freshly decoded one.
    ///
    /// The live instance keeps its identity; callers holding references to it
    /// observe the decoded values.
    pub fn copy_from(&mut self, other: &SessionMetadata) {
        self.session_id = other.session_id.clone();
        self.creation_time = other.creation_time;
        self.last_accessed_time = other.last_accessed_time;
        self.max_inactive_interval = other.max_inactive_interval;
    }
}

/// Caller-supplied resolution context for attribute payloads.
///
/// The cache layer only knows how to frame attribute records; turning a
/// record's payload back into a value is delegated here so that types owned
/// by the host application can be reconstructed during decode. A tag the
/// resolver does not recognize fails with
/// [`SessionCacheError::Deserialization`] rather than guessing at contents.
pub trait AttributeResolver: Send + Sync {
    fn resolve(&self, tag: &str, payload: &[u8]) -> Result<Value, SessionCacheError>;
}

/// Default resolver for the built-in `"json"` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAttributeResolver;

impl AttributeResolver for JsonAttributeResolver {
    fn resolve(&self, tag: &str, payload: &[u8]) -> Result<Value, SessionCacheError> {
        if tag != JSON_TAG {
            return Err(SessionCacheError::Deserialization(format!(
                "no resolver registered for attribute type '{tag}'"
            )));
        }
        serde_json::from_slice(payload)
            .map_err(|e| SessionCacheError::Encoding(format!("malformed attribute payload: {e}")))
    }
}

/// Compute the 128-bit content fingerprint of an attribute mapping.
///
/// Entries are hashed in key order, so the digest is stable across map
/// iteration orders and across repeated calls for identical content. MD5 is
/// kept from the original change-detection scheme; it is never used for
/// anything security-sensitive here.
pub fn fingerprint(attributes: &HashMap<String, Value>) -> Result<[u8; 16], SessionCacheError> {
    let ordered: BTreeMap<&str, &Value> = attributes
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();

    let mut buf = Vec::new();
    for (key, value) in ordered {
        put_chunk(&mut buf, key.as_bytes());
        put_chunk(&mut buf, &serde_json::to_vec(value)?);
    }
    Ok(md5::compute(&buf).0)
}

/// Encode a session blob: metadata frame first, then the attribute body
/// written by the caller-supplied writer.
pub fn encode<W>(metadata: &SessionMetadata, write_body: W) -> Result<Vec<u8>, SessionCacheError>
where
    W: FnOnce(&mut Vec<u8>) -> Result<(), SessionCacheError>,
{
    let header = serde_json::to_vec(metadata)?;
    let mut blob = Vec::with_capacity(4 + header.len());
    put_chunk(&mut blob, &header);
    write_body(&mut blob)?;
    Ok(blob)
}

/// Decode a session blob: metadata frame first, then the remaining body bytes
/// handed to the caller-supplied reader.
///
/// The reader only ever sees the body slice, so it cannot misread metadata
/// bytes; truncated or malformed framing fails with
/// [`SessionCacheError::Encoding`] before the reader runs.
pub fn decode<R>(blob: &[u8], read_body: R) -> Result<SessionMetadata, SessionCacheError>
where
    R: FnOnce(&[u8]) -> Result<(), SessionCacheError>,
{
    let mut cursor = blob;
    let header = take_chunk(&mut cursor, "session metadata")?;
    let metadata: SessionMetadata = serde_json::from_slice(header)
        .map_err(|e| SessionCacheError::Encoding(format!("malformed session metadata: {e}")))?;
    read_body(cursor)?;
    Ok(metadata)
}

/// Default body writer: frame an attribute mapping as tagged records.
///
/// Entries are written in key order so identical content produces an
/// identical body regardless of map iteration order.
pub fn write_attributes(
    buf: &mut Vec<u8>,
    attributes: &HashMap<String, Value>,
) -> Result<(), SessionCacheError> {
    let ordered: BTreeMap<&str, &Value> = attributes
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();

    buf.extend_from_slice(&(ordered.len() as u32).to_be_bytes());
    for (key, value) in ordered {
        put_chunk(buf, key.as_bytes());
        put_chunk(buf, JSON_TAG.as_bytes());
        put_chunk(buf, &serde_json::to_vec(value)?);
    }
    Ok(())
}

/// Default body reader: reconstruct an attribute mapping through the supplied
/// resolution context.
pub fn read_attributes(
    body: &[u8],
    resolver: &dyn AttributeResolver,
) -> Result<HashMap<String, Value>, SessionCacheError> {
    let mut cursor = body;
    let count = take_u32(&mut cursor, "attribute count")?;

    let mut attributes = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = std::str::from_utf8(take_chunk(&mut cursor, "attribute key")?)
            .map_err(|e| SessionCacheError::Encoding(format!("attribute key not UTF-8: {e}")))?
            .to_string();
        let tag = std::str::from_utf8(take_chunk(&mut cursor, "attribute type tag")?)
            .map_err(|e| SessionCacheError::Encoding(format!("attribute tag not UTF-8: {e}")))?
            .to_string();
        let payload = take_chunk(&mut cursor, "attribute payload")?;
        attributes.insert(key, resolver.resolve(&tag, payload)?);
    }
    if !cursor.is_empty() {
        return Err(SessionCacheError::Encoding(format!(
            "{} trailing bytes after attribute body",
            cursor.len()
        )));
    }
    Ok(attributes)
}

fn put_chunk(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn take_u32(cursor: &mut &[u8], what: &str) -> Result<u32, SessionCacheError> {
    let Some((head, rest)) = cursor.split_first_chunk::<4>() else {
        return Err(SessionCacheError::Encoding(format!(
            "session blob truncated reading {what}"
        )));
    };
    *cursor = rest;
    Ok(u32::from_be_bytes(*head))
}

fn take_chunk<'a>(cursor: &mut &'a [u8], what: &str) -> Result<&'a [u8], SessionCacheError> {
    let len = take_u32(cursor, what)? as usize;
    if cursor.len() < len {
        return Err(SessionCacheError::Encoding(format!(
            "session blob truncated reading {what}: need {len} bytes, have {}",
            cursor.len()
        )));
    }
    let (chunk, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metadata() -> SessionMetadata {
        SessionMetadata {
            session_id: "A1B2C3".to_string(),
            creation_time: 1_700_000_000_000,
            last_accessed_time: 1_700_000_060_000,
            max_inactive_interval: 1800,
        }
    }

    fn sample_attributes() -> HashMap<String, Value> {
        HashMap::from([
            ("user".to_string(), json!("alice")),
            ("cart".to_string(), json!(["apples", "pears"])),
            ("visits".to_string(), json!(17)),
        ])
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let attrs = sample_attributes();
        assert_eq!(fingerprint(&attrs).unwrap(), fingerprint(&attrs).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let forward = sample_attributes();
        // Rebuild in a different insertion order
        let mut shuffled = HashMap::new();
        shuffled.insert("visits".to_string(), json!(17));
        shuffled.insert("cart".to_string(), json!(["apples", "pears"]));
        shuffled.insert("user".to_string(), json!("alice"));

        assert_eq!(fingerprint(&forward).unwrap(), fingerprint(&shuffled).unwrap());
    }

    #[test]
    fn test_fingerprint_detects_changes() {
        let before = sample_attributes();
        let mut after = sample_attributes();
        after.insert("role".to_string(), json!("admin"));
        assert_ne!(fingerprint(&before).unwrap(), fingerprint(&after).unwrap());

        let mut mutated = sample_attributes();
        mutated.insert("visits".to_string(), json!(18));
        assert_ne!(fingerprint(&before).unwrap(), fingerprint(&mutated).unwrap());
    }

    #[test]
    fn test_round_trip() {
        let metadata = sample_metadata();
        let attrs = sample_attributes();

        let blob = encode(&metadata, |buf| write_attributes(buf, &attrs)).unwrap();

        let mut decoded_attrs = HashMap::new();
        let decoded_meta = decode(&blob, |body| {
            decoded_attrs = read_attributes(body, &JsonAttributeResolver)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(decoded_meta, metadata);
        assert_eq!(decoded_attrs, attrs);
    }

    #[test]
    fn test_copy_from_preserves_identity() {
        let mut live = SessionMetadata {
            session_id: "OLD".to_string(),
            creation_time: 1,
            last_accessed_time: 2,
            max_inactive_interval: 3,
        };
        let decoded = sample_metadata();
        live.copy_from(&decoded);
        assert_eq!(live, decoded);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = encode(&sample_metadata(), |buf| {
            write_attributes(buf, &sample_attributes())
        })
        .unwrap();

        for cut in [0, 2, blob.len() / 2, blob.len() - 1] {
            let result = decode(&blob[..cut], |body| {
                read_attributes(body, &JsonAttributeResolver).map(|_| ())
            });
            assert!(
                matches!(result, Err(SessionCacheError::Encoding(_))),
                "truncation at {cut} not rejected"
            );
        }
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        // Claims a 1 MiB metadata frame but carries 4 bytes
        let mut blob = (1024u32 * 1024).to_be_bytes().to_vec();
        blob.extend_from_slice(b"oops");
        let result = decode(&blob, |_| Ok(()));
        assert!(matches!(result, Err(SessionCacheError::Encoding(_))));
    }

    #[test]
    fn test_unknown_attribute_tag_fails_deserialization() {
        let metadata = sample_metadata();
        let blob = encode(&metadata, |buf| {
            buf.extend_from_slice(&1u32.to_be_bytes());
            put_chunk(buf, b"invoice");
            put_chunk(buf, b"com.example.Invoice");
            put_chunk(buf, b"\x00\x01\x02");
            Ok(())
        })
        .unwrap();

        let result = decode(&blob, |body| {
            read_attributes(body, &JsonAttributeResolver).map(|_| ())
        });
        assert!(matches!(result, Err(SessionCacheError::Deserialization(_))));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let attrs = sample_attributes();
        let blob = encode(&sample_metadata(), |buf| {
            write_attributes(buf, &attrs)?;
            buf.push(0xFF);
            Ok(())
        })
        .unwrap();

        let result = decode(&blob, |body| {
            read_attributes(body, &JsonAttributeResolver).map(|_| ())
        });
        assert!(matches!(result, Err(SessionCacheError::Encoding(_))));
    }
}
