//! Binary-safe encoding of payloads for string-only stores.
//!
//! The flat storage backend can only hold strings, so anything it persists
//! goes through [`encode`] on the way in and [`decode`] on the way out:
//!
//! - **Blobs** become a tagged JSON record
//!   `{"__blob": true, "type": "<mime>", "data": [<byte>, ...]}`.
//! - **Text** becomes a JSON string literal.
//! - **Structured** payloads are wrapped as `{"__json": <value>}`, so a
//!   document that is itself a string, or looks like a blob record, keeps its
//!   variant. Raw bytes embedded inside them must use the explicit
//!   [`BYTES_TAG`] wrapper ([`tagged_bytes`]).
//!
//! Decoding never guesses: only the blob tag produces a [`Blob`], and only the
//! bytes tag marks embedded binary data. An array of numbers is just an array
//! of numbers, so cached JSON documents survive the round trip untouched.
//! Untagged JSON that isn't a string (written by something other than
//! [`encode`]) is read back as structured data.
//!
//! ```
//! use resync_codec::{Blob, Payload, decode, encode};
//!
//! let font = Payload::Blob(Blob::new("font/woff2", vec![0x77, 0x4f, 0x46, 0x32]));
//! let stored = encode(&font).unwrap();
//! assert_eq!(decode(&stored).unwrap(), font);
//! ```

pub mod error;
mod payload;

pub use crate::payload::{BYTES_TAG, Blob, Payload, tagged_bytes, untag_bytes};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object key marking an encoded blob record.
pub const BLOB_TAG: &str = "__blob";
/// Object key wrapping an encoded structured payload.
pub const JSON_TAG: &str = "__json";

#[derive(Serialize)]
struct BlobRecordRef<'a> {
    #[serde(rename = "__blob")]
    tag: bool,
    #[serde(rename = "type")]
    mime_type: &'a str,
    data: &'a [u8],
}

#[derive(Serialize)]
struct JsonRecordRef<'a> {
    #[serde(rename = "__json")]
    value: &'a Value,
}

#[derive(Deserialize)]
struct BlobRecord {
    #[serde(rename = "type", default)]
    mime_type: String,
    data: Vec<u8>,
}

/// Encode a payload into text that a string-only store can hold.
pub fn encode(payload: &Payload) -> Result<String> {
    match payload {
        Payload::Blob(blob) => serde_json::to_string(&BlobRecordRef {
            tag: true,
            mime_type: &blob.mime_type,
            data: &blob.bytes,
        }),
        Payload::Text(text) => serde_json::to_string(text),
        Payload::Structured(value) => serde_json::to_string(&JsonRecordRef { value }),
    }
    .or_raise(|| ErrorKind::Serialize)
}

/// Reverse [`encode`].
///
/// Fails with [`InvalidData`](ErrorKind::InvalidData) when the text isn't
/// JSON, or carries the blob tag without a well-formed byte array.
pub fn decode(encoded: &str) -> Result<Payload> {
    let mut value: Value = serde_json::from_str(encoded).or_raise(|| ErrorKind::InvalidData)?;
    if let Some(inner) = json_record(&mut value) {
        return Ok(Payload::Structured(inner));
    }
    if is_blob_record(&value) {
        let record: BlobRecord = serde_json::from_value(value).or_raise(|| ErrorKind::InvalidData)?;
        return Ok(Payload::Blob(Blob::new(record.mime_type, record.data)));
    }
    Ok(match value {
        Value::String(text) => Payload::Text(text),
        other => Payload::Structured(other),
    })
}

/// Unwrap `{"__json": <value>}`. Only an object with that single key counts.
fn json_record(value: &mut Value) -> Option<Value> {
    match value {
        Value::Object(map) if map.len() == 1 => map.remove(JSON_TAG),
        _ => None,
    }
}

fn is_blob_record(value: &Value) -> bool {
    value.get(BLOB_TAG).and_then(Value::as_bool) == Some(true)
}
