//! In-memory payload model shared by the codec and the storage backends.

use serde_json::Value;

/// Object key marking an embedded byte buffer inside a structured payload.
///
/// A structured payload can carry raw bytes as `{"__bytes": [1, 2, 3]}`. The
/// tag is the only thing that marks a value as binary: a plain array of
/// numbers always stays a plain array of numbers.
pub const BYTES_TAG: &str = "__bytes";

/// Binary content together with its media type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    /// Media type reported by the origin (`Content-Type`), may be empty.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}
impl Blob {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Content of a cached resource.
///
/// Text resources (scripts, stylesheets, plain text) are kept as [`Text`](Self::Text),
/// binary ones (fonts, images, arbitrary blobs) as [`Blob`](Self::Blob).
/// [`Structured`](Self::Structured) exists for callers that cache JSON
/// documents directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Value),
    Blob(Blob),
}

impl Payload {
    /// `true` when there is nothing worth caching (empty text or zero bytes).
    ///
    /// `null` is the only structured value considered empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(value) => value.is_null(),
            Self::Blob(blob) => blob.bytes.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    /// Size of the content in bytes (structured payloads report their
    /// compact JSON length).
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Structured(value) => value.to_string().len(),
            Self::Blob(blob) => blob.bytes.len(),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
impl From<Blob> for Payload {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

/// Wrap raw bytes so they can be embedded inside a structured payload.
pub fn tagged_bytes(bytes: &[u8]) -> Value {
    let mut object = serde_json::Map::with_capacity(1);
    object.insert(BYTES_TAG.to_string(), Value::from(bytes.to_vec()));
    Value::Object(object)
}

/// Recover the bytes from a value produced by [`tagged_bytes`].
///
/// Returns `None` for anything that is not exactly a single-key tagged
/// object holding an array of integers in `0..=255`.
pub fn untag_bytes(value: &Value) -> Option<Vec<u8>> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object
        .get(BYTES_TAG)?
        .as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}
