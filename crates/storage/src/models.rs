//! Storage models.
//!
//! These types describe what a backend persists for every resource: the
//! content itself plus the metadata needed to decide whether it is still
//! current.

use derive_more::Display;
use resync_codec::Payload;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of content a resource holds.
///
/// Legacy short names are accepted when parsing: `js` (script), `css`
/// (stylesheet) and `img` (blob).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ResourceType {
    #[display("script")]
    Script,
    #[display("stylesheet")]
    Stylesheet,
    #[display("font")]
    Font,
    #[display("blob")]
    Blob,
    #[display("text")]
    Text,
}
impl ResourceType {
    pub const ALL: [ResourceType; 5] = [Self::Script, Self::Stylesheet, Self::Font, Self::Blob, Self::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Font => "font",
            Self::Blob => "blob",
            Self::Text => "text",
        }
    }

    /// Whether a renderer can inject this type into a document directly.
    pub fn is_renderable(self) -> bool {
        matches!(self, Self::Script | Self::Stylesheet | Self::Font)
    }

    /// Whether the body is kept as raw bytes rather than text.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Font | Self::Blob)
    }
}
impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "script" | "js" => Ok(Self::Script),
            "stylesheet" | "css" => Ok(Self::Stylesheet),
            "font" => Ok(Self::Font),
            "blob" | "img" => Ok(Self::Blob),
            "text" => Ok(Self::Text),
            _ => Err(format!("unknown resource type `{s}`")),
        }
    }
}
impl TryFrom<String> for ResourceType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
impl From<ResourceType> for &'static str {
    fn from(value: ResourceType) -> Self {
        value.as_str()
    }
}

/// Version fingerprint of a remote resource.
///
/// Derived from the `Last-Modified` and `ETag` response headers, so it can be
/// computed from a `HEAD` request without transferring the body. Two equal
/// fingerprints mean the two responses are *considered* interchangeable; it is
/// not a guarantee that the bytes are identical.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);
impl Fingerprint {
    /// Hash the two metadata headers into a fingerprint. Missing headers count
    /// as empty strings.
    pub fn derive(last_modified: Option<&str>, etag: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(last_modified.unwrap_or_default().as_bytes());
        hasher.update(etag.unwrap_or_default().as_bytes());
        Self(hasher.finalize().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Metadata entry stored next to every piece of content.
///
/// The flat backend persists exactly this as JSON: `{"type": ..., "ver": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMeta {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(rename = "ver")]
    pub version: Fingerprint,
}
impl StoredMeta {
    /// Parse a metadata entry, returning `None` when it is missing a field,
    /// names an unknown type or carries an empty version.
    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(raw).ok().filter(|meta| !meta.version.is_empty())
    }
}

/// A resource as persisted by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub content: Payload,
    pub resource_type: ResourceType,
    pub version: Fingerprint,
}

/// A resource the active backend holds metadata for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownResource {
    pub url: String,
    pub resource_type: ResourceType,
    pub version: Fingerprint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("script", ResourceType::Script)]
    #[case("js", ResourceType::Script)]
    #[case("CSS", ResourceType::Stylesheet)]
    #[case("stylesheet", ResourceType::Stylesheet)]
    #[case("font", ResourceType::Font)]
    #[case("img", ResourceType::Blob)]
    #[case("blob", ResourceType::Blob)]
    #[case("text", ResourceType::Text)]
    fn test_resource_type_parse(#[case] input: &str, #[case] expected: ResourceType) {
        assert_eq!(input.parse::<ResourceType>().unwrap(), expected);
    }

    #[test]
    fn test_resource_type_unknown() {
        assert!("video".parse::<ResourceType>().is_err());
        assert!(serde_json::from_str::<ResourceType>(r#""video""#).is_err());
    }

    #[test]
    fn test_resource_type_serializes_canonical_name() {
        assert_eq!(serde_json::to_string(&ResourceType::Stylesheet).unwrap(), r#""stylesheet""#);
        assert_eq!(serde_json::from_str::<ResourceType>(r#""js""#).unwrap(), ResourceType::Script);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Fingerprint::derive(Some("Wed, 21 Oct 2015 07:28:00 GMT"), Some("\"abc\""));
        let b = Fingerprint::derive(Some("Wed, 21 Oct 2015 07:28:00 GMT"), Some("\"abc\""));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_missing_headers_count_as_empty() {
        assert_eq!(Fingerprint::derive(None, None), Fingerprint::derive(Some(""), Some("")));
        assert_ne!(Fingerprint::derive(Some("a"), None), Fingerprint::derive(None, None));
        assert!(!Fingerprint::derive(None, None).is_empty());
    }

    #[test]
    fn test_stored_meta_layout() {
        let meta = StoredMeta {
            resource_type: ResourceType::Script,
            version: Fingerprint::from("h1"),
        };
        assert_eq!(serde_json::to_string(&meta).unwrap(), r#"{"type":"script","ver":"h1"}"#);
    }

    #[rstest]
    #[case(r#"{"type":"script","ver":"h1"}"#, true)]
    #[case(r#"{"type":"js","ver":"h1"}"#, true)]
    #[case(r#"{"type":"script"}"#, false)]
    #[case(r#"{"ver":"h1"}"#, false)]
    #[case(r#"{"type":"script","ver":""}"#, false)]
    #[case(r#"{"type":"video","ver":"h1"}"#, false)]
    #[case("null", false)]
    #[case("garbage", false)]
    fn test_stored_meta_parse(#[case] raw: &str, #[case] well_formed: bool) {
        assert_eq!(StoredMeta::parse(raw.as_bytes()).is_some(), well_formed);
    }
}
