//! Resource key validation and namespacing.
//!
//! Resources are keyed by their URL. Stores never interpret the key beyond
//! these rules, but every backend validates keys on the way in so that a key
//! can always be recovered from what was written.

use crate::error::{ErrorKind, Result};

/// Suffix marking the metadata entry of a resource in a flat store.
pub const META_SUFFIX: &str = "::V";
/// Separator between namespace and resource key in a flat store.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Validates a resource key.
///
/// Rejected keys:
/// - empty (or only whitespace),
/// - containing a null byte or a line break (partitions on disk store the key
///   on the first line of each entry),
/// - ending in [`META_SUFFIX`] (would collide with another key's metadata in a
///   flat store).
///
/// # Examples
///
/// ```
/// use resync_storage::validate_key;
/// assert!(validate_key("https://cdn.example.com/app.js").is_ok());
/// assert!(validate_key("fonts/inter.woff2").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("a\nb").is_err());
/// assert!(validate_key("sneaky::V").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    if key.trim().is_empty() || key.contains(['\0', '\n', '\r']) || key.ends_with(META_SUFFIX) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Validates a storage namespace.
///
/// The namespace names on-disk partitions (`{namespace}_files`) and prefixes
/// flat-store keys, so it must be non-empty and free of path separators, the
/// flat-store separator and control characters.
///
/// ```
/// use resync_storage::validate_namespace;
/// assert!(validate_namespace("quiche").is_ok());
/// assert!(validate_namespace("my-app.v2").is_ok());
/// assert!(validate_namespace("").is_err());
/// assert!(validate_namespace("../up").is_err());
/// assert!(validate_namespace("a::b").is_err());
/// ```
pub fn validate_namespace(namespace: &str) -> Result<&str> {
    let invalid = namespace.trim().is_empty()
        || namespace.starts_with('.')
        || namespace.contains(NAMESPACE_SEPARATOR)
        || namespace.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        exn::bail!(ErrorKind::InvalidKey(namespace.to_string()));
    }
    Ok(namespace)
}

/// Key of the content entry for `url` in a flat store.
pub(crate) fn content_key(namespace: &str, url: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{url}")
}

/// Key of the metadata entry for `url` in a flat store.
pub(crate) fn meta_key(namespace: &str, url: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{url}{META_SUFFIX}")
}

/// Prefix shared by every entry belonging to `namespace` in a flat store.
pub(crate) fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}")
}

/// Recover the resource URL from a flat-store metadata key, if `key` is one
/// belonging to `namespace`.
pub(crate) fn url_from_meta_key<'a>(namespace: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(namespace)?
        .strip_prefix(NAMESPACE_SEPARATOR)?
        .strip_suffix(META_SUFFIX)
        .filter(|url| !url.is_empty())
}
