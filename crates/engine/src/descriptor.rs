//! Resource descriptors and their validation.

use derive_more::Display;
use resync_storage::{ResourceType, validate_key};
use serde::{Deserialize, Serialize};

/// What a batch is for.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Synchronize, then hand each resource to the renderer as soon as it is
    /// ready. Only renderable types are accepted.
    #[default]
    #[display("render-after-load")]
    RenderAfterLoad,
    /// Only make sure each resource is stored and fresh.
    #[display("cache-only")]
    CacheOnly,
}

/// A resource as submitted by the caller.
///
/// Deserializes from `{"url": ..., "type": ..., "name": ...}`. The type is
/// kept as given: a missing URL, a missing type or an unknown type is caught
/// by [`validate()`](Self::validate), not by the deserializer, so one bad
/// entry never sinks a whole list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
impl ResourceDescriptor {
    pub fn new(url: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            url: url.into(),
            resource_type: Some(resource_type.as_str().to_string()),
            name: None,
        }
    }

    /// A font, which always needs the family name it is rendered under.
    pub fn font(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(url, ResourceType::Font).with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the descriptor can be synchronized in `mode`.
    ///
    /// ```
    /// use resync_engine::{Mode, Rejection, ResourceDescriptor};
    /// use resync_storage::ResourceType;
    ///
    /// let blob = ResourceDescriptor::new("https://cdn.example.com/logo.png", ResourceType::Blob);
    /// assert!(blob.validate(Mode::CacheOnly).is_ok());
    /// assert_eq!(
    ///     blob.validate(Mode::RenderAfterLoad),
    ///     Err(Rejection::NotRenderable(ResourceType::Blob)),
    /// );
    /// ```
    pub fn validate(&self, mode: Mode) -> Result<Resource, Rejection> {
        if self.url.trim().is_empty() {
            return Err(Rejection::MissingUrl);
        }
        if validate_key(&self.url).is_err() {
            return Err(Rejection::InvalidUrl(self.url.clone()));
        }
        let Some(raw_type) = self.resource_type.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Err(Rejection::MissingType);
        };
        let resource_type: ResourceType =
            raw_type.parse().map_err(|_| Rejection::UnsupportedType(raw_type.to_string()))?;
        if mode == Mode::RenderAfterLoad && !resource_type.is_renderable() {
            return Err(Rejection::NotRenderable(resource_type));
        }
        let name = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty());
        if resource_type == ResourceType::Font && name.is_none() {
            return Err(Rejection::MissingFontName);
        }
        Ok(Resource {
            url: self.url.clone(),
            resource_type,
            name: name.map(str::to_string),
        })
    }
}

/// Why a descriptor was skipped.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[display("missing URL")]
    MissingUrl,
    #[display("URL {_0:?} cannot be used as a storage key")]
    InvalidUrl(String),
    #[display("missing type")]
    MissingType,
    #[display("unsupported type {_0:?}")]
    UnsupportedType(String),
    #[display("{_0} resources cannot be rendered; cache them instead")]
    NotRenderable(ResourceType),
    #[display("font resources need a name")]
    MissingFontName,
}

/// A validated descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub url: String,
    pub resource_type: ResourceType,
    pub name: Option<String>,
}
