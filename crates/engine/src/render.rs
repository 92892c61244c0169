//! Rendering collaborator.
//!
//! The engine never builds documents itself: it hands each ready resource to
//! a [`Renderer`], which is free to inject it into a page, write it out, or
//! ignore it.

use resync_codec::Payload;
use resync_storage::ResourceType;
use std::sync::{Arc, Mutex, PoisonError};

/// A resource ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub url: String,
    pub resource_type: ResourceType,
    pub content: Payload,
    /// Family name, for fonts.
    pub name: Option<String>,
}

pub type RendererHandle = Arc<dyn Renderer + Send + Sync>;

pub trait Renderer: Send + Sync {
    /// Render one item. Only called with renderable types (script,
    /// stylesheet, and fonts with a name).
    fn render(&self, item: &RenderItem);
}

/// Renderer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _item: &RenderItem) {}
}

/// Renderer that keeps every item, in the order they were rendered.
#[derive(Debug, Default)]
pub struct CollectingRenderer {
    items: Mutex<Vec<RenderItem>>,
}
impl CollectingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<RenderItem> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove and return everything rendered so far.
    pub fn take(&self) -> Vec<RenderItem> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Renderer for CollectingRenderer {
    fn render(&self, item: &RenderItem) {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).push(item.clone());
    }
}
