//! Client-side resource synchronization.
//!
//! An [`Engine`] keeps a set of remote resources (scripts, stylesheets,
//! fonts, binary blobs and text) in local persistent storage, and only
//! downloads a resource again when the origin reports a new version. Batches
//! are synchronized concurrently; every resource ends up
//! [stored, reused or failed](Outcome) on its own, and a batch as a whole
//! never fails because one of its resources did.
//!
//! With the device offline, stored copies are used as they are and nothing
//! new can be downloaded.

mod descriptor;
mod engine;
pub mod error;
mod lifecycle;
mod orchestrate;
mod render;
mod sweep;
mod task;

pub use crate::descriptor::{Mode, Rejection, Resource, ResourceDescriptor};
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::ErrorKind;
pub use crate::lifecycle::ProcessState;
pub use crate::orchestrate::{Batch, MAX_CONCURRENCY, Rejected, Summary, SyncEvent};
pub use crate::render::{CollectingRenderer, NoopRenderer, RenderItem, Renderer, RendererHandle};
pub use crate::sweep::{Sweep, SweepAction, SweepEntry};
pub use crate::task::{Outcome, Report};
