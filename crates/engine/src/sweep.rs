//! Bulk refresh of everything already stored.

use crate::descriptor::Resource;
use crate::error::{Error, ErrorKind, Result};
use crate::orchestrate::MAX_CONCURRENCY;
use crate::task::{self, Context};
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{StreamExt, TryStreamExt};
use resync_storage::{CacheRecord, KnownResource, ResourceType};
use std::collections::VecDeque;

/// Result of [`Engine::update_all`](crate::Engine::update_all).
#[derive(Debug)]
pub enum Sweep {
    /// The device was offline, so nothing was checked.
    Skipped,
    /// One entry per stored resource, in completion order.
    Completed(Vec<SweepEntry>),
}
impl Sweep {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn entries(&self) -> &[SweepEntry] {
        match self {
            Self::Skipped => &[],
            Self::Completed(entries) => entries,
        }
    }

    pub fn updated(&self) -> usize {
        self.entries().iter().filter(|entry| matches!(entry.action, SweepAction::Updated(_))).count()
    }
}

#[derive(Debug)]
pub struct SweepEntry {
    pub url: String,
    pub resource_type: ResourceType,
    pub action: SweepAction,
}

#[derive(Debug)]
pub enum SweepAction {
    /// The origin still serves the stored version.
    UpToDate,
    /// A newer version was downloaded and stored.
    Updated(CacheRecord),
    /// Nothing was written; the stored record is as it was.
    Failed(Error),
}

/// Probe every stored resource and re-download those that changed, each
/// independently of the others.
///
/// # Errors
///
/// Only when the stored resources cannot be listed.
pub(crate) async fn update_all(ctx: &Context) -> Result<Sweep> {
    if !ctx.online {
        tracing::warn!("Offline, skipping update sweep");
        return Ok(Sweep::Skipped);
    }
    let known: Vec<KnownResource> = ctx.backend.list_stream().try_collect().await.or_raise(|| ErrorKind::Storage)?;
    tracing::info!(count = known.len(), backend = ctx.backend.name(), "Checking stored resources for updates");

    let mut pending: VecDeque<_> = known.into_iter().map(|known| refresh(ctx, known)).collect();
    let mut processing = FuturesUnordered::new();
    processing.extend(pending.drain(..MAX_CONCURRENCY.min(pending.len())));
    let mut entries = Vec::new();
    while let Some(entry) = processing.next().await {
        entries.push(entry);
        if let Some(next) = pending.pop_front() {
            processing.push(next);
        }
    }
    Ok(Sweep::Completed(entries))
}

async fn refresh(ctx: &Context, known: KnownResource) -> SweepEntry {
    let action = if task::is_current(ctx, &known.url, &known.version).await {
        SweepAction::UpToDate
    } else {
        let resource = Resource {
            url: known.url.clone(),
            resource_type: known.resource_type,
            name: None,
        };
        match task::download(ctx, &resource).await {
            Ok(record) => SweepAction::Updated(record),
            Err(err) => {
                tracing::error!(url = %known.url, error = %err, "Update failed");
                SweepAction::Failed(err)
            },
        }
    };
    SweepEntry {
        url: known.url,
        resource_type: known.resource_type,
        action,
    }
}
