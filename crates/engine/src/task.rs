//! Synchronization of a single resource.
//!
//! ```text
//! START -> CHECK_CACHE -> { DOWNLOAD | VERIFY_LIVE | REUSE } -> { STORED | REUSED | FAILED }
//! ```
//!
//! - Nothing cached: download.
//! - Cached, update checks disabled: reuse.
//! - Cached, device offline: reuse, possibly stale.
//! - Otherwise probe the origin: the same fingerprint is reused, a different
//!   one (or a failed probe) is downloaded.
//!
//! A download needs connectivity, and a download without content or
//! without a fingerprint is never written, so a failed refresh always leaves
//! the previous record in place. Nothing is retried.

use crate::descriptor::Resource;
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use resync_fetch::OriginHandle;
use resync_storage::{BackendHandle, CacheRecord, Fingerprint};

/// Terminal state of one resource.
#[derive(Debug)]
pub enum Outcome {
    /// A fresh copy was downloaded and written.
    Stored(CacheRecord),
    /// The stored copy was used as is.
    Reused(CacheRecord),
    Failed(Error),
}
impl Outcome {
    /// The record the resource ended up with, unless it failed.
    pub fn record(&self) -> Option<&CacheRecord> {
        match self {
            Self::Stored(record) | Self::Reused(record) => Some(record),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A resource together with its outcome.
#[derive(Debug)]
pub struct Report {
    pub resource: Resource,
    pub outcome: Outcome,
}

/// What a task needs from the engine. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Context {
    pub backend: BackendHandle,
    pub origin: OriginHandle,
    pub online: bool,
    pub check_for_updates: bool,
    pub debug: bool,
}

enum Step {
    Download,
    Reuse,
}

/// Drive `resource` to a terminal outcome. Never fails: errors become
/// [`Outcome::Failed`].
pub(crate) async fn synchronize(ctx: &Context, resource: Resource) -> Report {
    let outcome = match synchronize_inner(ctx, &resource).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(url = %resource.url, error = %err, "Resource synchronization failed");
            Outcome::Failed(err)
        },
    };
    Report { resource, outcome }
}

async fn synchronize_inner(ctx: &Context, resource: &Resource) -> Result<Outcome> {
    let url = resource.url.as_str();
    let cached = ctx.backend.read_version(url).await.or_raise(|| ErrorKind::Storage)?;
    let step = match cached {
        None => {
            if ctx.debug {
                tracing::debug!(url, "Not cached");
            }
            Step::Download
        },
        Some(_) if !ctx.check_for_updates => Step::Reuse,
        Some(_) if !ctx.online => {
            tracing::warn!(url, "Offline, reusing cached copy without checking for updates");
            Step::Reuse
        },
        Some(cached) if is_current(ctx, url, &cached).await => Step::Reuse,
        Some(_) => Step::Download,
    };

    if let Step::Reuse = step {
        if let Some(record) = ctx.backend.read_record(url).await.or_raise(|| ErrorKind::Storage)? {
            if ctx.debug {
                tracing::debug!(url, version = %record.version, "Reusing cached copy");
            }
            return Ok(Outcome::Reused(record));
        }
        // Gone between the two reads.
        tracing::warn!(url, "Cached copy disappeared before it could be read");
    }
    download(ctx, resource).await.map(Outcome::Stored)
}

/// Whether the origin still serves the `cached` version. A failed probe
/// counts as a change.
pub(crate) async fn is_current(ctx: &Context, url: &str, cached: &Fingerprint) -> bool {
    match ctx.origin.fingerprint(url).await {
        Ok(live) if &live == cached => true,
        Ok(live) => {
            if ctx.debug {
                tracing::debug!(url, cached = %cached, live = %live, "Origin has a newer version");
            }
            false
        },
        Err(err) => {
            tracing::warn!(url, error = %err, "Fingerprint probe failed, downloading");
            false
        },
    }
}

/// Download `resource` and write it, replacing any previous record.
pub(crate) async fn download(ctx: &Context, resource: &Resource) -> Result<CacheRecord> {
    let url = resource.url.as_str();
    if !ctx.online {
        exn::bail!(ErrorKind::Offline);
    }
    let download = ctx.origin.download(url, resource.resource_type).await.or_raise(|| ErrorKind::Fetch)?;
    if !download.is_usable() {
        exn::bail!(ErrorKind::EmptyDownload);
    }
    let record = ctx
        .backend
        .write_record(url, download.content, download.fingerprint, resource.resource_type)
        .await
        .or_raise(|| ErrorKind::Storage)?;
    tracing::info!(url, version = %record.version, "Resource stored");
    Ok(record)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use resync_codec::Payload;
    use resync_fetch::error::{ErrorKind as FetchErrorKind, Result as FetchResult};
    use resync_fetch::{Download, Origin};
    use resync_storage::{BackendKind, MockHost, ResourceType, StorageHost};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Origin serving a fixed set of resources, counting every request.
    #[derive(Default)]
    pub(crate) struct ScriptedOrigin {
        resources: Mutex<HashMap<String, Download>>,
        probe_failures: Mutex<Vec<String>>,
        probes: AtomicUsize,
        downloads: AtomicUsize,
    }
    impl ScriptedOrigin {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, version: &str, content: impl Into<Payload>) {
            let download = Download {
                fingerprint: Fingerprint::from(version),
                content: content.into(),
            };
            self.resources.lock().unwrap_or_else(PoisonError::into_inner).insert(url.to_string(), download);
        }

        pub fn fail_probes(&self, url: &str) {
            self.probe_failures.lock().unwrap_or_else(PoisonError::into_inner).push(url.to_string());
        }

        pub fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        pub fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        fn lookup(&self, url: &str) -> FetchResult<Download> {
            match self.resources.lock().unwrap_or_else(PoisonError::into_inner).get(url) {
                Some(download) => Ok(download.clone()),
                None => exn::bail!(FetchErrorKind::Status(404)),
            }
        }
    }

    #[async_trait]
    impl Origin for ScriptedOrigin {
        async fn fingerprint(&self, url: &str) -> FetchResult<Fingerprint> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.probe_failures.lock().unwrap_or_else(PoisonError::into_inner).iter().any(|u| u == url) {
                exn::bail!(FetchErrorKind::Timeout);
            }
            Ok(self.lookup(url)?.fingerprint)
        }

        async fn download(&self, url: &str, _resource_type: ResourceType) -> FetchResult<Download> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.lookup(url)
        }
    }

    async fn context(origin: &Arc<ScriptedOrigin>, online: bool, check_for_updates: bool) -> Context {
        let host = MockHost::new();
        Context {
            backend: host.open(BackendKind::Dual, "quiche").await.unwrap(),
            origin: origin.clone(),
            online,
            check_for_updates,
            debug: true,
        }
    }

    fn script(url: &str) -> Resource {
        Resource {
            url: url.to_string(),
            resource_type: ResourceType::Script,
            name: None,
        }
    }

    #[tokio::test]
    async fn test_miss_downloads_and_stores() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, true).await;

        let report = synchronize(&ctx, script("a.js")).await;
        let Outcome::Stored(record) = report.outcome else {
            panic!("expected a stored outcome");
        };
        assert_eq!(record.version, Fingerprint::from("h1"));
        assert_eq!(origin.probes(), 0);
        assert_eq!(origin.downloads(), 1);
        assert_eq!(ctx.backend.read_version("a.js").await.unwrap(), Some(Fingerprint::from("h1")));
    }

    #[tokio::test]
    async fn test_matching_fingerprint_reuses() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, true).await;
        synchronize(&ctx, script("a.js")).await;

        let report = synchronize(&ctx, script("a.js")).await;
        assert!(matches!(report.outcome, Outcome::Reused(_)));
        assert_eq!(origin.probes(), 1);
        assert_eq!(origin.downloads(), 1);
    }

    #[tokio::test]
    async fn test_changed_fingerprint_downloads() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, true).await;
        synchronize(&ctx, script("a.js")).await;
        origin.serve("a.js", "h2", "console.log(2)");

        let report = synchronize(&ctx, script("a.js")).await;
        let Outcome::Stored(record) = report.outcome else {
            panic!("expected a stored outcome");
        };
        assert_eq!(record.version, Fingerprint::from("h2"));
        assert_eq!(record.content, Payload::from("console.log(2)"));
    }

    #[tokio::test]
    async fn test_probe_failure_downloads() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, true).await;
        synchronize(&ctx, script("a.js")).await;
        origin.fail_probes("a.js");

        let report = synchronize(&ctx, script("a.js")).await;
        assert!(matches!(report.outcome, Outcome::Stored(_)));
        assert_eq!(origin.downloads(), 2);
    }

    #[tokio::test]
    async fn test_offline_reuses_without_probe() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let mut ctx = context(&origin, true, true).await;
        synchronize(&ctx, script("a.js")).await;

        ctx.online = false;
        origin.serve("a.js", "h2", "console.log(2)");
        let report = synchronize(&ctx, script("a.js")).await;
        let Outcome::Reused(record) = report.outcome else {
            panic!("expected a reused outcome");
        };
        assert_eq!(record.version, Fingerprint::from("h1"));
        assert_eq!(origin.probes(), 0);
    }

    #[tokio::test]
    async fn test_offline_miss_fails() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, false, true).await;

        let report = synchronize(&ctx, script("a.js")).await;
        let Outcome::Failed(err) = report.outcome else {
            panic!("expected a failed outcome");
        };
        assert!(matches!(&*err, ErrorKind::Offline));
        assert_eq!(origin.downloads(), 0);
    }

    #[tokio::test]
    async fn test_update_checks_disabled_reuses_without_probe() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, false).await;
        synchronize(&ctx, script("a.js")).await;
        origin.serve("a.js", "h2", "console.log(2)");

        let report = synchronize(&ctx, script("a.js")).await;
        assert!(matches!(report.outcome, Outcome::Reused(_)));
        assert_eq!(origin.probes(), 0);
    }

    #[tokio::test]
    async fn test_empty_download_keeps_previous_record() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let ctx = context(&origin, true, true).await;
        synchronize(&ctx, script("a.js")).await;

        // New fingerprint, empty body.
        origin.serve("a.js", "h2", "");
        let report = synchronize(&ctx, script("a.js")).await;
        let Outcome::Failed(err) = report.outcome else {
            panic!("expected a failed outcome");
        };
        assert!(matches!(&*err, ErrorKind::EmptyDownload));
        let record = ctx.backend.read_record("a.js").await.unwrap().unwrap();
        assert_eq!(record.version, Fingerprint::from("h1"));
        assert_eq!(record.content, Payload::from("console.log(1)"));
    }

    #[tokio::test]
    async fn test_empty_fingerprint_is_not_stored() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "", "console.log(1)");
        let ctx = context(&origin, true, true).await;

        let report = synchronize(&ctx, script("a.js")).await;
        assert!(report.outcome.is_failed());
        assert_eq!(ctx.backend.read_version("a.js").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_download_failure() {
        let origin = Arc::new(ScriptedOrigin::new());
        let ctx = context(&origin, true, true).await;

        let report = synchronize(&ctx, script("missing.js")).await;
        let Outcome::Failed(err) = report.outcome else {
            panic!("expected a failed outcome");
        };
        assert!(matches!(&*err, ErrorKind::Fetch));
        assert!(err.is_retryable());
    }
}
