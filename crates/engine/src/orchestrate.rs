use crate::descriptor::{Mode, Rejection, ResourceDescriptor};
use crate::engine::Engine;
use crate::error::Result;
use crate::task::{self, Outcome, Report};
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// Upper bound on resources being synchronized at the same time.
pub const MAX_CONCURRENCY: usize = 100;

/// Progress events emitted by [`Engine::synchronize_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Rejected`](Self::Rejected): once per invalid descriptor, in input
///    order, before any resource is synchronized.
/// 3. [`Finished`](Self::Finished): once per valid descriptor, in completion
///    order.
/// 4. [`Complete`](Self::Complete): exactly once.
///
/// The only error the stream yields is initialization failing, in which case
/// it is the first and only item.
#[derive(Debug)]
pub enum SyncEvent {
    /// The batch has begun; `total` counts every descriptor, valid or not.
    Started { total: usize },
    Rejected(Rejected),
    /// A resource reached its terminal outcome. In render mode, a successful
    /// resource has already been rendered when this is emitted.
    Finished(Report),
    Complete(Summary),
}

/// A descriptor that was skipped without any work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Position in the submitted list.
    pub index: usize,
    pub url: String,
    pub rejection: Rejection,
}

/// Counts of how a batch went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub stored: usize,
    pub reused: usize,
    pub failed: usize,
    pub rejected: usize,
}
impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Stored(_) => self.stored += 1,
            Outcome::Reused(_) => self.reused += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.stored + self.reused + self.failed + self.rejected
    }
}

/// Everything a batch produced, collected by [`Engine::synchronize`].
#[derive(Debug, Default)]
pub struct Batch {
    /// One report per valid descriptor, in completion order.
    pub reports: Vec<Report>,
    pub rejected: Vec<Rejected>,
    pub summary: Summary,
}
impl Batch {
    /// The report for `url`, if it was part of the batch and valid.
    pub fn report(&self, url: &str) -> Option<&Report> {
        self.reports.iter().find(|report| report.resource.url == url)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Report> {
        self.reports.iter().filter(|report| report.outcome.is_failed())
    }
}

pub(crate) fn synchronize(
    engine: &Engine,
    resources: Vec<ResourceDescriptor>,
    mode: Mode,
) -> impl Stream<Item = Result<SyncEvent>> + '_ {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let state = match engine.ready().await {
            Ok(state) => state,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(SyncEvent::Started { total: resources.len() });

        let mut summary = Summary::default();
        let mut accepted = VecDeque::with_capacity(resources.len());
        for (index, descriptor) in resources.into_iter().enumerate() {
            match descriptor.validate(mode) {
                Ok(resource) => accepted.push_back(resource),
                Err(rejection) => {
                    tracing::warn!(index, url = %descriptor.url, %rejection, %mode, "Resource rejected");
                    summary.rejected += 1;
                    yield Ok(SyncEvent::Rejected(Rejected {
                        index,
                        url: descriptor.url,
                        rejection,
                    }));
                },
            }
        }

        let ctx = engine.task_context(state, engine.config().check_for_updates);
        let mut pending: VecDeque<_> = accepted.into_iter().map(|resource| task::synchronize(&ctx, resource)).collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.drain(..MAX_CONCURRENCY.min(pending.len())));
        while let Some(report) = processing.next().await {
            summary.record(&report.outcome);
            if let (Mode::RenderAfterLoad, Some(record)) = (mode, report.outcome.record()) {
                engine.render_record(&report.resource, record);
            }
            yield Ok(SyncEvent::Finished(report));
            // FIFO, so resources start in the order they were submitted.
            if let Some(next) = pending.pop_front() {
                processing.push(next);
            }
        }

        tracing::info!(
            stored = summary.stored,
            reused = summary.reused,
            failed = summary.failed,
            rejected = summary.rejected,
            %mode,
            "Batch complete"
        );
        yield Ok(SyncEvent::Complete(summary));
    })
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Mode, Rejection, ResourceDescriptor};
    use crate::engine::Engine;
    use crate::error::ErrorKind;
    use crate::orchestrate::{Rejected, SyncEvent};
    use crate::render::CollectingRenderer;
    use crate::task::Outcome;
    use crate::task::tests::ScriptedOrigin;
    use futures::StreamExt;
    use resync_codec::Payload;
    use resync_fetch::StaticConnectivity;
    use resync_storage::{Fingerprint, MockHost, ResourceType};
    use std::sync::Arc;

    struct Harness {
        engine: Engine,
        origin: Arc<ScriptedOrigin>,
        renderer: Arc<CollectingRenderer>,
    }

    fn harness(host: MockHost, online: bool) -> Harness {
        let origin = Arc::new(ScriptedOrigin::new());
        let renderer = Arc::new(CollectingRenderer::new());
        let engine = Engine::builder(Arc::new(host))
            .origin(origin.clone())
            .connectivity(Arc::new(StaticConnectivity(online)))
            .renderer(renderer.clone())
            .build();
        Harness {
            engine,
            origin,
            renderer,
        }
    }

    #[tokio::test]
    async fn test_first_load_stores_and_renders_once() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("a.js", "h1", "console.log(1)");

        let batch = h.engine.load(vec![ResourceDescriptor::new("a.js", ResourceType::Script)]).await.unwrap();
        let Outcome::Stored(record) = &batch.report("a.js").unwrap().outcome else {
            panic!("expected a stored outcome");
        };
        assert_eq!(record.version, Fingerprint::from("h1"));
        let rendered = h.renderer.items();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].content, Payload::from("console.log(1)"));
    }

    #[tokio::test]
    async fn test_second_load_reuses_without_download() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("a.js", "h1", "console.log(1)");
        let resources = vec![ResourceDescriptor::new("a.js", ResourceType::Script)];
        h.engine.load(resources.clone()).await.unwrap();

        let batch = h.engine.load(resources).await.unwrap();
        assert!(matches!(batch.report("a.js").unwrap().outcome, Outcome::Reused(_)));
        assert_eq!(h.origin.downloads(), 1);
        assert_eq!(h.origin.probes(), 1);
        assert_eq!(h.renderer.items().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_only_is_idempotent() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("logo.png", "h1", resync_codec::Blob::new("image/png", vec![0x89, 0x50, 0x4e, 0x47]));
        let resources = vec![ResourceDescriptor::new("logo.png", ResourceType::Blob)];

        let first = h.engine.cache(resources.clone()).await.unwrap();
        assert_eq!(first.summary.stored, 1);
        let second = h.engine.cache(resources).await.unwrap();
        assert_eq!(second.summary.reused, 1);
        assert_eq!(h.origin.downloads(), 1);
        // Nothing is rendered in cache-only mode.
        assert!(h.renderer.items().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_descriptor_does_not_affect_others() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("a.js", "h1", "console.log(1)");
        h.origin.serve("b.css", "h2", "body{}");
        let resources = vec![
            ResourceDescriptor::new("a.js", ResourceType::Script),
            ResourceDescriptor {
                resource_type: Some("script".to_string()),
                ..Default::default()
            },
            ResourceDescriptor::new("b.css", ResourceType::Stylesheet),
            ResourceDescriptor {
                url: "v.mp4".to_string(),
                resource_type: Some("video".to_string()),
                name: None,
            },
        ];

        let batch = h.engine.load(resources).await.unwrap();
        assert_eq!(
            batch.rejected,
            vec![
                Rejected {
                    index: 1,
                    url: String::new(),
                    rejection: Rejection::MissingUrl,
                },
                Rejected {
                    index: 3,
                    url: "v.mp4".to_string(),
                    rejection: Rejection::UnsupportedType("video".to_string()),
                },
            ]
        );
        assert_eq!(batch.summary.stored, 2);
        assert_eq!(batch.summary.total(), 4);
        assert_eq!(h.renderer.items().len(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_fail_the_batch() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("a.js", "h1", "console.log(1)");
        let resources = vec![
            ResourceDescriptor::new("missing.js", ResourceType::Script),
            ResourceDescriptor::new("a.js", ResourceType::Script),
        ];

        let batch = h.engine.load(resources).await.unwrap();
        assert_eq!(batch.summary.stored, 1);
        assert_eq!(batch.summary.failed, 1);
        let failed: Vec<_> = batch.failures().map(|report| report.resource.url.as_str()).collect();
        assert_eq!(failed, vec!["missing.js"]);
        let rendered = h.renderer.items();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].url, "a.js");
    }

    #[tokio::test]
    async fn test_offline_reuses_stale_copy() {
        // Populate through one engine, then read back offline through another
        // engine sharing the same host.
        let host = Arc::new(MockHost::new());
        let origin = Arc::new(ScriptedOrigin::new());
        origin.serve("a.js", "h1", "console.log(1)");
        let first = Engine::builder(host.clone())
            .origin(origin.clone())
            .connectivity(Arc::new(StaticConnectivity(true)))
            .build();
        first.cache(vec![ResourceDescriptor::new("a.js", ResourceType::Script)]).await.unwrap();

        origin.serve("a.js", "h2", "console.log(2)");
        let second = Engine::builder(host)
            .origin(origin.clone())
            .connectivity(Arc::new(StaticConnectivity(false)))
            .build();
        let batch = second.cache(vec![ResourceDescriptor::new("a.js", ResourceType::Script)]).await.unwrap();
        let Outcome::Reused(record) = &batch.report("a.js").unwrap().outcome else {
            panic!("expected a reused outcome");
        };
        assert_eq!(record.version, Fingerprint::from("h1"));
        assert_eq!(origin.probes(), 0);
    }

    #[tokio::test]
    async fn test_capability_failure_ends_stream() {
        let h = harness(MockHost::with_support(false, false), true);
        let resources = vec![ResourceDescriptor::new("a.js", ResourceType::Script)];

        let events: Vec<_> = h.engine.synchronize_stream(resources.clone(), Mode::RenderAfterLoad).collect().await;
        assert_eq!(events.len(), 1);
        let err = events.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Capability(_)));

        // The failure is kept: later calls fail the same way without probing again.
        let err = h.engine.load(resources).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Capability(_)));
        assert_eq!(h.origin.downloads(), 0);
    }

    #[tokio::test]
    async fn test_event_order() {
        let h = harness(MockHost::new(), true);
        h.origin.serve("a.js", "h1", "console.log(1)");
        let resources = vec![
            ResourceDescriptor::new("a.js", ResourceType::Script),
            ResourceDescriptor::new("logo.png", ResourceType::Blob),
        ];

        let events: Vec<_> = h
            .engine
            .synchronize_stream(resources, Mode::RenderAfterLoad)
            .map(|event| event.unwrap())
            .collect()
            .await;
        assert!(matches!(events[0], SyncEvent::Started { total: 2 }));
        assert!(matches!(
            &events[1],
            SyncEvent::Rejected(Rejected { index: 1, rejection: Rejection::NotRenderable(ResourceType::Blob), .. })
        ));
        assert!(matches!(&events[2], SyncEvent::Finished(report) if report.resource.url == "a.js"));
        let SyncEvent::Complete(summary) = &events[3] else {
            panic!("expected the batch to complete");
        };
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_many_resources_all_finish() {
        let h = harness(MockHost::new(), true);
        let resources: Vec<_> = (0..250)
            .map(|i| {
                let url = format!("lib-{i}.js");
                h.origin.serve(&url, "h1", format!("console.log({i})"));
                ResourceDescriptor::new(url, ResourceType::Script)
            })
            .collect();

        let batch = h.engine.cache(resources).await.unwrap();
        assert_eq!(batch.summary.stored, 250);
        assert_eq!(batch.reports.len(), 250);
    }
}
