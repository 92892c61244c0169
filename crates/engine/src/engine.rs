use crate::descriptor::{Mode, Resource, ResourceDescriptor};
use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::{self, Lifecycle, ProcessState};
use crate::orchestrate::{self, Batch, SyncEvent};
use crate::render::{NoopRenderer, RenderItem, RendererHandle};
use crate::sweep::{self, Sweep};
use crate::task::{self, Context, Report};
use exn::ResultExt;
use futures::{Stream, StreamExt};
use resync_codec::Payload;
use resync_config::Config;
use resync_fetch::{
    ConnectivityHandle, HttpConnectivityProbe, HttpOrigin, OriginHandle, ReqwestTransport, TransportHandle,
};
use resync_storage::{BackendKind, CacheRecord, HostHandle, ResourceType};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Keeps remote resources synchronized into local storage.
///
/// An engine is configured once, when it is built. Storage selection and the
/// connectivity check happen on the first call that needs them; every call
/// waits for that to finish, and a failure there makes every call fail with
/// [`Capability`](ErrorKind::Capability).
///
/// ```no_run
/// use resync_engine::{Engine, ResourceDescriptor};
/// use resync_storage::{LocalHost, ResourceType};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let host = LocalHost::new("/var/cache/app")?;
/// let engine = Engine::builder(Arc::new(host)).build();
/// let batch = engine
///     .cache(vec![ResourceDescriptor::new("https://cdn.example.com/app.js", ResourceType::Script)])
///     .await?;
/// println!("{} stored, {} reused", batch.summary.stored, batch.summary.reused);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: Config,
    config_error: Option<Error>,
    host: HostHandle,
    origin: OriginHandle,
    connectivity: ConnectivityHandle,
    renderer: RendererHandle,
    state: OnceCell<Lifecycle>,
}

impl Engine {
    pub fn builder(host: HostHandle) -> EngineBuilder {
        EngineBuilder::new(host)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Why the supplied configuration was rejected, if it was. The engine
    /// runs with the defaults in that case.
    pub fn config_error(&self) -> Option<&Error> {
        self.config_error.as_ref()
    }

    /// Wait for initialization, running it if this is the first call.
    ///
    /// # Errors
    ///
    /// [`Capability`](ErrorKind::Capability) when the host has no usable
    /// storage. The failure is permanent for this engine.
    pub async fn ready(&self) -> Result<&ProcessState> {
        let lifecycle = self
            .state
            .get_or_init(|| lifecycle::initialize(&self.config, self.host.as_ref(), self.connectivity.as_ref()))
            .await;
        match lifecycle {
            Lifecycle::Ready(state) => Ok(state),
            Lifecycle::Unusable(reason) => exn::bail!(ErrorKind::Capability(reason.clone())),
        }
    }

    /// Synchronize a batch, reporting progress as it happens. See
    /// [`SyncEvent`] for the order of events.
    pub fn synchronize_stream(
        &self,
        resources: Vec<ResourceDescriptor>,
        mode: Mode,
    ) -> impl Stream<Item = Result<SyncEvent>> + '_ {
        orchestrate::synchronize(self, resources, mode)
    }

    /// Synchronize a batch and collect every outcome.
    ///
    /// Individual resources failing, or being rejected, never fails the
    /// call; see [`Batch`].
    ///
    /// # Errors
    ///
    /// Only when initialization failed.
    pub async fn synchronize(&self, resources: Vec<ResourceDescriptor>, mode: Mode) -> Result<Batch> {
        let mut batch = Batch::default();
        let mut events = std::pin::pin!(self.synchronize_stream(resources, mode));
        while let Some(event) = events.next().await {
            match event? {
                SyncEvent::Started { .. } => (),
                SyncEvent::Rejected(rejected) => batch.rejected.push(rejected),
                SyncEvent::Finished(report) => batch.reports.push(report),
                SyncEvent::Complete(summary) => batch.summary = summary,
            }
        }
        Ok(batch)
    }

    /// Synchronize and render scripts, stylesheets and fonts.
    pub async fn load(&self, resources: Vec<ResourceDescriptor>) -> Result<Batch> {
        self.synchronize(resources, Mode::RenderAfterLoad).await
    }

    /// Synchronize resources of any type without rendering them.
    pub async fn cache(&self, resources: Vec<ResourceDescriptor>) -> Result<Batch> {
        self.synchronize(resources, Mode::CacheOnly).await
    }

    /// Stored content for `url`, without any network activity.
    pub async fn get(&self, url: &str) -> Result<Option<Payload>> {
        let state = self.ready().await?;
        let record = state.backend.read_record(url).await.or_raise(|| ErrorKind::Storage)?;
        Ok(record.map(|record| record.content))
    }

    /// Synchronize one resource, checking the origin for a newer version
    /// even when update checks are disabled.
    ///
    /// # Errors
    ///
    /// [`Invalid`](ErrorKind::Invalid) when the descriptor is rejected; a
    /// failed synchronization is reported in the [`Report`].
    pub async fn update(&self, descriptor: ResourceDescriptor) -> Result<Report> {
        let state = self.ready().await?;
        let resource = descriptor.validate(Mode::CacheOnly).map_err(ErrorKind::Invalid)?;
        Ok(task::synchronize(&self.task_context(state, true), resource).await)
    }

    /// Re-download every stored resource whose origin has changed.
    pub async fn update_all(&self) -> Result<Sweep> {
        let state = self.ready().await?;
        sweep::update_all(&self.task_context(state, true)).await
    }

    /// Hand an item straight to the renderer.
    ///
    /// Items that cannot be rendered (types other than script, stylesheet
    /// and font, or a font without a name) are logged and dropped.
    pub fn render(&self, item: &RenderItem) {
        if !item.resource_type.is_renderable() {
            tracing::warn!(url = %item.url, resource_type = %item.resource_type, "Resource type cannot be rendered");
            return;
        }
        let unnamed = item.name.as_deref().is_none_or(|name| name.trim().is_empty());
        if item.resource_type == ResourceType::Font && unnamed {
            tracing::warn!(url = %item.url, "Font cannot be rendered without a name");
            return;
        }
        self.renderer.render(item);
    }

    /// Delete stored resources.
    ///
    /// `None` clears every backend kind the host supports; `Some(kind)`
    /// clears only that one. Only this engine's namespace is touched.
    pub async fn clear_all(&self, scope: Option<BackendKind>) -> Result<()> {
        let state = self.ready().await?;
        let kinds: Vec<BackendKind> = match scope {
            Some(kind) => vec![kind],
            None => state.capabilities.supported().collect(),
        };
        for kind in kinds {
            if kind == state.backend.kind() {
                state.backend.purge().await.or_raise(|| ErrorKind::Storage)?;
            } else {
                let backend = self.host.open(kind, &self.config.namespace).await.or_raise(|| ErrorKind::Storage)?;
                backend.purge().await.or_raise(|| ErrorKind::Storage)?;
            }
            tracing::info!(kind = %kind, namespace = %self.config.namespace, "Storage cleared");
        }
        Ok(())
    }

    pub(crate) fn task_context(&self, state: &ProcessState, check_for_updates: bool) -> Context {
        Context {
            backend: state.backend.clone(),
            origin: self.origin.clone(),
            online: state.online,
            check_for_updates,
            debug: self.config.debug_logging,
        }
    }

    pub(crate) fn render_record(&self, resource: &Resource, record: &CacheRecord) {
        self.render(&RenderItem {
            url: resource.url.clone(),
            resource_type: resource.resource_type,
            content: record.content.clone(),
            name: resource.name.clone(),
        });
    }
}

/// Builder for [`Engine`].
///
/// Everything except the storage host has a default: the default
/// configuration, HTTP for the origin and the connectivity probe, and a
/// renderer that does nothing.
pub struct EngineBuilder {
    host: HostHandle,
    config: Config,
    config_error: Option<Error>,
    transport: Option<TransportHandle>,
    origin: Option<OriginHandle>,
    connectivity: Option<ConnectivityHandle>,
    renderer: Option<RendererHandle>,
}

impl EngineBuilder {
    fn new(host: HostHandle) -> Self {
        Self {
            host,
            config: Config::default(),
            config_error: None,
            transport: None,
            origin: None,
            connectivity: None,
            renderer: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self.config_error = None;
        self
    }

    /// Configure from an untyped options object.
    ///
    /// A rejected object leaves the defaults in place and is reported by
    /// [`Engine::config_error`].
    pub fn options(mut self, options: &Value) -> Self {
        let (config, error) = Config::resolve(Some(options));
        self.config = config;
        self.config_error = error.map(|err| err.raise(ErrorKind::Config));
        self
    }

    /// HTTP client for the default origin and connectivity probe.
    pub fn transport(mut self, transport: TransportHandle) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn origin(mut self, origin: OriginHandle) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivityHandle) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn renderer(mut self, renderer: RendererHandle) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Engine {
        let download_timeout = self.config.download_timeout();
        let transport = self.transport.unwrap_or_else(|| match ReqwestTransport::with_timeout(download_timeout) {
            Ok(transport) => Arc::new(transport),
            Err(err) => {
                tracing::warn!(error = %err, "HTTP client could not be configured, downloads rely on the origin timeout");
                Arc::new(ReqwestTransport::default())
            },
        });
        let origin = self.origin.unwrap_or_else(|| {
            Arc::new(HttpOrigin::new(transport.clone(), self.config.probe_timeout(), download_timeout))
        });
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(HttpConnectivityProbe::new(transport, self.config.connectivity_url.clone())));
        Engine {
            config: self.config,
            config_error: self.config_error,
            host: self.host,
            origin,
            connectivity,
            renderer: self.renderer.unwrap_or_else(|| Arc::new(NoopRenderer)),
            state: OnceCell::new(),
        }
    }
}
