//! Discovery clients.
//!
//! [`DiscoveryClient`] is the public entry point. It wraps one of two
//! transport modes behind the [`InnerClient`] trait:
//!
//! - ad-hoc: Probe and Resolve are multicast over a [`DuplexChannel`] and
//!   matches are collected until the criteria's duration elapses or
//!   `max_results` is reached;
//! - managed: Probe and Resolve are sent to a discovery proxy over a
//!   [`RequestReplyChannel`] and the single reply is returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ws_discovery::transport::memory::MemoryNetwork;
//! use ws_discovery::{ClientConfig, DiscoveryClient, FindCriteria, QualifiedName};
//!
//! # async fn example() -> ws_discovery::Result<()> {
//! let network = MemoryNetwork::new();
//! let (channel, incoming) = network.join();
//! let client = DiscoveryClient::ad_hoc(ClientConfig::default(), Arc::new(channel), incoming)?;
//!
//! let criteria = FindCriteria::for_type(QualifiedName::new("urn:devices", "Printer"))
//!     .with_duration(Duration::from_secs(2));
//! for found in client.find(criteria).await?.endpoints {
//!     println!("{} at {:?}", found.endpoint.address, found.endpoint.listen_uris);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::model::{EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::sequence::DiscoveryMessageSequence;
use crate::transport::{DuplexChannel, Received, RequestReplyChannel};
use crate::wire::{ProtocolVersion, VersionRegistry, WS_DISCOVERY_11};
use crate::Result;

mod adhoc;
mod managed;
mod pending;

/// Default time a find or resolve waits for matches.
pub const DEFAULT_FIND_DURATION: Duration = Duration::from_secs(20);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Protocol version of outbound requests.
    pub version: &'static ProtocolVersion,
    /// Versions accepted on inbound responses.
    pub registry: VersionRegistry,
    /// Wait time when the criteria carry no duration.
    pub default_duration: Duration,
    /// How long a response is remembered for duplicate suppression.
    pub suppression_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: &WS_DISCOVERY_11,
            registry: VersionRegistry::new(),
            default_duration: DEFAULT_FIND_DURATION,
            suppression_window: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Set the outbound protocol version.
    pub fn version(mut self, version: &'static ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the accepted versions.
    pub fn registry(mut self, registry: VersionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the wait time used when criteria carry no duration.
    pub fn default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Set the duplicate suppression window.
    pub fn suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }
}

/// An endpoint returned by a find or resolve, with the responder's sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEndpoint {
    /// The endpoint.
    pub endpoint: EndpointDiscoveryMetadata,
    /// `AppSequence` of the response, when present.
    pub sequence: Option<DiscoveryMessageSequence>,
}

/// Progress notification from a running find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindEvent {
    /// A matching endpoint.
    Match(FoundEndpoint),
    /// A discovery proxy announced itself in response to the probe.
    ProxyAvailable(FoundEndpoint),
}

/// Result of a find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindResponse {
    /// Matching endpoints in arrival order.
    pub endpoints: Vec<FoundEndpoint>,
    /// Discovery proxies that announced themselves.
    pub proxies: Vec<FoundEndpoint>,
}

impl FindResponse {
    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Number of matching endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }
}

/// Result of a resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveResponse {
    /// The resolved endpoint, if any responder knew it.
    pub endpoint: Option<EndpointDiscoveryMetadata>,
    /// `AppSequence` of the response, when present.
    pub sequence: Option<DiscoveryMessageSequence>,
    /// Discovery proxies that announced themselves in response.
    pub proxies: Vec<FoundEndpoint>,
}

/// Operations shared by both transport modes.
#[async_trait]
pub trait InnerClient: Send + Sync + 'static {
    /// Whether requests are answered by a single reply.
    fn is_request_response(&self) -> bool;

    /// Find endpoints, reporting each match to `progress` as it arrives.
    async fn probe(
        &self,
        criteria: FindCriteria,
        progress: Option<mpsc::UnboundedSender<FindEvent>>,
    ) -> Result<FindResponse>;

    /// Resolve one endpoint by address.
    async fn resolve(&self, criteria: ResolveCriteria) -> Result<ResolveResponse>;
}

/// A WS-Discovery client.
#[derive(Clone)]
pub struct DiscoveryClient {
    inner: Arc<dyn InnerClient>,
}

impl DiscoveryClient {
    /// An ad-hoc client sending over `channel` and reading responses from
    /// `incoming`. Must be called inside a tokio runtime.
    pub fn ad_hoc(
        config: ClientConfig,
        channel: Arc<dyn DuplexChannel>,
        incoming: mpsc::Receiver<Received>,
    ) -> Result<Self> {
        config.registry.require(config.version)?;
        Ok(Self::from_inner(Arc::new(adhoc::AdHocClient::spawn(
            config, channel, incoming,
        ))))
    }

    /// A managed client talking to a discovery proxy over `channel`.
    pub fn managed(config: ClientConfig, channel: Arc<dyn RequestReplyChannel>) -> Result<Self> {
        config.registry.require(config.version)?;
        Ok(Self::from_inner(Arc::new(managed::ManagedClient::new(
            config, channel,
        ))))
    }

    /// Wrap a custom [`InnerClient`].
    pub fn from_inner(inner: Arc<dyn InnerClient>) -> Self {
        Self { inner }
    }

    /// Whether this client runs in managed mode.
    pub fn is_request_response(&self) -> bool {
        self.inner.is_request_response()
    }

    /// Find matching endpoints. Zero matches is a successful, empty response.
    pub async fn find(&self, criteria: FindCriteria) -> Result<FindResponse> {
        self.inner.probe(criteria, None).await
    }

    /// Find matching endpoints, yielding each one as it arrives.
    ///
    /// The stream ends when the find completes. Errors end the stream early
    /// and are logged.
    pub fn find_stream(&self, criteria: FindCriteria) -> impl Stream<Item = FindEvent> + Send + Unpin {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.probe(criteria, Some(tx)).await {
                tracing::warn!("streaming find failed: {e}");
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Resolve an endpoint address to its current metadata.
    pub async fn resolve(&self, criteria: ResolveCriteria) -> Result<ResolveResponse> {
        self.inner.resolve(criteria).await
    }
}
