//! Service host: inbound message processing and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::announcement::AnnouncementClient;
use super::operation::{CancellationFlag, Completion, Operation, OperationHandle};
use super::operations::{
    AnnouncementOperation, FindOperation, ReplyPath, ResolveOperation, ResponseContext,
};
use super::{AnnouncementHandler, DiscoveryService};
use crate::model::EndpointDiscoveryMetadata;
use crate::sequence::{DiscoveryMessageSequence, MessageSequenceGenerator};
use crate::suppression::MulticastSuppressor;
use crate::transport::{DuplexChannel, Received, Target};
use crate::wire::{DiscoveryMessage, Envelope, ProtocolVersion, VersionRegistry, WS_DISCOVERY_11};
use crate::Result;

/// Service host configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Protocol version of announcements.
    pub version: &'static ProtocolVersion,
    /// Versions accepted on inbound messages. Responses use the request's version.
    pub registry: VersionRegistry,
    /// How long inbound MessageIDs are remembered to drop retransmissions.
    pub duplicate_window: Duration,
    /// Endpoints announced with Hello when serving starts and Bye when it stops.
    pub announced_endpoints: Vec<EndpointDiscoveryMetadata>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: &WS_DISCOVERY_11,
            registry: VersionRegistry::new(),
            duplicate_window: Duration::from_secs(10),
            announced_endpoints: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Set the announcement version.
    pub fn version(mut self, version: &'static ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the accepted versions.
    pub fn registry(mut self, registry: VersionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the inbound duplicate window.
    pub fn duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    /// Announce an endpoint while serving.
    pub fn announce(mut self, endpoint: EndpointDiscoveryMetadata) -> Self {
        self.announced_endpoints.push(endpoint);
        self
    }
}

/// Builder for [`ServiceHost`].
pub struct ServiceHostBuilder {
    config: ServiceConfig,
    discovery: Option<Arc<dyn DiscoveryService>>,
    announcements: Option<Arc<dyn AnnouncementHandler>>,
    sequence: Option<Arc<MessageSequenceGenerator>>,
}

impl ServiceHostBuilder {
    /// Answer Probe and Resolve with `service`.
    pub fn discovery_service(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.discovery = Some(service);
        self
    }

    /// Deliver Hello and Bye to `handler`.
    pub fn announcement_handler(mut self, handler: Arc<dyn AnnouncementHandler>) -> Self {
        self.announcements = Some(handler);
        self
    }

    /// Use a specific sequence generator (for example, one with a persisted instance id).
    pub fn sequence_generator(mut self, sequence: Arc<MessageSequenceGenerator>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Build the host. Fails if the configured version is not registered.
    pub fn build(self) -> Result<ServiceHost> {
        self.config.registry.require(self.config.version)?;
        let duplicates = MulticastSuppressor::new(self.config.duplicate_window);
        Ok(ServiceHost {
            discovery: self.discovery,
            announcements: self.announcements,
            sequence: self
                .sequence
                .unwrap_or_else(|| Arc::new(MessageSequenceGenerator::new())),
            duplicates,
            config: self.config,
        })
    }
}

/// Runs discovery operations for inbound messages.
pub struct ServiceHost {
    config: ServiceConfig,
    discovery: Option<Arc<dyn DiscoveryService>>,
    announcements: Option<Arc<dyn AnnouncementHandler>>,
    sequence: Arc<MessageSequenceGenerator>,
    duplicates: MulticastSuppressor<String>,
}

impl ServiceHost {
    /// Start building a host.
    pub fn builder(config: ServiceConfig) -> ServiceHostBuilder {
        ServiceHostBuilder {
            config,
            discovery: None,
            announcements: None,
            sequence: None,
        }
    }

    /// The host configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The generator stamping outbound messages.
    pub fn sequence(&self) -> &Arc<MessageSequenceGenerator> {
        &self.sequence
    }

    fn decode(&self, text: &str) -> Option<Envelope> {
        match Envelope::decode(&self.config.registry, text) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable message");
                None
            }
        }
    }

    /// Answer a request-reply message. Returns the encoded response, if any.
    pub async fn handle_request(&self, text: &str) -> Result<Option<String>> {
        let Some(envelope) = self.decode(text) else {
            return Ok(None);
        };
        let span = tracing::debug_span!("discovery_request", message_id = %envelope.headers.message_id);
        let completion = self
            .execute(envelope, ReplyPath::RequestReply, CancellationFlag::default())
            .instrument(span)
            .await?;
        Ok(match completion {
            Completion::Replied(reply) => Some(reply.encode()),
            _ => None,
        })
    }

    /// Process one datagram received over `channel`. Responses go back to the sender.
    pub async fn process(
        &self,
        channel: &Arc<dyn DuplexChannel>,
        received: Received,
    ) -> Result<Completion> {
        self.process_with(channel, received, CancellationFlag::default())
            .await
    }

    /// Process one datagram on a new task.
    pub fn spawn_process(
        self: &Arc<Self>,
        channel: Arc<dyn DuplexChannel>,
        received: Received,
    ) -> OperationHandle {
        let cancel = CancellationFlag::default();
        let host = self.clone();
        let flag = cancel.clone();
        let task = tokio::spawn(async move {
            let result = host.process_with(&channel, received, flag).await;
            if let Err(e) = &result {
                tracing::error!("discovery operation failed: {e}");
            }
            result
        });
        OperationHandle::new(cancel, task)
    }

    async fn process_with(
        &self,
        channel: &Arc<dyn DuplexChannel>,
        received: Received,
        cancel: CancellationFlag,
    ) -> Result<Completion> {
        let span = tracing::debug_span!("discovery_message", from = %received.from);
        async move {
            let Some(envelope) = self.decode(&received.message) else {
                return Ok(Completion::Dropped);
            };
            if self
                .duplicates
                .should_suppress(envelope.headers.message_id.clone())
            {
                tracing::debug!(message_id = %envelope.headers.message_id, "dropping retransmission");
                return Ok(Completion::Dropped);
            }
            let reply = ReplyPath::Duplex {
                channel: channel.clone(),
                target: Target::Peer(received.from),
            };
            self.execute(envelope, reply, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        envelope: Envelope,
        reply: ReplyPath,
        cancel: CancellationFlag,
    ) -> Result<Completion> {
        let message_id = envelope.headers.message_id;
        let context = ResponseContext {
            version: envelope.version,
            sequence: self.sequence.clone(),
            request_id: message_id.clone(),
            reply,
        };
        let sequence = envelope.headers.app_sequence;

        match envelope.body {
            DiscoveryMessage::Probe(criteria) => {
                let Some(service) = self.discovery.clone() else {
                    tracing::trace!("no discovery service, ignoring Probe");
                    return Ok(Completion::Dropped);
                };
                let kind = FindOperation {
                    context,
                    service,
                    criteria,
                };
                Operation::new(kind, message_id, cancel).run().await
            }
            DiscoveryMessage::Resolve(criteria) => {
                let Some(service) = self.discovery.clone() else {
                    tracing::trace!("no discovery service, ignoring Resolve");
                    return Ok(Completion::Dropped);
                };
                let kind = ResolveOperation {
                    context,
                    service,
                    criteria,
                };
                Operation::new(kind, message_id, cancel).run().await
            }
            DiscoveryMessage::Hello(metadata) => {
                self.announce(true, sequence, metadata, message_id, cancel)
                    .await
            }
            DiscoveryMessage::Bye(metadata) => {
                self.announce(false, sequence, metadata, message_id, cancel)
                    .await
            }
            DiscoveryMessage::ProbeMatches(_) | DiscoveryMessage::ResolveMatches(_) => {
                tracing::trace!("ignoring response on service channel");
                Ok(Completion::Dropped)
            }
        }
    }

    async fn announce(
        &self,
        online: bool,
        sequence: Option<DiscoveryMessageSequence>,
        metadata: Option<EndpointDiscoveryMetadata>,
        message_id: String,
        cancel: CancellationFlag,
    ) -> Result<Completion> {
        let Some(handler) = self.announcements.clone() else {
            tracing::trace!("no announcement handler, ignoring announcement");
            return Ok(Completion::Dropped);
        };
        if sequence.is_none() {
            tracing::warn!(%message_id, "announcement without AppSequence");
        }
        let kind = AnnouncementOperation {
            handler,
            online,
            sequence,
            metadata,
        };
        Operation::new(kind, message_id, cancel).run().await
    }

    /// Announce the configured endpoints and process inbound traffic until
    /// the returned guard is shut down, then announce their departure.
    pub async fn serve(
        self: &Arc<Self>,
        channel: Arc<dyn DuplexChannel>,
        mut incoming: mpsc::Receiver<Received>,
    ) -> Result<ServiceGuard> {
        let announcer =
            AnnouncementClient::new(self.config.version, channel.clone(), self.sequence.clone());
        for endpoint in &self.config.announced_endpoints {
            announcer.announce_online(endpoint).await?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let host = self.clone();
        let span = tracing::debug_span!("service_host", version = self.config.version.name);
        let handle = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("service host received shutdown signal");
                            break;
                        }
                        next = incoming.recv() => match next {
                            Some(received) => {
                                host.spawn_process(channel.clone(), received);
                            }
                            None => {
                                tracing::debug!("inbound channel closed");
                                break;
                            }
                        }
                    }
                }
                for endpoint in &host.config.announced_endpoints {
                    if let Err(e) = announcer.announce_offline(endpoint).await {
                        tracing::error!("failed to send Bye: {e}");
                    }
                }
            }
            .instrument(span),
        );

        Ok(ServiceGuard {
            shutdown_tx,
            handle: Some(handle),
        })
    }
}

/// Guard for a serving host.
///
/// Dropping it signals the serve loop to stop; [`shutdown`](Self::shutdown)
/// also waits for the Bye announcements to go out.
pub struct ServiceGuard {
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceGuard {
    /// Graceful shutdown.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
