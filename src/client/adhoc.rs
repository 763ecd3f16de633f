//! Ad-hoc (multicast) client.
//!
//! Requests are multicast one-way. A dispatcher task decodes everything that
//! arrives on the inbound receiver and routes matches to the waiting request
//! by `RelatesTo`. Retransmitted datagrams are dropped by MessageID and
//! repeated matches by `AppSequence` and endpoint address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::pending::{Correlated, PendingMode, PendingOperations};
use super::{ClientConfig, FindEvent, FindResponse, FoundEndpoint, InnerClient, ResolveResponse};
use crate::model::{EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::suppression::{MulticastSuppressor, ResponseKey};
use crate::transport::{DuplexChannel, Received, Target};
use crate::wire::{DiscoveryMessage, Envelope, VersionRegistry};
use crate::Result;

pub(crate) struct AdHocClient {
    config: ClientConfig,
    channel: Arc<dyn DuplexChannel>,
    pending: Arc<PendingOperations>,
    dispatcher: JoinHandle<()>,
}

impl AdHocClient {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    pub(crate) fn spawn(
        config: ClientConfig,
        channel: Arc<dyn DuplexChannel>,
        incoming: mpsc::Receiver<Received>,
    ) -> Self {
        let pending = Arc::new(PendingOperations::default());
        let dispatcher = tokio::spawn(
            dispatch_loop(
                config.registry.clone(),
                pending.clone(),
                Duplicates::new(config.suppression_window),
                incoming,
            )
            .instrument(tracing::debug_span!("client_dispatcher", version = config.version.name)),
        );
        Self {
            config,
            channel,
            pending,
            dispatcher,
        }
    }
}

impl Drop for AdHocClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

struct Duplicates {
    messages: MulticastSuppressor<String>,
    responses: MulticastSuppressor<ResponseKey>,
}

impl Duplicates {
    fn new(window: Duration) -> Self {
        Self {
            messages: MulticastSuppressor::new(window),
            responses: MulticastSuppressor::new(window),
        }
    }
}

async fn dispatch_loop(
    registry: VersionRegistry,
    pending: Arc<PendingOperations>,
    duplicates: Duplicates,
    mut incoming: mpsc::Receiver<Received>,
) {
    while let Some(received) = incoming.recv().await {
        let span = tracing::trace_span!("client_recv", from = %received.from);
        span.in_scope(|| route(&registry, &pending, &duplicates, &received));
    }
    tracing::debug!("inbound channel closed, dispatcher stopping");
}

fn route(
    registry: &VersionRegistry,
    pending: &PendingOperations,
    duplicates: &Duplicates,
    received: &Received,
) {
    let envelope = match Envelope::decode(registry, &received.message) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "dropping undecodable message");
            return;
        }
    };
    let Some(relates_to) = envelope.headers.relates_to.as_deref() else {
        tracing::trace!(kind = ?envelope.kind(), "ignoring uncorrelated message");
        return;
    };
    if duplicates
        .messages
        .should_suppress(envelope.headers.message_id.clone())
    {
        tracing::debug!(message_id = %envelope.headers.message_id, "dropping retransmission");
        return;
    }

    let sequence = envelope.headers.app_sequence.clone();
    let wrap: fn(FoundEndpoint) -> Correlated;
    let endpoints: Vec<EndpointDiscoveryMetadata> = match envelope.body {
        DiscoveryMessage::ProbeMatches(matches) => {
            wrap = Correlated::ProbeMatch;
            matches
        }
        DiscoveryMessage::ResolveMatches(found) => {
            wrap = Correlated::ResolveMatch;
            found.into_iter().collect()
        }
        DiscoveryMessage::Hello(proxy) => {
            wrap = Correlated::Proxy;
            proxy.into_iter().collect()
        }
        other => {
            tracing::trace!(kind = ?other.kind(), "ignoring request on client channel");
            return;
        }
    };

    if sequence.is_none() {
        tracing::warn!(
            message_id = %envelope.headers.message_id,
            relates_to,
            "response without AppSequence"
        );
    }

    for endpoint in endpoints {
        if let Some(sequence) = &sequence {
            let key = ResponseKey::new(sequence.clone(), endpoint.address.as_str());
            if duplicates.responses.should_suppress(key) {
                tracing::debug!(address = %endpoint.address, "suppressed duplicate response");
                continue;
            }
        }
        let found = FoundEndpoint {
            endpoint,
            sequence: sequence.clone(),
        };
        if !pending.dispatch(relates_to, wrap(found)) {
            tracing::trace!(relates_to, "no pending operation for response");
        }
    }
}

#[async_trait]
impl InnerClient for AdHocClient {
    fn is_request_response(&self) -> bool {
        false
    }

    async fn probe(
        &self,
        criteria: FindCriteria,
        progress: Option<mpsc::UnboundedSender<FindEvent>>,
    ) -> Result<FindResponse> {
        let duration = criteria.duration.unwrap_or(self.config.default_duration);
        let max_results = criteria.max_results.map(|max| max as usize);
        let envelope = Envelope::new(self.config.version, DiscoveryMessage::Probe(Some(criteria)));
        let message_id = envelope.headers.message_id.clone();
        let (_guard, mut responses) = self.pending.register(message_id.clone(), PendingMode::Find);

        let span = tracing::debug_span!("probe", message_id = %message_id, ?duration);
        async move {
            self.channel.send(&envelope.encode(), Target::Multicast).await?;

            let mut response = FindResponse::default();
            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);
            loop {
                if max_results.is_some_and(|max| response.endpoints.len() >= max) {
                    tracing::debug!("max results reached");
                    break;
                }
                tokio::select! {
                    _ = &mut deadline => {
                        tracing::debug!(found = response.endpoints.len(), "probe duration elapsed");
                        break;
                    }
                    next = responses.recv() => match next {
                        Some(Correlated::ProbeMatch(found)) => {
                            if let Some(progress) = &progress {
                                let _ = progress.send(FindEvent::Match(found.clone()));
                            }
                            response.endpoints.push(found);
                        }
                        Some(Correlated::Proxy(found)) => {
                            if let Some(progress) = &progress {
                                let _ = progress.send(FindEvent::ProxyAvailable(found.clone()));
                            }
                            response.proxies.push(found);
                        }
                        Some(Correlated::ResolveMatch(_)) => {}
                        None => break,
                    }
                }
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn resolve(&self, criteria: ResolveCriteria) -> Result<ResolveResponse> {
        let duration = criteria.duration.unwrap_or(self.config.default_duration);
        let envelope =
            Envelope::new(self.config.version, DiscoveryMessage::Resolve(Some(criteria)));
        let message_id = envelope.headers.message_id.clone();
        let (_guard, mut responses) =
            self.pending.register(message_id.clone(), PendingMode::Resolve);

        let span = tracing::debug_span!("resolve", message_id = %message_id, ?duration);
        async move {
            self.channel.send(&envelope.encode(), Target::Multicast).await?;

            let mut response = ResolveResponse::default();
            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        tracing::debug!(proxies = response.proxies.len(), "resolve duration elapsed without match");
                        return Ok(response);
                    }
                    next = responses.recv() => match next {
                        Some(Correlated::ResolveMatch(found)) => {
                            response.endpoint = Some(found.endpoint);
                            response.sequence = found.sequence;
                            return Ok(response);
                        }
                        Some(Correlated::Proxy(found)) => response.proxies.push(found),
                        Some(Correlated::ProbeMatch(_)) => {}
                        None => return Ok(response),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
