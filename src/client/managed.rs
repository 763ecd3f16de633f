//! Managed (request-response) client, typically talking to a discovery proxy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::{ClientConfig, FindEvent, FindResponse, FoundEndpoint, InnerClient, ResolveResponse};
use crate::model::{FindCriteria, ResolveCriteria};
use crate::transport::RequestReplyChannel;
use crate::wire::{DiscoveryMessage, Envelope};
use crate::{Error, Result};

pub(crate) struct ManagedClient {
    config: ClientConfig,
    channel: Arc<dyn RequestReplyChannel>,
}

impl ManagedClient {
    pub(crate) fn new(config: ClientConfig, channel: Arc<dyn RequestReplyChannel>) -> Self {
        Self { config, channel }
    }

    /// Send a request and decode the reply. An absent reply is not an error.
    async fn call(&self, request: Envelope, duration: Duration) -> Result<Option<Envelope>> {
        let message_id = request.headers.message_id.clone();
        let reply = tokio::time::timeout(duration, self.channel.request(request.encode()))
            .await
            .map_err(|_| Error::Timeout)??;
        let Some(reply) = reply else {
            tracing::debug!("no reply");
            return Ok(None);
        };

        let reply = Envelope::decode(&self.config.registry, &reply)?;
        if reply.headers.relates_to.as_deref() != Some(message_id.as_str()) {
            tracing::debug!(relates_to = ?reply.headers.relates_to, "reply does not relate to request");
        }
        if reply.headers.app_sequence.is_none() {
            tracing::warn!(message_id = %reply.headers.message_id, "response without AppSequence");
        }
        Ok(Some(reply))
    }
}

#[async_trait]
impl InnerClient for ManagedClient {
    fn is_request_response(&self) -> bool {
        true
    }

    async fn probe(
        &self,
        criteria: FindCriteria,
        progress: Option<mpsc::UnboundedSender<FindEvent>>,
    ) -> Result<FindResponse> {
        let duration = criteria.duration.unwrap_or(self.config.default_duration);
        let request = Envelope::new(self.config.version, DiscoveryMessage::Probe(Some(criteria)));
        let span = tracing::debug_span!("managed_probe", message_id = %request.headers.message_id);

        async move {
            let Some(reply) = self.call(request, duration).await? else {
                return Ok(FindResponse::default());
            };
            let sequence = reply.headers.app_sequence;
            let matches = match reply.body {
                DiscoveryMessage::ProbeMatches(matches) => matches,
                other => {
                    return Err(Error::malformed(format!(
                        "expected ProbeMatches, got {:?}",
                        other.kind()
                    )))
                }
            };

            let mut response = FindResponse::default();
            for endpoint in matches {
                let found = FoundEndpoint {
                    endpoint,
                    sequence: sequence.clone(),
                };
                if let Some(progress) = &progress {
                    let _ = progress.send(FindEvent::Match(found.clone()));
                }
                response.endpoints.push(found);
            }
            tracing::debug!(found = response.endpoints.len(), "probe answered");
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn resolve(&self, criteria: ResolveCriteria) -> Result<ResolveResponse> {
        let duration = criteria.duration.unwrap_or(self.config.default_duration);
        let request = Envelope::new(self.config.version, DiscoveryMessage::Resolve(Some(criteria)));
        let span =
            tracing::debug_span!("managed_resolve", message_id = %request.headers.message_id);

        async move {
            let Some(reply) = self.call(request, duration).await? else {
                return Ok(ResolveResponse::default());
            };
            match reply.body {
                DiscoveryMessage::ResolveMatches(endpoint) => Ok(ResolveResponse {
                    endpoint,
                    sequence: reply.headers.app_sequence,
                    proxies: Vec::new(),
                }),
                other => Err(Error::malformed(format!(
                    "expected ResolveMatches, got {:?}",
                    other.kind()
                ))),
            }
        }
        .instrument(span)
        .await
    }
}
