//! Probe, Resolve and announcement operations.

use std::sync::Arc;

use async_trait::async_trait;

use super::operation::{Completion, OperationKind};
use super::{AnnouncementHandler, DiscoveryService, FindDisposition};
use crate::model::{EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::sequence::{DiscoveryMessageSequence, MessageSequenceGenerator};
use crate::transport::{DuplexChannel, Target};
use crate::wire::{DiscoveryMessage, Envelope, ProtocolVersion};
use crate::Result;

/// Where the response of an operation goes.
#[derive(Clone)]
pub(crate) enum ReplyPath {
    /// Send over the duplex channel to `target`.
    Duplex {
        channel: Arc<dyn DuplexChannel>,
        target: Target,
    },
    /// Return the response to the caller.
    RequestReply,
}

/// What every responding operation needs besides its payload.
#[derive(Clone)]
pub(crate) struct ResponseContext {
    pub(crate) version: &'static ProtocolVersion,
    pub(crate) sequence: Arc<MessageSequenceGenerator>,
    pub(crate) request_id: String,
    pub(crate) reply: ReplyPath,
}

impl ResponseContext {
    fn envelope(&self, body: DiscoveryMessage, sequence: DiscoveryMessageSequence) -> Envelope {
        Envelope::new(self.version, body)
            .with_relates_to(self.request_id.clone())
            .with_app_sequence(sequence)
    }

    /// Whether to send matches, and the proxy announcement with its sequence.
    ///
    /// The announcement is stamped ahead of the matches and sent before them.
    /// Request-reply paths never announce.
    fn plan(&self, disposition: FindDisposition) -> Result<Plan> {
        if matches!(self.reply, ReplyPath::RequestReply) {
            return Ok(Plan {
                respond: true,
                announce: None,
            });
        }
        let (respond, proxy) = match disposition {
            FindDisposition::Respond => (true, None),
            FindDisposition::Redirect(proxy) => (false, Some(proxy)),
            FindDisposition::RespondAndAnnounce(proxy) => (true, Some(proxy)),
        };
        let announce = match proxy {
            Some(proxy) => Some((proxy, self.sequence.next()?)),
            None => None,
        };
        Ok(Plan { respond, announce })
    }

    /// Send duplex responses: the optional proxy Hello first, then the matches.
    async fn send_duplex(
        &self,
        channel: &Arc<dyn DuplexChannel>,
        target: Target,
        announce: Option<(EndpointDiscoveryMetadata, DiscoveryMessageSequence)>,
        matches: Option<(DiscoveryMessage, DiscoveryMessageSequence)>,
    ) -> Result<Completion> {
        let mut sent = false;
        if let Some((proxy, sequence)) = announce {
            let hello = self.envelope(DiscoveryMessage::Hello(Some(proxy)), sequence);
            channel.send(&hello.encode(), target).await?;
            tracing::debug!(relates_to = %self.request_id, "proxy announcement sent");
            sent = true;
        }
        if let Some((body, sequence)) = matches {
            channel.send(&self.envelope(body, sequence).encode(), target).await?;
            sent = true;
        }
        Ok(if sent {
            Completion::ResponseSent
        } else {
            Completion::Suppressed
        })
    }
}

struct Plan {
    respond: bool,
    announce: Option<(EndpointDiscoveryMetadata, DiscoveryMessageSequence)>,
}

pub(crate) struct FindOutcome {
    matches: Vec<EndpointDiscoveryMetadata>,
    plan: Plan,
    sequence: DiscoveryMessageSequence,
}

pub(crate) struct FindOperation {
    pub(crate) context: ResponseContext,
    pub(crate) service: Arc<dyn DiscoveryService>,
    pub(crate) criteria: Option<FindCriteria>,
}

#[async_trait]
impl OperationKind for FindOperation {
    type Content = FindCriteria;
    type Outcome = FindOutcome;
    const NAME: &'static str = "probe";

    fn validate(&mut self) -> Option<FindCriteria> {
        self.criteria.take()
    }

    async fn dispatch(&self, criteria: &FindCriteria) -> Result<FindOutcome> {
        let disposition = self.service.find_disposition(criteria);
        let matches = match disposition {
            FindDisposition::Redirect(_) => Vec::new(),
            _ => self.service.find(criteria).await?,
        };
        tracing::debug!(matches = matches.len(), ?disposition, "probe dispatched");
        let plan = self.context.plan(disposition)?;
        let sequence = self.context.sequence.next()?;
        Ok(FindOutcome {
            matches,
            plan,
            sequence,
        })
    }

    async fn respond(&self, criteria: FindCriteria, outcome: FindOutcome) -> Result<Completion> {
        let FindOutcome {
            mut matches,
            plan,
            sequence,
        } = outcome;
        if let Some(max) = criteria.max_results {
            matches.truncate(max as usize);
        }

        match &self.context.reply {
            ReplyPath::RequestReply => Ok(Completion::Replied(
                self.context
                    .envelope(DiscoveryMessage::ProbeMatches(matches), sequence),
            )),
            ReplyPath::Duplex { channel, target } => {
                let matches = (plan.respond && !matches.is_empty())
                    .then(|| (DiscoveryMessage::ProbeMatches(matches), sequence));
                self.context
                    .send_duplex(channel, *target, plan.announce, matches)
                    .await
            }
        }
    }
}

pub(crate) struct ResolveOutcome {
    found: Option<EndpointDiscoveryMetadata>,
    plan: Plan,
    sequence: DiscoveryMessageSequence,
}

pub(crate) struct ResolveOperation {
    pub(crate) context: ResponseContext,
    pub(crate) service: Arc<dyn DiscoveryService>,
    pub(crate) criteria: Option<ResolveCriteria>,
}

#[async_trait]
impl OperationKind for ResolveOperation {
    type Content = ResolveCriteria;
    type Outcome = ResolveOutcome;
    const NAME: &'static str = "resolve";

    fn validate(&mut self) -> Option<ResolveCriteria> {
        self.criteria.take()
    }

    async fn dispatch(&self, criteria: &ResolveCriteria) -> Result<ResolveOutcome> {
        let disposition = self.service.resolve_disposition(criteria);
        let found = match disposition {
            FindDisposition::Redirect(_) => None,
            _ => self.service.resolve(criteria).await?,
        };
        tracing::debug!(address = %criteria.address, found = found.is_some(), ?disposition, "resolve dispatched");
        let plan = self.context.plan(disposition)?;
        let sequence = self.context.sequence.next()?;
        Ok(ResolveOutcome {
            found,
            plan,
            sequence,
        })
    }

    async fn respond(&self, _criteria: ResolveCriteria, outcome: ResolveOutcome) -> Result<Completion> {
        let ResolveOutcome {
            found,
            plan,
            sequence,
        } = outcome;

        match &self.context.reply {
            ReplyPath::RequestReply => Ok(Completion::Replied(
                self.context
                    .envelope(DiscoveryMessage::ResolveMatches(found), sequence),
            )),
            ReplyPath::Duplex { channel, target } => {
                let matches = found
                    .filter(|_| plan.respond)
                    .map(|found| (DiscoveryMessage::ResolveMatches(Some(found)), sequence));
                self.context
                    .send_duplex(channel, *target, plan.announce, matches)
                    .await
            }
        }
    }
}

pub(crate) struct AnnouncementOperation {
    pub(crate) handler: Arc<dyn AnnouncementHandler>,
    pub(crate) online: bool,
    pub(crate) sequence: Option<DiscoveryMessageSequence>,
    pub(crate) metadata: Option<EndpointDiscoveryMetadata>,
}

#[async_trait]
impl OperationKind for AnnouncementOperation {
    type Content = EndpointDiscoveryMetadata;
    type Outcome = ();
    const NAME: &'static str = "announcement";

    fn validate(&mut self) -> Option<EndpointDiscoveryMetadata> {
        self.metadata.take()
    }

    async fn dispatch(&self, metadata: &EndpointDiscoveryMetadata) -> Result<()> {
        if self.online {
            self.handler.on_hello(self.sequence.as_ref(), metadata).await
        } else {
            self.handler.on_bye(self.sequence.as_ref(), metadata).await
        }
    }

    async fn respond(&self, _metadata: EndpointDiscoveryMetadata, _outcome: ()) -> Result<Completion> {
        Ok(Completion::Handled)
    }
}
