//! Outbound Hello and Bye.

use std::sync::Arc;

use crate::model::EndpointDiscoveryMetadata;
use crate::sequence::MessageSequenceGenerator;
use crate::transport::{DuplexChannel, Target};
use crate::wire::{DiscoveryMessage, Envelope, ProtocolVersion};
use crate::Result;

/// Multicasts online and offline announcements, stamped with the sender's sequence.
#[derive(Clone)]
pub struct AnnouncementClient {
    version: &'static ProtocolVersion,
    channel: Arc<dyn DuplexChannel>,
    sequence: Arc<MessageSequenceGenerator>,
}

impl AnnouncementClient {
    /// Announce over `channel` using `sequence` for message numbers.
    pub fn new(
        version: &'static ProtocolVersion,
        channel: Arc<dyn DuplexChannel>,
        sequence: Arc<MessageSequenceGenerator>,
    ) -> Self {
        Self {
            version,
            channel,
            sequence,
        }
    }

    /// Send Hello for `endpoint`.
    pub async fn announce_online(&self, endpoint: &EndpointDiscoveryMetadata) -> Result<()> {
        self.announce(DiscoveryMessage::Hello(Some(endpoint.clone())))
            .await
    }

    /// Send Bye for `endpoint`.
    pub async fn announce_offline(&self, endpoint: &EndpointDiscoveryMetadata) -> Result<()> {
        self.announce(DiscoveryMessage::Bye(Some(endpoint.clone())))
            .await
    }

    async fn announce(&self, body: DiscoveryMessage) -> Result<()> {
        let sequence = self.sequence.next()?;
        let message_number = sequence.message_number;
        let envelope = Envelope::new(self.version, body).with_app_sequence(sequence);
        self.channel
            .send(&envelope.encode(), Target::Multicast)
            .await?;
        tracing::debug!(
            kind = ?envelope.kind(),
            message_id = %envelope.headers.message_id,
            message_number,
            "announcement sent"
        );
        Ok(())
    }
}
