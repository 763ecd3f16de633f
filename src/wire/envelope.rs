//! SOAP 1.2 envelopes carrying discovery messages.

use roxmltree::{Document, Node};
use uuid::Uuid;

use super::codec::WireCodec;
use super::registry::VersionRegistry;
use super::version::{MessageKind, ProtocolVersion, SOAP_ENVELOPE_NS};
use super::xml::{self, XmlWriter};
use crate::model::{EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::sequence::DiscoveryMessageSequence;
use crate::{Error, Result};

/// A fresh `urn:uuid:` message identifier.
pub fn new_message_id() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// WS-Addressing and discovery headers of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Action URI; identifies version and message kind.
    pub action: String,
    /// Unique id of this message.
    pub message_id: String,
    /// Id of the request this message answers.
    pub relates_to: Option<String>,
    /// Destination.
    pub to: Option<String>,
    /// Where replies should be sent.
    pub reply_to: Option<String>,
    /// Sender's message sequence.
    pub app_sequence: Option<DiscoveryMessageSequence>,
}

/// Body of a discovery message. Request payloads are optional so that a
/// message with a missing body element still decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// Probe.
    Probe(Option<FindCriteria>),
    /// ProbeMatches.
    ProbeMatches(Vec<EndpointDiscoveryMetadata>),
    /// Resolve.
    Resolve(Option<ResolveCriteria>),
    /// ResolveMatches.
    ResolveMatches(Option<EndpointDiscoveryMetadata>),
    /// Hello.
    Hello(Option<EndpointDiscoveryMetadata>),
    /// Bye.
    Bye(Option<EndpointDiscoveryMetadata>),
}

impl DiscoveryMessage {
    /// The message kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            DiscoveryMessage::Probe(_) => MessageKind::Probe,
            DiscoveryMessage::ProbeMatches(_) => MessageKind::ProbeMatches,
            DiscoveryMessage::Resolve(_) => MessageKind::Resolve,
            DiscoveryMessage::ResolveMatches(_) => MessageKind::ResolveMatches,
            DiscoveryMessage::Hello(_) => MessageKind::Hello,
            DiscoveryMessage::Bye(_) => MessageKind::Bye,
        }
    }
}

/// A complete discovery message for one protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Protocol version of the message.
    pub version: &'static ProtocolVersion,
    /// Message headers.
    pub headers: MessageHeaders,
    /// Message body.
    pub body: DiscoveryMessage,
}

impl Envelope {
    /// A new message with a fresh id. Announcements and requests are
    /// addressed to the multicast URN, responses to the anonymous address.
    pub fn new(version: &'static ProtocolVersion, body: DiscoveryMessage) -> Self {
        let kind = body.kind();
        let to = match kind {
            MessageKind::ProbeMatches | MessageKind::ResolveMatches => version.anonymous_address,
            _ => version.multicast_address,
        };
        Self {
            version,
            headers: MessageHeaders {
                action: version.action(kind).to_string(),
                message_id: new_message_id(),
                relates_to: None,
                to: Some(to.to_string()),
                reply_to: None,
                app_sequence: None,
            },
            body,
        }
    }

    /// Mark the message as a response to `message_id`.
    pub fn with_relates_to(mut self, message_id: impl Into<String>) -> Self {
        self.headers.relates_to = Some(message_id.into());
        self
    }

    /// Override the destination.
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.headers.to = Some(to.into());
        self
    }

    /// Ask for replies at `address`.
    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.headers.reply_to = Some(address.into());
        self
    }

    /// Stamp the sender's message sequence.
    pub fn with_app_sequence(mut self, sequence: DiscoveryMessageSequence) -> Self {
        self.headers.app_sequence = Some(sequence);
        self
    }

    /// The message kind.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Serialize to XML text.
    pub fn encode(&self) -> String {
        let codec = WireCodec::new(self.version);
        let mut attrs = vec![("xmlns:s", SOAP_ENVELOPE_NS)];
        attrs.extend(codec.namespace_declarations());

        let mut w = XmlWriter::new();
        w.open("s:Envelope", &attrs);
        w.open("s:Header", &[]);
        w.element("wsa:Action", &[], &self.headers.action);
        w.element("wsa:MessageID", &[], &self.headers.message_id);
        if let Some(relates_to) = &self.headers.relates_to {
            w.element("wsa:RelatesTo", &[], relates_to);
        }
        if let Some(to) = &self.headers.to {
            w.element("wsa:To", &[], to);
        }
        if let Some(reply_to) = &self.headers.reply_to {
            w.open("wsa:ReplyTo", &[]);
            w.element("wsa:Address", &[], reply_to);
            w.close("wsa:ReplyTo");
        }
        if let Some(sequence) = &self.headers.app_sequence {
            let instance_id = sequence.instance_id.to_string();
            let message_number = sequence.message_number.to_string();
            let mut seq_attrs = vec![("InstanceId", instance_id.as_str())];
            if let Some(sequence_id) = &sequence.sequence_id {
                seq_attrs.push(("SequenceId", sequence_id.as_str()));
            }
            seq_attrs.push(("MessageNumber", message_number.as_str()));
            w.empty("d:AppSequence", &seq_attrs);
        }
        w.close("s:Header");
        w.open("s:Body", &[]);
        codec.write_body(&mut w, &self.body);
        w.close("s:Body");
        w.close("s:Envelope");
        w.finish()
    }

    /// Parse XML text, identifying the version from the Action header.
    pub fn decode(registry: &VersionRegistry, text: &str) -> Result<Self> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();
        if !xml::is(root, SOAP_ENVELOPE_NS, "Envelope") {
            return Err(Error::malformed("not a SOAP 1.2 envelope"));
        }
        let header = xml::child(root, SOAP_ENVELOPE_NS, "Header")
            .ok_or_else(|| Error::malformed("envelope without Header"))?;

        let action = header
            .children()
            .find(|c| c.is_element() && c.tag_name().name() == "Action")
            .map(xml::text)
            .ok_or_else(|| Error::malformed("message without Action"))?;
        let (version, kind) = registry
            .identify(action)
            .ok_or_else(|| Error::UnsupportedAction(action.to_string()))?;

        let wsa = version.addressing_namespace;
        let header_text = |local: &str| xml::child(header, wsa, local).map(|n| xml::text(n).to_string());
        let message_id = header_text("MessageID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::malformed("message without MessageID"))?;
        let reply_to = xml::child(header, wsa, "ReplyTo")
            .and_then(|r| xml::child(r, wsa, "Address"))
            .map(|a| xml::text(a).to_string());
        let app_sequence = xml::child(header, version.discovery_namespace, "AppSequence")
            .map(read_app_sequence)
            .transpose()?;

        let body = xml::child(root, SOAP_ENVELOPE_NS, "Body")
            .ok_or_else(|| Error::malformed("envelope without Body"))?;
        let body = WireCodec::new(version).read_body(kind, body)?;

        Ok(Self {
            version,
            headers: MessageHeaders {
                action: action.to_string(),
                message_id,
                relates_to: header_text("RelatesTo"),
                to: header_text("To"),
                reply_to,
                app_sequence,
            },
            body,
        })
    }
}

fn read_app_sequence(node: Node<'_, '_>) -> Result<DiscoveryMessageSequence> {
    let number = |name: &str| -> Result<u64> {
        let value = node
            .attribute(name)
            .ok_or_else(|| Error::malformed(format!("AppSequence without {name}")))?;
        value
            .trim()
            .parse()
            .map_err(|_| Error::malformed(format!("invalid AppSequence {name}: {value:?}")))
    };
    Ok(DiscoveryMessageSequence {
        instance_id: number("InstanceId")?,
        sequence_id: node.attribute("SequenceId").map(str::to_string),
        message_number: number("MessageNumber")?,
    })
}
