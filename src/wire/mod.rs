//! Wire formats.
//!
//! Every protocol version shares one codec, parameterized by a static
//! [`ProtocolVersion`] descriptor. A [`VersionRegistry`] lists the versions a
//! client or host accepts and identifies inbound messages by their Action.

mod codec;
mod duration;
mod envelope;
mod registry;
mod schema;
mod version;
pub(crate) mod xml;

pub use codec::WireCodec;
pub use envelope::{new_message_id, DiscoveryMessage, Envelope, MessageHeaders};
pub use registry::VersionRegistry;
pub use schema::SchemaSet;
pub use version::{
    ActionUris, MessageKind, ProtocolVersion, ScopeMatchUris, DISCOVERY_EXTENSIONS_NS,
    SOAP_ENVELOPE_NS, WS_DISCOVERY_11, WS_DISCOVERY_APRIL_2005, WS_DISCOVERY_CD1,
};
