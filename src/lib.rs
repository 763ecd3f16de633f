//! WS-Discovery protocol engine.
//!
//! Target services announce themselves with Hello and Bye, clients find them
//! with Probe (by type and scope) and Resolve (by endpoint address). Both sides
//! work in ad-hoc mode (multicast, responses correlated by `RelatesTo`) and in
//! managed mode (request-response with a discovery proxy), over any of the
//! registered protocol versions.
//!
//! - [`model`]: version-independent criteria and endpoint metadata
//! - [`wire`]: protocol version descriptors, XML codec and SOAP envelopes
//! - [`client`]: ad-hoc and managed discovery clients
//! - [`service`]: the operation engine, service host and endpoint catalog
//! - [`transport`]: duplex and request-reply channels (in-memory, UDP)

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod model;
pub mod sequence;
pub mod service;
pub mod suppression;
pub mod transport;
pub mod wire;

// Re-export key types
pub use client::{ClientConfig, DiscoveryClient, FindEvent, FindResponse, FoundEndpoint, ResolveResponse};
pub use error::{Error, Result};
pub use model::{
    EndpointAddress, EndpointDiscoveryMetadata, FindCriteria, QualifiedName, ResolveCriteria,
    ScopeMatchBy,
};
pub use sequence::{DiscoveryMessageSequence, MessageSequenceGenerator};
pub use service::{
    AnnouncementClient, AnnouncementHandler, DiscoveryService, EndpointCatalog, FindDisposition,
    ServiceConfig, ServiceHost,
};
pub use suppression::MulticastSuppressor;
pub use wire::{ProtocolVersion, VersionRegistry, WS_DISCOVERY_11, WS_DISCOVERY_APRIL_2005, WS_DISCOVERY_CD1};
