//! Version-independent discovery model.
//!
//! These types describe what is being searched for and what is advertised,
//! independent of the protocol version used on the wire. The [`wire`](crate::wire)
//! module maps them to each version's XML.

pub mod criteria;
pub mod metadata;
mod scope;

pub use criteria::{FindCriteria, ResolveCriteria, ScopeMatchBy};
pub use metadata::{EndpointAddress, EndpointDiscoveryMetadata, QualifiedName};
