//! Target-service side of discovery.
//!
//! A [`ServiceHost`] decodes inbound messages, runs each one as an
//! independent operation and hands the payload to the collaborators:
//!
//! - [`DiscoveryService`] answers Probe and Resolve;
//! - [`AnnouncementHandler`] receives Hello and Bye from other endpoints.
//!
//! [`EndpointCatalog`] implements both over an in-memory table.

use async_trait::async_trait;

use crate::model::{EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::sequence::DiscoveryMessageSequence;
use crate::Result;

mod announcement;
mod catalog;
mod host;
mod operation;
mod operations;

pub use announcement::AnnouncementClient;
pub use catalog::EndpointCatalog;
pub use host::{ServiceConfig, ServiceGuard, ServiceHost, ServiceHostBuilder};
pub use operation::{CancellationFlag, Completion, OperationHandle, OperationState};

/// What a duplex Probe or Resolve should send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FindDisposition {
    /// Send the matches, if any.
    #[default]
    Respond,
    /// Do not answer; announce the given discovery proxy instead.
    Redirect(EndpointDiscoveryMetadata),
    /// Send the matches and announce the given discovery proxy.
    RespondAndAnnounce(EndpointDiscoveryMetadata),
}

/// Answers Probe and Resolve requests.
#[async_trait]
pub trait DiscoveryService: Send + Sync + 'static {
    /// Endpoints matching the criteria.
    async fn find(&self, criteria: &FindCriteria) -> Result<Vec<EndpointDiscoveryMetadata>>;

    /// The endpoint with the requested address.
    async fn resolve(&self, criteria: &ResolveCriteria) -> Result<Option<EndpointDiscoveryMetadata>>;

    /// Chooses the response to a multicast Probe. Discovery proxies override
    /// this to announce themselves.
    fn find_disposition(&self, _criteria: &FindCriteria) -> FindDisposition {
        FindDisposition::Respond
    }

    /// Chooses the response to a multicast Resolve.
    fn resolve_disposition(&self, _criteria: &ResolveCriteria) -> FindDisposition {
        FindDisposition::Respond
    }
}

/// Receives Hello and Bye announcements.
#[async_trait]
pub trait AnnouncementHandler: Send + Sync + 'static {
    /// An endpoint came online.
    async fn on_hello(
        &self,
        sequence: Option<&DiscoveryMessageSequence>,
        endpoint: &EndpointDiscoveryMetadata,
    ) -> Result<()>;

    /// An endpoint went offline.
    async fn on_bye(
        &self,
        sequence: Option<&DiscoveryMessageSequence>,
        endpoint: &EndpointDiscoveryMetadata,
    ) -> Result<()>;
}
