//! In-memory endpoint catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AnnouncementHandler, DiscoveryService};
use crate::model::{EndpointAddress, EndpointDiscoveryMetadata, FindCriteria, ResolveCriteria};
use crate::sequence::DiscoveryMessageSequence;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Announced {
    metadata: EndpointDiscoveryMetadata,
    sequence: Option<DiscoveryMessageSequence>,
}

#[derive(Debug, Default)]
struct CatalogState {
    published: Vec<EndpointDiscoveryMetadata>,
    announced: HashMap<EndpointAddress, Announced>,
}

/// Published endpoints plus endpoints learned from announcements.
///
/// Answers Probe and Resolve from the published endpoints. A catalog built
/// with [`proxy`](Self::proxy) also answers for announced endpoints, the way a
/// discovery proxy does.
#[derive(Debug, Default)]
pub struct EndpointCatalog {
    state: RwLock<CatalogState>,
    answer_announced: bool,
}

impl EndpointCatalog {
    /// A catalog answering for its published endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog answering for published and announced endpoints.
    pub fn proxy() -> Self {
        Self {
            answer_announced: true,
            ..Self::default()
        }
    }

    /// Publish an endpoint, replacing one with the same address.
    pub fn publish(&self, endpoint: EndpointDiscoveryMetadata) -> Option<EndpointDiscoveryMetadata> {
        let mut state = self.state.write();
        match state
            .published
            .iter()
            .position(|e| e.address == endpoint.address)
        {
            Some(index) => Some(std::mem::replace(&mut state.published[index], endpoint)),
            None => {
                state.published.push(endpoint);
                None
            }
        }
    }

    /// Withdraw a published endpoint.
    pub fn unpublish(&self, address: &EndpointAddress) -> Option<EndpointDiscoveryMetadata> {
        let mut state = self.state.write();
        let index = state.published.iter().position(|e| &e.address == address)?;
        Some(state.published.remove(index))
    }

    /// Published endpoints.
    pub fn published(&self) -> Vec<EndpointDiscoveryMetadata> {
        self.state.read().published.clone()
    }

    /// Endpoints currently known from Hello announcements.
    pub fn announced(&self) -> Vec<EndpointDiscoveryMetadata> {
        self.state
            .read()
            .announced
            .values()
            .map(|a| a.metadata.clone())
            .collect()
    }

    /// Look up an endpoint by address.
    pub fn get(&self, address: &EndpointAddress) -> Option<EndpointDiscoveryMetadata> {
        let state = self.state.read();
        state
            .published
            .iter()
            .find(|e| &e.address == address)
            .cloned()
            .or_else(|| {
                self.answer_announced
                    .then(|| state.announced.get(address).map(|a| a.metadata.clone()))
                    .flatten()
            })
    }

    fn candidates(&self) -> Vec<EndpointDiscoveryMetadata> {
        let state = self.state.read();
        let mut all = state.published.clone();
        if self.answer_announced {
            all.extend(state.announced.values().map(|a| a.metadata.clone()));
        }
        all
    }
}

/// Whether `incoming` is older than (or the same as) what is already known.
fn is_stale(known: Option<&DiscoveryMessageSequence>, incoming: Option<&DiscoveryMessageSequence>) -> bool {
    match (known, incoming) {
        (Some(known), Some(incoming)) if incoming.can_compare_to(known) => {
            !incoming.is_newer_than(known)
        }
        _ => false,
    }
}

#[async_trait]
impl DiscoveryService for EndpointCatalog {
    async fn find(&self, criteria: &FindCriteria) -> Result<Vec<EndpointDiscoveryMetadata>> {
        let mut matches = Vec::new();
        for endpoint in self.candidates() {
            match criteria.is_match(&endpoint) {
                Ok(true) => matches.push(endpoint),
                Ok(false) => {}
                Err(Error::UnsupportedScopeMatch(rule)) => {
                    tracing::warn!(%rule, "cannot evaluate scope rule, no matches");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(matches)
    }

    async fn resolve(&self, criteria: &ResolveCriteria) -> Result<Option<EndpointDiscoveryMetadata>> {
        Ok(self.get(&criteria.address))
    }
}

#[async_trait]
impl AnnouncementHandler for EndpointCatalog {
    async fn on_hello(
        &self,
        sequence: Option<&DiscoveryMessageSequence>,
        endpoint: &EndpointDiscoveryMetadata,
    ) -> Result<()> {
        let mut state = self.state.write();
        let known = state.announced.get(&endpoint.address);
        if is_stale(known.and_then(|a| a.sequence.as_ref()), sequence) {
            tracing::debug!(address = %endpoint.address, "ignoring stale Hello");
            return Ok(());
        }
        tracing::debug!(address = %endpoint.address, version = endpoint.version, "endpoint online");
        state.announced.insert(
            endpoint.address.clone(),
            Announced {
                metadata: endpoint.clone(),
                sequence: sequence.cloned(),
            },
        );
        Ok(())
    }

    async fn on_bye(
        &self,
        sequence: Option<&DiscoveryMessageSequence>,
        endpoint: &EndpointDiscoveryMetadata,
    ) -> Result<()> {
        let mut state = self.state.write();
        let known = state.announced.get(&endpoint.address);
        if is_stale(known.and_then(|a| a.sequence.as_ref()), sequence) {
            tracing::debug!(address = %endpoint.address, "ignoring stale Bye");
            return Ok(());
        }
        if state.announced.remove(&endpoint.address).is_some() {
            tracing::debug!(address = %endpoint.address, "endpoint offline");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QualifiedName, ScopeMatchBy};

    fn printer(address: &str) -> EndpointDiscoveryMetadata {
        EndpointDiscoveryMetadata::new(address)
            .with_type(QualifiedName::new("urn:devices", "Printer"))
            .with_scope("http://example.com/floor1")
    }

    #[tokio::test]
    async fn find_filters_published_endpoints() {
        let catalog = EndpointCatalog::new();
        catalog.publish(printer("urn:uuid:p1"));
        catalog.publish(EndpointDiscoveryMetadata::new("urn:uuid:other"));

        let criteria = FindCriteria::for_type(QualifiedName::new("urn:devices", "Printer"));
        let found = catalog.find(&criteria).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address.as_str(), "urn:uuid:p1");

        let unsupported = FindCriteria::new()
            .with_scope("http://example.com")
            .with_scope_match_by(ScopeMatchBy::Custom("urn:rule".into()));
        assert!(catalog.find(&unsupported).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_replaces_by_address() {
        let catalog = EndpointCatalog::new();
        assert!(catalog.publish(printer("urn:uuid:p1")).is_none());
        let replaced = catalog.publish(printer("urn:uuid:p1").with_version(2));
        assert_eq!(replaced.map(|e| e.version), Some(0));
        assert_eq!(catalog.published().len(), 1);
        assert!(catalog.unpublish(&"urn:uuid:p1".into()).is_some());
        assert!(catalog.published().is_empty());
    }

    #[tokio::test]
    async fn stale_hellos_are_ignored() {
        let catalog = EndpointCatalog::proxy();
        let newer = DiscoveryMessageSequence::new(1, 5);
        let older = DiscoveryMessageSequence::new(1, 4);

        catalog
            .on_hello(Some(&newer), &printer("urn:uuid:p1").with_version(5))
            .await
            .unwrap();
        catalog
            .on_hello(Some(&older), &printer("urn:uuid:p1").with_version(4))
            .await
            .unwrap();
        assert_eq!(catalog.announced()[0].version, 5);

        let resolved = catalog
            .resolve(&ResolveCriteria::new("urn:uuid:p1"))
            .await
            .unwrap();
        assert_eq!(resolved.map(|e| e.version), Some(5));

        catalog
            .on_bye(Some(&DiscoveryMessageSequence::new(1, 6)), &printer("urn:uuid:p1"))
            .await
            .unwrap();
        assert!(catalog.announced().is_empty());
    }

    #[tokio::test]
    async fn plain_catalog_does_not_answer_for_announced_endpoints() {
        let catalog = EndpointCatalog::new();
        catalog.on_hello(None, &printer("urn:uuid:p1")).await.unwrap();
        assert_eq!(catalog.announced().len(), 1);
        assert!(catalog.find(&FindCriteria::new()).await.unwrap().is_empty());
        assert!(catalog
            .resolve(&ResolveCriteria::new("urn:uuid:p1"))
            .await
            .unwrap()
            .is_none());
    }
}
