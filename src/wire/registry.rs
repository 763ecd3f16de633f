//! Registry of the protocol versions a client or host understands.

use tracing::debug;

use super::schema::SchemaSet;
use super::version::{
    MessageKind, ProtocolVersion, WS_DISCOVERY_11, WS_DISCOVERY_APRIL_2005, WS_DISCOVERY_CD1,
};
use crate::{Error, Result};

/// Known protocol versions and their schemas.
///
/// Constructed explicitly and handed to clients and hosts through their
/// configuration; there is no global registry.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    versions: Vec<&'static ProtocolVersion>,
    schemas: SchemaSet,
}

impl VersionRegistry {
    /// A registry with no versions.
    pub fn empty() -> Self {
        Self {
            versions: Vec::new(),
            schemas: SchemaSet::new(),
        }
    }

    /// A registry with every built-in version.
    pub fn new() -> Self {
        Self::empty()
            .with(&WS_DISCOVERY_11)
            .with(&WS_DISCOVERY_CD1)
            .with(&WS_DISCOVERY_APRIL_2005)
    }

    /// Register a version; returns `false` if it was already known.
    pub fn register(&mut self, version: &'static ProtocolVersion) -> bool {
        if self.contains(version) {
            return false;
        }
        version.ensure_schema(&mut self.schemas);
        self.versions.push(version);
        debug!(version = version.name, "registered protocol version");
        true
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, version: &'static ProtocolVersion) -> Self {
        self.register(version);
        self
    }

    /// Whether the version is registered.
    pub fn contains(&self, version: &ProtocolVersion) -> bool {
        self.versions.iter().any(|v| *v == version)
    }

    /// Fail with [`Error::UnknownVersion`] unless the version is registered.
    pub fn require(&self, version: &ProtocolVersion) -> Result<()> {
        if self.contains(version) {
            Ok(())
        } else {
            Err(Error::UnknownVersion(version.name))
        }
    }

    /// The version and message kind an Action URI belongs to.
    pub fn identify(&self, action: &str) -> Option<(&'static ProtocolVersion, MessageKind)> {
        self.versions
            .iter()
            .find_map(|v| v.message_kind(action).map(|kind| (*v, kind)))
    }

    /// The version using a discovery namespace.
    pub fn by_namespace(&self, namespace: &str) -> Option<&'static ProtocolVersion> {
        self.versions
            .iter()
            .copied()
            .find(|v| v.discovery_namespace == namespace)
    }

    /// Registered versions, in registration order.
    pub fn versions(&self) -> impl Iterator<Item = &'static ProtocolVersion> + '_ {
        self.versions.iter().copied()
    }

    /// Schemas of every registered version.
    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
