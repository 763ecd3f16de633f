//! Endpoint descriptions exchanged in Hello, Bye, ProbeMatches and ResolveMatches.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::Error;

/// An XML qualified name (namespace URI plus local name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Namespace URI; empty for names without a namespace.
    pub namespace: String,
    /// Local part of the name.
    pub name: String,
}

impl QualifiedName {
    /// Create a qualified name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.name)
        }
    }
}

/// Parses the `{namespace}name` form produced by `Display`.
impl FromStr for QualifiedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = match s.strip_prefix('{') {
            Some(rest) => rest
                .split_once('}')
                .ok_or_else(|| Error::malformed(format!("unterminated namespace in {s:?}")))?,
            None => ("", s),
        };
        if name.is_empty() {
            return Err(Error::malformed(format!("qualified name without local part: {s:?}")));
        }
        Ok(Self::new(namespace, name))
    }
}

/// The `wsa:Address` of an endpoint reference.
///
/// Discovery uses it as the stable identity of a target service, typically a
/// `urn:uuid:` URI that survives restarts and address changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    /// Wrap an address URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// A fresh `urn:uuid:` address.
    pub fn random() -> Self {
        Self(format!("urn:uuid:{}", Uuid::new_v4()))
    }

    /// The address URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointAddress {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for EndpointAddress {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// Everything a target service advertises about one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDiscoveryMetadata {
    /// Stable endpoint identity.
    pub address: EndpointAddress,
    /// Contract types implemented by the endpoint.
    pub contract_type_names: Vec<QualifiedName>,
    /// Scopes the endpoint belongs to.
    pub scopes: Vec<String>,
    /// Transport addresses (`XAddrs`) the endpoint listens on.
    pub listen_uris: Vec<String>,
    /// Incremented whenever any of the above changes.
    pub version: u32,
    /// Extension elements, kept as raw XML.
    pub extensions: Vec<String>,
}

impl EndpointDiscoveryMetadata {
    /// Metadata for an endpoint with no types, scopes or listen URIs.
    pub fn new(address: impl Into<EndpointAddress>) -> Self {
        Self {
            address: address.into(),
            contract_type_names: Vec::new(),
            scopes: Vec::new(),
            listen_uris: Vec::new(),
            version: 0,
            extensions: Vec::new(),
        }
    }

    /// Add a contract type.
    pub fn with_type(mut self, name: QualifiedName) -> Self {
        if !self.contract_type_names.contains(&name) {
            self.contract_type_names.push(name);
        }
        self
    }

    /// Add a scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Add a listen URI.
    pub fn with_listen_uri(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        if !self.listen_uris.contains(&uri) {
            self.listen_uris.push(uri);
        }
        self
    }

    /// Set the metadata version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Add an extension element (raw, self-contained XML).
    pub fn with_extension(mut self, xml: impl Into<String>) -> Self {
        self.extensions.push(xml.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_skip_duplicates() {
        let metadata = EndpointDiscoveryMetadata::new("urn:uuid:1")
            .with_type(QualifiedName::new("urn:t", "Printer"))
            .with_type(QualifiedName::new("urn:t", "Printer"))
            .with_scope("http://example.com/a")
            .with_scope("http://example.com/a")
            .with_listen_uri("http://10.0.0.1/svc")
            .with_listen_uri("http://10.0.0.1/svc");

        assert_eq!(metadata.contract_type_names.len(), 1);
        assert_eq!(metadata.scopes.len(), 1);
        assert_eq!(metadata.listen_uris.len(), 1);
    }

    #[test]
    fn random_addresses_are_uuid_urns() {
        let a = EndpointAddress::random();
        let b = EndpointAddress::random();
        assert!(a.as_str().starts_with("urn:uuid:"));
        assert_ne!(a, b);
    }

    #[test]
    fn qualified_name_display_uses_clark_notation() {
        assert_eq!(
            QualifiedName::new("urn:t", "Printer").to_string(),
            "{urn:t}Printer"
        );
        assert_eq!(QualifiedName::new("", "Local").to_string(), "Local");
    }

    #[test]
    fn qualified_name_parses_clark_notation() {
        let parsed: QualifiedName = "{urn:t}Printer".parse().unwrap();
        assert_eq!(parsed, QualifiedName::new("urn:t", "Printer"));
        assert_eq!("Local".parse::<QualifiedName>().unwrap(), QualifiedName::new("", "Local"));
        assert!("{urn:t".parse::<QualifiedName>().is_err());
        assert!("{urn:t}".parse::<QualifiedName>().is_err());
    }
}
