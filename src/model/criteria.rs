//! Probe and Resolve criteria.

use std::time::Duration;

use super::metadata::{EndpointAddress, EndpointDiscoveryMetadata, QualifiedName};
use super::scope::scope_matches;
use crate::Result;

/// Version-independent URI of the RFC 3986 prefix rule.
pub const SCOPE_MATCH_BY_PREFIX: &str = "http://schemas.microsoft.com/ws/2008/06/discovery/rfc";
/// Version-independent URI of the exact string rule.
pub const SCOPE_MATCH_BY_EXACT: &str = "http://schemas.microsoft.com/ws/2008/06/discovery/strcmp0";
/// Version-independent URI of the LDAP rule.
pub const SCOPE_MATCH_BY_LDAP: &str = "http://schemas.microsoft.com/ws/2008/06/discovery/ldap";
/// Version-independent URI of the UUID rule.
pub const SCOPE_MATCH_BY_UUID: &str = "http://schemas.microsoft.com/ws/2008/06/discovery/uuid";
/// Version-independent URI of the "no scopes" rule.
pub const SCOPE_MATCH_BY_NONE: &str = "http://schemas.microsoft.com/ws/2008/06/discovery/none";

/// How requested scopes are compared against advertised scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ScopeMatchBy {
    /// Case-sensitive string equality.
    Exact,
    /// RFC 3986 segment-wise prefix.
    #[default]
    Prefix,
    /// LDAP distinguished-name ancestry.
    Ldap,
    /// UUID equality.
    Uuid,
    /// Matches only endpoints that advertise no scopes.
    None,
    /// A rule identified by an unrecognized URI.
    Custom(String),
}

impl ScopeMatchBy {
    /// The version-independent URI naming this rule.
    pub fn uri(&self) -> &str {
        match self {
            Self::Exact => SCOPE_MATCH_BY_EXACT,
            Self::Prefix => SCOPE_MATCH_BY_PREFIX,
            Self::Ldap => SCOPE_MATCH_BY_LDAP,
            Self::Uuid => SCOPE_MATCH_BY_UUID,
            Self::None => SCOPE_MATCH_BY_NONE,
            Self::Custom(uri) => uri,
        }
    }

    /// Parse a version-independent URI; anything unknown becomes [`Custom`](Self::Custom).
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            SCOPE_MATCH_BY_EXACT => Self::Exact,
            SCOPE_MATCH_BY_PREFIX => Self::Prefix,
            SCOPE_MATCH_BY_LDAP => Self::Ldap,
            SCOPE_MATCH_BY_UUID => Self::Uuid,
            SCOPE_MATCH_BY_NONE => Self::None,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// What a Probe asks for.
///
/// An endpoint matches when it implements every requested type and, for each
/// requested scope, advertises a scope satisfying [`scope_match_by`](Self::scope_match_by).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FindCriteria {
    /// Contract types the endpoint must implement.
    pub types: Vec<QualifiedName>,
    /// Scopes the endpoint must belong to.
    pub scopes: Vec<String>,
    /// Scope comparison rule.
    pub scope_match_by: ScopeMatchBy,
    /// Stop collecting after this many matches.
    pub max_results: Option<u32>,
    /// How long a client waits for matches.
    pub duration: Option<Duration>,
    /// Extension elements, kept as raw XML.
    pub extensions: Vec<String>,
}

impl FindCriteria {
    /// Criteria matching every endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria for a single contract type.
    pub fn for_type(name: QualifiedName) -> Self {
        Self::new().with_type(name)
    }

    /// Require a contract type.
    pub fn with_type(mut self, name: QualifiedName) -> Self {
        if !self.types.contains(&name) {
            self.types.push(name);
        }
        self
    }

    /// Require a scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Set the scope comparison rule.
    pub fn with_scope_match_by(mut self, rule: ScopeMatchBy) -> Self {
        self.scope_match_by = rule;
        self
    }

    /// Bound the number of collected matches.
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Bound how long a client collects matches.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Add an extension element (raw, self-contained XML).
    pub fn with_extension(mut self, xml: impl Into<String>) -> Self {
        self.extensions.push(xml.into());
        self
    }

    /// Evaluate the criteria against an endpoint.
    ///
    /// Fails with [`Error::UnsupportedScopeMatch`](crate::Error::UnsupportedScopeMatch)
    /// when scopes are requested under a custom rule.
    pub fn is_match(&self, endpoint: &EndpointDiscoveryMetadata) -> Result<bool> {
        if !self
            .types
            .iter()
            .all(|t| endpoint.contract_type_names.contains(t))
        {
            return Ok(false);
        }

        if self.scope_match_by == ScopeMatchBy::None {
            return Ok(endpoint.scopes.is_empty());
        }

        for requested in &self.scopes {
            let mut found = false;
            for advertised in &endpoint.scopes {
                if scope_matches(&self.scope_match_by, requested, advertised)? {
                    found = true;
                    break;
                }
            }
            if !found {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// What a Resolve asks for: the metadata of one endpoint by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveCriteria {
    /// Address of the endpoint to resolve.
    pub address: EndpointAddress,
    /// How long a client waits for the match.
    pub duration: Option<Duration>,
    /// Extension elements, kept as raw XML.
    pub extensions: Vec<String>,
}

impl ResolveCriteria {
    /// Resolve the given address.
    pub fn new(address: impl Into<EndpointAddress>) -> Self {
        Self {
            address: address.into(),
            duration: None,
            extensions: Vec::new(),
        }
    }

    /// Bound how long a client waits for the match.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
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
    use crate::Error;

    fn printer() -> QualifiedName {
        QualifiedName::new("urn:devices", "Printer")
    }

    fn endpoint() -> EndpointDiscoveryMetadata {
        EndpointDiscoveryMetadata::new("urn:uuid:1")
            .with_type(printer())
            .with_type(QualifiedName::new("urn:devices", "Scanner"))
            .with_scope("http://example.com/building1/floor2")
    }

    #[test]
    fn empty_criteria_match_everything() {
        assert!(FindCriteria::new().is_match(&endpoint()).unwrap());
    }

    #[test]
    fn all_types_are_required() {
        assert!(FindCriteria::for_type(printer()).is_match(&endpoint()).unwrap());
        let criteria =
            FindCriteria::for_type(printer()).with_type(QualifiedName::new("urn:devices", "Fax"));
        assert!(!criteria.is_match(&endpoint()).unwrap());
    }

    #[test]
    fn scopes_use_the_selected_rule() {
        let prefix = FindCriteria::new().with_scope("http://example.com/building1");
        assert!(prefix.is_match(&endpoint()).unwrap());

        let exact = prefix.clone().with_scope_match_by(ScopeMatchBy::Exact);
        assert!(!exact.is_match(&endpoint()).unwrap());
    }

    #[test]
    fn none_rule_matches_only_unscoped_endpoints() {
        let criteria = FindCriteria::new().with_scope_match_by(ScopeMatchBy::None);
        assert!(!criteria.is_match(&endpoint()).unwrap());
        assert!(criteria
            .is_match(&EndpointDiscoveryMetadata::new("urn:uuid:2"))
            .unwrap());
    }

    #[test]
    fn custom_rule_fails_only_when_scopes_are_requested() {
        let rule = ScopeMatchBy::Custom("urn:rule".into());
        let unscoped = FindCriteria::new().with_scope_match_by(rule.clone());
        assert!(unscoped.is_match(&endpoint()).unwrap());

        let scoped = unscoped.with_scope("http://example.com");
        assert!(matches!(
            scoped.is_match(&endpoint()),
            Err(Error::UnsupportedScopeMatch(_))
        ));
    }

    #[test]
    fn scope_rule_uris_round_trip() {
        for rule in [
            ScopeMatchBy::Exact,
            ScopeMatchBy::Prefix,
            ScopeMatchBy::Ldap,
            ScopeMatchBy::Uuid,
            ScopeMatchBy::None,
            ScopeMatchBy::Custom("urn:other".into()),
        ] {
            assert_eq!(ScopeMatchBy::from_uri(rule.uri()), rule);
        }
    }
}
