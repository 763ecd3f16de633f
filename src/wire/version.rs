//! Protocol version descriptors.
//!
//! Each supported WS-Discovery version is described by one static
//! [`ProtocolVersion`]: its namespaces, multicast address, action URIs and
//! scope-match URIs. Everything else (codec, operations, clients) is shared.

use crate::model::ScopeMatchBy;

/// SOAP 1.2 envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Namespace of the `MaxResults` and `Duration` Probe extensions.
pub const DISCOVERY_EXTENSIONS_NS: &str = "http://schemas.microsoft.com/ws/2008/06/discovery";

/// The six discovery messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Online announcement.
    Hello,
    /// Offline announcement.
    Bye,
    /// Search by type and scope.
    Probe,
    /// Response to a Probe.
    ProbeMatches,
    /// Search by endpoint address.
    Resolve,
    /// Response to a Resolve.
    ResolveMatches,
}

impl MessageKind {
    /// All kinds.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Hello,
        MessageKind::Bye,
        MessageKind::Probe,
        MessageKind::ProbeMatches,
        MessageKind::Resolve,
        MessageKind::ResolveMatches,
    ];

    /// Local name of the body element.
    pub fn element_name(self) -> &'static str {
        match self {
            MessageKind::Hello => "Hello",
            MessageKind::Bye => "Bye",
            MessageKind::Probe => "Probe",
            MessageKind::ProbeMatches => "ProbeMatches",
            MessageKind::Resolve => "Resolve",
            MessageKind::ResolveMatches => "ResolveMatches",
        }
    }
}

/// Action URIs of one protocol version.
#[derive(Debug, PartialEq, Eq)]
pub struct ActionUris {
    /// Hello action.
    pub hello: &'static str,
    /// Bye action.
    pub bye: &'static str,
    /// Probe action.
    pub probe: &'static str,
    /// ProbeMatches action.
    pub probe_matches: &'static str,
    /// Resolve action.
    pub resolve: &'static str,
    /// ResolveMatches action.
    pub resolve_matches: &'static str,
}

/// Scope-match rule URIs of one protocol version.
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeMatchUris {
    /// Exact string rule.
    pub exact: &'static str,
    /// RFC 3986 (or RFC 2396) prefix rule.
    pub prefix: &'static str,
    /// LDAP rule.
    pub ldap: &'static str,
    /// UUID rule.
    pub uuid: &'static str,
    /// "No scopes" rule.
    pub none: &'static str,
}

/// Descriptor of one WS-Discovery version.
#[derive(Debug, PartialEq, Eq)]
pub struct ProtocolVersion {
    /// Human-readable name.
    pub name: &'static str,
    /// Namespace of the discovery elements.
    pub discovery_namespace: &'static str,
    /// WS-Addressing namespace used in headers.
    pub addressing_namespace: &'static str,
    /// WS-Addressing anonymous address.
    pub anonymous_address: &'static str,
    /// Value of `wsa:To` on multicast messages.
    pub multicast_address: &'static str,
    /// Action URIs.
    pub actions: ActionUris,
    /// Scope-match rule URIs.
    pub scope_match: ScopeMatchUris,
}

impl ProtocolVersion {
    /// The Action URI of a message kind.
    pub fn action(&self, kind: MessageKind) -> &'static str {
        match kind {
            MessageKind::Hello => self.actions.hello,
            MessageKind::Bye => self.actions.bye,
            MessageKind::Probe => self.actions.probe,
            MessageKind::ProbeMatches => self.actions.probe_matches,
            MessageKind::Resolve => self.actions.resolve,
            MessageKind::ResolveMatches => self.actions.resolve_matches,
        }
    }

    /// The message kind an Action URI denotes in this version.
    pub fn message_kind(&self, action: &str) -> Option<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| self.action(*kind) == action)
    }

    /// This version's URI for a scope-match rule.
    pub fn scope_match_to_wire<'a>(&'a self, rule: &'a ScopeMatchBy) -> &'a str {
        match rule {
            ScopeMatchBy::Exact => self.scope_match.exact,
            ScopeMatchBy::Prefix => self.scope_match.prefix,
            ScopeMatchBy::Ldap => self.scope_match.ldap,
            ScopeMatchBy::Uuid => self.scope_match.uuid,
            ScopeMatchBy::None => self.scope_match.none,
            ScopeMatchBy::Custom(uri) => uri,
        }
    }

    /// Map a wire URI to a rule. Version-independent URIs are accepted as well.
    pub fn scope_match_from_wire(&self, uri: &str) -> ScopeMatchBy {
        let table = &self.scope_match;
        if uri == table.exact {
            ScopeMatchBy::Exact
        } else if uri == table.prefix {
            ScopeMatchBy::Prefix
        } else if uri == table.ldap {
            ScopeMatchBy::Ldap
        } else if uri == table.uuid {
            ScopeMatchBy::Uuid
        } else if uri == table.none {
            ScopeMatchBy::None
        } else {
            ScopeMatchBy::from_uri(uri)
        }
    }
}

const WSA_2005_08: &str = "http://www.w3.org/2005/08/addressing";
const WSA_2004_08: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";

/// WS-Discovery 1.1 (OASIS standard, 2009/01).
pub static WS_DISCOVERY_11: ProtocolVersion = ProtocolVersion {
    name: "WS-Discovery 1.1",
    discovery_namespace: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01",
    addressing_namespace: WSA_2005_08,
    anonymous_address: "http://www.w3.org/2005/08/addressing/anonymous",
    multicast_address: "urn:docs-oasis-open-org:ws-dd:ns:discovery:2009:01",
    actions: ActionUris {
        hello: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Hello",
        bye: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Bye",
        probe: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Probe",
        probe_matches: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/ProbeMatches",
        resolve: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Resolve",
        resolve_matches: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/ResolveMatches",
    },
    scope_match: ScopeMatchUris {
        exact: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/strcmp0",
        prefix: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/rfc3986",
        ldap: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/ldap",
        uuid: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/uuid",
        none: "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/none",
    },
};

/// WS-Discovery committee draft 1 (OASIS, 2008/09).
pub static WS_DISCOVERY_CD1: ProtocolVersion = ProtocolVersion {
    name: "WS-Discovery CD1",
    discovery_namespace: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09",
    addressing_namespace: WSA_2005_08,
    anonymous_address: "http://www.w3.org/2005/08/addressing/anonymous",
    multicast_address: "urn:docs-oasis-open-org:ws-dd:ns:discovery:2008:09",
    actions: ActionUris {
        hello: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/Hello",
        bye: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/Bye",
        probe: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/Probe",
        probe_matches: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/ProbeMatches",
        resolve: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/Resolve",
        resolve_matches: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/ResolveMatches",
    },
    scope_match: ScopeMatchUris {
        exact: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/strcmp0",
        prefix: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/rfc3986",
        ldap: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/ldap",
        uuid: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/uuid",
        none: "http://docs.oasis-open.org/ws-dd/ns/discovery/2008/09/none",
    },
};

/// WS-Discovery April 2005 (pre-standard, used by DPWS 1.0 and ONVIF).
pub static WS_DISCOVERY_APRIL_2005: ProtocolVersion = ProtocolVersion {
    name: "WS-Discovery April 2005",
    discovery_namespace: "http://schemas.xmlsoap.org/ws/2005/04/discovery",
    addressing_namespace: WSA_2004_08,
    anonymous_address: "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous",
    multicast_address: "urn:schemas-xmlsoap-org:ws:2005:04:discovery",
    actions: ActionUris {
        hello: "http://schemas.xmlsoap.org/ws/2005/04/discovery/Hello",
        bye: "http://schemas.xmlsoap.org/ws/2005/04/discovery/Bye",
        probe: "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe",
        probe_matches: "http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches",
        resolve: "http://schemas.xmlsoap.org/ws/2005/04/discovery/Resolve",
        resolve_matches: "http://schemas.xmlsoap.org/ws/2005/04/discovery/ResolveMatches",
    },
    scope_match: ScopeMatchUris {
        exact: "http://schemas.xmlsoap.org/ws/2005/04/discovery/strcmp0",
        prefix: "http://schemas.xmlsoap.org/ws/2005/04/discovery/rfc2396",
        ldap: "http://schemas.xmlsoap.org/ws/2005/04/discovery/ldap",
        uuid: "http://schemas.xmlsoap.org/ws/2005/04/discovery/uuid",
        none: "http://schemas.microsoft.com/ws/2008/06/discovery/none",
    },
};
