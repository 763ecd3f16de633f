//! Schema-set hook.
//!
//! Hosts that validate or publish metadata collect the XML schemas of every
//! protocol version in use. Adding a version's schema twice is a no-op.

use std::collections::BTreeMap;

use super::version::{ProtocolVersion, DISCOVERY_EXTENSIONS_NS};

/// XML schemas keyed by target namespace.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: BTreeMap<String, String>,
}

impl SchemaSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema; returns `false` when one for the namespace is already present.
    pub fn add(&mut self, target_namespace: impl Into<String>, xsd: impl Into<String>) -> bool {
        let target_namespace = target_namespace.into();
        if self.schemas.contains_key(&target_namespace) {
            return false;
        }
        self.schemas.insert(target_namespace, xsd.into());
        true
    }

    /// Whether a schema for the namespace is present.
    pub fn contains(&self, target_namespace: &str) -> bool {
        self.schemas.contains_key(target_namespace)
    }

    /// The schema for a namespace.
    pub fn get(&self, target_namespace: &str) -> Option<&str> {
        self.schemas.get(target_namespace).map(String::as_str)
    }

    /// Number of schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Target namespaces in the set.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

impl ProtocolVersion {
    /// The XML schema of this version's discovery elements.
    pub fn schema(&self) -> String {
        format!(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:tns="{ns}" xmlns:wsa="{wsa}" targetNamespace="{ns}" elementFormDefault="qualified" blockDefault="#all">
<xs:import namespace="{wsa}"/>
<xs:element name="AppSequence"><xs:complexType><xs:attribute name="InstanceId" type="xs:unsignedLong" use="required"/><xs:attribute name="SequenceId" type="xs:anyURI"/><xs:attribute name="MessageNumber" type="xs:unsignedLong" use="required"/><xs:anyAttribute namespace="##other" processContents="lax"/></xs:complexType></xs:element>
<xs:complexType name="EndpointMetadataType"><xs:sequence><xs:element ref="wsa:EndpointReference"/><xs:element ref="tns:Types" minOccurs="0"/><xs:element ref="tns:Scopes" minOccurs="0"/><xs:element ref="tns:XAddrs" minOccurs="0"/><xs:element ref="tns:MetadataVersion" minOccurs="0"/><xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/></xs:sequence><xs:anyAttribute namespace="##other" processContents="lax"/></xs:complexType>
<xs:element name="Hello" type="tns:EndpointMetadataType"/>
<xs:element name="Bye" type="tns:EndpointMetadataType"/>
<xs:element name="Probe"><xs:complexType><xs:sequence><xs:element ref="tns:Types" minOccurs="0"/><xs:element ref="tns:Scopes" minOccurs="0"/><xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/></xs:sequence><xs:anyAttribute namespace="##other" processContents="lax"/></xs:complexType></xs:element>
<xs:element name="ProbeMatches"><xs:complexType><xs:sequence><xs:element name="ProbeMatch" type="tns:EndpointMetadataType" minOccurs="0" maxOccurs="unbounded"/><xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/></xs:sequence></xs:complexType></xs:element>
<xs:element name="Resolve"><xs:complexType><xs:sequence><xs:element ref="wsa:EndpointReference"/><xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/></xs:sequence></xs:complexType></xs:element>
<xs:element name="ResolveMatches"><xs:complexType><xs:sequence><xs:element name="ResolveMatch" type="tns:EndpointMetadataType" minOccurs="0"/><xs:any namespace="##other" processContents="lax" minOccurs="0" maxOccurs="unbounded"/></xs:sequence></xs:complexType></xs:element>
<xs:element name="Types"><xs:simpleType><xs:list itemType="xs:QName"/></xs:simpleType></xs:element>
<xs:element name="Scopes"><xs:complexType><xs:simpleContent><xs:extension base="tns:UriListType"><xs:attribute name="MatchBy" type="xs:anyURI"/></xs:extension></xs:simpleContent></xs:complexType></xs:element>
<xs:element name="XAddrs" type="tns:UriListType"/>
<xs:element name="MetadataVersion" type="xs:unsignedInt"/>
<xs:simpleType name="UriListType"><xs:list itemType="xs:anyURI"/></xs:simpleType>
</xs:schema>"###,
            ns = self.discovery_namespace,
            wsa = self.addressing_namespace,
        )
    }

    /// Add this version's schemas to `set`; returns `true` if anything was added.
    pub fn ensure_schema(&self, set: &mut SchemaSet) -> bool {
        let added = set.add(self.discovery_namespace, self.schema());
        let extensions = set.add(DISCOVERY_EXTENSIONS_NS, extensions_schema());
        added || extensions
    }
}

fn extensions_schema() -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="{DISCOVERY_EXTENSIONS_NS}" elementFormDefault="qualified">
<xs:element name="MaxResults" type="xs:unsignedInt"/>
<xs:element name="Duration" type="xs:duration"/>
</xs:schema>"#
    )
}
