//! Mapping between the domain model and one version's XML.

use roxmltree::{Document, Node};

use super::duration::{format_duration, parse_duration};
use super::envelope::DiscoveryMessage;
use super::version::{MessageKind, ProtocolVersion, DISCOVERY_EXTENSIONS_NS};
use super::xml::{self, XmlWriter};
use crate::model::{
    EndpointAddress, EndpointDiscoveryMetadata, FindCriteria, QualifiedName, ResolveCriteria,
    ScopeMatchBy,
};
use crate::{Error, Result};

/// Version adapter: writes and reads discovery elements for one protocol version.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    version: &'static ProtocolVersion,
}

impl WireCodec {
    /// A codec for `version`.
    pub fn new(version: &'static ProtocolVersion) -> Self {
        Self { version }
    }

    /// The version this codec speaks.
    pub fn version(&self) -> &'static ProtocolVersion {
        self.version
    }

    /// Serialize criteria as a standalone `Probe` element.
    pub fn find_criteria_to_xml(&self, criteria: &FindCriteria) -> String {
        let mut w = XmlWriter::new();
        self.write_probe(&mut w, criteria, true);
        w.finish()
    }

    /// Parse a standalone `Probe` element.
    pub fn find_criteria_from_xml(&self, text: &str) -> Result<FindCriteria> {
        let doc = Document::parse(text)?;
        let root = self.expect_root(&doc, &["Probe"])?;
        self.read_probe(root)
    }

    /// Serialize criteria as a standalone `Resolve` element.
    pub fn resolve_criteria_to_xml(&self, criteria: &ResolveCriteria) -> String {
        let mut w = XmlWriter::new();
        self.write_resolve(&mut w, criteria, true);
        w.finish()
    }

    /// Parse a standalone `Resolve` element.
    pub fn resolve_criteria_from_xml(&self, text: &str) -> Result<ResolveCriteria> {
        let doc = Document::parse(text)?;
        let root = self.expect_root(&doc, &["Resolve"])?;
        self.read_resolve(root)
    }

    /// Serialize endpoint metadata as a standalone `ProbeMatch` element.
    pub fn metadata_to_xml(&self, metadata: &EndpointDiscoveryMetadata) -> String {
        let mut w = XmlWriter::new();
        self.write_metadata(&mut w, "ProbeMatch", metadata, true);
        w.finish()
    }

    /// Parse endpoint metadata from a `Hello`, `Bye`, `ProbeMatch` or `ResolveMatch` element.
    pub fn metadata_from_xml(&self, text: &str) -> Result<EndpointDiscoveryMetadata> {
        let doc = Document::parse(text)?;
        let root = self.expect_root(&doc, &["Hello", "Bye", "ProbeMatch", "ResolveMatch"])?;
        self.read_metadata(root)
    }

    /// Namespace declarations placed on the outermost element written.
    pub(crate) fn namespace_declarations(&self) -> [(&'static str, &'static str); 3] {
        [
            ("xmlns:d", self.version.discovery_namespace),
            ("xmlns:wsa", self.version.addressing_namespace),
            ("xmlns:wsdx", DISCOVERY_EXTENSIONS_NS),
        ]
    }

    fn declarations(&self, declare: bool) -> Vec<(&'static str, &'static str)> {
        if declare {
            self.namespace_declarations().to_vec()
        } else {
            Vec::new()
        }
    }

    fn expect_root<'a, 'i>(&self, doc: &'a Document<'i>, names: &[&str]) -> Result<Node<'a, 'i>> {
        let root = doc.root_element();
        if names
            .iter()
            .any(|name| xml::is(root, self.version.discovery_namespace, name))
        {
            Ok(root)
        } else {
            Err(Error::malformed(format!(
                "unexpected element {:?} for {}",
                root.tag_name().name(),
                self.version.name
            )))
        }
    }

    /// Write the body content of a message.
    pub(crate) fn write_body(&self, w: &mut XmlWriter, message: &DiscoveryMessage) {
        match message {
            DiscoveryMessage::Probe(criteria) => {
                if let Some(criteria) = criteria {
                    self.write_probe(w, criteria, false);
                }
            }
            DiscoveryMessage::Resolve(criteria) => {
                if let Some(criteria) = criteria {
                    self.write_resolve(w, criteria, false);
                }
            }
            DiscoveryMessage::Hello(metadata) => {
                if let Some(metadata) = metadata {
                    self.write_metadata(w, "Hello", metadata, false);
                }
            }
            DiscoveryMessage::Bye(metadata) => {
                if let Some(metadata) = metadata {
                    self.write_metadata(w, "Bye", metadata, false);
                }
            }
            DiscoveryMessage::ProbeMatches(matches) => {
                w.open("d:ProbeMatches", &[]);
                for metadata in matches {
                    self.write_metadata(w, "ProbeMatch", metadata, false);
                }
                w.close("d:ProbeMatches");
            }
            DiscoveryMessage::ResolveMatches(metadata) => {
                w.open("d:ResolveMatches", &[]);
                if let Some(metadata) = metadata {
                    self.write_metadata(w, "ResolveMatch", metadata, false);
                }
                w.close("d:ResolveMatches");
            }
        }
    }

    /// Read the body content of a message of `kind`.
    ///
    /// A missing body element yields an absent payload rather than an error.
    pub(crate) fn read_body(&self, kind: MessageKind, body: Node<'_, '_>) -> Result<DiscoveryMessage> {
        let ns = self.version.discovery_namespace;
        let element = xml::child(body, ns, kind.element_name());
        Ok(match kind {
            MessageKind::Probe => {
                DiscoveryMessage::Probe(element.map(|e| self.read_probe(e)).transpose()?)
            }
            MessageKind::Resolve => {
                DiscoveryMessage::Resolve(element.map(|e| self.read_resolve(e)).transpose()?)
            }
            MessageKind::Hello => {
                DiscoveryMessage::Hello(element.map(|e| self.read_metadata(e)).transpose()?)
            }
            MessageKind::Bye => {
                DiscoveryMessage::Bye(element.map(|e| self.read_metadata(e)).transpose()?)
            }
            MessageKind::ProbeMatches => {
                let mut matches = Vec::new();
                if let Some(element) = element {
                    for m in element.children().filter(|c| xml::is(*c, ns, "ProbeMatch")) {
                        matches.push(self.read_metadata(m)?);
                    }
                }
                DiscoveryMessage::ProbeMatches(matches)
            }
            MessageKind::ResolveMatches => DiscoveryMessage::ResolveMatches(
                element
                    .and_then(|e| xml::child(e, ns, "ResolveMatch"))
                    .map(|m| self.read_metadata(m))
                    .transpose()?,
            ),
        })
    }

    fn write_probe(&self, w: &mut XmlWriter, criteria: &FindCriteria, declare: bool) {
        w.open("d:Probe", &self.declarations(declare));
        write_types(w, &criteria.types);
        if !criteria.scopes.is_empty() || criteria.scope_match_by != ScopeMatchBy::Prefix {
            let rule = self.version.scope_match_to_wire(&criteria.scope_match_by);
            w.element("d:Scopes", &[("MatchBy", rule)], &criteria.scopes.join(" "));
        }
        if let Some(max) = criteria.max_results {
            w.element("wsdx:MaxResults", &[], &max.to_string());
        }
        if let Some(duration) = criteria.duration {
            w.element("wsdx:Duration", &[], &format_duration(duration));
        }
        for extension in &criteria.extensions {
            w.raw(extension);
        }
        w.close("d:Probe");
    }

    fn read_probe(&self, node: Node<'_, '_>) -> Result<FindCriteria> {
        let ns = self.version.discovery_namespace;
        let mut criteria = FindCriteria::new();
        for child in node.children().filter(Node::is_element) {
            if xml::is(child, ns, "Types") {
                criteria.types = read_types(child)?;
            } else if xml::is(child, ns, "Scopes") {
                criteria.scopes = xml::list(child);
                criteria.scope_match_by = child
                    .attribute("MatchBy")
                    .map(|uri| self.version.scope_match_from_wire(uri.trim()))
                    .unwrap_or_default();
            } else if xml::is(child, DISCOVERY_EXTENSIONS_NS, "MaxResults") {
                let text = xml::text(child);
                let max = text
                    .parse()
                    .map_err(|_| Error::malformed(format!("invalid MaxResults: {text:?}")))?;
                criteria.max_results = Some(max);
            } else if xml::is(child, DISCOVERY_EXTENSIONS_NS, "Duration") {
                criteria.duration = Some(parse_duration(xml::text(child))?);
            } else {
                criteria.extensions.push(xml::raw(child));
            }
        }
        Ok(criteria)
    }

    fn write_resolve(&self, w: &mut XmlWriter, criteria: &ResolveCriteria, declare: bool) {
        w.open("d:Resolve", &self.declarations(declare));
        write_endpoint_reference(w, &criteria.address);
        if let Some(duration) = criteria.duration {
            w.element("wsdx:Duration", &[], &format_duration(duration));
        }
        for extension in &criteria.extensions {
            w.raw(extension);
        }
        w.close("d:Resolve");
    }

    fn read_resolve(&self, node: Node<'_, '_>) -> Result<ResolveCriteria> {
        let wsa = self.version.addressing_namespace;
        let mut address = None;
        let mut duration = None;
        let mut extensions = Vec::new();
        for child in node.children().filter(Node::is_element) {
            if xml::is(child, wsa, "EndpointReference") {
                address = Some(self.read_endpoint_reference(child)?);
            } else if xml::is(child, DISCOVERY_EXTENSIONS_NS, "Duration") {
                duration = Some(parse_duration(xml::text(child))?);
            } else {
                extensions.push(xml::raw(child));
            }
        }
        let address = address.ok_or_else(|| Error::malformed("Resolve without EndpointReference"))?;
        Ok(ResolveCriteria {
            address,
            duration,
            extensions,
        })
    }

    fn write_metadata(
        &self,
        w: &mut XmlWriter,
        element: &str,
        metadata: &EndpointDiscoveryMetadata,
        declare: bool,
    ) {
        let name = format!("d:{element}");
        w.open(&name, &self.declarations(declare));
        write_endpoint_reference(w, &metadata.address);
        write_types(w, &metadata.contract_type_names);
        if !metadata.scopes.is_empty() {
            w.element("d:Scopes", &[], &metadata.scopes.join(" "));
        }
        if !metadata.listen_uris.is_empty() {
            w.element("d:XAddrs", &[], &metadata.listen_uris.join(" "));
        }
        w.element("d:MetadataVersion", &[], &metadata.version.to_string());
        for extension in &metadata.extensions {
            w.raw(extension);
        }
        w.close(&name);
    }

    fn read_metadata(&self, node: Node<'_, '_>) -> Result<EndpointDiscoveryMetadata> {
        let ns = self.version.discovery_namespace;
        let wsa = self.version.addressing_namespace;
        let mut address = None;
        let mut metadata = EndpointDiscoveryMetadata::new("");
        for child in node.children().filter(Node::is_element) {
            if xml::is(child, wsa, "EndpointReference") {
                address = Some(self.read_endpoint_reference(child)?);
            } else if xml::is(child, ns, "Types") {
                metadata.contract_type_names = read_types(child)?;
            } else if xml::is(child, ns, "Scopes") {
                metadata.scopes = xml::list(child);
            } else if xml::is(child, ns, "XAddrs") {
                metadata.listen_uris = xml::list(child);
            } else if xml::is(child, ns, "MetadataVersion") {
                let text = xml::text(child);
                metadata.version = text
                    .parse()
                    .map_err(|_| Error::malformed(format!("invalid MetadataVersion: {text:?}")))?;
            } else {
                metadata.extensions.push(xml::raw(child));
            }
        }
        metadata.address = address.ok_or_else(|| {
            Error::malformed(format!(
                "{} without EndpointReference",
                node.tag_name().name()
            ))
        })?;
        Ok(metadata)
    }

    fn read_endpoint_reference(&self, node: Node<'_, '_>) -> Result<EndpointAddress> {
        let address = xml::child(node, self.version.addressing_namespace, "Address")
            .map(xml::text)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::malformed("EndpointReference without Address"))?;
        Ok(EndpointAddress::new(address))
    }
}

fn write_endpoint_reference(w: &mut XmlWriter, address: &EndpointAddress) {
    w.open("wsa:EndpointReference", &[]);
    w.element("wsa:Address", &[], address.as_str());
    w.close("wsa:EndpointReference");
}

/// Write a `Types` element, declaring one prefix per distinct namespace on it.
fn write_types(w: &mut XmlWriter, types: &[QualifiedName]) {
    if types.is_empty() {
        return;
    }
    let mut namespaces: Vec<&str> = Vec::new();
    let mut names = Vec::with_capacity(types.len());
    for qname in types {
        if qname.namespace.is_empty() {
            names.push(qname.name.clone());
            continue;
        }
        let index = match namespaces.iter().position(|ns| *ns == qname.namespace) {
            Some(index) => index,
            None => {
                namespaces.push(&qname.namespace);
                namespaces.len() - 1
            }
        };
        names.push(format!("t{index}:{}", qname.name));
    }
    let prefixes: Vec<String> = (0..namespaces.len()).map(|i| format!("xmlns:t{i}")).collect();
    let attrs: Vec<(&str, &str)> = prefixes
        .iter()
        .map(String::as_str)
        .zip(namespaces.iter().copied())
        .collect();
    w.element("d:Types", &attrs, &names.join(" "));
}

fn read_types(node: Node<'_, '_>) -> Result<Vec<QualifiedName>> {
    let mut types = Vec::new();
    for token in xml::text(node).split_whitespace() {
        let (prefix, name) = match token.split_once(':') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, token),
        };
        let namespace = match node.lookup_namespace_uri(prefix) {
            Some(ns) => ns,
            None if prefix.is_none() => "",
            None => {
                return Err(Error::malformed(format!(
                    "undeclared prefix in type {token:?}"
                )))
            }
        };
        types.push(QualifiedName::new(namespace, name));
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::wire::version::{WS_DISCOVERY_11, WS_DISCOVERY_APRIL_2005, WS_DISCOVERY_CD1};

    fn codecs() -> [WireCodec; 3] {
        [
            WireCodec::new(&WS_DISCOVERY_11),
            WireCodec::new(&WS_DISCOVERY_CD1),
            WireCodec::new(&WS_DISCOVERY_APRIL_2005),
        ]
    }

    fn full_criteria() -> FindCriteria {
        FindCriteria::new()
            .with_type(QualifiedName::new("urn:devices", "Printer"))
            .with_type(QualifiedName::new("urn:other", "Scanner"))
            .with_type(QualifiedName::new("urn:devices", "Fax"))
            .with_scope("ldap:///ou=floor2,o=example")
            .with_scope_match_by(ScopeMatchBy::Ldap)
            .with_max_results(3)
            .with_duration(Duration::from_millis(2500))
            .with_extension(r#"<x:Hint xmlns:x="urn:x">fast</x:Hint>"#)
    }

    #[test]
    fn find_criteria_survive_every_version() {
        for codec in codecs() {
            for criteria in [FindCriteria::new(), full_criteria()] {
                let xml = codec.find_criteria_to_xml(&criteria);
                assert_eq!(codec.find_criteria_from_xml(&xml).unwrap(), criteria, "{xml}");
            }
        }
    }

    #[test]
    fn custom_scope_rule_is_carried() {
        let codec = WireCodec::new(&WS_DISCOVERY_11);
        let criteria = FindCriteria::new()
            .with_scope("a:b")
            .with_scope_match_by(ScopeMatchBy::Custom("urn:rule".into()));
        let xml = codec.find_criteria_to_xml(&criteria);
        assert!(xml.contains(r#"MatchBy="urn:rule""#));
        assert_eq!(codec.find_criteria_from_xml(&xml).unwrap(), criteria);
    }

    #[test]
    fn missing_match_by_means_prefix() {
        let codec = WireCodec::new(&WS_DISCOVERY_11);
        let xml = format!(
            r#"<d:Probe xmlns:d="{}"><d:Scopes>http://a/b</d:Scopes></d:Probe>"#,
            WS_DISCOVERY_11.discovery_namespace
        );
        let criteria = codec.find_criteria_from_xml(&xml).unwrap();
        assert_eq!(criteria.scope_match_by, ScopeMatchBy::Prefix);
        assert_eq!(criteria.scopes, vec!["http://a/b".to_string()]);
    }

    #[test]
    fn resolve_criteria_survive_every_version() {
        for codec in codecs() {
            let criteria = ResolveCriteria::new("urn:uuid:42").with_duration(Duration::from_secs(5));
            let xml = codec.resolve_criteria_to_xml(&criteria);
            assert_eq!(codec.resolve_criteria_from_xml(&xml).unwrap(), criteria);
        }
    }

    #[test]
    fn metadata_survives_every_version() {
        let metadata = EndpointDiscoveryMetadata::new("urn:uuid:42")
            .with_type(QualifiedName::new("urn:devices", "Printer"))
            .with_scope("http://example.com/a")
            .with_listen_uri("http://10.0.0.1:80/svc")
            .with_version(7)
            .with_extension(r#"<x:Note xmlns:x="urn:x"/>"#);
        for codec in codecs() {
            let xml = codec.metadata_to_xml(&metadata);
            assert_eq!(codec.metadata_from_xml(&xml).unwrap(), metadata);
        }
    }

    #[test]
    fn foreign_version_is_rejected() {
        let xml = WireCodec::new(&WS_DISCOVERY_11).find_criteria_to_xml(&FindCriteria::new());
        let err = WireCodec::new(&WS_DISCOVERY_APRIL_2005)
            .find_criteria_from_xml(&xml)
            .unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn broken_input_is_reported() {
        let codec = WireCodec::new(&WS_DISCOVERY_11);
        assert!(matches!(
            codec.find_criteria_from_xml("<d:Probe"),
            Err(Error::Xml(_))
        ));

        let ns = WS_DISCOVERY_11.discovery_namespace;
        let no_epr = format!(r#"<d:Resolve xmlns:d="{ns}"/>"#);
        assert!(matches!(
            codec.resolve_criteria_from_xml(&no_epr),
            Err(Error::Malformed(_))
        ));

        let bad_prefix = format!(r#"<d:Probe xmlns:d="{ns}"><d:Types>q:Thing</d:Types></d:Probe>"#);
        assert!(matches!(
            codec.find_criteria_from_xml(&bad_prefix),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn missing_metadata_version_reads_as_zero() {
        let codec = WireCodec::new(&WS_DISCOVERY_11);
        let xml = format!(
            r#"<d:Hello xmlns:d="{}" xmlns:wsa="{}"><wsa:EndpointReference><wsa:Address>urn:uuid:1</wsa:Address></wsa:EndpointReference></d:Hello>"#,
            WS_DISCOVERY_11.discovery_namespace, WS_DISCOVERY_11.addressing_namespace
        );
        let metadata = codec.metadata_from_xml(&xml).unwrap();
        assert_eq!(metadata.version, 0);
        assert_eq!(metadata.address.as_str(), "urn:uuid:1");
    }
}
