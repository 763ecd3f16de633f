//! Scope matching rules.

use url::Url;
use uuid::Uuid;

use super::criteria::ScopeMatchBy;
use crate::{Error, Result};

/// Whether the advertised scope satisfies the requested one under `rule`.
///
/// [`ScopeMatchBy::None`] is decided at the criteria level and never reaches
/// this function with a meaningful answer; it is treated as "no match".
pub(crate) fn scope_matches(rule: &ScopeMatchBy, requested: &str, advertised: &str) -> Result<bool> {
    match rule {
        ScopeMatchBy::Exact => Ok(requested == advertised),
        ScopeMatchBy::Prefix => Ok(prefix_matches(requested, advertised)),
        ScopeMatchBy::Ldap => Ok(ldap_matches(requested, advertised)),
        ScopeMatchBy::Uuid => Ok(uuid_matches(requested, advertised)),
        ScopeMatchBy::None => Ok(false),
        ScopeMatchBy::Custom(uri) => Err(Error::UnsupportedScopeMatch(uri.clone())),
    }
}

/// RFC 3986 rule: scheme and authority compare case-insensitively, the path
/// compares segment by segment. Query and fragment are ignored.
fn prefix_matches(requested: &str, advertised: &str) -> bool {
    let (requested_url, advertised_url) = match (Url::parse(requested), Url::parse(advertised)) {
        (Ok(r), Ok(a)) => (r, a),
        _ => return string_prefix_matches(requested, advertised),
    };

    if requested_url.scheme() != advertised_url.scheme()
        || requested_url.username() != advertised_url.username()
        || requested_url.port_or_known_default() != advertised_url.port_or_known_default()
    {
        return false;
    }
    match (requested_url.host_str(), advertised_url.host_str()) {
        (Some(r), Some(a)) if r.eq_ignore_ascii_case(a) => {}
        (None, None) => {}
        _ => return false,
    }

    match (requested_url.path_segments(), advertised_url.path_segments()) {
        (Some(r), Some(a)) => {
            let r: Vec<&str> = r.filter(|s| !s.is_empty()).collect();
            let a: Vec<&str> = a.filter(|s| !s.is_empty()).collect();
            r.len() <= a.len() && r.iter().zip(a.iter()).all(|(x, y)| x == y)
        }
        _ => string_prefix_matches(requested_url.path(), advertised_url.path()),
    }
}

fn string_prefix_matches(requested: &str, advertised: &str) -> bool {
    let requested = requested.trim_end_matches('/');
    match advertised.strip_prefix(requested) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// LDAP rule: the requested DN must equal or be an ancestor of the advertised
/// DN. RDNs compare case-insensitively, root last.
fn ldap_matches(requested: &str, advertised: &str) -> bool {
    let (Some((r_authority, r_dn)), Some((a_authority, a_dn))) =
        (split_ldap(requested), split_ldap(advertised))
    else {
        return false;
    };
    if !r_authority.eq_ignore_ascii_case(a_authority) {
        return false;
    }

    let r = rdns(r_dn);
    let a = rdns(a_dn);
    r.len() <= a.len() && r.iter().rev().zip(a.iter().rev()).all(|(x, y)| x == y)
}

fn split_ldap(uri: &str) -> Option<(&str, &str)> {
    let scheme = uri.get(..5)?;
    if !scheme.eq_ignore_ascii_case("ldap:") {
        return None;
    }
    let rest = uri[5..].strip_prefix("//")?;
    match rest.find('/') {
        Some(i) => Some((&rest[..i], &rest[i + 1..])),
        None => Some((rest, "")),
    }
}

fn rdns(dn: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in dn.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == ',' {
            parts.push(normalize_rdn(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        parts.push(normalize_rdn(&current));
    }
    parts
}

fn normalize_rdn(rdn: &str) -> String {
    match rdn.split_once('=') {
        Some((attr, value)) => format!("{}={}", attr.trim(), value.trim()).to_lowercase(),
        None => rdn.trim().to_lowercase(),
    }
}

fn uuid_matches(requested: &str, advertised: &str) -> bool {
    match (parse_uuid(requested), parse_uuid(advertised)) {
        (Some(r), Some(a)) => r == a,
        _ => false,
    }
}

fn parse_uuid(uri: &str) -> Option<Uuid> {
    let lower = uri.to_ascii_lowercase();
    let raw = lower
        .strip_prefix("urn:uuid:")
        .or_else(|| lower.strip_prefix("uuid:"))?;
    Uuid::parse_str(raw).ok()
}
