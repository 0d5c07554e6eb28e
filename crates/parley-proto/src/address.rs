//! Instant-messaging addresses.
//!
//! An [`Address`] is the bare `node@domain` identity of a user, a room or a
//! server. It is normalized to lowercase on construction so that equality and
//! hashing are by value. A [`FullAddress`] adds the optional connection
//! resource (`node@domain/resource`), which is kept exactly as received.
//!
//! ```rust
//! use parley_proto::{Address, FullAddress};
//!
//! let bare: Address = "Alice@Example.COM".parse().unwrap();
//! assert_eq!(bare.as_str(), "alice@example.com");
//! assert_eq!(bare.node(), Some("alice"));
//!
//! let full: FullAddress = "alice@example.com/Laptop".parse().unwrap();
//! assert_eq!(full.address(), &bare);
//! assert_eq!(full.resource(), Some("Laptop"));
//! ```

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{opt, rest},
    sequence::{preceded, terminated},
    IResult,
};

use crate::error::{ProtocolError, Result};

fn is_node_char(c: char) -> bool {
    !matches!(c, '@' | '/' | '"' | '&' | '\'' | ':' | '<' | '>') && !c.is_whitespace()
}

fn is_domain_char(c: char) -> bool {
    !matches!(c, '@' | '/') && !c.is_whitespace()
}

fn parse_node(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(is_node_char), char('@'))(input)
}

fn parse_domain(input: &str) -> IResult<&str, &str> {
    take_while1(is_domain_char)(input)
}

fn parse_resource(input: &str) -> IResult<&str, &str> {
    preceded(char('/'), rest)(input)
}

/// Split `[node@]domain[/resource]` into its parts.
fn parse_parts(input: &str) -> IResult<&str, (Option<&str>, &str, Option<&str>)> {
    let (input, node) = opt(parse_node)(input)?;
    let (input, domain) = parse_domain(input)?;
    let (input, resource) = opt(parse_resource)(input)?;
    Ok((input, (node, domain, resource)))
}

fn split(input: &str) -> Result<(Option<&str>, &str, Option<&str>)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyAddress);
    }
    match parse_parts(trimmed) {
        Ok(("", parts)) => Ok(parts),
        Ok(_) => Err(ProtocolError::invalid(input, "trailing characters")),
        Err(_) => Err(ProtocolError::invalid(input, "malformed node or domain")),
    }
}

fn validate_domain(input: &str, domain: &str) -> Result<()> {
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ProtocolError::invalid(input, "malformed domain"));
    }
    Ok(())
}

/// A bare, normalized `node@domain` (or `domain`) identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Address(String);

impl Address {
    /// Parse a bare address. A resource part is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let (node, domain, resource) = split(input)?;
        if resource.is_some() {
            return Err(ProtocolError::UnexpectedResource(input.to_string()));
        }
        Self::from_parts(node, domain)
    }

    /// Build an address from its node and domain.
    pub fn from_parts(node: Option<&str>, domain: &str) -> Result<Self> {
        let joined = match node {
            Some(node) => format!("{node}@{domain}"),
            None => domain.to_string(),
        };
        if let Some(node) = node {
            if node.is_empty() || !node.chars().all(is_node_char) {
                return Err(ProtocolError::invalid(&joined, "malformed node"));
            }
        }
        if domain.is_empty() || !domain.chars().all(is_domain_char) {
            return Err(ProtocolError::invalid(&joined, "malformed domain"));
        }
        validate_domain(&joined, domain)?;
        Ok(Self(joined.to_lowercase()))
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`, if any.
    pub fn node(&self) -> Option<&str> {
        self.0.split_once('@').map(|(node, _)| node)
    }

    /// The part after `@` (or the whole address for a domain-only identity).
    pub fn domain(&self) -> &str {
        match self.0.split_once('@') {
            Some((_, domain)) => domain,
            None => &self.0,
        }
    }

    /// Attach a connection resource.
    pub fn with_resource(&self, resource: impl Into<String>) -> FullAddress {
        FullAddress {
            address: self.clone(),
            resource: Some(resource.into()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An address plus an optional connection resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct FullAddress {
    address: Address,
    resource: Option<String>,
}

impl FullAddress {
    /// Parse `node@domain[/resource]`.
    pub fn parse(input: &str) -> Result<Self> {
        let (node, domain, resource) = split(input)?;
        let address = Address::from_parts(node, domain)?;
        let resource = match resource {
            Some("") => return Err(ProtocolError::invalid(input, "empty resource")),
            Some(r) => Some(r.to_string()),
            None => None,
        };
        Ok(Self { address, resource })
    }

    /// The bare address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The resource, if one was given.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Drop the resource.
    pub fn into_bare(self) -> Address {
        self.address
    }
}

impl From<Address> for FullAddress {
    fn from(address: Address) -> Self {
        Self {
            address,
            resource: None,
        }
    }
}

impl fmt::Display for FullAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}/{}", self.address, resource),
            None => write!(f, "{}", self.address),
        }
    }
}

impl FromStr for FullAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FullAddress {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FullAddress> for String {
    fn from(full: FullAddress) -> Self {
        full.to_string()
    }
}
