//! Qualified names and namespace resolution.
//!
//! A [`Name`] is a (namespace URI, local name) pair. Textual names come in two
//! forms: the prefixed form `prefix:local`, which needs a [`NamespaceResolver`]
//! to map the prefix to a URI, and the expanded form `{uri}local`, which does
//! not.

use std::collections::HashMap;
use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;

/// The empty (default) namespace.
pub const NS_DEFAULT_URI: &str = "";
/// Namespace of built-in items (`jcr:`).
pub const NS_JCR_URI: &str = "http://www.jcp.org/jcr/1.0";
/// Namespace of built-in primary node types (`nt:`).
pub const NS_NT_URI: &str = "http://www.jcp.org/jcr/nt/1.0";
/// Namespace of built-in mixin node types (`mix:`).
pub const NS_MIX_URI: &str = "http://www.jcp.org/jcr/mix/1.0";
/// The XML namespace (`xml:`).
pub const NS_XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

const ILLEGAL_CHARS: &[char] = &['/', ':', '[', ']', '*', '|'];

/// Maps namespace prefixes to URIs and back.
pub trait NamespaceResolver: Send + Sync {
    /// Resolve a prefix to its namespace URI.
    fn uri_for_prefix(&self, prefix: &str) -> Result<String, Error>;

    /// Resolve a namespace URI to its prefix.
    fn prefix_for_uri(&self, uri: &str) -> Result<String, Error>;
}

/// A qualified name.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct Name {
    /// Namespace URI (empty for the default namespace).
    pub namespace: String,
    /// Local part of the name.
    pub local_name: String,
}

impl Name {
    /// Create a name without validating it.
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Parse a name in prefixed (`prefix:local`), plain (`local`) or
    /// expanded (`{uri}local`) form.
    pub fn parse(text: &str, resolver: &dyn NamespaceResolver) -> Result<Self, Error> {
        if text.is_empty() {
            return Err(Error::illegal_name(text, "empty name"));
        }

        if let Some(rest) = text.strip_prefix('{') {
            let end = rest
                .find('}')
                .ok_or_else(|| Error::illegal_name(text, "unterminated namespace uri"))?;
            let uri = &rest[..end];
            let local = &rest[end + 1..];
            validate_local_name(text, local)?;
            return Ok(Self::new(uri, local));
        }

        match text.split_once(':') {
            Some((prefix, local)) => {
                validate_prefix(text, prefix)?;
                validate_local_name(text, local)?;
                let uri = resolver.uri_for_prefix(prefix)?;
                Ok(Self::new(uri, local))
            }
            None => {
                validate_local_name(text, text)?;
                Ok(Self::new(NS_DEFAULT_URI, text))
            }
        }
    }

    /// Render the name in prefixed form.
    pub fn format(&self, resolver: &dyn NamespaceResolver) -> Result<String, Error> {
        if self.namespace.is_empty() {
            return Ok(self.local_name.clone());
        }
        let prefix = resolver.prefix_for_uri(&self.namespace)?;
        if prefix.is_empty() {
            Ok(self.local_name.clone())
        } else {
            Ok(format!("{}:{}", prefix, self.local_name))
        }
    }
}

impl fmt::Display for Name {
    /// Expanded form; needs no resolver.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

fn validate_prefix(text: &str, prefix: &str) -> Result<(), Error> {
    if prefix.is_empty() {
        return Err(Error::illegal_name(text, "empty prefix"));
    }
    if prefix.chars().any(|c| c.is_whitespace() || ILLEGAL_CHARS.contains(&c) || c == '{' || c == '}') {
        return Err(Error::illegal_name(text, "illegal character in prefix"));
    }
    Ok(())
}

fn validate_local_name(text: &str, local: &str) -> Result<(), Error> {
    if local.is_empty() {
        return Err(Error::illegal_name(text, "empty local name"));
    }
    if local == "." || local == ".." {
        return Err(Error::illegal_name(text, "reserved local name"));
    }
    if local.starts_with(char::is_whitespace) || local.ends_with(char::is_whitespace) {
        return Err(Error::illegal_name(text, "leading or trailing whitespace"));
    }
    if let Some(c) = local.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
        return Err(Error::illegal_name(text, format!("illegal character '{}'", c)));
    }
    Ok(())
}

/// In-memory namespace registry.
///
/// Preloaded with the built-in prefixes `""`, `jcr`, `nt`, `mix` and `xml`,
/// none of which can be remapped.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    prefix_to_uri: HashMap<String, String>,
    uri_to_prefix: HashMap<String, String>,
}

impl NamespaceRegistry {
    const BUILT_IN: [(&'static str, &'static str); 5] = [
        ("", NS_DEFAULT_URI),
        ("jcr", NS_JCR_URI),
        ("nt", NS_NT_URI),
        ("mix", NS_MIX_URI),
        ("xml", NS_XML_URI),
    ];

    /// Create a registry with the built-in mappings.
    pub fn new() -> Self {
        let mut registry = Self {
            prefix_to_uri: HashMap::new(),
            uri_to_prefix: HashMap::new(),
        };
        for (prefix, uri) in Self::BUILT_IN {
            registry.prefix_to_uri.insert(prefix.to_string(), uri.to_string());
            registry.uri_to_prefix.insert(uri.to_string(), prefix.to_string());
        }
        registry
    }

    /// Register (or remap) a prefix.
    pub fn register(&mut self, prefix: &str, uri: &str) -> Result<(), Error> {
        if Self::BUILT_IN.iter().any(|(p, u)| *p == prefix || *u == uri) {
            return Err(Error::illegal_name(prefix, "built-in namespace mapping cannot be changed"));
        }
        validate_prefix(prefix, prefix)?;

        if let Some(old_uri) = self.prefix_to_uri.remove(prefix) {
            self.uri_to_prefix.remove(&old_uri);
        }
        if let Some(old_prefix) = self.uri_to_prefix.remove(uri) {
            self.prefix_to_uri.remove(&old_prefix);
        }
        self.prefix_to_uri.insert(prefix.to_string(), uri.to_string());
        self.uri_to_prefix.insert(uri.to_string(), prefix.to_string());
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Result<Self, Error> {
        self.register(prefix, uri)?;
        Ok(self)
    }

    /// Number of registered mappings.
    pub fn len(&self) -> usize {
        self.prefix_to_uri.len()
    }

    /// Always false; the built-in mappings are never removed.
    pub fn is_empty(&self) -> bool {
        self.prefix_to_uri.is_empty()
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceResolver for NamespaceRegistry {
    fn uri_for_prefix(&self, prefix: &str) -> Result<String, Error> {
        self.prefix_to_uri
            .get(prefix)
            .cloned()
            .ok_or_else(|| Error::UnknownPrefix(prefix.to_string()))
    }

    fn prefix_for_uri(&self, uri: &str) -> Result<String, Error> {
        self.uri_to_prefix
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::UnknownNamespace(uri.to_string()))
    }
}
