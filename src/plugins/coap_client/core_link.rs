use std::fmt;

use coap_lite::link_format::{LinkFormatParser, LinkFormatWrite};
use log::warn;

/// One web link from a CoRE link-format (RFC 6690) document, as served by `/.well-known/core`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreLink {
    path: String,
    attributes: Vec<(String, String)>,
}

impl CoreLink {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of attribute `key`.  Flag style attributes such as `obs` yield `Some("")`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for CoreLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        let mut write = LinkFormatWrite::new(&mut buf);
        let mut link = write.link(&self.path);
        for (key, value) in &self.attributes {
            link = if value.is_empty() {
                link.attr(key, "")
            } else {
                link.attr_quoted(key, value)
            };
        }
        link.finish()?;
        write.finish()?;
        f.write_str(&buf)
    }
}

/// Parse a link-format payload as far as it is well formed.  Discovery results are informational
/// only, so a malformed document is logged and whatever was parsed before the error is kept.
pub fn parse_all(payload: &[u8]) -> Vec<CoreLink> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => {
            warn!("Discovery payload is not UTF-8: {e}");
            return Vec::new();
        }
    };

    let mut links = Vec::new();
    for item in LinkFormatParser::new(text) {
        match item {
            Ok((path, attributes)) => {
                let attributes = attributes
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect();
                links.push(CoreLink {
                    path: path.to_string(),
                    attributes,
                });
            }
            Err(e) => {
                warn!("Malformed link-format payload after {} links: {e:?}", links.len());
                break;
            }
        }
    }
    links
}
