//! Ordered header set exchanged at the start of every stream.

use std::fmt;

use crate::wire::{HeaderBlock, HeaderField};

/// Name of the content-type header.
pub const CONTENT_TYPE: &str = "content-type";

/// An ordered list of `(name, value)` header pairs.
///
/// Lookups are case-insensitive on the name. Duplicate names are kept in
/// insertion order; [`Headers::get`] returns the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing value with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replace every value for `name` with a single `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.fields.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.fields.push((name, value.into()));
    }

    /// Builder-style [`Headers::append`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// First value matching `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values matching `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The `content-type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<&Headers> for HeaderBlock {
    fn from(headers: &Headers) -> Self {
        HeaderBlock {
            fields: headers
                .fields
                .iter()
                .map(|(name, value)| HeaderField {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

impl From<HeaderBlock> for Headers {
    fn from(block: HeaderBlock) -> Self {
        block
            .fields
            .into_iter()
            .map(|field| (field.name, field.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let headers = Headers::from([("Content-Type", "text/event-stream")]);
        assert_eq!(headers.get("content-type"), Some("text/event-stream"));
        assert_eq!(headers.content_type(), Some("text/event-stream"));
    }

    #[test]
    fn append_keeps_duplicates_in_order() {
        let headers = Headers::new().with("x-trace", "a").with("X-Trace", "b");
        let all: Vec<_> = headers.get_all("x-trace").collect();
        assert_eq!(all, vec!["a", "b"]);
        assert_eq!(headers.get("x-trace"), Some("a"));
    }

    #[test]
    fn insert_replaces_existing_values() {
        let mut headers = Headers::new().with(":path", "/a").with(":PATH", "/b");
        headers.insert(":path", "/c");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(":path"), Some("/c"));
    }

    #[test]
    fn header_block_conversion_preserves_order() {
        let headers = Headers::from([(":method", "GET"), (":path", "/"), ("accept", "*/*")]);
        let block = HeaderBlock::from(&headers);
        assert_eq!(block.fields.len(), 3);
        assert_eq!(block.fields[1].name, ":path");
        assert_eq!(Headers::from(block), headers);
    }

    #[test]
    fn display_joins_pairs() {
        let headers = Headers::from([("a", "1"), ("b", "2")]);
        assert_eq!(headers.to_string(), "a: 1, b: 2");
    }
}
