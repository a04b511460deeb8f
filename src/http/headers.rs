//! Request headers
//!
//! Headers are kept in the order they were parsed. Names are matched
//! exactly, so `content-length` and `Content-Length` are different keys.
//! Duplicate names are allowed; [`Headers::get`] returns the first one
//! parsed.

use super::{Error, Result, MAX_HEADERS};

/// Ordered multi-map of header names to values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    /// Append a header, keeping any earlier value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        if self.headers.len() >= MAX_HEADERS {
            return Err(Error::BadRequest(format!(
                "more than {} headers",
                MAX_HEADERS
            )));
        }

        self.headers.push((name.into(), value.into()));
        Ok(())
    }

    /// Get the first parsed value for a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a header in parse order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all headers in parse order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parse a `Key: Value` line
    ///
    /// The line is split at the first `:`, which may be neither the first
    /// nor the last character. Both sides are stripped of ASCII spaces
    /// (tabs are kept) and must not end up empty.
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let colon_pos = line
            .find(':')
            .ok_or_else(|| Error::BadRequest(format!("no colon in header: {}", line)))?;

        if colon_pos == 0 || colon_pos == line.len() - 1 {
            return Err(Error::BadRequest(format!("malformed header: {}", line)));
        }

        let name = trim_spaces(&line[..colon_pos]);
        let value = trim_spaces(&line[colon_pos + 1..]);

        if name.is_empty() {
            return Err(Error::BadRequest("empty header name".to_string()));
        }
        if value.is_empty() {
            return Err(Error::BadRequest(format!("empty value for header {}", name)));
        }

        Ok((name.to_string(), value.to_string()))
    }
}

/// Strip leading and trailing ASCII spaces only
pub(crate) fn trim_spaces(s: &str) -> &str {
    s.trim_matches(' ')
}
