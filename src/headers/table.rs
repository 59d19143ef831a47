//! Case-insensitive, multi-valued header storage.
//!
//! # Responsibilities
//! - Store header values grouped under their lower-cased name, in arrival order
//! - Enforce the table mode: request tables are read-only, response tables are
//!   mutable until the owning response finalizes them
//! - Derive `Content-Length`, `Connection` and `Transfer-Encoding` semantics
//!
//! # Design Decisions
//! - A `Vec` of entries instead of a map: header counts are small and the
//!   insertion order is the order written to the wire
//! - Every mutation goes through `ensure_mutable`, so a finalized table can
//!   never be observed with pending changes

use http::Version;

use crate::error::HeaderImmutableError;

/// Mutability mode of a header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Request headers; never mutable.
    ReadOnly,
    /// Response headers before the head is sent.
    Mutable,
    /// Response headers after the head is sent.
    Finalized,
}

/// Header storage keyed by lower-cased name.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    entries: Vec<(String, Vec<String>)>,
    mode: HeaderMode,
    version: Version,
}

impl HeaderTable {
    /// Build a read-only table from raw `(name, value)` pairs.
    ///
    /// Repeated names are grouped, keeping the order in which values arrived.
    pub fn request<I, N, V>(version: Version, pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        let mut table = Self {
            entries: Vec::new(),
            mode: HeaderMode::Mutable,
            version,
        };
        for (name, value) in pairs {
            table.push(normalize(name.as_ref()), value.into());
        }
        table.mode = HeaderMode::ReadOnly;
        table
    }

    /// Create an empty, mutable response table.
    pub fn response(version: Version) -> Self {
        Self {
            entries: Vec::new(),
            mode: HeaderMode::Mutable,
            version,
        }
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    pub fn is_mutable(&self) -> bool {
        self.mode == HeaderMode::Mutable
    }

    pub fn is_finalized(&self) -> bool {
        self.mode == HeaderMode::Finalized
    }

    /// Protocol version the derived accessors are evaluated against.
    pub fn version(&self) -> Version {
        self.version
    }

    /// All values stored under `name`, in order.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        let name = normalize(name);
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, values)| values.as_slice())
    }

    /// First value stored under `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over `(name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into one `(name, value)` pair per value, in wire order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.clone(), v.clone())))
            .collect()
    }

    /// Replace every value of `name`. An empty `values` removes the header.
    pub fn set<I, V>(&mut self, name: &str, values: I) -> Result<(), HeaderImmutableError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.ensure_mutable(name)?;
        let name = normalize(name);
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let position = self.entries.iter().position(|(key, _)| *key == name);
        match (position, values.is_empty()) {
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (Some(index), false) => self.entries[index].1 = values,
            (None, true) => {}
            (None, false) => self.entries.push((name, values)),
        }
        Ok(())
    }

    /// Append one value to `name`, keeping existing values.
    pub fn add(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderImmutableError> {
        self.ensure_mutable(name)?;
        self.push(normalize(name), value.into());
        Ok(())
    }

    /// Remove `name` and return its values.
    pub fn remove(&mut self, name: &str) -> Result<Option<Vec<String>>, HeaderImmutableError> {
        self.ensure_mutable(name)?;
        let name = normalize(name);
        Ok(self
            .entries
            .iter()
            .position(|(key, _)| *key == name)
            .map(|index| self.entries.remove(index).1))
    }

    pub fn clear(&mut self) -> Result<(), HeaderImmutableError> {
        self.ensure_mutable("headers")?;
        self.entries.clear();
        Ok(())
    }

    /// Numeric `Content-Length`, if present and unambiguous.
    pub fn content_length(&self) -> Option<u64> {
        let values = self.get("content-length")?;
        let mut parsed = values.iter().map(|v| v.trim().parse::<u64>().ok());
        let first = parsed.next()??;
        // Repeated values are only acceptable when they all agree.
        if parsed.all(|v| v == Some(first)) {
            Some(first)
        } else {
            None
        }
    }

    pub fn set_content_length(&mut self, length: Option<u64>) -> Result<(), HeaderImmutableError> {
        match length {
            Some(length) => self.set("content-length", [length.to_string()]),
            None => self.set("content-length", Vec::<String>::new()),
        }
    }

    /// Whether the connection stays open after this message.
    ///
    /// An explicit `close` token wins, then `keep-alive`; otherwise HTTP/1.1
    /// and later default to persistent and older versions do not.
    pub fn persistent_connection(&self) -> bool {
        if self.has_token("connection", "close") {
            return false;
        }
        if self.has_token("connection", "keep-alive") {
            return true;
        }
        self.version >= Version::HTTP_11
    }

    pub fn set_persistent_connection(&mut self, persistent: bool) -> Result<(), HeaderImmutableError> {
        match (persistent, self.version >= Version::HTTP_11) {
            (false, _) => self.set("connection", ["close"]),
            (true, true) => self.set("connection", Vec::<String>::new()),
            (true, false) => self.set("connection", ["keep-alive"]),
        }
    }

    /// Whether `chunked` is the final transfer coding.
    pub fn chunked_transfer_encoding(&self) -> bool {
        self.get("transfer-encoding")
            .and_then(|values| values.last())
            .and_then(|value| value.split(',').last())
            .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.first("content-type")
    }

    pub fn host(&self) -> Option<&str> {
        self.first("host")
    }

    /// Freeze a mutable table. Returns `false` if it was not mutable.
    pub(crate) fn finalize(&mut self) -> bool {
        if self.mode != HeaderMode::Mutable {
            return false;
        }
        self.mode = HeaderMode::Finalized;
        true
    }

    fn ensure_mutable(&self, target: &str) -> Result<(), HeaderImmutableError> {
        if self.is_mutable() {
            Ok(())
        } else {
            Err(HeaderImmutableError::new(normalize(target)))
        }
    }

    fn push(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|values| {
                values
                    .iter()
                    .flat_map(|value| value.split(','))
                    .any(|t| t.trim().eq_ignore_ascii_case(token))
            })
            .unwrap_or(false)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
