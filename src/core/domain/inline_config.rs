//! Codec for the PVE inline configuration micro-format.
//!
//! Several guest configuration fields (`net0`, `ipconfig0`, ...) pack
//! sub-fields into a single comma-separated `key=value` string, e.g.
//! `virtio,bridge=vmbr0,firewall=1,rate=125`. This codec parses that format
//! into an ordered map so partial updates can overwrite individual keys
//! without disturbing their siblings, then serializes it back.

use indexmap::IndexMap;

/// An ordered view of one inline config string.
///
/// Insertion order is preserved across parse, mutation and serialization, so
/// an untouched value round-trips byte-identically. Bare tokens without an
/// `=` (such as the leading `virtio` model token) are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineConfig {
    entries: IndexMap<String, Option<String>>,
}

impl InlineConfig {
    /// Parses a comma-separated `key=value` string.
    ///
    /// Each token is split on the first `=`; keys are case-sensitive.
    /// Duplicate keys are unspecified upstream, so the last occurrence wins.
    pub fn parse(raw: &str) -> Self {
        let mut entries = IndexMap::new();
        for token in raw.split(',') {
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => {
                    entries.insert(key.to_string(), Some(value.to_string()));
                }
                None => {
                    entries.insert(token.to_string(), None);
                }
            }
        }
        Self { entries }
    }

    /// Serializes the map back into the wire representation, joining
    /// `key=value` pairs with `,` in iteration order.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={value}"),
                None => key.clone(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Overwrites or appends a single key.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), Some(value.into()));
    }

    /// Returns the value for a key, if the key is present with a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|value| value.as_deref())
    }

    /// Returns `true` if the key is present, with or without a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
