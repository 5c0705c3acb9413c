//! Capability classification of links.
//!
//! What a participant may do with one of its links follows from the link's
//! declared type. The policy is fixed and case-insensitive:
//!
//! | type      | subscribable | publishable | gettable | puttable |
//! |-----------|--------------|-------------|----------|----------|
//! | `stream`  | yes          | yes         |          |          |
//! | `data`    |              |             | yes      |          |
//! | `mutable` |              |             | yes      | yes      |
//! | other     |              |             | yes      |          |
//!
//! Any other type names a value type (`float`, `int`, ...) and is treated
//! as plain data.

use crate::descriptor::Link;
use crate::topic::Topic;
use std::collections::{BTreeMap, HashMap};

/// Link type for pub/sub streams.
pub const STREAM: &str = "stream";
/// Link type for read-only values.
pub const DATA: &str = "data";
/// Link type for values that remote callers may overwrite.
pub const MUTABLE: &str = "mutable";

/// Capabilities of a single link.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Capabilities {
    pub subscribable: bool,
    pub publishable: bool,
    pub gettable: bool,
    pub puttable: bool,
}

impl Capabilities {
    /// Classify a declared link type.
    pub fn classify(link_type: &str) -> Self {
        match link_type.to_ascii_lowercase().as_str() {
            STREAM => Self {
                subscribable: true,
                publishable: true,
                ..Self::default()
            },
            MUTABLE => Self {
                gettable: true,
                puttable: true,
                ..Self::default()
            },
            DATA => Self::read_only(),
            // value types (`float`, `int`, ...)
            _ => Self::read_only(),
        }
    }

    fn read_only() -> Self {
        Self {
            gettable: true,
            ..Self::default()
        }
    }
}

/// Boolean capability tables keyed by link path.
///
/// Every declared link has an entry in each of the four tables.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CapabilityTables {
    subscribable: HashMap<Topic, bool>,
    publishable: HashMap<Topic, bool>,
    gettable: HashMap<Topic, bool>,
    puttable: HashMap<Topic, bool>,
}

impl CapabilityTables {
    /// Derive the tables from a flattened link map.
    pub fn from_links(links: &BTreeMap<Topic, Link>) -> Self {
        let mut tables = Self::default();
        for (path, link) in links {
            let caps = Capabilities::classify(&link.link_type);
            tables.subscribable.insert(path.clone(), caps.subscribable);
            tables.publishable.insert(path.clone(), caps.publishable);
            tables.gettable.insert(path.clone(), caps.gettable);
            tables.puttable.insert(path.clone(), caps.puttable);
        }
        tables
    }

    /// Capabilities of one path, `None` if the path is not declared.
    pub fn get(&self, path: &str) -> Option<Capabilities> {
        Some(Capabilities {
            subscribable: *self.subscribable.get(path)?,
            publishable: *self.publishable.get(path)?,
            gettable: *self.gettable.get(path)?,
            puttable: *self.puttable.get(path)?,
        })
    }

    pub fn is_subscribable(&self, path: &str) -> bool {
        self.subscribable.get(path).copied().unwrap_or(false)
    }

    pub fn is_publishable(&self, path: &str) -> bool {
        self.publishable.get(path).copied().unwrap_or(false)
    }

    pub fn is_gettable(&self, path: &str) -> bool {
        self.gettable.get(path).copied().unwrap_or(false)
    }

    pub fn is_puttable(&self, path: &str) -> bool {
        self.puttable.get(path).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.gettable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gettable.is_empty()
    }
}
