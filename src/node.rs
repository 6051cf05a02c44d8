//! Identity of content-tree nodes: kind tags and handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of node kinds a packer exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Community,
    Collection,
    Item,
}

impl NodeKind {
    /// Tag written as `OBJECT_TYPE`.
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Community  => "community",
            NodeKind::Collection => "collection",
            NodeKind::Item       => "item",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "community"  => Some(NodeKind::Community),
            "collection" => Some(NodeKind::Collection),
            "item"       => Some(NodeKind::Item),
            _            => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Stable, globally unique node identifier such as `123456789/42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(handle: impl Into<String>) -> Self {
        Handle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe form used to name archives.
    ///
    /// `/` becomes `-`; letters, digits and `.` are kept (except a leading
    /// `.`); every other byte is written as `_XX` in upper-case hex.  The
    /// mapping is injective, so distinct handles never share an archive name.
    pub fn archive_stem(&self) -> String {
        if self.0.is_empty() {
            return "_".to_owned();
        }
        let mut stem = String::with_capacity(self.0.len());
        for (i, b) in self.0.bytes().enumerate() {
            match b {
                b'/' => stem.push('-'),
                b'.' if i > 0 => stem.push('.'),
                b if b.is_ascii_alphanumeric() => stem.push(b as char),
                b => stem.push_str(&format!("_{b:02X}")),
            }
        }
        stem
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Handle(s.to_owned())
    }
}

impl From<String> for Handle {
    fn from(s: String) -> Self {
        Handle(s)
    }
}
