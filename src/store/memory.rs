use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};

use tracing::debug;

use super::{ContentStore, PayloadInfo, StoreError};
use crate::node::{Handle, NodeKind};
use crate::schema;

#[derive(Debug, Clone)]
struct NodeRecord {
    kind:     NodeKind,
    parent:   Option<Handle>,
    children: Vec<Handle>,
    metadata: BTreeMap<String, String>,
    payloads: BTreeMap<String, Vec<u8>>,
}

/// In-process content tree.
///
/// Commits can be refused per node with [`MemoryStore::deny_updates`] to
/// exercise authorization failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes:   HashMap<Handle, NodeRecord>,
    denied:  HashSet<Handle>,
    commits: HashMap<Handle, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or as a root).
    pub fn insert(
        &mut self,
        handle: impl Into<Handle>,
        kind:   NodeKind,
        parent: Option<&Handle>,
    ) -> Result<Handle, StoreError> {
        let handle = handle.into();
        if self.nodes.contains_key(&handle) {
            return Err(StoreError::Duplicate(handle));
        }
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(handle.clone());
        }
        self.nodes.insert(handle.clone(), NodeRecord {
            kind,
            parent:   parent.cloned(),
            children: Vec::new(),
            metadata: BTreeMap::new(),
            payloads: BTreeMap::new(),
        });
        Ok(handle)
    }

    /// Attach payload bytes directly, bypassing [`ContentStore::set_payload`].
    pub fn put_payload(&mut self, handle: &Handle, name: &str, bytes: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        self.node_mut(handle)?.payloads.insert(name.to_owned(), bytes.into());
        Ok(())
    }

    pub fn payload_bytes(&self, handle: &Handle, name: &str) -> Option<&[u8]> {
        self.nodes.get(handle)?.payloads.get(name).map(Vec::as_slice)
    }

    pub fn deny_updates(&mut self, handle: &Handle) {
        self.denied.insert(handle.clone());
    }

    /// Number of successful commits of `handle`.
    pub fn commit_count(&self, handle: &Handle) -> usize {
        self.commits.get(handle).copied().unwrap_or(0)
    }

    fn node(&self, handle: &Handle) -> Result<&NodeRecord, StoreError> {
        self.nodes.get(handle).ok_or_else(|| StoreError::NotFound(handle.clone()))
    }

    fn node_mut(&mut self, handle: &Handle) -> Result<&mut NodeRecord, StoreError> {
        self.nodes.get_mut(handle).ok_or_else(|| StoreError::NotFound(handle.clone()))
    }
}

impl ContentStore for MemoryStore {
    fn kind(&self, handle: &Handle) -> Result<NodeKind, StoreError> {
        Ok(self.node(handle)?.kind)
    }

    fn parent(&self, handle: &Handle) -> Result<Option<Handle>, StoreError> {
        Ok(self.node(handle)?.parent.clone())
    }

    fn children(&self, handle: &Handle) -> Result<Vec<Handle>, StoreError> {
        Ok(self.node(handle)?.children.clone())
    }

    fn metadata(&self, handle: &Handle, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.node(handle)?.metadata.get(field).cloned())
    }

    fn set_metadata(&mut self, handle: &Handle, field: &str, value: &str) -> Result<(), StoreError> {
        let node = self.node_mut(handle)?;
        if !schema::is_recognized(node.kind, field) {
            return Err(StoreError::UnknownField { kind: node.kind, field: field.to_owned() });
        }
        node.metadata.insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    fn payloads(&self, handle: &Handle) -> Result<Vec<PayloadInfo>, StoreError> {
        Ok(self.node(handle)?
            .payloads
            .iter()
            .map(|(name, bytes)| PayloadInfo { name: name.clone(), size: bytes.len() as u64 })
            .collect())
    }

    fn retrieve<'a>(&'a self, handle: &Handle, name: &str) -> Result<Box<dyn Read + 'a>, StoreError> {
        let bytes = self.node(handle)?
            .payloads
            .get(name)
            .ok_or_else(|| StoreError::PayloadNotFound { handle: handle.clone(), name: name.to_owned() })?;
        Ok(Box::new(Cursor::new(bytes.as_slice())))
    }

    fn set_payload(
        &mut self,
        handle: &Handle,
        name:   &str,
        stream: Option<&mut dyn Read>,
    ) -> Result<(), StoreError> {
        let node = self.node_mut(handle)?;
        match stream {
            Some(s) => {
                let mut bytes = Vec::new();
                s.read_to_end(&mut bytes)?;
                node.payloads.insert(name.to_owned(), bytes);
            }
            None => {
                node.payloads.remove(name);
            }
        }
        Ok(())
    }

    fn update(&mut self, handle: &Handle) -> Result<(), StoreError> {
        self.node(handle)?;
        if self.denied.contains(handle) {
            return Err(StoreError::Authorization {
                handle: handle.clone(),
                reason: "updates denied for this node".to_owned(),
            });
        }
        *self.commits.entry(handle.clone()).or_insert(0) += 1;
        debug!(%handle, "committed node");
        Ok(())
    }
}
