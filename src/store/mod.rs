//! The persistence collaborator packers read from and write back to.
//!
//! A [`ContentStore`] owns the content tree.  Packers only ever hold a
//! [`Handle`]; parent and child links are looked up through the store on
//! demand, never cached.

pub mod dir;
pub mod memory;

use std::io::{self, Read};

use thiserror::Error;

use crate::node::{Handle, NodeKind};

pub use dir::DirStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No such node: {0}")]
    NotFound(Handle),
    #[error("Node {0} already exists")]
    Duplicate(Handle),
    #[error("Not authorized to modify {handle}: {reason}")]
    Authorization { handle: Handle, reason: String },
    #[error("Field '{field}' is not part of the {kind} schema")]
    UnknownField { kind: NodeKind, field: String },
    #[error("Payload '{name}' not found on {handle}")]
    PayloadNotFound { handle: Handle, name: String },
    #[error("Invalid payload name: {0:?}")]
    InvalidPayloadName(String),
    #[error("Node file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Size and name of one stored payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadInfo {
    pub name: String,
    pub size: u64,
}

pub trait ContentStore {
    fn kind(&self, handle: &Handle) -> Result<NodeKind, StoreError>;

    fn parent(&self, handle: &Handle) -> Result<Option<Handle>, StoreError>;

    /// Direct children, in a stable order.
    fn children(&self, handle: &Handle) -> Result<Vec<Handle>, StoreError>;

    fn metadata(&self, handle: &Handle, field: &str) -> Result<Option<String>, StoreError>;

    /// Stage a field value.  Becomes durable on [`ContentStore::update`].
    fn set_metadata(&mut self, handle: &Handle, field: &str, value: &str) -> Result<(), StoreError>;

    /// Every payload attached to the node, sorted by name.
    fn payloads(&self, handle: &Handle) -> Result<Vec<PayloadInfo>, StoreError>;

    fn payload(&self, handle: &Handle, name: &str) -> Result<Option<PayloadInfo>, StoreError> {
        Ok(self.payloads(handle)?.into_iter().find(|p| p.name == name))
    }

    fn retrieve<'a>(&'a self, handle: &Handle, name: &str) -> Result<Box<dyn Read + 'a>, StoreError>;

    /// Replace payload `name` with the contents of `stream`, or remove it
    /// when `stream` is `None`.
    fn set_payload(
        &mut self,
        handle: &Handle,
        name:   &str,
        stream: Option<&mut dyn Read>,
    ) -> Result<(), StoreError>;

    /// Commit the node.  Authorization is checked here.
    fn update(&mut self, handle: &Handle) -> Result<(), StoreError>;
}
