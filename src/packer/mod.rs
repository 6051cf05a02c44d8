//! Packers map one node kind onto bag sections.
//!
//! Every archive starts with the same property section:
//!
//! | Key           | Value                                     |
//! |---------------|-------------------------------------------|
//! | `BAG_TYPE`    | always `AIP`                              |
//! | `OBJECT_TYPE` | [`NodeKind::tag`]                         |
//! | `OBJECT_ID`   | the node's handle                         |
//! | `OWNER_ID`    | the parent's handle, omitted for roots    |
//!
//! followed by one `metadata` stanza holding the kind's schema fields and the
//! kind's payloads under `data/`.
//!
//! [`PackerFactory`] picks the packer for a node.  [`AnyPacker`] is the closed
//! set of packers; `size` recurses through the factory so that no packer
//! needs to know the kinds of its children.

pub mod collection;
pub mod community;
pub mod factory;
pub mod item;

mod common;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bag::BagError;
use crate::node::{Handle, NodeKind};
use crate::store::{ContentStore, StoreError};

pub use collection::CollectionPacker;
pub use community::CommunityPacker;
pub use factory::PackerFactory;
pub use item::ItemPacker;

/// Section holding the identity properties.
pub const OBJFILE: &str = "object.properties";
/// Section holding the metadata stanza.
pub const METADATA_FILE: &str = "metadata.xml";
pub const METADATA_STANZA: &str = "metadata";
/// Payload name of a container's logo.
pub const LOGO: &str = "logo";

pub const BAG_TYPE: &str = "BAG_TYPE";
pub const OBJECT_TYPE: &str = "OBJECT_TYPE";
pub const OBJECT_ID: &str = "OBJECT_ID";
pub const OWNER_ID: &str = "OWNER_ID";
pub const AIP_BAG_TYPE: &str = "AIP";

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Missing archive for {kind}: {handle}")]
    MissingArchive { kind: NodeKind, handle: Handle },
    #[error("{capability} is not supported for {kind} packers")]
    Unsupported { kind: NodeKind, capability: &'static str },
    #[error("Archive holds a {found} but a {expected} was expected")]
    WrongObjectType { expected: NodeKind, found: String },
    #[error(transparent)]
    Bag(#[from] BagError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How far [`Packer::size`] descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMethod {
    /// The node's own payloads plus every descendant's.
    #[default]
    Recursive,
    /// The node's own payloads only.
    NoRecurse,
}

impl SizeMethod {
    pub const NORECURSE: &'static str = "norecurse";
}

/// Only the literal `norecurse` limits the walk; anything else recurses.
impl From<&str> for SizeMethod {
    fn from(s: &str) -> Self {
        if s == Self::NORECURSE { SizeMethod::NoRecurse } else { SizeMethod::Recursive }
    }
}

pub trait Packer {
    fn kind(&self) -> NodeKind;

    fn handle(&self) -> &Handle;

    /// Build, deflate and clean a bag for the node.  Returns the archive path.
    fn pack<S: ContentStore + ?Sized>(&self, store: &S, pack_dir: &Path) -> Result<PathBuf, PackError>;

    /// Replay `archive` onto the node and commit it.
    fn unpack<S: ContentStore + ?Sized>(&self, store: &mut S, archive: Option<&Path>) -> Result<(), PackError>;

    /// Payload bytes of the node and, unless `method` is
    /// [`SizeMethod::NoRecurse`], of all its descendants.
    fn size<S: ContentStore + ?Sized>(&self, store: &S, method: SizeMethod) -> Result<u64, PackError>;

    fn set_content_filter(&mut self, filter: &str) -> Result<(), PackError>;

    fn set_reference_filter(&mut self, filter: &str) -> Result<(), PackError>;
}

/// The packer chosen for one node.
#[derive(Debug, Clone)]
pub enum AnyPacker {
    Community(CommunityPacker),
    Collection(CollectionPacker),
    Item(ItemPacker),
}

impl Packer for AnyPacker {
    fn kind(&self) -> NodeKind {
        match self {
            AnyPacker::Community(p)  => p.kind(),
            AnyPacker::Collection(p) => p.kind(),
            AnyPacker::Item(p)       => p.kind(),
        }
    }

    fn handle(&self) -> &Handle {
        match self {
            AnyPacker::Community(p)  => p.handle(),
            AnyPacker::Collection(p) => p.handle(),
            AnyPacker::Item(p)       => p.handle(),
        }
    }

    fn pack<S: ContentStore + ?Sized>(&self, store: &S, pack_dir: &Path) -> Result<PathBuf, PackError> {
        match self {
            AnyPacker::Community(p)  => p.pack(store, pack_dir),
            AnyPacker::Collection(p) => p.pack(store, pack_dir),
            AnyPacker::Item(p)       => p.pack(store, pack_dir),
        }
    }

    fn unpack<S: ContentStore + ?Sized>(&self, store: &mut S, archive: Option<&Path>) -> Result<(), PackError> {
        match self {
            AnyPacker::Community(p)  => p.unpack(store, archive),
            AnyPacker::Collection(p) => p.unpack(store, archive),
            AnyPacker::Item(p)       => p.unpack(store, archive),
        }
    }

    fn size<S: ContentStore + ?Sized>(&self, store: &S, method: SizeMethod) -> Result<u64, PackError> {
        match self {
            AnyPacker::Community(p)  => p.size(store, method),
            AnyPacker::Collection(p) => p.size(store, method),
            AnyPacker::Item(p)       => p.size(store, method),
        }
    }

    fn set_content_filter(&mut self, filter: &str) -> Result<(), PackError> {
        match self {
            AnyPacker::Community(p)  => p.set_content_filter(filter),
            AnyPacker::Collection(p) => p.set_content_filter(filter),
            AnyPacker::Item(p)       => p.set_content_filter(filter),
        }
    }

    fn set_reference_filter(&mut self, filter: &str) -> Result<(), PackError> {
        match self {
            AnyPacker::Community(p)  => p.set_reference_filter(filter),
            AnyPacker::Collection(p) => p.set_reference_filter(filter),
            AnyPacker::Item(p)       => p.set_reference_filter(filter),
        }
    }
}
