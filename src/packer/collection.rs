use std::path::{Path, PathBuf};

use tracing::info;

use super::common::{
    add_payload, check_object_type, children_size, new_bag, replace_payload, replay_metadata,
    require_archive, write_identity, write_metadata,
};
use super::{PackError, Packer, SizeMethod, LOGO};
use crate::bag::Bag;
use crate::config::BagOptions;
use crate::node::{Handle, NodeKind};
use crate::schema;
use crate::store::ContentStore;

/// Packs a collection: its own metadata and logo.  Items are packed
/// separately; they only contribute to `size`.
#[derive(Debug, Clone)]
pub struct CollectionPacker {
    collection: Handle,
    options:    BagOptions,
}

impl CollectionPacker {
    pub fn new(collection: Handle, options: BagOptions) -> Self {
        Self { collection, options }
    }
}

impl Packer for CollectionPacker {
    fn kind(&self) -> NodeKind {
        NodeKind::Collection
    }

    fn handle(&self) -> &Handle {
        &self.collection
    }

    fn pack<S: ContentStore + ?Sized>(&self, store: &S, pack_dir: &Path) -> Result<PathBuf, PackError> {
        let mut bag = new_bag(pack_dir, &self.collection, &self.options)?;
        write_identity(&mut bag, store, &self.collection, NodeKind::Collection)?;
        write_metadata(&mut bag, store, &self.collection, &schema::COLLECTION)?;
        if let Some(logo) = store.payload(&self.collection, LOGO)? {
            add_payload(&mut bag, store, &self.collection, LOGO, logo.size)?;
        }
        bag.close()?;
        let archive = bag.deflate(self.options.format)?;
        bag.empty()?;
        info!(collection = %self.collection, archive = %archive.display(), "packed collection");
        Ok(archive)
    }

    fn unpack<S: ContentStore + ?Sized>(&self, store: &mut S, archive: Option<&Path>) -> Result<(), PackError> {
        let archive = require_archive(archive, NodeKind::Collection, &self.collection)?;
        let mut bag = Bag::open(archive)?;
        check_object_type(&bag, NodeKind::Collection)?;
        let fields = replay_metadata(&bag, store, &self.collection, &schema::COLLECTION)?;
        replace_payload(&bag, store, &self.collection, LOGO)?;
        store.update(&self.collection)?;
        bag.empty()?;
        info!(collection = %self.collection, fields, "unpacked collection");
        Ok(())
    }

    fn size<S: ContentStore + ?Sized>(&self, store: &S, method: SizeMethod) -> Result<u64, PackError> {
        let mut size = store.payload(&self.collection, LOGO)?.map_or(0, |logo| logo.size);
        if method != SizeMethod::NoRecurse {
            size += children_size(store, &self.collection, method, &self.options)?;
        }
        Ok(size)
    }

    fn set_content_filter(&mut self, _filter: &str) -> Result<(), PackError> {
        Ok(())
    }

    fn set_reference_filter(&mut self, _filter: &str) -> Result<(), PackError> {
        Err(PackError::Unsupported { kind: NodeKind::Collection, capability: "reference filter" })
    }
}
