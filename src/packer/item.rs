//! Packs items: Dublin Core metadata plus every content file.
//!
//! Item payloads are named `<BUNDLE>/<file>` (for example
//! `ORIGINAL/thesis.pdf`).  A content filter such as `ORIGINAL,LICENSE`
//! restricts packing, sizing and replacement to those bundles; payloads of
//! other bundles are left alone on unpack.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::info;

use super::common::{
    add_payload, check_object_type, new_bag, replay_metadata, require_archive, write_identity,
    write_metadata,
};
use super::{PackError, Packer, SizeMethod};
use crate::bag::Bag;
use crate::config::BagOptions;
use crate::node::{Handle, NodeKind};
use crate::schema;
use crate::store::ContentStore;

#[derive(Debug, Clone)]
pub struct ItemPacker {
    item:    Handle,
    options: BagOptions,
    /// Bundles that participate; `None` means all of them.
    bundles: Option<BTreeSet<String>>,
}

impl ItemPacker {
    pub fn new(item: Handle, options: BagOptions) -> Self {
        Self { item, options, bundles: None }
    }

    fn accepts(&self, payload: &str) -> bool {
        match &self.bundles {
            None => true,
            Some(bundles) => {
                let bundle = payload.split_once('/').map_or(payload, |(b, _)| b);
                bundles.contains(bundle)
            }
        }
    }
}

impl Packer for ItemPacker {
    fn kind(&self) -> NodeKind {
        NodeKind::Item
    }

    fn handle(&self) -> &Handle {
        &self.item
    }

    fn pack<S: ContentStore + ?Sized>(&self, store: &S, pack_dir: &Path) -> Result<PathBuf, PackError> {
        let mut bag = new_bag(pack_dir, &self.item, &self.options)?;
        write_identity(&mut bag, store, &self.item, NodeKind::Item)?;
        write_metadata(&mut bag, store, &self.item, &schema::ITEM)?;
        let mut files = 0;
        for payload in store.payloads(&self.item)? {
            if self.accepts(&payload.name) {
                add_payload(&mut bag, store, &self.item, &payload.name, payload.size)?;
                files += 1;
            }
        }
        bag.close()?;
        let archive = bag.deflate(self.options.format)?;
        bag.empty()?;
        info!(item = %self.item, files, archive = %archive.display(), "packed item");
        Ok(archive)
    }

    fn unpack<S: ContentStore + ?Sized>(&self, store: &mut S, archive: Option<&Path>) -> Result<(), PackError> {
        let archive = require_archive(archive, NodeKind::Item, &self.item)?;
        let mut bag = Bag::open(archive)?;
        check_object_type(&bag, NodeKind::Item)?;
        let fields = replay_metadata(&bag, store, &self.item, &schema::ITEM)?;

        let incoming: BTreeSet<String> = bag
            .payload_names()?
            .into_iter()
            .filter(|name| self.accepts(name))
            .collect();
        for stale in store.payloads(&self.item)? {
            if self.accepts(&stale.name) && !incoming.contains(&stale.name) {
                store.set_payload(&self.item, &stale.name, None)?;
            }
        }
        for name in &incoming {
            if let Some(mut stream) = bag.data_stream(name)? {
                store.set_payload(&self.item, name, Some(&mut stream as &mut dyn Read))?;
            }
        }

        store.update(&self.item)?;
        bag.empty()?;
        info!(item = %self.item, fields, files = incoming.len(), "unpacked item");
        Ok(())
    }

    /// Items have no children, so both methods give the same answer.
    fn size<S: ContentStore + ?Sized>(&self, store: &S, _method: SizeMethod) -> Result<u64, PackError> {
        Ok(store
            .payloads(&self.item)?
            .iter()
            .filter(|p| self.accepts(&p.name))
            .map(|p| p.size)
            .sum())
    }

    /// `filter` is a comma-separated list of bundle names.  An empty filter
    /// removes the restriction.
    fn set_content_filter(&mut self, filter: &str) -> Result<(), PackError> {
        let bundles: BTreeSet<String> = filter
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_owned)
            .collect();
        self.bundles = if bundles.is_empty() { None } else { Some(bundles) };
        Ok(())
    }

    fn set_reference_filter(&mut self, _filter: &str) -> Result<(), PackError> {
        Err(PackError::Unsupported { kind: NodeKind::Item, capability: "reference filter" })
    }
}
