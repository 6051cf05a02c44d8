//! Packs and unpacks community AIPs.

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

#[derive(Debug, Clone)]
pub struct CommunityPacker {
    community: Handle,
    options:   BagOptions,
}

impl CommunityPacker {
    pub fn new(community: Handle, options: BagOptions) -> Self {
        Self { community, options }
    }

    pub fn community(&self) -> &Handle {
        &self.community
    }

    pub fn set_community(&mut self, community: Handle) {
        self.community = community;
    }
}

impl Packer for CommunityPacker {
    fn kind(&self) -> NodeKind {
        NodeKind::Community
    }

    fn handle(&self) -> &Handle {
        &self.community
    }

    fn pack<S: ContentStore + ?Sized>(&self, store: &S, pack_dir: &Path) -> Result<PathBuf, PackError> {
        let mut bag = new_bag(pack_dir, &self.community, &self.options)?;
        write_identity(&mut bag, store, &self.community, NodeKind::Community)?;
        write_metadata(&mut bag, store, &self.community, &schema::COMMUNITY)?;
        if let Some(logo) = store.payload(&self.community, LOGO)? {
            add_payload(&mut bag, store, &self.community, LOGO, logo.size)?;
        }
        bag.close()?;
        let archive = bag.deflate(self.options.format)?;
        // clean up undeflated bag
        bag.empty()?;
        info!(community = %self.community, archive = %archive.display(), "packed community");
        Ok(archive)
    }

    fn unpack<S: ContentStore + ?Sized>(&self, store: &mut S, archive: Option<&Path>) -> Result<(), PackError> {
        let archive = require_archive(archive, NodeKind::Community, &self.community)?;
        let mut bag = Bag::open(archive)?;
        check_object_type(&bag, NodeKind::Community)?;
        let fields = replay_metadata(&bag, store, &self.community, &schema::COMMUNITY)?;
        // install the logo or clear it
        replace_payload(&bag, store, &self.community, LOGO)?;
        store.update(&self.community)?;
        bag.empty()?;
        info!(community = %self.community, fields, "unpacked community");
        Ok(())
    }

    fn size<S: ContentStore + ?Sized>(&self, store: &S, method: SizeMethod) -> Result<u64, PackError> {
        let mut size = store.payload(&self.community, LOGO)?.map_or(0, |logo| logo.size);
        if method != SizeMethod::NoRecurse {
            size += children_size(store, &self.community, method, &self.options)?;
        }
        Ok(size)
    }

    fn set_content_filter(&mut self, _filter: &str) -> Result<(), PackError> {
        // a community has no filterable content
        Ok(())
    }

    fn set_reference_filter(&mut self, _filter: &str) -> Result<(), PackError> {
        Err(PackError::Unsupported { kind: NodeKind::Community, capability: "reference filter" })
    }
}
