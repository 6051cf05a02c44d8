use crate::config::BagOptions;
use crate::node::{Handle, NodeKind};
use crate::store::ContentStore;

use super::{AnyPacker, CollectionPacker, CommunityPacker, ItemPacker, PackError};

/// Chooses the packer for a node by its kind.  Holds no state.
pub struct PackerFactory;

impl PackerFactory {
    /// Look up the kind of `handle` in `store` and return its packer.
    pub fn instance<S: ContentStore + ?Sized>(
        store:   &S,
        handle:  &Handle,
        options: &BagOptions,
    ) -> Result<AnyPacker, PackError> {
        Ok(Self::for_kind(store.kind(handle)?, handle.clone(), *options))
    }

    pub fn for_kind(kind: NodeKind, handle: Handle, options: BagOptions) -> AnyPacker {
        match kind {
            NodeKind::Community  => AnyPacker::Community(CommunityPacker::new(handle, options)),
            NodeKind::Collection => AnyPacker::Collection(CollectionPacker::new(handle, options)),
            NodeKind::Item       => AnyPacker::Item(ItemPacker::new(handle, options)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::Packer;
    use crate::store::MemoryStore;

    #[test]
    fn dispatches_on_node_kind() {
        let mut store = MemoryStore::new();
        let c = store.insert("1/1", NodeKind::Community, None).unwrap();
        let l = store.insert("1/2", NodeKind::Collection, Some(&c)).unwrap();
        let i = store.insert("1/3", NodeKind::Item, Some(&l)).unwrap();
        let opts = BagOptions::default();

        for (handle, kind) in [(c, NodeKind::Community), (l, NodeKind::Collection), (i, NodeKind::Item)] {
            let packer = PackerFactory::instance(&store, &handle, &opts).unwrap();
            assert_eq!(packer.kind(), kind);
            assert_eq!(packer.handle(), &handle);
        }
    }

    #[test]
    fn unknown_handle_is_a_store_error() {
        let store = MemoryStore::new();
        let err = PackerFactory::instance(&store, &Handle::from("0/0"), &BagOptions::default()).unwrap_err();
        assert!(matches!(err, PackError::Store(_)));
    }
}
