//! Section writers and readers shared by the packers.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::{
    PackError, Packer, PackerFactory, SizeMethod, AIP_BAG_TYPE, BAG_TYPE, METADATA_FILE,
    METADATA_STANZA, OBJECT_ID, OBJECT_TYPE, OBJFILE, OWNER_ID,
};
use crate::bag::Bag;
use crate::config::BagOptions;
use crate::node::{Handle, NodeKind};
use crate::schema::{FieldTable, SCHEMA_VERSION};
use crate::store::ContentStore;

/// Open a new bag named after the node and stamp the schema version.
pub(super) fn new_bag(pack_dir: &Path, handle: &Handle, options: &BagOptions) -> Result<Bag, PackError> {
    let mut bag = Bag::create(pack_dir, &handle.archive_stem(), options)?;
    bag.add_info("Schema-Version", &SCHEMA_VERSION.to_string())?;
    Ok(bag)
}

/// Write the identity properties.  Order matters: tooling reads the bag and
/// object type before parsing anything else.
pub(super) fn write_identity<S: ContentStore + ?Sized>(
    bag:    &mut Bag,
    store:  &S,
    handle: &Handle,
    kind:   NodeKind,
) -> Result<(), PackError> {
    let mut fwriter = bag.flat_writer(OBJFILE)?;
    fwriter.write_property(BAG_TYPE, AIP_BAG_TYPE)?;
    fwriter.write_property(OBJECT_TYPE, kind.tag())?;
    fwriter.write_property(OBJECT_ID, handle.as_str())?;
    if let Some(parent) = store.parent(handle)? {
        fwriter.write_property(OWNER_ID, parent.as_str())?;
    }
    fwriter.close()?;
    Ok(())
}

/// Write the `metadata` stanza with every field of `table` the node has.
pub(super) fn write_metadata<S: ContentStore + ?Sized>(
    bag:    &mut Bag,
    store:  &S,
    handle: &Handle,
    table:  &FieldTable,
) -> Result<(), PackError> {
    let mut xwriter = bag.xml_writer(METADATA_FILE)?;
    xwriter.start_stanza(METADATA_STANZA)?;
    for field in table.fields {
        let value = store.metadata(handle, field)?;
        xwriter.write_value(field, value.as_deref())?;
    }
    xwriter.end_stanza()?;
    xwriter.close()?;
    Ok(())
}

/// Copy one stored payload into the bag.
pub(super) fn add_payload<S: ContentStore + ?Sized>(
    bag:    &mut Bag,
    store:  &S,
    handle: &Handle,
    name:   &str,
    size:   u64,
) -> Result<(), PackError> {
    let stream = store.retrieve(handle, name)?;
    bag.add_data(name, size, stream)?;
    Ok(())
}

/// Resolve the archive argument of `unpack`.  A missing reference or file
/// fails before the store is touched.
pub(super) fn require_archive<'a>(
    archive: Option<&'a Path>,
    kind:    NodeKind,
    handle:  &Handle,
) -> Result<&'a Path, PackError> {
    match archive {
        Some(path) if path.is_file() => Ok(path),
        _ => Err(PackError::MissingArchive { kind, handle: handle.clone() }),
    }
}

/// Refuse archives whose `OBJECT_TYPE` names another kind.  Archives without
/// a property section are accepted.
pub(super) fn check_object_type(bag: &Bag, expected: NodeKind) -> Result<(), PackError> {
    let Some(props) = bag.flat_reader(OBJFILE)? else {
        return Ok(());
    };
    match props.get(OBJECT_TYPE) {
        Some(found) if found != expected.tag() => Err(PackError::WrongObjectType {
            expected,
            found: found.to_owned(),
        }),
        _ => Ok(()),
    }
}

/// Replay the `metadata` stanza onto the node.  Fields outside `table` are
/// skipped; fields absent from the bag are left as they are.
pub(super) fn replay_metadata<S: ContentStore + ?Sized>(
    bag:    &Bag,
    store:  &mut S,
    handle: &Handle,
    table:  &FieldTable,
) -> Result<usize, PackError> {
    let Some(mut reader) = bag.xml_reader(METADATA_FILE)? else {
        return Ok(0);
    };
    let mut applied = 0;
    if reader.find_stanza(METADATA_STANZA)? {
        while let Some(value) = reader.next_value()? {
            if !table.contains(&value.name) {
                debug!(%handle, field = %value.name, "skipping field outside schema");
                continue;
            }
            store.set_metadata(handle, &value.name, &value.val)?;
            applied += 1;
        }
    }
    reader.close();
    Ok(applied)
}

/// Install payload `name` from the bag, or clear it if the bag has none.
pub(super) fn replace_payload<S: ContentStore + ?Sized>(
    bag:    &Bag,
    store:  &mut S,
    handle: &Handle,
    name:   &str,
) -> Result<(), PackError> {
    match bag.data_stream(name)? {
        Some(mut stream) => store.set_payload(handle, name, Some(&mut stream as &mut dyn Read))?,
        None => store.set_payload(handle, name, None)?,
    }
    Ok(())
}

/// Sum of `size` over the children of `handle`, each sized by the packer the
/// factory picks for it.
pub(super) fn children_size<S: ContentStore + ?Sized>(
    store:   &S,
    handle:  &Handle,
    method:  SizeMethod,
    options: &BagOptions,
) -> Result<u64, PackError> {
    let mut size = 0;
    for child in store.children(handle)? {
        size += PackerFactory::instance(store, &child, options)?.size(store, method)?;
    }
    Ok(size)
}
