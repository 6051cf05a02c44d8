use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use aipbag::bag::{Bag, BagError};
use aipbag::packer::{
    CommunityPacker, PackError, Packer, PackerFactory, SizeMethod, OBJECT_ID, OBJECT_TYPE, OBJFILE,
    OWNER_ID,
};
use aipbag::schema;
use aipbag::store::{ContentStore, MemoryStore, StoreError};
use aipbag::{ArchiveFormat, BagOptions, Handle, NodeKind};
use proptest::prelude::*;
use tempfile::TempDir;

/// Community 1/1 (logo 4 bytes)
///   ├── community 1/2 (logo 10 bytes)
///   │     └── collection 1/3 (logo 6 bytes)
///   │           └── item 1/4 (ORIGINAL/a.pdf 100, LICENSE/license.txt 20)
///   └── collection 1/5 (no logo)
fn sample_tree() -> MemoryStore {
    let mut store = MemoryStore::new();
    let top = store.insert("1/1", NodeKind::Community, None).unwrap();
    let sub = store.insert("1/2", NodeKind::Community, Some(&top)).unwrap();
    let coll = store.insert("1/3", NodeKind::Collection, Some(&sub)).unwrap();
    let item = store.insert("1/4", NodeKind::Item, Some(&coll)).unwrap();
    store.insert("1/5", NodeKind::Collection, Some(&top)).unwrap();

    store.set_metadata(&top, "name", "Physics").unwrap();
    store.set_metadata(&top, "short_description", "Department of <Physics> & Astronomy").unwrap();
    store.set_metadata(&top, "side_bar_text", "  line one\nline two  ").unwrap();
    store.put_payload(&top, "logo", vec![1u8; 4]).unwrap();
    store.put_payload(&sub, "logo", vec![2u8; 10]).unwrap();
    store.put_payload(&coll, "logo", vec![3u8; 6]).unwrap();
    store.set_metadata(&coll, "name", "Theses").unwrap();
    store.set_metadata(&coll, "license", "CC-BY-4.0").unwrap();
    store.set_metadata(&item, "dc.title", "On Quarks").unwrap();
    store.put_payload(&item, "ORIGINAL/a.pdf", vec![4u8; 100]).unwrap();
    store.put_payload(&item, "LICENSE/license.txt", vec![5u8; 20]).unwrap();
    store
}

fn field_map(store: &MemoryStore, handle: &Handle) -> BTreeMap<String, String> {
    let table = schema::fields_for(store.kind(handle).unwrap());
    table
        .fields
        .iter()
        .filter_map(|f| store.metadata(handle, f).unwrap().map(|v| (f.to_string(), v)))
        .collect()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn pack(store: &MemoryStore, handle: &str, dir: &Path) -> std::path::PathBuf {
    PackerFactory::instance(store, &Handle::from(handle), &BagOptions::default())
        .unwrap()
        .pack(store, dir)
        .unwrap()
}

// ── Round trip ───────────────────────────────────────────────────────────────

#[test]
fn community_round_trip_onto_fresh_node() {
    let mut store = sample_tree();
    let dir = TempDir::new().unwrap();
    let archive = pack(&store, "1/1", dir.path());
    assert_eq!(archive, dir.path().join("1-1.zbag"));

    let target = store.insert("2/1", NodeKind::Community, None).unwrap();
    let packer = CommunityPacker::new(target.clone(), BagOptions::default());
    packer.unpack(&mut store, Some(&archive)).unwrap();

    assert_eq!(field_map(&store, &target), field_map(&store, &Handle::from("1/1")));
    assert_eq!(store.payload_bytes(&target, "logo"), Some(&[1u8; 4][..]));
    assert_eq!(store.commit_count(&target), 1);
}

#[test]
fn both_archive_formats_round_trip() {
    for format in [ArchiveFormat::Zbag, ArchiveFormat::TarZst] {
        let mut store = sample_tree();
        let dir = TempDir::new().unwrap();
        let options = BagOptions { format, ..BagOptions::default() };
        let archive = PackerFactory::instance(&store, &Handle::from("1/3"), &options)
            .unwrap()
            .pack(&store, dir.path())
            .unwrap();
        assert_eq!(ArchiveFormat::sniff(&archive).unwrap(), format);

        let target = store.insert("2/3", NodeKind::Collection, None).unwrap();
        PackerFactory::instance(&store, &target, &options)
            .unwrap()
            .unpack(&mut store, Some(&archive))
            .unwrap();
        assert_eq!(field_map(&store, &target), field_map(&store, &Handle::from("1/3")));
        assert_eq!(store.payload_bytes(&target, "logo"), Some(&[3u8; 6][..]));
    }
}

#[test]
fn identity_properties_and_owner() {
    let store = sample_tree();
    let dir = TempDir::new().unwrap();

    let top = Bag::open(pack(&store, "1/1", dir.path())).unwrap();
    let props = top.flat_reader(OBJFILE).unwrap().unwrap();
    assert_eq!(props.get(OBJECT_TYPE), Some("community"));
    assert_eq!(props.get(OBJECT_ID), Some("1/1"));
    assert_eq!(props.get(OWNER_ID), None);
    assert_eq!(props.keys().next(), Some("BAG_TYPE"));

    let sub = Bag::open(pack(&store, "1/2", dir.path())).unwrap();
    let props = sub.flat_reader(OBJFILE).unwrap().unwrap();
    assert_eq!(props.get(OWNER_ID), Some("1/1"));
}

#[test]
fn pack_leaves_only_the_archive() {
    let store = sample_tree();
    let dir = TempDir::new().unwrap();
    pack(&store, "1/1", dir.path());
    pack(&store, "1/4", dir.path());
    assert_eq!(dir_entries(dir.path()), vec!["1-1.zbag", "1-4.zbag"]);
}

#[test]
fn similar_handles_never_share_an_archive() {
    let mut store = sample_tree();
    store.insert("1-1", NodeKind::Community, None).unwrap();
    let dir = TempDir::new().unwrap();

    let first = pack(&store, "1/1", dir.path());
    let first_bytes = fs::read(&first).unwrap();
    let second = pack(&store, "1-1", dir.path());
    assert_ne!(first, second);
    assert_eq!(fs::read(&first).unwrap(), first_bytes);

    let again = PackerFactory::instance(&store, &Handle::from("1/1"), &BagOptions::default())
        .unwrap()
        .pack(&store, dir.path())
        .unwrap_err();
    assert!(matches!(again, PackError::Bag(BagError::ArchiveExists(ref p)) if *p == first));
    assert_eq!(fs::read(&first).unwrap(), first_bytes);
    assert_eq!(dir_entries(dir.path()).len(), 2);

    let props = Bag::open(&second).unwrap().flat_reader(OBJFILE).unwrap().unwrap();
    assert_eq!(props.get(OBJECT_ID), Some("1-1"));
}

#[test]
fn missing_logo_in_archive_clears_target_logo() {
    let mut store = sample_tree();
    let dir = TempDir::new().unwrap();
    let archive = pack(&store, "1/5", dir.path());

    let target = Handle::from("1/3");
    assert!(store.payload_bytes(&target, "logo").is_some());
    PackerFactory::instance(&store, &target, &BagOptions::default())
        .unwrap()
        .unpack(&mut store, Some(&archive))
        .unwrap();
    assert!(store.payload_bytes(&target, "logo").is_none());
    // Fields the archive does not carry are left as they were.
    assert_eq!(store.metadata(&target, "license").unwrap().as_deref(), Some("CC-BY-4.0"));
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[test]
fn missing_archive_leaves_target_untouched() {
    let mut store = sample_tree();
    let target = Handle::from("1/1");
    let before = field_map(&store, &target);
    let packer = CommunityPacker::new(target.clone(), BagOptions::default());

    let err = packer.unpack(&mut store, None).unwrap_err();
    assert!(matches!(err, PackError::MissingArchive { kind: NodeKind::Community, .. }));

    let dir = TempDir::new().unwrap();
    let err = packer.unpack(&mut store, Some(&dir.path().join("absent.zbag"))).unwrap_err();
    assert!(matches!(err, PackError::MissingArchive { .. }));

    assert_eq!(field_map(&store, &target), before);
    assert_eq!(store.payload_bytes(&target, "logo"), Some(&[1u8; 4][..]));
    assert_eq!(store.commit_count(&target), 0);
}

#[test]
fn refused_commit_still_cleans_staging() {
    let mut store = sample_tree();
    let dir = TempDir::new().unwrap();
    let archive = pack(&store, "1/1", dir.path());

    let target = store.insert("2/1", NodeKind::Community, None).unwrap();
    store.deny_updates(&target);
    let err = CommunityPacker::new(target.clone(), BagOptions::default())
        .unpack(&mut store, Some(&archive))
        .unwrap_err();
    assert!(matches!(err, PackError::Store(StoreError::Authorization { .. })));
    assert_eq!(dir_entries(dir.path()), vec!["1-1.zbag"]);
    assert_eq!(store.commit_count(&target), 0);
}

#[test]
fn archive_of_another_kind_is_refused() {
    let mut store = sample_tree();
    let dir = TempDir::new().unwrap();
    let archive = pack(&store, "1/3", dir.path());
    let err = CommunityPacker::new(Handle::from("1/1"), BagOptions::default())
        .unpack(&mut store, Some(&archive))
        .unwrap_err();
    assert!(matches!(
        err,
        PackError::WrongObjectType { expected: NodeKind::Community, ref found } if found == "collection"
    ));
    assert_eq!(store.commit_count(&Handle::from("1/1")), 0);
}

#[test]
fn reference_filter_is_unsupported_everywhere() {
    let store = sample_tree();
    for h in ["1/1", "1/3", "1/4"] {
        let mut packer = PackerFactory::instance(&store, &Handle::from(h), &BagOptions::default()).unwrap();
        assert!(matches!(
            packer.set_reference_filter("anything"),
            Err(PackError::Unsupported { capability: "reference filter", .. })
        ));
        assert!(packer.set_content_filter("").is_ok());
    }
}

// ── Size ─────────────────────────────────────────────────────────────────────

#[test]
fn size_recurses_unless_norecurse() {
    let store = sample_tree();
    let opts = BagOptions::default();
    let top = PackerFactory::instance(&store, &Handle::from("1/1"), &opts).unwrap();
    assert_eq!(top.size(&store, SizeMethod::Recursive).unwrap(), 4 + 10 + 6 + 120);
    assert_eq!(top.size(&store, SizeMethod::NoRecurse).unwrap(), 4);
    assert_eq!(top.size(&store, SizeMethod::from("norecurse")).unwrap(), 4);
    assert_eq!(top.size(&store, SizeMethod::from("NORECURSE")).unwrap(), 140);
    assert_eq!(top.size(&store, SizeMethod::from("whatever")).unwrap(), 140);

    let empty = PackerFactory::instance(&store, &Handle::from("1/5"), &opts).unwrap();
    assert_eq!(empty.size(&store, SizeMethod::Recursive).unwrap(), 0);
}

// ── Items ────────────────────────────────────────────────────────────────────

#[test]
fn item_content_filter_limits_packing_and_replacement() {
    let mut store = sample_tree();
    let dir = TempDir::new().unwrap();
    let item = Handle::from("1/4");

    let mut packer = PackerFactory::instance(&store, &item, &BagOptions::default()).unwrap();
    packer.set_content_filter("ORIGINAL").unwrap();
    assert_eq!(packer.size(&store, SizeMethod::Recursive).unwrap(), 100);
    let archive = packer.pack(&store, dir.path()).unwrap();

    let bag = Bag::open(&archive).unwrap();
    assert_eq!(bag.payload_names().unwrap(), vec!["ORIGINAL/a.pdf"]);
    drop(bag);

    let target = store.insert("2/4", NodeKind::Item, None).unwrap();
    store.put_payload(&target, "ORIGINAL/old.pdf", b"stale".to_vec()).unwrap();
    store.put_payload(&target, "THUMBNAIL/t.jpg", b"keep".to_vec()).unwrap();
    let mut unpacker = PackerFactory::instance(&store, &target, &BagOptions::default()).unwrap();
    unpacker.set_content_filter("ORIGINAL").unwrap();
    unpacker.unpack(&mut store, Some(&archive)).unwrap();

    assert_eq!(store.payload_bytes(&target, "ORIGINAL/a.pdf"), Some(&[4u8; 100][..]));
    assert!(store.payload_bytes(&target, "ORIGINAL/old.pdf").is_none());
    assert_eq!(store.payload_bytes(&target, "THUMBNAIL/t.jpg"), Some(&b"keep"[..]));
    assert_eq!(store.metadata(&target, "dc.title").unwrap().as_deref(), Some("On Quarks"));
}

// ── Schema consistency ───────────────────────────────────────────────────────

#[test]
fn packers_write_exactly_the_schema_fields() {
    let mut store = MemoryStore::new();
    let dir = TempDir::new().unwrap();
    for (i, kind) in [NodeKind::Community, NodeKind::Collection, NodeKind::Item].into_iter().enumerate() {
        let h = store.insert(format!("3/{i}"), kind, None).unwrap();
        for field in schema::fields_for(kind).fields {
            store.set_metadata(&h, field, &format!("value of {field}")).unwrap();
        }
        let archive = pack(&store, h.as_str(), dir.path());
        let bag = Bag::open(&archive).unwrap();
        let mut reader = bag.xml_reader(aipbag::packer::METADATA_FILE).unwrap().unwrap();
        assert!(reader.find_stanza(aipbag::packer::METADATA_STANZA).unwrap());
        let mut written = Vec::new();
        while let Some(v) = reader.next_value().unwrap() {
            assert_eq!(v.val, format!("value of {}", v.name));
            written.push(v.name);
        }
        assert_eq!(written, schema::fields_for(kind).fields);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_any_field_subset_round_trips(
        values in proptest::collection::vec(
            proptest::option::of("[\\PC\t\r\n]{0,40}"),
            schema::COMMUNITY.fields.len(),
        ),
        logo in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
    ) {
        let mut store = MemoryStore::new();
        let source = store.insert("4/1", NodeKind::Community, None).unwrap();
        let target = store.insert("4/2", NodeKind::Community, None).unwrap();
        store.put_payload(&target, "logo", b"stale logo".to_vec()).unwrap();
        for (field, value) in schema::COMMUNITY.fields.iter().zip(&values) {
            if let Some(v) = value {
                store.set_metadata(&source, field, v).unwrap();
            }
        }
        if let Some(bytes) = &logo {
            store.put_payload(&source, "logo", bytes.clone()).unwrap();
        }

        let dir = TempDir::new().unwrap();
        let archive = pack(&store, "4/1", dir.path());
        CommunityPacker::new(target.clone(), BagOptions::default())
            .unpack(&mut store, Some(&archive))
            .unwrap();
        prop_assert_eq!(field_map(&store, &target), field_map(&store, &source));
        prop_assert_eq!(store.payload_bytes(&target, "logo"), logo.as_deref());
    }
}
