//! A content tree laid out as plain directories.
//!
//! ```text
//! root/
//!   physics/
//!     node.json                 {"handle": "1/1", "kind": "community", "metadata": {...}}
//!     payloads/logo
//!     theses/
//!       node.json               {"handle": "1/2", "kind": "collection", ...}
//!       thesis-1/
//!         node.json
//!         payloads/ORIGINAL/thesis.pdf
//! ```
//!
//! A node's parent is the nearest ancestor directory holding a `node.json`.
//! Metadata edits stay in memory until [`ContentStore::update`] rewrites the
//! node file; payload edits go straight to disk.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{ContentStore, PayloadInfo, StoreError};
use crate::node::{Handle, NodeKind};
use crate::schema;

pub const NODE_FILE: &str = "node.json";
pub const PAYLOAD_DIR: &str = "payloads";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeFile {
    handle:   Handle,
    kind:     NodeKind,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug)]
struct DirNode {
    dir:      PathBuf,
    file:     NodeFile,
    parent:   Option<Handle>,
    children: Vec<Handle>,
}

#[derive(Debug)]
pub struct DirStore {
    root:  PathBuf,
    nodes: HashMap<Handle, DirNode>,
}

impl DirStore {
    /// Scan `root` for node directories.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_owned();
        let mut by_dir: BTreeMap<PathBuf, NodeFile> = BTreeMap::new();

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != PAYLOAD_DIR);
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == NODE_FILE {
                let file: NodeFile = serde_json::from_reader(BufReader::new(File::open(entry.path())?))?;
                if let Some(dir) = entry.path().parent() {
                    by_dir.insert(dir.to_path_buf(), file);
                }
            }
        }

        let handle_of: HashMap<PathBuf, Handle> = by_dir
            .iter()
            .map(|(dir, f)| (dir.clone(), f.handle.clone()))
            .collect();

        let mut nodes: HashMap<Handle, DirNode> = HashMap::new();
        // BTreeMap order visits parents before children and siblings by name.
        for (dir, file) in by_dir {
            let parent = dir
                .ancestors()
                .skip(1)
                .take_while(|a| a.starts_with(&root))
                .find_map(|a| handle_of.get(a).cloned());
            let handle = file.handle.clone();
            if nodes.contains_key(&handle) {
                return Err(StoreError::Duplicate(handle));
            }
            if let Some(p) = &parent {
                if let Some(pn) = nodes.get_mut(p) {
                    pn.children.push(handle.clone());
                }
            }
            nodes.insert(handle, DirNode { dir, file, parent, children: Vec::new() });
        }

        info!(root = %root.display(), nodes = nodes.len(), "opened directory store");
        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        self.nodes.keys()
    }

    fn node(&self, handle: &Handle) -> Result<&DirNode, StoreError> {
        self.nodes.get(handle).ok_or_else(|| StoreError::NotFound(handle.clone()))
    }

    fn payload_path(&self, handle: &Handle, name: &str) -> Result<PathBuf, StoreError> {
        let safe = !name.is_empty()
            && Path::new(name).components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidPayloadName(name.to_owned()));
        }
        Ok(self.node(handle)?.dir.join(PAYLOAD_DIR).join(name))
    }
}

impl ContentStore for DirStore {
    fn kind(&self, handle: &Handle) -> Result<NodeKind, StoreError> {
        Ok(self.node(handle)?.file.kind)
    }

    fn parent(&self, handle: &Handle) -> Result<Option<Handle>, StoreError> {
        Ok(self.node(handle)?.parent.clone())
    }

    fn children(&self, handle: &Handle) -> Result<Vec<Handle>, StoreError> {
        Ok(self.node(handle)?.children.clone())
    }

    fn metadata(&self, handle: &Handle, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.node(handle)?.file.metadata.get(field).cloned())
    }

    fn set_metadata(&mut self, handle: &Handle, field: &str, value: &str) -> Result<(), StoreError> {
        let node = self.nodes.get_mut(handle).ok_or_else(|| StoreError::NotFound(handle.clone()))?;
        if !schema::is_recognized(node.file.kind, field) {
            return Err(StoreError::UnknownField { kind: node.file.kind, field: field.to_owned() });
        }
        node.file.metadata.insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    fn payloads(&self, handle: &Handle) -> Result<Vec<PayloadInfo>, StoreError> {
        let base = self.node(handle)?.dir.join(PAYLOAD_DIR);
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&base) else { continue };
            let name: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(PayloadInfo { name: name.join("/"), size: entry.metadata()?.len() });
        }
        Ok(out)
    }

    fn retrieve<'a>(&'a self, handle: &Handle, name: &str) -> Result<Box<dyn Read + 'a>, StoreError> {
        let path = self.payload_path(handle, name)?;
        match File::open(&path) {
            Ok(f) => Ok(Box::new(BufReader::new(f))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::PayloadNotFound {
                handle: handle.clone(),
                name:   name.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn set_payload(
        &mut self,
        handle: &Handle,
        name:   &str,
        stream: Option<&mut dyn Read>,
    ) -> Result<(), StoreError> {
        let path = self.payload_path(handle, name)?;
        match stream {
            Some(s) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = BufWriter::new(File::create(&path)?);
                let n = io::copy(s, &mut out)?;
                out.flush()?;
                debug!(%handle, payload = name, bytes = n, "stored payload");
            }
            None => match fs::remove_file(&path) {
                Ok(()) => debug!(%handle, payload = name, "removed payload"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn update(&mut self, handle: &Handle) -> Result<(), StoreError> {
        let node = self.node(handle)?;
        let path = node.dir.join(NODE_FILE);
        let tmp = node.dir.join(format!(".{NODE_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(&node.file)?)?;
        fs::rename(&tmp, &path)?;
        debug!(%handle, "committed node file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_node(dir: &Path, handle: &str, kind: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(NODE_FILE),
            format!(r#"{{"handle": "{handle}", "kind": "{kind}", "metadata": {{}}}}"#),
        )
        .unwrap();
    }

    #[test]
    fn tree_is_recovered_from_directories() {
        let root = tempfile::tempdir().unwrap();
        write_node(&root.path().join("top"), "1/1", "community");
        write_node(&root.path().join("top/b-sub"), "1/3", "community");
        write_node(&root.path().join("top/a-coll"), "1/2", "collection");
        // Directories without a node file are transparent.
        write_node(&root.path().join("top/a-coll/batch/item"), "1/4", "item");

        let store = DirStore::open(root.path()).unwrap();
        let top = Handle::from("1/1");
        assert_eq!(store.parent(&top).unwrap(), None);
        assert_eq!(store.children(&top).unwrap(), vec![Handle::from("1/2"), Handle::from("1/3")]);
        assert_eq!(store.parent(&Handle::from("1/4")).unwrap(), Some(Handle::from("1/2")));
        assert_eq!(store.kind(&Handle::from("1/4")).unwrap(), NodeKind::Item);
    }

    #[test]
    fn metadata_persists_on_update() {
        let root = tempfile::tempdir().unwrap();
        write_node(&root.path().join("c"), "1/1", "community");
        let h = Handle::from("1/1");

        let mut store = DirStore::open(root.path()).unwrap();
        store.set_metadata(&h, "name", "Physics").unwrap();
        store.update(&h).unwrap();

        let reopened = DirStore::open(root.path()).unwrap();
        assert_eq!(reopened.metadata(&h, "name").unwrap().as_deref(), Some("Physics"));
    }

    #[test]
    fn payloads_are_streamed_to_disk() {
        let root = tempfile::tempdir().unwrap();
        write_node(&root.path().join("i"), "1/9", "item");
        let h = Handle::from("1/9");

        let mut store = DirStore::open(root.path()).unwrap();
        store.set_payload(&h, "ORIGINAL/a.pdf", Some(&mut &b"%PDF"[..])).unwrap();
        assert_eq!(store.payloads(&h).unwrap(), vec![PayloadInfo { name: "ORIGINAL/a.pdf".into(), size: 4 }]);

        store.set_payload(&h, "ORIGINAL/a.pdf", None).unwrap();
        store.set_payload(&h, "ORIGINAL/a.pdf", None).unwrap();
        assert!(store.payloads(&h).unwrap().is_empty());
        assert!(matches!(
            store.set_payload(&h, "../escape", None),
            Err(StoreError::InvalidPayloadName(_))
        ));
    }
}
