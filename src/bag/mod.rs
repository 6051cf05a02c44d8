//! The [`Bag`]: a staging directory that collects typed sections and is
//! deflated into (or inflated from) a single archive file.
//!
//! ```no_run
//! use aipbag::bag::{ArchiveFormat, Bag};
//! use aipbag::config::BagOptions;
//!
//! let mut bag = Bag::create("/tmp/aips", "123456789-2", &BagOptions::default())?;
//! let mut props = bag.flat_writer("object.properties")?;
//! props.write_property("BAG_TYPE", "AIP")?;
//! props.close()?;
//! bag.close()?;
//! let archive = bag.deflate(ArchiveFormat::Zbag)?;
//! bag.empty()?;
//!
//! let mut bag = Bag::open(&archive)?;
//! let props = bag.flat_reader("object.properties")?.expect("written above");
//! assert_eq!(props.get("BAG_TYPE"), Some("AIP"));
//! bag.empty()?;
//! # Ok::<(), aipbag::bag::BagError>(())
//! ```
//!
//! # Layout
//! ```text
//! bagit.txt
//! bag-info.txt
//! manifest-blake3.txt
//! <sections>            object.properties, metadata.xml, ...
//! data/<payloads>       logo, ORIGINAL/thesis.pdf, ...
//! ```
//!
//! # Lifecycle
//! The staging directory lives exactly as long as the bag.  [`Bag::empty`]
//! removes it and is idempotent; dropping a bag that was never emptied
//! removes it too, so every exit path releases the directory.  The archive
//! written by [`Bag::deflate`] sits outside the staging directory and is
//! never touched by cleanup.

pub mod flat;
pub mod format;
pub mod manifest;
pub mod payload;
pub mod stanza;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::BagOptions;
use crate::container::ContainerError;

pub use flat::{FlatReader, FlatWriter};
pub use format::ArchiveFormat;
pub use payload::DataStream;
pub use stanza::{Value, XmlReader, XmlWriter};

use format::Compression;
use manifest::{BAGIT_FILE, BAG_INFO_FILE, MANIFEST_FILE};

/// Directory holding payloads inside a bag.
pub const DATA_DIR: &str = "data";

#[derive(Error, Debug)]
pub enum BagError {
    #[error("Archive not found: {}", .0.display())]
    MissingArchive(PathBuf),
    #[error("Not a recognised bag archive: {}", .0.display())]
    UnrecognizedArchive(PathBuf),
    #[error("Unknown archive format: {0}")]
    UnknownFormat(String),
    #[error("Archive already exists: {}", .0.display())]
    ArchiveExists(PathBuf),
    #[error("Bag is closed; no further writes are accepted")]
    Closed,
    #[error("Bag staging directory has already been emptied")]
    Emptied,
    #[error("Invalid section name: {0:?}")]
    InvalidSectionName(String),
    #[error("Invalid property key: {0:?}")]
    InvalidKey(String),
    #[error("Malformed property line: {0:?}")]
    MalformedProperty(String),
    #[error("Malformed stanza section: {0}")]
    MalformedStanza(&'static str),
    #[error("No stanza is open")]
    NoOpenStanza,
    #[error("Payload '{name}' declared {declared} bytes but {actual} were available")]
    PayloadLength { name: String, declared: u64, actual: u64 },
    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),
    #[error("Manifest lists {0} but the bag does not contain it")]
    ManifestEntryMissing(String),
    #[error("Bag contains {0} but the manifest does not list it")]
    UnlistedFile(String),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct Bag {
    name:     String,
    /// Where deflated archives are written.
    pack_dir: PathBuf,
    staging:  Option<TempDir>,
    closed:   bool,
    info:     Vec<(String, String)>,
    options:  BagOptions,
}

impl Bag {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Start an empty bag whose archive will be written to
    /// `pack_dir/<name>.<ext>`.  The staging directory is created inside
    /// `pack_dir`.
    pub fn create<P: AsRef<Path>>(pack_dir: P, name: &str, options: &BagOptions) -> Result<Self, BagError> {
        let pack_dir = pack_dir.as_ref().to_owned();
        if !format::is_safe_relative(name) || name.contains('/') {
            return Err(BagError::InvalidSectionName(name.to_owned()));
        }
        fs::create_dir_all(&pack_dir)?;
        let staging = staging_dir(&pack_dir, name)?;
        debug!(bag = name, staging = %staging.path().display(), "created bag");
        Ok(Self {
            name: name.to_owned(),
            pack_dir,
            staging: Some(staging),
            closed: false,
            info: Vec::new(),
            options: *options,
        })
    }

    /// Inflate an existing archive into a fresh staging directory next to it
    /// and verify its manifest.  The result is read-only.
    pub fn open<P: AsRef<Path>>(archive: P) -> Result<Self, BagError> {
        let archive = archive.as_ref();
        if !archive.is_file() {
            return Err(BagError::MissingArchive(archive.to_path_buf()));
        }
        let format = ArchiveFormat::sniff(archive)?;
        let pack_dir = match archive.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = archive_stem(archive, format);
        let staging = staging_dir(&pack_dir, &name)?;

        let bag = Self {
            name,
            pack_dir,
            staging: Some(staging),
            closed: true,
            info: Vec::new(),
            options: BagOptions { format, ..BagOptions::default() },
        };
        // On failure `bag` is dropped here, which removes the staging directory.
        format::inflate(format, archive, bag.staging_path()?)?;
        let checked = manifest::verify_manifest(bag.staging_path()?)?;
        info!(archive = %archive.display(), %format, files = checked, "opened bag");
        Ok(bag)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str { &self.name }

    pub fn is_closed(&self) -> bool { self.closed }

    /// The staging directory, or `None` once the bag has been emptied.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(|d| d.path())
    }

    fn staging_path(&self) -> Result<&Path, BagError> {
        self.staging_dir().ok_or(BagError::Emptied)
    }

    fn writable_path(&self, rel: &str) -> Result<PathBuf, BagError> {
        if self.closed {
            return Err(BagError::Closed);
        }
        self.section_path(rel)
    }

    fn section_path(&self, rel: &str) -> Result<PathBuf, BagError> {
        if !format::is_safe_relative(rel) {
            return Err(BagError::InvalidSectionName(rel.to_owned()));
        }
        Ok(self.staging_path()?.join(rel))
    }

    // ── Write side ───────────────────────────────────────────────────────────

    /// Open a flat property section for writing, replacing any existing one.
    pub fn flat_writer(&mut self, name: &str) -> Result<FlatWriter<'_>, BagError> {
        FlatWriter::create(&self.writable_path(name)?)
    }

    /// Open a stanza section for writing, replacing any existing one.
    pub fn xml_writer(&mut self, name: &str) -> Result<XmlWriter<'_>, BagError> {
        XmlWriter::create(&self.writable_path(name)?)
    }

    /// Copy exactly `length` bytes of `source` into payload `name`.
    pub fn add_data<R: Read>(&mut self, name: &str, length: u64, source: R) -> Result<(), BagError> {
        let path = self.writable_path(&payload_rel(name))?;
        payload::copy_exact(name, &path, length, source)?;
        debug!(bag = %self.name, payload = name, bytes = length, "added payload");
        Ok(())
    }

    /// Record an extra `bag-info.txt` line, written on close.
    pub fn add_info(&mut self, key: &str, value: &str) -> Result<(), BagError> {
        if self.closed {
            return Err(BagError::Closed);
        }
        self.info.push((key.to_owned(), value.to_owned()));
        Ok(())
    }

    /// Write the tag files and manifest.  No further writes are accepted.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), BagError> {
        if self.closed {
            return Ok(());
        }
        let staging = self.staging_path()?;
        manifest::write_tag_files(staging, &self.info)?;
        manifest::write_manifest(staging)?;
        self.closed = true;
        Ok(())
    }

    /// Serialize the staging directory into `pack_dir/<name>.<ext>`.
    ///
    /// Closes the bag first if needed.  The archive is written to a
    /// temporary sibling and moved into place only if `dest` does not exist
    /// yet; an existing archive is never replaced and a failed deflate leaves
    /// no partial archive behind.
    pub fn deflate(&mut self, format: ArchiveFormat) -> Result<PathBuf, BagError> {
        self.close()?;
        let staging = self.staging_path()?;
        let dest = self.pack_dir.join(format!("{}.{}", self.name, format.extension()));
        if dest.exists() {
            return Err(BagError::ArchiveExists(dest));
        }
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.{}-", self.name, format.extension()))
            .suffix(".tmp")
            .tempfile_in(&self.pack_dir)?;

        let comp = Compression {
            codec:      self.options.codec,
            level:      self.options.level,
            chunk_size: self.options.chunk_size,
        };
        // On error `temp` is dropped, which deletes it.
        format::deflate(format, staging, temp.path(), comp)?;
        temp.persist_noclobber(&dest).map_err(|e| match e.error.kind() {
            io::ErrorKind::AlreadyExists => BagError::ArchiveExists(dest.clone()),
            _ => BagError::Io(e.error),
        })?;
        info!(bag = %self.name, %format, archive = %dest.display(), "deflated bag");
        Ok(dest)
    }

    /// Remove the staging directory.  Safe to call any number of times.
    pub fn empty(&mut self) -> Result<(), BagError> {
        if let Some(dir) = self.staging.take() {
            let path = dir.path().to_owned();
            dir.close()?;
            debug!(bag = %self.name, staging = %path.display(), "emptied bag");
        }
        Ok(())
    }

    // ── Read side ────────────────────────────────────────────────────────────

    pub fn flat_reader(&self, name: &str) -> Result<Option<FlatReader>, BagError> {
        let path = self.section_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        FlatReader::open(&path).map(Some)
    }

    /// A forward-only reader over stanza section `name`, or `None` if the bag
    /// has no such section.
    pub fn xml_reader(&self, name: &str) -> Result<Option<XmlReader>, BagError> {
        let path = self.section_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        XmlReader::open(&path).map(Some)
    }

    /// Stream payload `name`, or `None` if the bag carries no such payload.
    pub fn data_stream(&self, name: &str) -> Result<Option<DataStream>, BagError> {
        let path = self.section_path(&payload_rel(name))?;
        if !path.is_file() {
            return Ok(None);
        }
        DataStream::open(name, &path).map(Some)
    }

    /// Names of every payload, sorted.
    pub fn payload_names(&self) -> Result<Vec<String>, BagError> {
        let data = self.staging_path()?.join(DATA_DIR);
        if !data.is_dir() {
            return Ok(Vec::new());
        }
        relative_files(&data)
    }

    /// Every file in the bag with its size, sorted by path.
    pub fn sections(&self) -> Result<Vec<(String, u64)>, BagError> {
        let staging = self.staging_path()?;
        let mut out = Vec::new();
        for rel in relative_files(staging)? {
            let len = fs::metadata(staging.join(&rel))?.len();
            out.push((rel, len));
        }
        Ok(out)
    }

    /// Lines of `bag-info.txt`.
    pub fn info(&self) -> Result<Vec<(String, String)>, BagError> {
        manifest::read_info(self.staging_path()?)
    }

    /// Re-hash the staged files against the manifest.
    pub fn verify(&self) -> Result<usize, BagError> {
        manifest::verify_manifest(self.staging_path()?)
    }

    /// True for the BagIt bookkeeping files, as opposed to content sections.
    pub fn is_tag_file(rel: &str) -> bool {
        matches!(rel, BAGIT_FILE | BAG_INFO_FILE | MANIFEST_FILE)
    }
}

impl Drop for Bag {
    fn drop(&mut self) {
        if let Some(dir) = self.staging.take() {
            let path = dir.path().to_owned();
            if let Err(e) = dir.close() {
                warn!(bag = %self.name, staging = %path.display(), "failed to remove staging directory: {e}");
            }
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn staging_dir(pack_dir: &Path, name: &str) -> Result<TempDir, BagError> {
    Ok(tempfile::Builder::new()
        .prefix(&format!(".{name}-staging-"))
        .tempdir_in(pack_dir)?)
}

fn payload_rel(name: &str) -> String {
    format!("{DATA_DIR}/{name}")
}

fn archive_stem(archive: &Path, format: ArchiveFormat) -> String {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bag".to_owned());
    let suffix = format!(".{}", format.extension());
    file_name.strip_suffix(&suffix).unwrap_or(&file_name).to_owned()
}

/// All regular files below `root` as sorted, `/`-separated relative paths.
pub(crate) fn relative_files(root: &Path) -> Result<Vec<String>, BagError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).map_err(|_| {
            BagError::InvalidSectionName(entry.path().display().to_string())
        })?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        out.push(parts.join("/"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BagOptions;

    fn sample_bag(dir: &Path) -> Bag {
        let mut bag = Bag::create(dir, "sample", &BagOptions::default()).unwrap();
        let mut w = bag.flat_writer("object.properties").unwrap();
        w.write_property("BAG_TYPE", "AIP").unwrap();
        w.close().unwrap();
        bag.add_data("logo", 5, &b"hello"[..]).unwrap();
        bag
    }

    #[test]
    fn short_payload_is_a_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = Bag::create(dir.path(), "short", &BagOptions::default()).unwrap();
        let err = bag.add_data("logo", 10, &b"abc"[..]).unwrap_err();
        assert!(matches!(err, BagError::PayloadLength { declared: 10, actual: 3, .. }));
        assert!(bag.data_stream("logo").unwrap().is_none());
    }

    #[test]
    fn long_payload_is_a_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = Bag::create(dir.path(), "long", &BagOptions::default()).unwrap();
        let err = bag.add_data("logo", 3, &b"abcdef"[..]).unwrap_err();
        assert!(matches!(err, BagError::PayloadLength { declared: 3, actual: 6, .. }));
        assert!(bag.data_stream("logo").unwrap().is_none());
        bag.add_data("logo", 6, &b"abcdef"[..]).unwrap();
        assert_eq!(bag.data_stream("logo").unwrap().unwrap().len(), 6);
    }

    #[test]
    fn writes_after_close_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = sample_bag(dir.path());
        bag.close().unwrap();
        assert!(matches!(bag.flat_writer("x.properties"), Err(BagError::Closed)));
        assert!(matches!(bag.xml_writer("metadata.xml"), Err(BagError::Closed)));
        assert!(matches!(bag.add_data("x", 0, io::empty()), Err(BagError::Closed)));
    }

    #[test]
    fn close_writes_tag_files_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = sample_bag(dir.path());
        bag.add_info("Schema-Version", "1").unwrap();
        bag.close().unwrap();

        let names: Vec<String> = bag.sections().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, [
            "bag-info.txt", "bagit.txt", "data/logo", "manifest-blake3.txt", "object.properties",
        ]);
        let info = bag.info().unwrap();
        assert!(info.contains(&("Payload-Oxum".to_owned(), "5.1".to_owned())));
        assert!(info.contains(&("Schema-Version".to_owned(), "1".to_owned())));
        assert_eq!(bag.verify().unwrap(), 4);
    }

    #[test]
    fn section_names_cannot_escape_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = Bag::create(dir.path(), "esc", &BagOptions::default()).unwrap();
        assert!(matches!(bag.flat_writer("../evil"), Err(BagError::InvalidSectionName(_))));
        assert!(matches!(bag.add_data("../../evil", 0, io::empty()), Err(BagError::InvalidSectionName(_))));
    }

    #[test]
    fn empty_is_idempotent_and_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = sample_bag(dir.path());
        let staging = bag.staging_dir().unwrap().to_owned();
        bag.empty().unwrap();
        bag.empty().unwrap();
        assert!(!staging.exists());
        assert!(matches!(bag.flat_reader("object.properties"), Err(BagError::Emptied)));

        let bag = sample_bag(dir.path());
        let staging = bag.staging_dir().unwrap().to_owned();
        drop(bag);
        assert!(!staging.exists());
    }

    #[test]
    fn tampered_archive_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = sample_bag(dir.path());
        bag.close().unwrap();
        // Corrupt a staged file after the manifest was written.
        fs::write(bag.staging_dir().unwrap().join("data/logo"), b"HELLO").unwrap();
        let archive = bag.deflate(ArchiveFormat::TarZst).unwrap();
        bag.empty().unwrap();

        assert!(matches!(Bag::open(&archive), Err(BagError::ChecksumMismatch(p)) if p == "data/logo"));
        // The failed open must not leave a staging directory behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("-staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unlisted_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = Bag::create(dir.path(), "extra", &BagOptions::default()).unwrap();
        bag.close().unwrap();
        // Slip a payload in after the manifest was written.
        let staging = bag.staging_dir().unwrap().to_owned();
        fs::create_dir_all(staging.join(DATA_DIR)).unwrap();
        fs::write(staging.join("data/logo"), b"injected").unwrap();
        assert!(matches!(bag.verify(), Err(BagError::UnlistedFile(p)) if p == "data/logo"));

        let archive = bag.deflate(ArchiveFormat::TarZst).unwrap();
        bag.empty().unwrap();
        assert!(matches!(Bag::open(&archive), Err(BagError::UnlistedFile(p)) if p == "data/logo"));
    }

    #[test]
    fn dropped_writer_is_flushed_before_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut bag = Bag::create(dir.path(), "flush", &BagOptions::default()).unwrap();
        {
            let mut w = bag.flat_writer("object.properties").unwrap();
            w.write_property("OBJECT_ID", "1/1").unwrap();
        }
        bag.close().unwrap();
        assert_eq!(bag.verify().unwrap(), 3);
        let props = bag.flat_reader("object.properties").unwrap().unwrap();
        assert_eq!(props.get("OBJECT_ID"), Some("1/1"));
    }

    #[test]
    fn deflate_never_replaces_an_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = sample_bag(dir.path());
        let archive = first.deflate(ArchiveFormat::Zbag).unwrap();
        first.empty().unwrap();
        let before = fs::read(&archive).unwrap();

        let mut second = Bag::create(dir.path(), "sample", &BagOptions::default()).unwrap();
        second.add_data("logo", 5, &b"other"[..]).unwrap();
        assert!(matches!(second.deflate(ArchiveFormat::Zbag), Err(BagError::ArchiveExists(p)) if p == archive));
        second.empty().unwrap();

        assert_eq!(fs::read(&archive).unwrap(), before);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["sample.zbag"]);
    }
}
