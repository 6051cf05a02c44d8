//! BagIt tag files and the BLAKE3 payload manifest.
//!
//! `close` writes `bagit.txt`, `bag-info.txt` and finally
//! `manifest-blake3.txt`, which lists `<hex digest>  <path>` for every other
//! file in the bag.  Opening an archive re-hashes every listed file.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::{relative_files, BagError, DATA_DIR};

pub const BAGIT_FILE:    &str = "bagit.txt";
pub const BAG_INFO_FILE: &str = "bag-info.txt";
pub const MANIFEST_FILE: &str = "manifest-blake3.txt";

const BAGIT_VERSION: &str = "0.97";

pub(super) fn write_tag_files(staging: &Path, info: &[(String, String)]) -> Result<(), BagError> {
    fs::write(
        staging.join(BAGIT_FILE),
        format!("BagIt-Version: {BAGIT_VERSION}\nTag-File-Character-Encoding: UTF-8\n"),
    )?;

    let (bytes, count) = payload_oxum(staging)?;
    let mut out = BufWriter::new(File::create(staging.join(BAG_INFO_FILE))?);
    writeln!(out, "Bagging-Date: {}", chrono::Utc::now().format("%Y-%m-%d"))?;
    writeln!(out, "Payload-Oxum: {bytes}.{count}")?;
    for (key, value) in info {
        writeln!(out, "{key}: {value}")?;
    }
    out.flush()?;
    Ok(())
}

pub(super) fn write_manifest(staging: &Path) -> Result<(), BagError> {
    let mut out = BufWriter::new(File::create(staging.join(MANIFEST_FILE))?);
    for rel in relative_files(staging)? {
        if rel == MANIFEST_FILE {
            continue;
        }
        writeln!(out, "{}  {rel}", digest_file(&staging.join(&rel))?)?;
    }
    out.flush()?;
    Ok(())
}

/// Re-hash every file named in the manifest and refuse files it does not
/// name.  Returns the number checked.
pub(super) fn verify_manifest(staging: &Path) -> Result<usize, BagError> {
    let manifest = staging.join(MANIFEST_FILE);
    if !manifest.exists() {
        return Err(BagError::ManifestEntryMissing(MANIFEST_FILE.to_owned()));
    }
    let mut listed = HashSet::new();
    for line in BufReader::new(File::open(manifest)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (expected, rel) = line
            .split_once("  ")
            .ok_or_else(|| BagError::MalformedProperty(line.clone()))?;
        let path = staging.join(rel);
        if !path.is_file() {
            return Err(BagError::ManifestEntryMissing(rel.to_owned()));
        }
        if digest_file(&path)? != expected {
            return Err(BagError::ChecksumMismatch(rel.to_owned()));
        }
        listed.insert(rel.to_owned());
    }
    for rel in relative_files(staging)? {
        if rel != MANIFEST_FILE && !listed.contains(&rel) {
            return Err(BagError::UnlistedFile(rel));
        }
    }
    Ok(listed.len())
}

/// `key: value` pairs of `bag-info.txt`, or empty if the bag has none.
pub(super) fn read_info(staging: &Path) -> Result<Vec<(String, String)>, BagError> {
    let path = staging.join(BAG_INFO_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut info = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if let Some((k, v)) = line.split_once(": ") {
            info.push((k.to_owned(), v.to_owned()));
        }
    }
    Ok(info)
}

fn payload_oxum(staging: &Path) -> Result<(u64, usize), BagError> {
    let data = staging.join(DATA_DIR);
    if !data.exists() {
        return Ok((0, 0));
    }
    let files = relative_files(&data)?;
    let mut bytes = 0;
    for rel in &files {
        bytes += fs::metadata(data.join(rel))?.len();
    }
    Ok((bytes, files.len()))
}

fn digest_file(path: &Path) -> Result<String, BagError> {
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
