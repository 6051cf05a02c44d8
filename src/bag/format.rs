//! Archive backends a bag can be deflated into.
//!
//! | Name      | Extension  | Layout                                      |
//! |-----------|------------|---------------------------------------------|
//! | `zbag`    | `.zbag`    | native block container, see [`crate::container`] |
//! | `tar.zst` | `.tar.zst` | GNU tar stream inside a zstd frame          |
//!
//! Readers never trust the extension; [`ArchiveFormat::sniff`] looks at the
//! first four bytes of the file.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tar::{Builder, Header};

use super::{relative_files, BagError};
use crate::codec::CodecId;
use crate::container::{superblock, ZbagReader, ZbagWriter};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "zbag")]
    Zbag,
    #[serde(rename = "tar.zst", alias = "tar")]
    TarZst,
}

impl ArchiveFormat {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "zbag"                   => Some(ArchiveFormat::Zbag),
            "tar.zst" | "tar" | "tzst" => Some(ArchiveFormat::TarZst),
            _                        => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Zbag   => "zbag",
            ArchiveFormat::TarZst => "tar.zst",
        }
    }

    pub fn extension(self) -> &'static str {
        self.name()
    }

    /// Identify the backend of an existing archive from its magic bytes.
    pub fn sniff(path: &Path) -> Result<Self, BagError> {
        let mut magic = [0u8; 4];
        File::open(path)?.read_exact(&mut magic)?;
        if &magic == superblock::MAGIC {
            Ok(ArchiveFormat::Zbag)
        } else if magic == ZSTD_MAGIC {
            Ok(ArchiveFormat::TarZst)
        } else {
            Err(BagError::UnrecognizedArchive(path.to_path_buf()))
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compression settings shared by both backends.
#[derive(Debug, Clone, Copy)]
pub(super) struct Compression {
    pub codec:      CodecId,
    pub level:      i32,
    pub chunk_size: usize,
}

// ── Deflate ──────────────────────────────────────────────────────────────────

pub(super) fn deflate(
    format:  ArchiveFormat,
    staging: &Path,
    dest:    &Path,
    comp:    Compression,
) -> Result<(), BagError> {
    match format {
        ArchiveFormat::Zbag   => deflate_zbag(staging, dest, comp),
        ArchiveFormat::TarZst => deflate_tar_zst(staging, dest, comp),
    }
}

fn deflate_zbag(staging: &Path, dest: &Path, comp: Compression) -> Result<(), BagError> {
    let file = File::create(dest)?;
    let mut writer = ZbagWriter::with_options(file, comp.codec, comp.level, comp.chunk_size)?;
    for rel in relative_files(staging)? {
        writer.add_entry(&rel, BufReader::new(File::open(staging.join(&rel))?))?;
    }
    writer.finalize()?.sync_all()?;
    Ok(())
}

fn deflate_tar_zst(staging: &Path, dest: &Path, comp: Compression) -> Result<(), BagError> {
    let encoder = zstd::Encoder::new(BufWriter::new(File::create(dest)?), comp.level)?;
    let mut builder = Builder::new(encoder);
    for rel in relative_files(staging)? {
        let file = File::open(staging.join(&rel))?;
        let mut header = Header::new_gnu();
        header.set_size(file.metadata()?.len());
        header.set_mode(0o644);
        header.set_mtime(0);
        builder.append_data(&mut header, &rel, BufReader::new(file))?;
    }
    let encoder = builder.into_inner()?;
    let mut out = encoder.finish()?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(())
}

// ── Inflate ──────────────────────────────────────────────────────────────────

pub(super) fn inflate(format: ArchiveFormat, archive: &Path, staging: &Path) -> Result<(), BagError> {
    match format {
        ArchiveFormat::Zbag   => inflate_zbag(archive, staging),
        ArchiveFormat::TarZst => inflate_tar_zst(archive, staging),
    }
}

fn inflate_zbag(archive: &Path, staging: &Path) -> Result<(), BagError> {
    let mut reader = ZbagReader::new(BufReader::new(File::open(archive)?))?;
    let paths: Vec<String> = reader.entries().iter().map(|e| e.path.clone()).collect();
    for rel in paths {
        if !is_safe_relative(&rel) {
            return Err(BagError::InvalidSectionName(rel));
        }
        let dest = staging.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&dest)?);
        reader.extract_entry(&rel, &mut out)?;
        out.flush()?;
    }
    Ok(())
}

fn inflate_tar_zst(archive: &Path, staging: &Path) -> Result<(), BagError> {
    let decoder = zstd::Decoder::new(File::open(archive)?)?;
    // `unpack` refuses entries that would escape `staging`.
    tar::Archive::new(decoder).unpack(staging)?;
    Ok(())
}

/// True for a non-empty relative path made only of normal components.
pub(super) fn is_safe_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}
