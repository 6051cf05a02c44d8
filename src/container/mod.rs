//! Native `zbag` container: streaming writer and verifying reader.
//!
//! # Writer
//! [`ZbagWriter`] accepts entries one at a time from any [`Read`], splits
//! them into `chunk_size` chunks, compresses each chunk and writes it as a
//! self-describing data block.  Entries are never held in memory whole.
//! The INDEX block goes last; the superblock at offset 0 is patched in place
//! on [`ZbagWriter::finalize`].
//!
//! # Reader
//! [`ZbagReader`] reads and checks the superblock, loads the index, and
//! extracts entries block by block into any [`Write`].  Every block CRC32 and
//! every entry's BLAKE3 digest is verified during extraction.

pub mod block;
pub mod index;
pub mod superblock;

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::codec::{CodecError, CodecId};
use block::{decode_block, encode_block, BlockHeader, BlockKind, ENTRY_ID_NONE};
use index::{BlockRef, ContainerIndex, EntryRecord};
use superblock::{Superblock, SUPERBLOCK_SIZE};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE:        usize = 4 * 1024 * 1024;
/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32   = 3;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Invalid magic number")]
    InvalidMagic,
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),
    #[error("Superblock checksum mismatch")]
    SuperblockChecksum,
    #[error("Invalid block magic {0:#010x}")]
    InvalidBlockMagic(u32),
    #[error("Unknown block kind {0}")]
    UnknownBlockKind(u8),
    #[error("Block checksum mismatch in entry {entry_id}")]
    BlockChecksum { entry_id: u32 },
    #[error("Block of entry {entry_id} declares {declared} bytes but decodes to {actual}")]
    BlockSize { entry_id: u32, declared: u64, actual: u64 },
    #[error("Block of {0} bytes exceeds the 4 GiB block limit")]
    BlockTooLarge(u64),
    #[error("Block at offset {offset} declares {declared} bytes but only {remaining} remain")]
    BlockOutOfBounds { offset: u64, declared: u64, remaining: u64 },
    #[error("Expected an index block at offset {0}")]
    MissingIndex(u64),
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    #[error("Digest mismatch for entry {path}")]
    DigestMismatch { path: String },
    #[error("Index error: {0}")]
    Index(#[from] serde_json::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ZbagWriter<W: Write + Seek> {
    writer:         W,
    pub superblock: Superblock,
    pub index:      ContainerIndex,
    codec:          CodecId,
    level:          i32,
    chunk_size:     usize,
}

impl<W: Write + Seek> ZbagWriter<W> {
    pub fn new(writer: W) -> Result<Self, ContainerError> {
        Self::with_options(writer, CodecId::Zstd, DEFAULT_COMPRESSION_LEVEL, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_options(
        mut writer: W,
        codec:      CodecId,
        level:      i32,
        chunk_size: usize,
    ) -> Result<Self, ContainerError> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; SUPERBLOCK_SIZE])?; // reserved; overwritten on finalize
        Ok(Self {
            writer,
            superblock: Superblock::new(),
            index:      ContainerIndex::default(),
            codec,
            level,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Stream one entry into the container.  Returns the number of bytes read
    /// from `source`.
    pub fn add_entry<R: Read>(&mut self, path: &str, mut source: R) -> Result<u64, ContainerError> {
        let id = self.index.entries.len() as u32;
        let mut hasher = blake3::Hasher::new();
        let mut blocks = Vec::new();
        let mut entry_offset = 0u64;
        let mut chunk = Vec::with_capacity(self.chunk_size);

        loop {
            chunk.clear();
            (&mut source).take(self.chunk_size as u64).read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                break;
            }
            hasher.update(&chunk);

            let (header, payload) = encode_block(
                BlockKind::Data,
                id,
                entry_offset,
                &chunk,
                self.codec,
                self.level,
            )?;
            let offset = self.writer.stream_position()?;
            header.write(&mut self.writer)?;
            self.writer.write_all(&payload)?;

            blocks.push(BlockRef {
                offset,
                orig_size: header.orig_size,
                comp_size: header.comp_size,
            });
            entry_offset += chunk.len() as u64;
        }

        self.index.entries.push(EntryRecord {
            id,
            path: path.to_owned(),
            size: entry_offset,
            blake3: hasher.finalize().to_hex().to_string(),
            blocks,
        });
        Ok(entry_offset)
    }

    /// Write the INDEX block, patch the superblock and hand back the sink.
    pub fn finalize(mut self) -> Result<W, ContainerError> {
        let index_payload = self.index.to_bytes()?;
        // The index is always zstd-compressed, whatever the entry codec.
        let (header, on_disk) = encode_block(
            BlockKind::Index,
            ENTRY_ID_NONE,
            0,
            &index_payload,
            CodecId::Zstd,
            DEFAULT_COMPRESSION_LEVEL,
        )?;

        let index_offset = self.writer.stream_position()?;
        header.write(&mut self.writer)?;
        self.writer.write_all(&on_disk)?;

        self.superblock.index_offset = index_offset;
        self.superblock.index_size   = on_disk.len() as u64;
        self.writer.seek(SeekFrom::Start(0))?;
        self.superblock.write(&mut self.writer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ZbagReader<R: Read + Seek> {
    reader:         R,
    /// Total stream length; block sizes are checked against it.
    len:            u64,
    pub superblock: Superblock,
    pub index:      ContainerIndex,
}

impl<R: Read + Seek> ZbagReader<R> {
    pub fn new(mut reader: R) -> Result<Self, ContainerError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let superblock = Superblock::read(&mut reader)?;

        reader.seek(SeekFrom::Start(superblock.index_offset))?;
        let header = BlockHeader::read(&mut reader)?;
        if header.kind != BlockKind::Index || header.comp_size as u64 != superblock.index_size {
            return Err(ContainerError::MissingIndex(superblock.index_offset));
        }
        let payload = read_payload(&mut reader, &header, len)?;
        let index = ContainerIndex::from_bytes(&decode_block(&header, &payload)?)?;

        Ok(Self { reader, len, superblock, index })
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.index.entries
    }

    /// Stream the entry at `path` into `out`, verifying every block and the
    /// entry digest.  Returns the number of bytes written.
    pub fn extract_entry<W: Write>(&mut self, path: &str, mut out: W) -> Result<u64, ContainerError> {
        let record = self.index.find(path)
            .ok_or_else(|| ContainerError::EntryNotFound(path.to_owned()))?
            .clone();

        let mut hasher = blake3::Hasher::new();
        let mut written = 0u64;
        for block in &record.blocks {
            self.reader.seek(SeekFrom::Start(block.offset))?;
            let header = BlockHeader::read(&mut self.reader)?;
            if header.kind != BlockKind::Data || header.entry_id != record.id {
                return Err(ContainerError::BlockChecksum { entry_id: record.id });
            }
            let payload = read_payload(&mut self.reader, &header, self.len)?;
            let data = decode_block(&header, &payload)?;
            hasher.update(&data);
            out.write_all(&data)?;
            written += data.len() as u64;
        }

        if written != record.size || hasher.finalize().to_hex().as_str() != record.blake3 {
            return Err(ContainerError::DigestMismatch { path: record.path });
        }
        Ok(written)
    }
}

/// Read the stored payload that follows `header`, refusing sizes that run
/// past the end of the stream before allocating anything.
fn read_payload<R: Read + Seek>(reader: &mut R, header: &BlockHeader, len: u64) -> Result<Vec<u8>, ContainerError> {
    let offset = reader.stream_position()?;
    let remaining = len.saturating_sub(offset);
    let declared = header.comp_size as u64;
    if declared > remaining {
        return Err(ContainerError::BlockOutOfBounds { offset, declared, remaining });
    }
    let mut payload = vec![0u8; header.comp_size as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
