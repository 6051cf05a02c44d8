//! Fixed 64-byte superblock at offset 0 of every `zbag` container.
//!
//! ```text
//! 0   magic        [u8; 4]  b"ZBAG"
//! 4   version      u32
//! 8   archive_uuid [u8; 16]
//! 24  flags        u32
//! 28  index_offset u64
//! 36  index_size   u64
//! 44  reserved     [u8; 16]
//! 60  header_crc   u32      CRC32 of bytes 0..60
//! ```
//!
//! All integers are little-endian.  The superblock is written as zeros when
//! the container is created and patched in place on finalize.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use super::ContainerError;

pub const MAGIC: &[u8; 4] = b"ZBAG";
pub const VERSION: u32 = 1;
pub const SUPERBLOCK_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct Superblock {
    pub version:      u32,
    pub archive_uuid: Uuid,
    pub flags:        u32,
    pub index_offset: u64,
    pub index_size:   u64,
}

impl Superblock {
    pub fn new() -> Self {
        Self {
            version:      VERSION,
            archive_uuid: Uuid::new_v4(),
            flags:        0,
            index_offset: 0,
            index_size:   0,
        }
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE);
        buf.write_all(MAGIC)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_all(self.archive_uuid.as_bytes())?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u64::<LittleEndian>(self.index_offset)?;
        buf.write_u64::<LittleEndian>(self.index_size)?;
        buf.write_all(&[0u8; 16])?;
        let crc = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(crc)?;
        Ok(buf)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.encode()?)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, ContainerError> {
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        reader.read_exact(&mut raw)?;
        if &raw[0..4] != MAGIC {
            return Err(ContainerError::InvalidMagic);
        }
        let stored_crc = (&raw[60..64]).read_u32::<LittleEndian>()?;
        if crc32fast::hash(&raw[..60]) != stored_crc {
            return Err(ContainerError::SuperblockChecksum);
        }

        let mut cur = &raw[4..60];
        let version = cur.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let mut uuid_bytes = [0u8; 16];
        cur.read_exact(&mut uuid_bytes)?;
        let flags        = cur.read_u32::<LittleEndian>()?;
        let index_offset = cur.read_u64::<LittleEndian>()?;
        let index_size   = cur.read_u64::<LittleEndian>()?;

        Ok(Self {
            version,
            archive_uuid: Uuid::from_bytes(uuid_bytes),
            flags,
            index_offset,
            index_size,
        })
    }
}

impl Default for Superblock {
    fn default() -> Self { Self::new() }
}
