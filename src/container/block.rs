//! Self-describing blocks: a 32-byte header followed by the stored payload.
//!
//! ```text
//! 0   magic        u32   "BLCK"
//! 4   kind         u8    0 = data, 1 = index
//! 5   codec        u8    see codec::ID_*
//! 6   reserved     u16
//! 8   entry_id     u32
//! 12  entry_offset u64   byte offset of this chunk within its entry
//! 20  orig_size    u32
//! 24  comp_size    u32
//! 28  checksum     u32   CRC32 of the stored payload
//! ```

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use super::ContainerError;
use crate::codec::CodecId;

pub const BLOCK_MAGIC: u32 = 0x424C434B;
pub const BLOCK_HEADER_SIZE: usize = 32;
/// `entry_id` used by blocks that belong to no entry (the index).
pub const ENTRY_ID_NONE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Data,
    Index,
}

impl BlockKind {
    fn to_u8(self) -> u8 {
        match self {
            BlockKind::Data  => 0,
            BlockKind::Index => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Self, ContainerError> {
        match v {
            0 => Ok(BlockKind::Data),
            1 => Ok(BlockKind::Index),
            other => Err(ContainerError::UnknownBlockKind(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub kind:         BlockKind,
    pub codec:        CodecId,
    pub entry_id:     u32,
    pub entry_offset: u64,
    pub orig_size:    u32,
    pub comp_size:    u32,
    pub checksum:     u32,
}

impl BlockHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(BLOCK_MAGIC)?;
        writer.write_u8(self.kind.to_u8())?;
        writer.write_u8(self.codec.id())?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(self.entry_id)?;
        writer.write_u64::<LittleEndian>(self.entry_offset)?;
        writer.write_u32::<LittleEndian>(self.orig_size)?;
        writer.write_u32::<LittleEndian>(self.comp_size)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, ContainerError> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != BLOCK_MAGIC {
            return Err(ContainerError::InvalidBlockMagic(magic));
        }
        let kind  = BlockKind::from_u8(reader.read_u8()?)?;
        let codec = CodecId::from_id(reader.read_u8()?)?;
        let _reserved = reader.read_u16::<LittleEndian>()?;
        Ok(Self {
            kind,
            codec,
            entry_id:     reader.read_u32::<LittleEndian>()?,
            entry_offset: reader.read_u64::<LittleEndian>()?,
            orig_size:    reader.read_u32::<LittleEndian>()?,
            comp_size:    reader.read_u32::<LittleEndian>()?,
            checksum:     reader.read_u32::<LittleEndian>()?,
        })
    }
}

pub fn encode_block(
    kind:         BlockKind,
    entry_id:     u32,
    entry_offset: u64,
    data:         &[u8],
    codec:        CodecId,
    level:        i32,
) -> Result<(BlockHeader, Vec<u8>), ContainerError> {
    let payload = codec.compress(data, level)?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let header = BlockHeader {
        kind,
        codec,
        entry_id,
        entry_offset,
        orig_size: block_len(data.len())?,
        comp_size: block_len(payload.len())?,
        checksum:  hasher.finalize(),
    };
    Ok((header, payload))
}

pub fn decode_block(header: &BlockHeader, payload: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != header.checksum {
        return Err(ContainerError::BlockChecksum { entry_id: header.entry_id });
    }
    let data = header.codec.decompress(payload)?;
    if data.len() != header.orig_size as usize {
        return Err(ContainerError::BlockSize {
            entry_id: header.entry_id,
            declared: header.orig_size as u64,
            actual:   data.len() as u64,
        });
    }
    Ok(data)
}

fn block_len(len: usize) -> Result<u32, ContainerError> {
    u32::try_from(len).map_err(|_| ContainerError::BlockTooLarge(len as u64))
}
