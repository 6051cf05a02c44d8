use serde::{Deserialize, Serialize};

/// Location of one stored chunk of an entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub offset:    u64,
    pub orig_size: u32,
    pub comp_size: u32,
}

/// One file of the bag, addressed by its `/`-separated relative path.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EntryRecord {
    pub id:     u32,
    pub path:   String,
    pub size:   u64,
    /// BLAKE3 of the uncompressed content, hex encoded.
    pub blake3: String,
    pub blocks: Vec<BlockRef>,
}

impl EntryRecord {
    pub fn compressed_size(&self) -> u64 {
        self.blocks.iter().map(|b| b.comp_size as u64).sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ContainerIndex {
    pub entries: Vec<EntryRecord>,
}

impl ContainerIndex {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn find(&self, path: &str) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.path == path)
    }
}
