pub mod bag;
pub mod codec;
pub mod config;
pub mod container;
pub mod node;
pub mod packer;
pub mod schema;
pub mod store;

pub use bag::{ArchiveFormat, Bag, BagError};
pub use codec::CodecId;
pub use config::BagOptions;
pub use node::{Handle, NodeKind};
pub use packer::{AnyPacker, PackError, Packer, PackerFactory, SizeMethod};
pub use store::{ContentStore, DirStore, MemoryStore, StoreError};
