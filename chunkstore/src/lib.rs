//! On-disk storage of voxel-world chunks in fixed-grid region files.
//!
//! Chunks are keyed by global `(x, z)` coordinates and grouped 32x32 into
//! region files. Each region file carries a header with a 1024-slot index
//! table followed by a data area managed by a first-fit free-space
//! allocator; records can optionally be zlib-compressed and regions can be
//! compacted offline with [`RegionFile::defrag`].
//!
//! Mutating operations take `&mut self` and must not be interleaved per
//! region; there is no internal locking. Reads of slots that were never
//! written return `Ok(None)` rather than an error.

pub mod alloc;
mod backend;
pub mod error;
pub mod region;
pub mod store;

pub use error::{Error, Result};
pub use format::{ChunkFeatures, Generation, IndexEntry, LightData, RawChunk};
pub use region::RegionFile;
pub use store::{Chunk, RawStorage};
