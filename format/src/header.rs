//! Region file header: magic, version tags, region position and the
//! 1024-slot index table.

use super::{read_i32, read_u16, read_u32, read_u8, Deserializable, Serializable};
use std::io::{Read, Result, Write};

pub const MAGIC: [u8; 4] = *b"CHNK";
pub const FORMAT_VERSION: u8 = 1;

/// One index entry per chunk slot of the 32x32 region grid.
pub const INFO_ENTRIES: usize = 0x400;
pub const INFO_ENTRY_SIZE: usize = 0x8;
/// Byte position of the index table, right after the fixed header fields.
pub const INFO_TABLE_OFFSET: usize = 15;
/// Total header length; the data area starts here.
pub const HEADER_SIZE: usize = INFO_TABLE_OFFSET + INFO_ENTRIES * INFO_ENTRY_SIZE;

/// Hard cap on a stored record, compression flag byte included.
pub const MAX_CHUNK_SIZE: usize = 0x10_0000;

/// The fixed fields at the very start of a region file.
///
/// The magic bytes are kept as data rather than checked here, so that the
/// engine can report mismatches with the file path attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    pub magic: [u8; 4],
    pub format_version: u8,
    pub world_version: u16,
    pub x: i32,
    pub z: i32,
}

impl RegionHeader {
    pub fn new(world_version: u16, x: i32, z: i32) -> Self {
        Self {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            world_version,
            x,
            z,
        }
    }
}

impl Serializable for RegionHeader {
    fn to_writer<W: Write>(&self, output: &mut W) -> Result<usize> {
        output.write_all(&self.magic)?;
        output.write_all(&[self.format_version])?;
        output.write_all(&self.world_version.to_be_bytes())?;
        output.write_all(&self.x.to_be_bytes())?;
        output.write_all(&self.z.to_be_bytes())?;
        Ok(INFO_TABLE_OFFSET)
    }
}

impl Deserializable for RegionHeader {
    fn from_reader<R: Read>(input: &mut R) -> Result<Self> {
        let mut magic = [0; 4];
        input.read_exact(&mut magic)?;

        Ok(Self {
            magic,
            format_version: read_u8(input)?,
            world_version: read_u16(input)?,
            x: read_i32(input)?,
            z: read_i32(input)?,
        })
    }
}

/// Where one chunk slot's record sits in the data area.
///
/// `offset` is relative to the end of the header. `size == 0` marks an
/// empty slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u32,
    pub size: u32,
}

impl IndexEntry {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte position of the slot's entry within the header, so a single
    /// entry can be rewritten without touching its neighbours.
    pub fn position(slot: usize) -> u64 {
        (INFO_TABLE_OFFSET + slot * INFO_ENTRY_SIZE) as u64
    }
}

impl Serializable for IndexEntry {
    fn to_writer<W: Write>(&self, output: &mut W) -> Result<usize> {
        output.write_all(&self.offset.to_be_bytes())?;
        output.write_all(&self.size.to_be_bytes())?;
        Ok(INFO_ENTRY_SIZE)
    }
}

impl Deserializable for IndexEntry {
    fn from_reader<R: Read>(input: &mut R) -> Result<Self> {
        Ok(Self {
            offset: read_u32(input)?,
            size: read_u32(input)?,
        })
    }
}
