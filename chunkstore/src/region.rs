//! A single region file: header lifecycle, slot reads and writes, and
//! offline compaction.

use crate::alloc::{Extent, ExtentList, Extents};
use crate::backend::FileBackend;
use crate::error::{Error, Result};
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use format::header::{
    FORMAT_VERSION, HEADER_SIZE, INFO_ENTRIES, INFO_ENTRY_SIZE, MAGIC, MAX_CHUNK_SIZE,
};
use format::{Deserializable, Generation, IndexEntry, RawChunk, RegionHeader, Serializable};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// One slot of the region index together with its link into the
/// allocation list (`None` for empty slots).
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    entry: IndexEntry,
    alloc: Option<usize>,
}

/// One 32x32-chunk container file.
///
/// Reads of empty slots return `Ok(None)`. Writes and [`defrag`] must be
/// serialized by the caller; nothing here locks, and an I/O failure
/// leaves the in-memory index exactly as it was when the failure surfaced.
///
/// [`defrag`]: RegionFile::defrag
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    backend: FileBackend,
    generation: Generation,
    slots: Vec<Slot>,
    allocs: ExtentList,
    /// Total on-disk size, header included.
    size: u64,
}

impl RegionFile {
    /// Opens the region file at `path`, creating it if it does not exist.
    ///
    /// An existing file must carry the expected magic, a format version no
    /// newer than this engine writes, the declared world version and the
    /// declared region position; anything else fails the open.
    pub async fn open(
        path: impl Into<PathBuf>,
        world_version: u16,
        x: i32,
        z: i32,
    ) -> Result<Self> {
        let path = path.into();
        let mut slots = vec![Slot::default(); INFO_ENTRIES];
        let mut allocs = ExtentList::new();

        let backend = match FileBackend::open(&path).await? {
            Some(mut backend) => {
                let header_bytes = backend.read_at(0, HEADER_SIZE).await?;
                let mut reader = Cursor::new(header_bytes);

                let header = RegionHeader::from_reader(&mut reader)?;
                if header.magic != MAGIC {
                    return Err(Error::BadMagic { path });
                }
                if header.format_version > FORMAT_VERSION {
                    return Err(Error::FormatVersion {
                        path,
                        found: header.format_version,
                    });
                }
                if header.world_version != world_version {
                    return Err(Error::WorldVersion {
                        path,
                        found: header.world_version,
                        expected: world_version,
                    });
                }
                if (header.x, header.z) != (x, z) {
                    return Err(Error::Position {
                        path,
                        found: (header.x, header.z),
                        expected: (x, z),
                    });
                }

                let mut used = Vec::new();
                for (index, slot) in slots.iter_mut().enumerate() {
                    slot.entry = IndexEntry::from_reader(&mut reader)?;
                    if !slot.entry.is_empty() {
                        used.push(Extent {
                            slot: index,
                            offset: slot.entry.offset,
                            size: slot.entry.size,
                        });
                    }
                }
                used.sort_by_key(|extent| extent.offset);
                for extent in used {
                    slots[extent.slot].alloc = Some(allocs.push_back(extent));
                }

                debug!(path = %path.display(), "opened region file");
                backend
            }
            None => {
                let mut backend = FileBackend::create(&path).await?;

                let mut header_bytes = Vec::with_capacity(HEADER_SIZE);
                RegionHeader::new(world_version, x, z).to_writer(&mut header_bytes)?;
                for slot in &slots {
                    slot.entry.to_writer(&mut header_bytes)?;
                }
                backend.write_at(0, &header_bytes).await?;

                debug!(path = %path.display(), "created region file");
                backend
            }
        };

        let size = backend.len().await?;

        Ok(Self {
            path,
            backend,
            generation: Generation::of(world_version),
            slots,
            allocs,
            size,
        })
    }

    /// Reads the record at local chunk coordinates. `Ok(None)` when the
    /// slot was never written, or when its extent runs past the end of a
    /// truncated file.
    pub async fn read(&mut self, x: i32, z: i32) -> Result<Option<RawChunk>> {
        let slot = slot_index(x, z)?;

        let entry = self.slots[slot].entry;
        if entry.is_empty() {
            return Ok(None);
        }
        if HEADER_SIZE as u64 + entry.offset as u64 + entry.size as u64 > self.size {
            warn!(
                path = %self.path.display(),
                x, z, "chunk extent runs past the end of the file, treating as absent"
            );
            return Ok(None);
        }

        let cell = self
            .backend
            .read_at(HEADER_SIZE as u64 + entry.offset as u64, entry.size as usize)
            .await?;

        let payload = match cell[0] {
            1 => inflate(&cell[1..])?,
            _ => cell[1..].to_vec(),
        };
        let record = RawChunk::read_from(&mut Cursor::new(payload), self.generation)?;

        Ok(Some(record))
    }

    /// Writes a record at local chunk coordinates.
    ///
    /// A record that serializes (and compresses) to the same size as the
    /// slot's current one is overwritten in place. Otherwise the old
    /// extent is freed and the new one lands in the first gap that fits,
    /// or at the end of the data area when no gap does.
    pub async fn write(
        &mut self,
        x: i32,
        z: i32,
        record: &RawChunk,
        compress: bool,
    ) -> Result<()> {
        let slot = slot_index(x, z)?;

        let mut payload = Vec::new();
        record.write_to(&mut payload, self.generation)?;
        if compress {
            payload = deflate(&payload)?;
        }

        let mut cell = Vec::with_capacity(payload.len() + 1);
        cell.push(compress as u8);
        cell.extend_from_slice(&payload);

        if cell.len() >= MAX_CHUNK_SIZE {
            return Err(Error::ChunkTooLarge { size: cell.len() });
        }
        let size = cell.len() as u32;

        let entry = self.slots[slot].entry;
        if !entry.is_empty() && entry.size == size {
            // same length, the bytes can go straight over the old ones
            trace!(x, z, offset = entry.offset, size, "overwriting chunk in place");
            self.backend
                .write_at(HEADER_SIZE as u64 + entry.offset as u64, &cell)
                .await?;
            return Ok(());
        }

        if let Some(key) = self.slots[slot].alloc.take() {
            self.allocs.remove(key);
        }

        let (offset, key) = match self.allocs.find_gap(size) {
            Some((offset, before)) => {
                trace!(x, z, offset, size, "chunk fits a free gap");
                let key = self.allocs.insert_before(before, Extent { slot, offset, size });
                (offset, key)
            }
            None => {
                // no gap anywhere, grow the file
                let offset = (self.size - HEADER_SIZE as u64) as u32;
                trace!(x, z, offset, size, "growing the data area");
                self.backend.write_at(self.size, &vec![0; size as usize]).await?;
                self.size += size as u64;
                let key = self.allocs.push_back(Extent { slot, offset, size });
                (offset, key)
            }
        };

        self.slots[slot] = Slot {
            entry: IndexEntry { offset, size },
            alloc: Some(key),
        };
        self.persist_entry(slot).await?;
        self.backend
            .write_at(HEADER_SIZE as u64 + offset as u64, &cell)
            .await?;

        Ok(())
    }

    /// Packs all used extents down to the front of the data area and cuts
    /// the file to exactly the space they occupy.
    ///
    /// Slots keep their contents; only physical placement changes, so
    /// every read that was valid before stays valid.
    pub async fn defrag(&mut self) -> Result<()> {
        let mut free_start: u32 = 0;

        for key in self.allocs.keys() {
            let extent = *self.allocs.get(key);
            if extent.offset > free_start {
                let bytes = self
                    .backend
                    .read_at(HEADER_SIZE as u64 + extent.offset as u64, extent.size as usize)
                    .await?;
                self.backend
                    .write_at(HEADER_SIZE as u64 + free_start as u64, &bytes)
                    .await?;

                self.allocs.set_offset(key, free_start);
                self.slots[extent.slot].entry.offset = free_start;
                self.persist_entry(extent.slot).await?;
            }
            free_start += extent.size;
        }

        let new_size = HEADER_SIZE as u64 + free_start as u64;
        if self.size > new_size {
            debug!(
                path = %self.path.display(),
                reclaimed = self.size - new_size,
                "defragmented region"
            );
            self.backend.set_len(new_size).await?;
            self.size = new_size;
        }

        Ok(())
    }

    /// Flushes and releases the file handle.
    pub async fn close(self) -> Result<()> {
        debug!(path = %self.path.display(), "closing region file");
        self.backend.close().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total on-disk size in bytes, header included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The slot's index entry; `None` while the slot is empty.
    pub fn entry(&self, x: i32, z: i32) -> Result<Option<IndexEntry>> {
        let slot = slot_index(x, z)?;
        let entry = self.slots[slot].entry;

        Ok((!entry.is_empty()).then_some(entry))
    }

    /// Used extents in ascending offset order.
    pub fn extents(&self) -> Extents<'_> {
        self.allocs.iter()
    }

    async fn persist_entry(&mut self, slot: usize) -> Result<()> {
        let mut buf = Vec::with_capacity(INFO_ENTRY_SIZE);
        self.slots[slot].entry.to_writer(&mut buf)?;
        self.backend.write_at(IndexEntry::position(slot), &buf).await?;

        Ok(())
    }
}

/// Maps local coordinates to a slot index, rejecting anything outside the
/// 32x32 grid.
fn slot_index(x: i32, z: i32) -> Result<usize> {
    if !(0..32).contains(&x) || !(0..32).contains(&z) {
        return Err(Error::OutOfBounds { x, z });
    }

    Ok((x + z * 32) as usize)
}

fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(Vec::new());
    decoder.write_all(data)?;
    decoder.finish()
}
