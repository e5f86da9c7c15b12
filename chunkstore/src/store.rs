//! Routing of global chunk coordinates to region files, and the seam to
//! the chunk codec on the caller's side.

use crate::error::Result;
use crate::region::RegionFile;
use format::{ChunkFeatures, Generation, LightData, RawChunk};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::debug;

/// The chunk codec the store delegates content semantics to.
///
/// The engine moves opaque bytes; what a block, light or biome dump means
/// is entirely this type's business. The light and biome methods are only
/// called for world versions that store those sections separately, so
/// implementations for older versions can keep the defaults.
pub trait Chunk: Sized {
    /// Rebuilds a chunk from its stored block data.
    fn load(data: &[u8], bit_mask: u16, sky_light_sent: bool, full_chunk: bool) -> Self;

    /// Attaches the separately stored light section.
    fn load_light(
        &mut self,
        _data: &[u8],
        _sky_light_mask: u32,
        _block_light_mask: u32,
        _empty_sky_light_mask: u32,
        _empty_block_light_mask: u32,
    ) {
    }

    /// Attaches the separately stored biome section.
    fn load_biomes(&mut self, _biomes: &[u8]) {}

    fn bit_mask(&self) -> u16;

    fn sky_light_sent(&self) -> bool;

    /// Serializes the block data. Opaque to the engine.
    fn dump(&self) -> Vec<u8>;

    fn sky_light_mask(&self) -> u32 {
        0
    }

    fn block_light_mask(&self) -> u32 {
        0
    }

    fn dump_light(&self) -> Vec<u8> {
        Vec::new()
    }

    fn dump_biomes(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Chunk storage over a directory of region files.
///
/// Region files are opened lazily on first access and stay resident until
/// [`close`] is called; dropping the store without closing leaks nothing
/// but skips the final flush. The store never creates its root directory,
/// that is the caller's setup concern.
///
/// [`close`]: RawStorage::close
pub struct RawStorage<C: Chunk> {
    root: PathBuf,
    world_version: u16,
    generation: Generation,
    compress: bool,
    regions: HashMap<(i32, i32), RegionFile>,
    _chunk: PhantomData<fn() -> C>,
}

impl<C: Chunk> RawStorage<C> {
    pub fn new(root: impl Into<PathBuf>, world_version: u16, compress: bool) -> Self {
        Self {
            root: root.into(),
            world_version,
            generation: Generation::of(world_version),
            compress,
            regions: HashMap::new(),
            _chunk: PhantomData,
        }
    }

    /// The region file containing the global chunk coordinates, opened
    /// lazily.
    pub async fn region(&mut self, x: i32, z: i32) -> Result<&mut RegionFile> {
        self.region_at(x >> 5, z >> 5).await
    }

    /// Loads the chunk at global coordinates. `Ok(None)` when it was
    /// never stored.
    pub async fn load(&mut self, x: i32, z: i32) -> Result<Option<C>> {
        let region = self.region(x, z).await?;

        let raw = match region.read(x & 31, z & 31).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let mut chunk = C::load(
            &raw.data,
            raw.bit_mask,
            raw.features.contains(ChunkFeatures::SKY_LIGHT_SENT),
            raw.features.contains(ChunkFeatures::FULL_CHUNK),
        );
        if let Some(light) = &raw.light {
            chunk.load_light(
                &light.data,
                light.sky_light_mask,
                light.block_light_mask,
                light.empty_sky_light_mask,
                light.empty_block_light_mask,
            );
        }
        if let Some(biomes) = &raw.biomes {
            chunk.load_biomes(biomes);
        }

        Ok(Some(chunk))
    }

    /// Saves the chunk at global coordinates, dumping whichever sections
    /// the store's world version keeps separate.
    pub async fn save(&mut self, x: i32, z: i32, chunk: &C) -> Result<()> {
        let generation = self.generation;
        let compress = self.compress;

        let mut features = ChunkFeatures::FULL_CHUNK;
        if generation.has_light() || chunk.sky_light_sent() {
            features |= ChunkFeatures::SKY_LIGHT_SENT;
        }

        let raw = RawChunk {
            features,
            bit_mask: chunk.bit_mask(),
            data: chunk.dump(),
            light: generation.has_light().then(|| LightData {
                sky_light_mask: chunk.sky_light_mask(),
                block_light_mask: chunk.block_light_mask(),
                // the codec contract has no accessors for these
                empty_sky_light_mask: 0,
                empty_block_light_mask: 0,
                data: chunk.dump_light(),
            }),
            biomes: generation.has_biomes().then(|| chunk.dump_biomes()),
        };

        let region = self.region(x, z).await?;
        region.write(x & 31, z & 31, &raw, compress).await
    }

    /// Closes every resident region file.
    pub async fn close(&mut self) -> Result<()> {
        for (_, region) in self.regions.drain() {
            region.close().await?;
        }

        Ok(())
    }

    /// Compacts every region file under the root, resident or not.
    /// Regions opened just for this pass are closed again afterwards.
    pub async fn defrag(&mut self) -> Result<()> {
        let mut temporary = Vec::new();

        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let name = dirent.file_name();
            if let Some((rx, rz)) = name.to_str().and_then(parse_region_name) {
                if !self.regions.contains_key(&(rx, rz)) {
                    self.region_at(rx, rz).await?;
                    temporary.push((rx, rz));
                }
            }
        }

        for region in self.regions.values_mut() {
            region.defrag().await?;
        }

        debug!(
            regions = self.regions.len(),
            temporary = temporary.len(),
            "defragmented store"
        );

        for key in temporary {
            if let Some(region) = self.regions.remove(&key) {
                region.close().await?;
            }
        }

        Ok(())
    }

    /// How many region files are currently resident.
    pub fn open_regions(&self) -> usize {
        self.regions.len()
    }

    async fn region_at(&mut self, rx: i32, rz: i32) -> Result<&mut RegionFile> {
        let path = self.root.join(format!("r.{}.{}.chnk", rx, rz));

        match self.regions.entry((rx, rz)) {
            Entry::Occupied(resident) => Ok(resident.into_mut()),
            Entry::Vacant(vacant) => {
                let region = RegionFile::open(path, self.world_version, rx, rz).await?;
                Ok(vacant.insert(region))
            }
        }
    }
}

/// Region coordinates from an `r.{x}.{z}.chnk` file name.
fn parse_region_name(name: &str) -> Option<(i32, i32)> {
    let mut parts = name.split('.');
    if parts.next() != Some("r") {
        return None;
    }

    let rx = parts.next()?.parse().ok()?;
    let rz = parts.next()?.parse().ok()?;

    match (parts.next(), parts.next()) {
        (Some("chnk"), None) => Some((rx, rz)),
        _ => None,
    }
}
