//! The serialized form of a single raw chunk record.
//!
//! Which sections a record carries is decided once per region by its
//! [`Generation`], never by per-record flags: old worlds keep light and
//! biomes inside the opaque block data, newer ones store them separately.

use super::{read_u16, read_u24, read_u32, read_u8};
use bitflags::bitflags;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// World-format version that moved light data out of the block data
/// (Minecraft 1.14).
pub const LIGHT_SEPARATED: u16 = 477;
/// World-format version that moved biome ids out of the block data
/// (Minecraft 1.15).
pub const BIOMES_SEPARATED: u16 = 573;

/// Length of the raw biome-id section.
pub const BIOMES_LEN: usize = 0x1000;

bitflags! {
    pub struct ChunkFeatures: u8 {
        const FULL_CHUNK = 0x01;
        const SKY_LIGHT_SENT = 0x02;
    }
}

/// Which optional sections records of a region carry, derived from the
/// world-format version the region was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Light and biomes are part of the opaque block data.
    Base,
    /// Light masks and light data stored as their own section.
    SeparateLight,
    /// Light separated, plus a raw biome-id section.
    SeparateBiomes,
}

impl Generation {
    pub fn of(world_version: u16) -> Self {
        if world_version >= BIOMES_SEPARATED {
            Self::SeparateBiomes
        } else if world_version >= LIGHT_SEPARATED {
            Self::SeparateLight
        } else {
            Self::Base
        }
    }

    pub fn has_light(self) -> bool {
        !matches!(self, Self::Base)
    }

    pub fn has_biomes(self) -> bool {
        matches!(self, Self::SeparateBiomes)
    }
}

/// The light section of a record. The masks are 24-bit quantities, one bit
/// per chunk section; only the low 24 bits of each field are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightData {
    pub sky_light_mask: u32,
    pub block_light_mask: u32,
    pub empty_sky_light_mask: u32,
    pub empty_block_light_mask: u32,
    pub data: Vec<u8>,
}

/// One chunk record as it is stored inside a region file, minus the
/// compression flag byte that precedes it on disk.
///
/// The engine treats `data`, `light` and `biomes` as opaque bytes; their
/// meaning belongs to the chunk codec on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub features: ChunkFeatures,
    pub bit_mask: u16,
    pub data: Vec<u8>,
    pub light: Option<LightData>,
    pub biomes: Option<Vec<u8>>,
}

impl RawChunk {
    /// Serializes the record for a region of the given generation.
    ///
    /// Sections the generation does not store are skipped even when
    /// present on the record. Returns how many bytes were written.
    pub fn write_to<W: Write>(&self, output: &mut W, generation: Generation) -> Result<usize> {
        let mut written = 0;

        output.write_all(&[self.features.bits()])?;
        output.write_all(&self.bit_mask.to_be_bytes())?;
        output.write_all(&(self.data.len() as u32).to_be_bytes())?;
        output.write_all(&self.data)?;
        written += 1 + 2 + 4 + self.data.len();

        if generation.has_light() {
            let light = self.light.as_ref().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    "record has no light section but the region stores light separately",
                )
            })?;
            output.write_all(&light.sky_light_mask.to_be_bytes()[1..])?;
            output.write_all(&light.block_light_mask.to_be_bytes()[1..])?;
            output.write_all(&light.empty_sky_light_mask.to_be_bytes()[1..])?;
            output.write_all(&light.empty_block_light_mask.to_be_bytes()[1..])?;
            output.write_all(&(light.data.len() as u32).to_be_bytes())?;
            output.write_all(&light.data)?;
            written += 4 * 3 + 4 + light.data.len();
        }

        if generation.has_biomes() {
            let biomes = self.biomes.as_deref().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    "record has no biome section but the region stores biomes separately",
                )
            })?;
            if biomes.len() != BIOMES_LEN {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "biome section must be exactly 4096 bytes",
                ));
            }
            output.write_all(biomes)?;
            written += BIOMES_LEN;
        }

        Ok(written)
    }

    /// Parses a record written by [`RawChunk::write_to`] with the same
    /// generation.
    pub fn read_from<R: Read>(input: &mut R, generation: Generation) -> Result<Self> {
        let features = ChunkFeatures::from_bits_truncate(read_u8(input)?);
        let bit_mask = read_u16(input)?;

        let data_len = read_u32(input)? as usize;
        let mut data = vec![0; data_len];
        input.read_exact(&mut data)?;

        let light = if generation.has_light() {
            let sky_light_mask = read_u24(input)?;
            let block_light_mask = read_u24(input)?;
            let empty_sky_light_mask = read_u24(input)?;
            let empty_block_light_mask = read_u24(input)?;
            let light_len = read_u32(input)? as usize;
            let mut light_data = vec![0; light_len];
            input.read_exact(&mut light_data)?;
            Some(LightData {
                sky_light_mask,
                block_light_mask,
                empty_sky_light_mask,
                empty_block_light_mask,
                data: light_data,
            })
        } else {
            None
        };

        let biomes = if generation.has_biomes() {
            let mut biomes = vec![0; BIOMES_LEN];
            input.read_exact(&mut biomes)?;
            Some(biomes)
        } else {
            None
        };

        Ok(Self {
            features,
            bit_mask,
            data,
            light,
            biomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn base_record() -> RawChunk {
        RawChunk {
            features: ChunkFeatures::FULL_CHUNK,
            bit_mask: 0b0000_0011_0000_0001,
            data: vec![7; 50],
            light: None,
            biomes: None,
        }
    }

    #[test]
    fn base_roundtrip() {
        let mut buffer: Vec<u8> = Vec::new();

        let original = base_record();
        let written = original.write_to(&mut buffer, Generation::Base).unwrap();
        assert_eq!(written, buffer.len());
        assert_eq!(written, 1 + 2 + 4 + 50);

        let parsed = RawChunk::read_from(&mut Cursor::new(buffer), Generation::Base).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn light_separated_roundtrip() {
        let mut buffer: Vec<u8> = Vec::new();

        let mut original = base_record();
        original.features |= ChunkFeatures::SKY_LIGHT_SENT;
        original.light = Some(LightData {
            sky_light_mask: 0x03FFFF,
            block_light_mask: 0x000FF0,
            empty_sky_light_mask: 0,
            empty_block_light_mask: 0,
            data: vec![0xAB; 2048],
        });

        original
            .write_to(&mut buffer, Generation::SeparateLight)
            .unwrap();
        let parsed =
            RawChunk::read_from(&mut Cursor::new(buffer), Generation::SeparateLight).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn biomes_separated_roundtrip() {
        let mut buffer: Vec<u8> = Vec::new();

        let mut original = base_record();
        original.features |= ChunkFeatures::SKY_LIGHT_SENT;
        original.light = Some(LightData::default());
        original.biomes = Some((0..BIOMES_LEN).map(|i| i as u8).collect());

        original
            .write_to(&mut buffer, Generation::SeparateBiomes)
            .unwrap();
        let parsed =
            RawChunk::read_from(&mut Cursor::new(buffer), Generation::SeparateBiomes).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn sections_are_gated_by_generation_not_presence() {
        let mut buffer: Vec<u8> = Vec::new();

        let mut record = base_record();
        record.light = Some(LightData::default());
        record.biomes = Some(vec![0; BIOMES_LEN]);

        // a Base region must ignore the extra sections entirely
        let written = record.write_to(&mut buffer, Generation::Base).unwrap();
        assert_eq!(written, 1 + 2 + 4 + 50);

        let parsed = RawChunk::read_from(&mut Cursor::new(buffer), Generation::Base).unwrap();
        assert_eq!(parsed.light, None);
        assert_eq!(parsed.biomes, None);
    }

    #[test]
    fn missing_sections_are_rejected() {
        let record = base_record();

        assert!(record
            .write_to(&mut Vec::new(), Generation::SeparateLight)
            .is_err());

        let mut with_light = base_record();
        with_light.light = Some(LightData::default());
        assert!(with_light
            .write_to(&mut Vec::new(), Generation::SeparateBiomes)
            .is_err());
    }

    #[test]
    fn undersized_biome_section_is_rejected() {
        let mut record = base_record();
        record.light = Some(LightData::default());
        record.biomes = Some(vec![0; BIOMES_LEN - 1]);

        assert!(record
            .write_to(&mut Vec::new(), Generation::SeparateBiomes)
            .is_err());
    }

    #[test]
    fn generation_thresholds() {
        assert_eq!(Generation::of(0), Generation::Base);
        assert_eq!(Generation::of(LIGHT_SEPARATED - 1), Generation::Base);
        assert_eq!(Generation::of(LIGHT_SEPARATED), Generation::SeparateLight);
        assert_eq!(Generation::of(BIOMES_SEPARATED - 1), Generation::SeparateLight);
        assert_eq!(Generation::of(BIOMES_SEPARATED), Generation::SeparateBiomes);
        assert_eq!(Generation::of(u16::MAX), Generation::SeparateBiomes);
    }
}
