use chunkstore::{Chunk, RawStorage};

// 1.15, biomes and light both stored separately
const WORLD_VERSION: u16 = 573;

/// A toy chunk that keeps everything as plain bytes. A real caller would
/// plug in its palette/lighting codec here.
#[derive(Debug, Clone, PartialEq)]
struct MemoryChunk {
    bit_mask: u16,
    blocks: Vec<u8>,
    light: Vec<u8>,
    sky_light_mask: u32,
    block_light_mask: u32,
    biomes: Vec<u8>,
}

impl Chunk for MemoryChunk {
    fn load(data: &[u8], bit_mask: u16, _sky_light_sent: bool, _full_chunk: bool) -> Self {
        Self {
            bit_mask,
            blocks: data.to_vec(),
            light: Vec::new(),
            sky_light_mask: 0,
            block_light_mask: 0,
            biomes: Vec::new(),
        }
    }

    fn load_light(
        &mut self,
        data: &[u8],
        sky_light_mask: u32,
        block_light_mask: u32,
        _empty_sky_light_mask: u32,
        _empty_block_light_mask: u32,
    ) {
        self.light = data.to_vec();
        self.sky_light_mask = sky_light_mask;
        self.block_light_mask = block_light_mask;
    }

    fn load_biomes(&mut self, biomes: &[u8]) {
        self.biomes = biomes.to_vec();
    }

    fn bit_mask(&self) -> u16 {
        self.bit_mask
    }

    fn sky_light_sent(&self) -> bool {
        true
    }

    fn dump(&self) -> Vec<u8> {
        self.blocks.clone()
    }

    fn sky_light_mask(&self) -> u32 {
        self.sky_light_mask
    }

    fn block_light_mask(&self) -> u32 {
        self.block_light_mask
    }

    fn dump_light(&self) -> Vec<u8> {
        self.light.clone()
    }

    fn dump_biomes(&self) -> Vec<u8> {
        self.biomes.clone()
    }
}

async fn run() -> chunkstore::Result<()> {
    let root = std::env::temp_dir().join("chunkstore-demo");
    // directory setup is on the caller, the store won't create it
    tokio::fs::create_dir_all(&root).await?;

    let mut store = RawStorage::<MemoryChunk>::new(&root, WORLD_VERSION, true);

    let chunk = MemoryChunk {
        bit_mask: 0b11,
        blocks: (0..4096).map(|i| (i % 251) as u8).collect(),
        light: vec![0x77; 2048],
        sky_light_mask: 0b111,
        block_light_mask: 0b001,
        biomes: vec![1; 4096],
    };

    store.save(0, 0, &chunk).await?;
    store.save(-1, 7, &chunk).await?;

    let loaded = store.load(0, 0).await?.expect("chunk was just saved");
    assert_eq!(loaded, chunk);
    println!(
        "round-tripped chunk (0, 0): {} block bytes, {} light bytes",
        loaded.blocks.len(),
        loaded.light.len()
    );

    println!("chunk (3, 3) stored: {}", store.load(3, 3).await?.is_some());

    store.defrag().await?;
    store.close().await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error running the storage demo: {:?}", e)
    }
}
