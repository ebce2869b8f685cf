use crate::{
	block::{Block, Lookup, LookupId},
	common::world::{
		chunk::{Buffers, DelayedUpdate},
		generator::{column_seed, Generator},
		ColumnCoord, CHUNK_SIZE,
	},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;

/// Flat layered terrain, with a sprinkling of glass in every layer above the floor.
#[derive(Default)]
pub struct Flat {
	seed: u64,
	layers: BTreeMap</*block-z*/ usize, LookupId>,
	glass_id: Option<LookupId>,
	/// Percent chance for a block above z = 0 to be glass instead.
	glass_chance: u32,
}

impl Flat {
	pub fn classic(lookup: &Lookup, seed: u64) -> Self {
		let mut cfg = Self {
			seed,
			glass_chance: 15,
			..Default::default()
		};

		cfg.insert(0, lookup.lookup_value("bedrock"));
		let stone = lookup.lookup_value("stone");
		cfg.insert(1, stone);
		cfg.insert(2, stone);
		cfg.insert(3, stone);
		let dirt = lookup.lookup_value("dirt");
		cfg.insert(4, dirt);
		cfg.insert(5, dirt);
		cfg.insert(6, lookup.lookup_value("grass"));
		cfg.glass_id = lookup.lookup_value("glass");

		cfg
	}

	/// Fully solid layers with no glass; handy where tests need predictable solidity.
	pub fn solid(id: LookupId, depth: usize) -> Self {
		let mut cfg = Self::default();
		for z in 0..depth {
			cfg.insert(z, Some(id));
		}
		cfg
	}

	pub fn insert(&mut self, z: usize, id: Option<LookupId>) {
		if let Some(id) = id {
			self.layers.insert(z, id);
		}
	}

	/// Height of the topmost configured layer plus one.
	pub fn surface(&self) -> usize {
		self.layers.keys().next_back().map(|z| z + 1).unwrap_or(0)
	}
}

impl Generator for Flat {
	#[profiling::function]
	fn generate(
		&self,
		coordinate: &ColumnCoord,
		buffers: &mut Buffers,
	) -> anyhow::Result<Vec<DelayedUpdate>> {
		let mut rng = StdRng::seed_from_u64(column_seed(self.seed, coordinate));
		for (&z, &block_id) in self.layers.iter() {
			if z >= buffers.height() {
				anyhow::bail!(
					"layer {} does not fit in a column of height {}",
					z,
					buffers.height()
				);
			}
			for y in 0..CHUNK_SIZE {
				for x in 0..CHUNK_SIZE {
					let id = match self.glass_id {
						Some(glass) if z > 0 && rng.gen_range(0..100) < self.glass_chance => glass,
						_ => block_id,
					};
					buffers.set(x, y, z, Block::new(id));
				}
			}
		}
		Ok(Vec::new())
	}
}
