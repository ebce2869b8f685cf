use crate::{
	block::{Block, LookupId},
	common::world::{generator::Populator, to_world, BlockPoint, Neighborhood, CHUNK_SIZE},
};
use rand::{rngs::StdRng, Rng};

/// Scatters a decoration block on top of the surface.
///
/// Each placement picks a spot up to one block beyond the column's edge,
/// so roughly one in nine land in a neighbouring column.
pub struct Scatter {
	pub block: LookupId,
	pub per_column: usize,
}

impl Populator for Scatter {
	#[profiling::function]
	fn populate(&self, region: &mut Neighborhood, rng: &mut StdRng) -> anyhow::Result<()> {
		let center = *region.center();
		let edge = CHUNK_SIZE as i64;
		for _ in 0..self.per_column {
			let local = BlockPoint::new(rng.gen_range(-1..=edge), rng.gen_range(-1..=edge), 0);
			let mut point = to_world(&center, &local);
			let floor = (0..)
				.map(|z| BlockPoint::new(point.x, point.y, z))
				.take_while(|p| region.get(p).is_some())
				.filter(|p| region.get(p).map(|b| !b.is_air()).unwrap_or(false))
				.last();
			let floor = match floor {
				Some(floor) => floor,
				None => continue,
			};
			point.z = floor.z + 1;
			if region.get(&point) == Some(Block::AIR) {
				region.set(&point, Block::new(self.block))?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod scatter {
	use super::*;
	use crate::common::world::{chunk::Chunk, neighbors, ColumnCoord};
	use rand::SeedableRng;

	#[test]
	fn places_on_surface() {
		let center = ColumnCoord::new(0, 0);
		let chunks = std::iter::once(center)
			.chain(neighbors(&center))
			.map(|coordinate| Chunk::new(coordinate, 16))
			.collect::<Vec<_>>();
		for chunk in chunks.iter() {
			let mut data = chunk.write().unwrap();
			let mut buffers = data.buffers();
			for y in 0..CHUNK_SIZE {
				for x in 0..CHUNK_SIZE {
					buffers.set(x, y, 0, Block::new(1));
				}
			}
		}
		let scatter = Scatter {
			block: 7,
			per_column: 40,
		};
		let mut rng = StdRng::seed_from_u64(9);
		let mut region = Neighborhood::lock(center, chunks.iter()).unwrap();
		scatter.populate(&mut region, &mut rng).unwrap();
		let placed = (-1..=16i64)
			.flat_map(|y| (-1..=16i64).map(move |x| BlockPoint::new(x, y, 1)))
			.filter(|p| region.get(p) == Some(Block::new(7)))
			.count();
		assert!(placed > 0);
		assert!(region.touched().contains(&center));
	}
}
