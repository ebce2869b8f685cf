//! The collaborators which fill chunks: a [`Generator`] produces a column's base terrain in isolation,
//! a [`Populator`] decorates a column once its neighbours exist (and may write across borders).

use crate::common::world::{
	chunk::{Buffers, DelayedUpdate},
	ColumnCoord, Neighborhood,
};
use rand::rngs::StdRng;

mod flat;
pub use flat::*;

mod scatter;
pub use scatter::*;

pub trait Generator: Send + Sync {
	/// Fills the type/data arrays of a column for all heights,
	/// returning any block updates to schedule for it.
	fn generate(
		&self,
		coordinate: &ColumnCoord,
		buffers: &mut Buffers,
	) -> anyhow::Result<Vec<DelayedUpdate>>;
}

pub trait Populator: Send + Sync {
	/// Runs exactly once per column while it is `Populating`, with the column and its 8 neighbours locked.
	fn populate(&self, region: &mut Neighborhood, rng: &mut StdRng) -> anyhow::Result<()>;

	/// Runs exactly once per column when it first reaches `Loaded` in this process.
	fn load(&self, _region: &mut Neighborhood) -> anyhow::Result<()> {
		Ok(())
	}
}

/// A populator which leaves terrain untouched.
pub struct NoPopulator;

impl Populator for NoPopulator {
	fn populate(&self, _region: &mut Neighborhood, _rng: &mut StdRng) -> anyhow::Result<()> {
		Ok(())
	}
}

/// A stable per-column seed, so population is reproducible for a given world seed.
pub fn column_seed(seed: u64, coordinate: &ColumnCoord) -> u64 {
	let x = coordinate.x as u64;
	let y = coordinate.y as u64;
	seed ^ x.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ y.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}
