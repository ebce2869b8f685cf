use crate::{
	block::Block,
	common::world::{
		chunk::{Chunk, ChunkData},
		column_of, coordinate_order, local_of, BlockPoint, ColumnCoord, Error,
	},
};
use std::{collections::BTreeSet, sync::RwLockWriteGuard};

/// Write access to a column and the columns around it, for passes which may write across borders.
///
/// Locks are always taken in coordinate order, which every multi-chunk lock site shares,
/// so two neighbourhoods can never deadlock.
pub struct Neighborhood<'a> {
	center: ColumnCoord,
	center_index: usize,
	chunks: Vec<(ColumnCoord, RwLockWriteGuard<'a, ChunkData>)>,
	touched: BTreeSet<(i64, i64)>,
}

impl<'a> Neighborhood<'a> {
	pub fn lock<I>(center: ColumnCoord, chunks: I) -> Result<Self, Error>
	where
		I: IntoIterator<Item = &'a Chunk>,
	{
		let mut chunks = chunks.into_iter().collect::<Vec<_>>();
		chunks.sort_by(|a, b| coordinate_order(a.coordinate(), b.coordinate()));
		chunks.dedup_by(|a, b| a.coordinate() == b.coordinate());
		let center_index = chunks
			.iter()
			.position(|chunk| *chunk.coordinate() == center)
			.ok_or(Error::ChunkNotLoaded(center))?;
		let mut guards = Vec::with_capacity(chunks.len());
		for chunk in chunks {
			guards.push((*chunk.coordinate(), chunk.write()?));
		}
		Ok(Self {
			center,
			center_index,
			chunks: guards,
			touched: BTreeSet::new(),
		})
	}

	pub fn center(&self) -> &ColumnCoord {
		&self.center
	}

	pub fn center_mut(&mut self) -> &mut ChunkData {
		self.touched.insert((self.center.x, self.center.y));
		&mut *self.chunks[self.center_index].1
	}

	/// Direct access to one of the locked columns. Writes made this way are not tracked by [`touched`](Self::touched).
	pub fn chunk_mut(&mut self, column: &ColumnCoord) -> Option<&mut ChunkData> {
		self.chunks
			.iter_mut()
			.find(|(coordinate, _)| coordinate == column)
			.map(|(_, data)| &mut **data)
	}

	fn chunk(&self, column: &ColumnCoord) -> Option<&ChunkData> {
		self.chunks
			.iter()
			.find(|(coordinate, _)| coordinate == column)
			.map(|(_, data)| &**data)
	}

	/// Reads a world block; `None` when its column is not part of the neighbourhood or it is out of range.
	pub fn get(&self, point: &BlockPoint) -> Option<Block> {
		self.chunk(&column_of(point))?.block_at(&local_of(point)).ok()
	}

	/// Writes a world block into whichever locked column contains it.
	pub fn set(&mut self, point: &BlockPoint, block: Block) -> Result<Block, Error> {
		let column = column_of(point);
		let (_, data) = self
			.chunks
			.iter_mut()
			.find(|(coordinate, _)| *coordinate == column)
			.ok_or(Error::ChunkNotLoaded(column))?;
		let previous = data.set(&local_of(point), block)?;
		self.touched.insert((column.x, column.y));
		Ok(previous)
	}

	/// Columns written to through this neighbourhood, in coordinate order.
	pub fn touched(&self) -> Vec<ColumnCoord> {
		self.touched
			.iter()
			.map(|(x, y)| ColumnCoord::new(*x, *y))
			.collect()
	}
}

#[cfg(test)]
mod neighborhood {
	use super::*;
	use crate::common::world::neighbors;

	fn ring(center: ColumnCoord) -> Vec<Chunk> {
		std::iter::once(center)
			.chain(neighbors(&center))
			.map(|coordinate| Chunk::new(coordinate, 16))
			.collect()
	}

	#[test]
	fn writes_across_borders() {
		let center = ColumnCoord::new(0, 0);
		let chunks = ring(center);
		{
			let mut region = Neighborhood::lock(center, chunks.iter()).unwrap();
			region.set(&BlockPoint::new(-1, 16, 3), Block::new(2)).unwrap();
			region.set(&BlockPoint::new(4, 4, 3), Block::new(2)).unwrap();
			assert_eq!(region.get(&BlockPoint::new(-1, 16, 3)), Some(Block::new(2)));
			assert_eq!(
				region.touched(),
				vec![ColumnCoord::new(-1, 1), ColumnCoord::new(0, 0)]
			);
			assert!(matches!(
				region.set(&BlockPoint::new(40, 0, 0), Block::new(1)),
				Err(Error::ChunkNotLoaded(_))
			));
		}
		let corner = chunks
			.iter()
			.find(|chunk| *chunk.coordinate() == ColumnCoord::new(-1, 1))
			.unwrap();
		assert_eq!(corner.block_at(&BlockPoint::new(15, 0, 3)).unwrap(), Block::new(2));
	}

	#[test]
	fn center_is_required() {
		let chunks = vec![Chunk::new(ColumnCoord::new(1, 0), 16)];
		assert!(Neighborhood::lock(ColumnCoord::new(0, 0), chunks.iter()).is_err());
	}
}
