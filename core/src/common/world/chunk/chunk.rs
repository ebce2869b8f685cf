use super::{ChunkData, State};
use crate::{
	block::Block,
	common::world::{BlockPoint, ColumnCoord, Error},
};
use std::sync::{
	atomic::{AtomicU8, Ordering},
	RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// A column of voxel data addressed by its integer `(cx, cy)` coordinate.
///
/// The coordinate never changes for the lifetime of the chunk.
/// The lifecycle [`State`] is readable without taking the data lock,
/// so neighbours can be inspected while another thread holds the chunk for population.
pub struct Chunk {
	coordinate: ColumnCoord,
	state: AtomicU8,
	data: RwLock<ChunkData>,
}

impl std::fmt::Debug for Chunk {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(
			f,
			"Chunk(<{}, {}>, {:?})",
			self.coordinate.x,
			self.coordinate.y,
			self.state()
		)
	}
}

impl Chunk {
	pub fn new(coordinate: ColumnCoord, height: usize) -> Self {
		Self::from_data(coordinate, State::New, ChunkData::new(height))
	}

	/// Wraps existing data (generated, deserialized, or received from the network).
	pub fn from_data(coordinate: ColumnCoord, state: State, data: ChunkData) -> Self {
		Self {
			coordinate,
			state: AtomicU8::new(state as u8),
			data: RwLock::new(data),
		}
	}

	pub fn coordinate(&self) -> &ColumnCoord {
		&self.coordinate
	}

	pub fn state(&self) -> State {
		State::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(State::New)
	}

	/// Moves the chunk to `next`, returning the previous state.
	/// Fails without changing anything if the step is not one [`State::allows`].
	pub fn transition(&self, next: State) -> Result<State, Error> {
		let result = self
			.state
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
				let current = State::from_u8(raw).unwrap_or(State::New);
				current.allows(next).then(|| next as u8)
			});
		match result {
			Ok(raw) => Ok(State::from_u8(raw).unwrap_or(State::New)),
			Err(raw) => Err(Error::InvalidTransition(
				State::from_u8(raw).unwrap_or(State::New),
				next,
			)),
		}
	}

	/// Shared access for point reads (rendering, queries, serialization snapshots).
	pub fn read(&self) -> Result<RwLockReadGuard<'_, ChunkData>, Error> {
		self.data.read().map_err(|_| Error::LockPoisoned("chunk data"))
	}

	/// Exclusive access for bulk work (population, deserialization) and block changes.
	pub fn write(&self) -> Result<RwLockWriteGuard<'_, ChunkData>, Error> {
		self.data.write().map_err(|_| Error::LockPoisoned("chunk data"))
	}

	pub fn block_at(&self, local: &BlockPoint) -> Result<Block, Error> {
		self.read()?.block_at(local)
	}
}
