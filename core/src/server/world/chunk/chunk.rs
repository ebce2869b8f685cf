use crate::common::world::{
	chunk::{Chunk as CommonChunk, ChunkData, DelayedUpdate, SaveData, State},
	ColumnCoord, Error,
};
use std::sync::{
	atomic::{AtomicBool, AtomicU64, Ordering},
	Mutex, MutexGuard,
};

/// A column resident on the server.
///
/// Holds the shared chunk record plus the server-only bookkeeping:
/// scheduled block updates and the last time anything asked for the chunk.
pub struct Chunk {
	pub chunk: CommonChunk,
	updates: Mutex<Vec<DelayedUpdate>>,
	/// Milliseconds since the owning cache was created. Not saved to file.
	last_access: AtomicU64,
	/// True once the populator's load hook ran for this chunk in this process.
	loaded_hooks: AtomicBool,
}

impl std::ops::Deref for Chunk {
	type Target = CommonChunk;
	fn deref(&self) -> &Self::Target {
		&self.chunk
	}
}

impl std::fmt::Debug for Chunk {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Server{:?}", self.chunk)
	}
}

impl Chunk {
	pub fn new(coordinate: ColumnCoord, data: ChunkData, updates: Vec<DelayedUpdate>) -> Self {
		Self::with_state(coordinate, State::New, data, updates)
	}

	fn with_state(
		coordinate: ColumnCoord,
		state: State,
		data: ChunkData,
		updates: Vec<DelayedUpdate>,
	) -> Self {
		Self {
			chunk: CommonChunk::from_data(coordinate, state, data),
			updates: Mutex::new(updates),
			last_access: AtomicU64::new(0),
			loaded_hooks: AtomicBool::new(false),
		}
	}

	/// Restores a chunk from its persisted form.
	pub fn from_save(save: SaveData) -> Result<Self, Error> {
		let coordinate = save.coordinate;
		let state = save.state();
		let (data, updates) = save.into_data()?;
		Ok(Self::with_state(coordinate, state, data, updates))
	}

	/// Snapshots the chunk (under its read lock) into its persisted form.
	#[profiling::function]
	pub fn to_save_data(&self) -> Result<SaveData, Error> {
		let updates = self.updates()?.clone();
		let data = self.chunk.read()?;
		Ok(SaveData::new(*self.coordinate(), self.state(), &data, updates))
	}

	pub fn updates(&self) -> Result<MutexGuard<'_, Vec<DelayedUpdate>>, Error> {
		self.updates
			.lock()
			.map_err(|_| Error::LockPoisoned("delayed updates"))
	}

	pub(crate) fn touch(&self, now_ms: u64) {
		self.last_access.fetch_max(now_ms, Ordering::Relaxed);
	}

	pub fn last_access(&self) -> u64 {
		self.last_access.load(Ordering::Relaxed)
	}

	/// Returns true exactly once: the first time it is called for this chunk.
	pub(crate) fn claim_loaded_hooks(&self) -> bool {
		!self.loaded_hooks.swap(true, Ordering::AcqRel)
	}
}

#[cfg(test)]
mod server_chunk {
	use super::*;
	use crate::{block::Block, common::world::BlockPoint};

	#[test]
	fn save_keeps_updates_and_state() {
		let chunk = Chunk::new(
			ColumnCoord::new(1, 2),
			ChunkData::new(16),
			vec![DelayedUpdate::new(BlockPoint::new(17, 33, 1), 5, 1)],
		);
		chunk
			.write()
			.unwrap()
			.set(&BlockPoint::new(1, 1, 1), Block::new(2))
			.unwrap();
		for state in [State::ShouldPopulate, State::Populating, State::Populated] {
			chunk.transition(state).unwrap();
		}

		let restored = Chunk::from_save(chunk.to_save_data().unwrap()).unwrap();
		assert_eq!(restored.state(), State::Populated);
		assert_eq!(restored.coordinate(), &ColumnCoord::new(1, 2));
		assert_eq!(*restored.updates().unwrap(), *chunk.updates().unwrap());
		assert_eq!(
			restored.block_at(&BlockPoint::new(1, 1, 1)).unwrap(),
			Block::new(2)
		);
	}

	#[test]
	fn loaded_hooks_claimed_once() {
		let chunk = Chunk::new(ColumnCoord::new(0, 0), ChunkData::new(16), vec![]);
		assert!(chunk.claim_loaded_hooks());
		assert!(!chunk.claim_loaded_hooks());
	}

	#[test]
	fn touch_only_moves_forward() {
		let chunk = Chunk::new(ColumnCoord::new(0, 0), ChunkData::new(16), vec![]);
		chunk.touch(50);
		chunk.touch(20);
		assert_eq!(chunk.last_access(), 50);
	}
}
