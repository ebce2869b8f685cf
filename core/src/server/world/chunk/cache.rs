use crate::{
	common::world::{chunk::State, neighbors, ColumnCoord, Error},
	server::world::chunk::Chunk,
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
	sync::{Arc, RwLock},
	time::Instant,
};

/// A storage bin for all the chunks which are loaded on the server.
///
/// Unbounded; chunks leave only when the loading thread unloads them.
/// The most recently looked-up chunk is remembered so that the common case
/// (many queries against the same column) skips the map entirely.
pub struct Cache {
	chunks: DashMap<ColumnCoord, Arc<Chunk>>,
	last: RwLock<Option<Arc<Chunk>>>,
	epoch: Instant,
}

impl Default for Cache {
	fn default() -> Self {
		Self {
			chunks: DashMap::new(),
			last: RwLock::new(None),
			epoch: Instant::now(),
		}
	}
}

impl Cache {
	/// Milliseconds since the cache was created; the clock `last_access` is measured in.
	pub fn now_ms(&self) -> u64 {
		self.epoch.elapsed().as_millis() as u64
	}

	/// Adds a chunk. A coordinate maps to at most one live chunk,
	/// so inserting over an existing one is refused.
	pub fn insert(&self, chunk: Arc<Chunk>) -> Result<(), Error> {
		let coordinate = *chunk.coordinate();
		chunk.touch(self.now_ms());
		match self.chunks.entry(coordinate) {
			Entry::Occupied(_) => Err(Error::DuplicateChunk(coordinate)),
			Entry::Vacant(entry) => {
				entry.insert(chunk);
				Ok(())
			}
		}
	}

	pub fn remove(&self, coordinate: &ColumnCoord) -> Option<Arc<Chunk>> {
		// Holding the `last` lock while removing keeps `get` from re-caching the chunk being removed.
		let mut last = self.last.write().unwrap_or_else(|poisoned| poisoned.into_inner());
		if matches!(&*last, Some(chunk) if chunk.coordinate() == coordinate) {
			*last = None;
		}
		self.chunks.remove(coordinate).map(|(_, chunk)| chunk)
	}

	/// Finds a chunk and marks it as accessed.
	pub fn get(&self, coordinate: &ColumnCoord) -> Option<Arc<Chunk>> {
		let now = self.now_ms();
		if let Ok(last) = self.last.read() {
			if let Some(chunk) = &*last {
				if chunk.coordinate() == coordinate {
					chunk.touch(now);
					return Some(chunk.clone());
				}
			}
		}
		let chunk = self.peek(coordinate)?;
		chunk.touch(now);
		if let Ok(mut last) = self.last.try_write() {
			let still_resident = self
				.chunks
				.get(coordinate)
				.map(|entry| Arc::ptr_eq(entry.value(), &chunk))
				.unwrap_or(false);
			if still_resident {
				*last = Some(chunk.clone());
			}
		}
		Some(chunk)
	}

	/// Finds a chunk without counting it as an access.
	pub fn peek(&self, coordinate: &ColumnCoord) -> Option<Arc<Chunk>> {
		self.chunks.get(coordinate).map(|entry| entry.value().clone())
	}

	pub fn contains(&self, coordinate: &ColumnCoord) -> bool {
		self.chunks.contains_key(coordinate)
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	/// A snapshot of every resident chunk.
	pub fn chunks(&self) -> Vec<Arc<Chunk>> {
		self.chunks.iter().map(|entry| entry.value().clone()).collect()
	}

	pub fn for_each<F: FnMut(&Arc<Chunk>)>(&self, mut callback: F) {
		for entry in self.chunks.iter() {
			callback(entry.value());
		}
	}

	/// The lifecycle state of each of the 8 surrounding columns, `None` where a column is absent.
	pub fn neighbor_states(&self, coordinate: &ColumnCoord) -> [Option<State>; 8] {
		neighbors(coordinate).map(|neighbor| self.chunks.get(&neighbor).map(|entry| entry.state()))
	}
}
