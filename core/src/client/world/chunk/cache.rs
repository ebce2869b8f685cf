use crate::{
	client::world::chunk::Chunk,
	common::world::{chunk::State, neighbors, ColumnCoord, Error},
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The fixed-size window of columns the client keeps around its viewer.
///
/// Slots are addressed by `coordinate mod size` on each axis, so moving the window
/// never moves a retained chunk: only the columns which scroll out are evicted.
pub struct Cache {
	ring: RwLock<Ring>,
}

struct Ring {
	radius: i64,
	size: i64,
	origin: ColumnCoord,
	slots: Vec<Option<Arc<Chunk>>>,
	len: usize,
}

impl Ring {
	fn in_window(&self, coordinate: &ColumnCoord) -> bool {
		(coordinate.x - self.origin.x).abs() <= self.radius
			&& (coordinate.y - self.origin.y).abs() <= self.radius
	}

	fn slot(&self, coordinate: &ColumnCoord) -> usize {
		(coordinate.x.rem_euclid(self.size) + coordinate.y.rem_euclid(self.size) * self.size) as usize
	}

	fn get(&self, coordinate: &ColumnCoord) -> Option<&Arc<Chunk>> {
		if !self.in_window(coordinate) {
			return None;
		}
		self.slots[self.slot(coordinate)]
			.as_ref()
			.filter(|chunk| chunk.coordinate() == coordinate)
	}
}

impl Cache {
	/// A window reaching `radius` columns out from `origin` on each axis.
	pub fn new(radius: usize, origin: ColumnCoord) -> Self {
		let size = radius as i64 * 2 + 1;
		Self {
			ring: RwLock::new(Ring {
				radius: radius as i64,
				size,
				origin,
				slots: vec![None; (size * size) as usize],
				len: 0,
			}),
		}
	}

	fn read(&self) -> RwLockReadGuard<'_, Ring> {
		self.ring.read().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, Ring> {
		self.ring.write().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn origin(&self) -> ColumnCoord {
		self.read().origin
	}

	pub fn radius(&self) -> usize {
		self.read().radius as usize
	}

	/// Number of slots, `(2r + 1)^2`.
	pub fn capacity(&self) -> usize {
		self.read().slots.len()
	}

	pub fn contains_coordinate(&self, coordinate: &ColumnCoord) -> bool {
		self.read().in_window(coordinate)
	}

	pub fn get(&self, coordinate: &ColumnCoord) -> Option<Arc<Chunk>> {
		self.read().get(coordinate).cloned()
	}

	/// Puts a chunk into its slot, returning whatever chunk of the same coordinate it replaced.
	pub fn put(&self, chunk: Arc<Chunk>) -> Result<Option<Arc<Chunk>>, Error> {
		let coordinate = *chunk.coordinate();
		let mut ring = self.write();
		if !ring.in_window(&coordinate) {
			return Err(Error::OutsideWindow(coordinate));
		}
		let slot = ring.slot(&coordinate);
		let previous = ring.slots[slot].replace(chunk);
		if previous.is_none() {
			ring.len += 1;
		}
		Ok(previous)
	}

	/// Puts a chunk only if its slot is empty. Returns false if another chunk holds it.
	pub fn put_if_absent(&self, chunk: Arc<Chunk>) -> Result<bool, Error> {
		let coordinate = *chunk.coordinate();
		let mut ring = self.write();
		if !ring.in_window(&coordinate) {
			return Err(Error::OutsideWindow(coordinate));
		}
		let slot = ring.slot(&coordinate);
		if ring.slots[slot].is_some() {
			return Ok(false);
		}
		ring.slots[slot] = Some(chunk);
		ring.len += 1;
		Ok(true)
	}

	/// Swaps `expected` for `replacement` if `expected` is still the chunk at its coordinate.
	pub fn replace(&self, expected: &Arc<Chunk>, replacement: Arc<Chunk>) -> bool {
		let mut ring = self.write();
		let coordinate = *expected.coordinate();
		if replacement.coordinate() != &coordinate {
			return false;
		}
		let current = matches!(ring.get(&coordinate), Some(chunk) if Arc::ptr_eq(chunk, expected));
		if current {
			let slot = ring.slot(&coordinate);
			ring.slots[slot] = Some(replacement);
		}
		current
	}

	pub fn remove(&self, coordinate: &ColumnCoord) -> Option<Arc<Chunk>> {
		let mut ring = self.write();
		ring.get(coordinate)?;
		let slot = ring.slot(coordinate);
		let removed = ring.slots[slot].take();
		if removed.is_some() {
			ring.len -= 1;
		}
		removed
	}

	/// Moves the window to `origin`. Every chunk which falls outside the new window
	/// is taken out of its slot and handed to `evict`, once. Returns how many were evicted.
	#[profiling::function]
	pub fn recenter<F: FnMut(Arc<Chunk>)>(&self, origin: ColumnCoord, mut evict: F) -> usize {
		let evicted = {
			let mut ring = self.write();
			if ring.origin == origin {
				return 0;
			}
			ring.origin = origin;
			let mut evicted = Vec::new();
			for index in 0..ring.slots.len() {
				let outside = match &ring.slots[index] {
					Some(chunk) => !ring.in_window(chunk.coordinate()),
					None => false,
				};
				if outside {
					if let Some(chunk) = ring.slots[index].take() {
						evicted.push(chunk);
					}
				}
			}
			ring.len -= evicted.len();
			evicted
		};
		let count = evicted.len();
		for chunk in evicted.into_iter() {
			evict(chunk);
		}
		count
	}

	pub fn len(&self) -> usize {
		self.read().len
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// A snapshot of every chunk in the window.
	pub fn chunks(&self) -> Vec<Arc<Chunk>> {
		self.read().slots.iter().flatten().cloned().collect()
	}

	pub fn for_each<F: FnMut(&Arc<Chunk>)>(&self, mut callback: F) {
		for chunk in self.chunks().iter() {
			callback(chunk);
		}
	}

	/// The lifecycle state of each surrounding column.
	/// Placeholders count as absent, since they hold no data yet.
	pub fn neighbor_states(&self, coordinate: &ColumnCoord) -> [Option<State>; 8] {
		let ring = self.read();
		neighbors(coordinate).map(|neighbor| {
			ring.get(&neighbor)
				.map(|chunk| chunk.state())
				.filter(State::is_populated)
		})
	}
}

#[cfg(test)]
mod cache {
	use super::*;
	use crate::common::world::chunk::ChunkData;
	use std::collections::HashSet;

	fn chunk(x: i64, y: i64) -> Arc<Chunk> {
		Arc::new(Chunk::received(ColumnCoord::new(x, y), ChunkData::new(16)))
	}

	fn fill(cache: &Cache) -> Vec<Arc<Chunk>> {
		let origin = cache.origin();
		let radius = cache.radius() as i64;
		let mut all = Vec::new();
		for y in -radius..=radius {
			for x in -radius..=radius {
				let chunk = chunk(origin.x + x, origin.y + y);
				cache.put(chunk.clone()).unwrap();
				all.push(chunk);
			}
		}
		all
	}

	#[test]
	fn put_outside_window_is_refused() {
		let cache = Cache::new(1, ColumnCoord::new(0, 0));
		assert!(matches!(
			cache.put(chunk(2, 0)),
			Err(Error::OutsideWindow(_))
		));
		assert!(cache.get(&ColumnCoord::new(2, 0)).is_none());
	}

	#[test]
	fn aliased_slot_does_not_answer_for_other_coordinates() {
		let cache = Cache::new(1, ColumnCoord::new(0, 0));
		cache.put(chunk(1, 0)).unwrap();
		// (-2, 0) shares a slot with (1, 0) but is outside the window
		assert!(cache.get(&ColumnCoord::new(-2, 0)).is_none());
	}

	#[test]
	fn recenter_evicts_exactly_what_leaves() {
		let cache = Cache::new(2, ColumnCoord::new(0, 0));
		let all = fill(&cache);
		assert_eq!(cache.len(), 25);

		let mut evicted = HashSet::new();
		let count = cache.recenter(ColumnCoord::new(1, -2), |chunk| {
			assert!(evicted.insert(*chunk.coordinate()), "evicted twice");
		});
		assert_eq!(count, evicted.len());

		for original in all.iter() {
			let coordinate = original.coordinate();
			let inside = (coordinate.x - 1).abs() <= 2 && (coordinate.y + 2).abs() <= 2;
			assert_eq!(evicted.contains(coordinate), !inside);
			match cache.get(coordinate) {
				Some(found) => {
					assert!(inside);
					assert!(Arc::ptr_eq(&found, original));
				}
				None => assert!(!inside),
			}
		}
		assert_eq!(cache.len(), 25 - evicted.len());
	}

	#[test]
	fn far_recenter_evicts_everything() {
		let cache = Cache::new(1, ColumnCoord::new(0, 0));
		fill(&cache);
		let mut count = 0;
		cache.recenter(ColumnCoord::new(100, 100), |_| count += 1);
		assert_eq!(count, 9);
		assert!(cache.is_empty());
		assert!(cache.chunks().is_empty());
	}

	#[test]
	fn insert_then_remove_empties() {
		let cache = Cache::new(2, ColumnCoord::new(-3, 4));
		let all = fill(&cache);
		for chunk in all.iter() {
			assert!(cache.remove(chunk.coordinate()).is_some());
		}
		assert!(cache.is_empty());
		assert!(cache.remove(&ColumnCoord::new(-3, 4)).is_none());
	}

	#[test]
	fn replace_checks_identity() {
		let cache = Cache::new(1, ColumnCoord::new(0, 0));
		let placeholder = Arc::new(Chunk::placeholder(ColumnCoord::new(0, 0)));
		assert!(cache.put_if_absent(placeholder.clone()).unwrap());
		assert!(!cache.put_if_absent(chunk(0, 0)).unwrap());
		let received = chunk(0, 0);
		assert!(cache.replace(&placeholder, received.clone()));
		assert!(!cache.replace(&placeholder, chunk(0, 0)));
		assert!(Arc::ptr_eq(&cache.get(&ColumnCoord::new(0, 0)).unwrap(), &received));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn placeholders_are_not_neighbors() {
		let cache = Cache::new(1, ColumnCoord::new(0, 0));
		cache.put(chunk(1, 0)).unwrap();
		cache
			.put(Arc::new(Chunk::placeholder(ColumnCoord::new(-1, 0))))
			.unwrap();
		let states = cache.neighbor_states(&ColumnCoord::new(0, 0));
		assert_eq!(states[4], Some(State::Populated));
		assert_eq!(states[3], None);
		assert_eq!(states.iter().filter(|s| s.is_some()).count(), 1);
	}
}
