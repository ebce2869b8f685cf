use crate::{
	common::world::{
		chunk::{Chunk as CommonChunk, ChunkData, State},
		ColumnCoord, Error,
	},
	graphics::voxel::RenderChunk,
};
use std::{
	sync::{
		atomic::{AtomicBool, AtomicU32, Ordering},
		Mutex, MutexGuard,
	},
	time::{Duration, Instant},
};

/// A column as the client sees it.
///
/// Either a placeholder (state `New`, no data yet, possibly requested from the server)
/// or a received chunk, which arrives already populated and carries its render state.
pub struct Chunk {
	pub chunk: CommonChunk,
	requested: AtomicBool,
	requested_at: Mutex<Option<Instant>>,
	/// How many times this column has been asked for.
	attempts: AtomicU32,
	render: Mutex<RenderChunk>,
}

impl std::ops::Deref for Chunk {
	type Target = CommonChunk;
	fn deref(&self) -> &Self::Target {
		&self.chunk
	}
}

impl std::fmt::Debug for Chunk {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Client{:?}", self.chunk)
	}
}

impl Chunk {
	/// A column we know we need but have no data for.
	pub fn placeholder(coordinate: ColumnCoord) -> Self {
		Self {
			chunk: CommonChunk::new(coordinate, 0),
			requested: AtomicBool::new(false),
			requested_at: Mutex::new(None),
			attempts: AtomicU32::new(0),
			render: Mutex::new(RenderChunk::default()),
		}
	}

	/// A column whose data came from the server.
	pub fn received(coordinate: ColumnCoord, data: ChunkData) -> Self {
		let section_count = data.section_count();
		Self {
			chunk: CommonChunk::from_data(coordinate, State::Populated, data),
			requested: AtomicBool::new(false),
			requested_at: Mutex::new(None),
			attempts: AtomicU32::new(0),
			render: Mutex::new(RenderChunk::new(section_count)),
		}
	}

	pub fn is_placeholder(&self) -> bool {
		!self.state().is_populated()
	}

	pub fn is_requested(&self) -> bool {
		self.requested.load(Ordering::Acquire)
	}

	/// Flags the column as asked for. Returns false if it already was.
	pub(crate) fn mark_requested(&self, now: Instant) -> bool {
		if self
			.requested
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}
		self.attempts.fetch_add(1, Ordering::Relaxed);
		if let Ok(mut requested_at) = self.requested_at.lock() {
			*requested_at = Some(now);
		}
		true
	}

	/// Clears the request flag. Returns true only for the call which actually cleared it,
	/// which is the one allowed to release the outstanding-request slot.
	pub(crate) fn clear_requested(&self) -> bool {
		self.requested
			.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	/// True when the request has gone unanswered for longer than `timeout`.
	pub(crate) fn request_expired(&self, now: Instant, timeout: Duration) -> bool {
		if !self.is_requested() {
			return false;
		}
		match self.requested_at.lock() {
			Ok(requested_at) => requested_at
				.map(|at| now.saturating_duration_since(at) >= timeout)
				.unwrap_or(false),
			Err(_) => false,
		}
	}

	pub fn attempts(&self) -> u32 {
		self.attempts.load(Ordering::Relaxed)
	}

	pub fn render(&self) -> Result<MutexGuard<'_, RenderChunk>, Error> {
		self.render
			.lock()
			.map_err(|_| Error::LockPoisoned("render chunk"))
	}
}

#[cfg(test)]
mod client_chunk {
	use super::*;

	#[test]
	fn placeholder_is_new() {
		let chunk = Chunk::placeholder(ColumnCoord::new(1, 1));
		assert!(chunk.is_placeholder());
		assert_eq!(chunk.state(), State::New);
		assert_eq!(chunk.render().unwrap().section_count(), 0);
	}

	#[test]
	fn received_is_populated() {
		let chunk = Chunk::received(ColumnCoord::new(1, 1), ChunkData::new(32));
		assert!(!chunk.is_placeholder());
		assert_eq!(chunk.state(), State::Populated);
		assert_eq!(chunk.render().unwrap().section_count(), 2);
	}

	#[test]
	fn request_flag_releases_once() {
		let chunk = Chunk::placeholder(ColumnCoord::new(0, 0));
		let now = Instant::now();
		assert!(chunk.mark_requested(now));
		assert!(!chunk.mark_requested(now));
		assert_eq!(chunk.attempts(), 1);
		assert!(chunk.clear_requested());
		assert!(!chunk.clear_requested());
		assert!(chunk.mark_requested(now));
		assert_eq!(chunk.attempts(), 2);
	}

	#[test]
	fn request_expires() {
		let chunk = Chunk::placeholder(ColumnCoord::new(0, 0));
		let start = Instant::now();
		let timeout = Duration::from_millis(100);
		assert!(!chunk.request_expired(start, timeout));
		chunk.mark_requested(start);
		assert!(!chunk.request_expired(start + Duration::from_millis(50), timeout));
		assert!(chunk.request_expired(start + Duration::from_millis(100), timeout));
	}
}
