use crate::{
	block::{Block, Lookup},
	client::world::{
		chunk::{self, requester, Cache},
		Settings,
	},
	common::{
		network::Packet,
		utility::ThreadHandle,
		world::{
			chunk::{SaveData, State},
			column_of, column_of_position, local_of, BlockPoint, ColumnCoord, Error,
			CHUNK_SIZE, SECTION_HEIGHT,
		},
	},
};
use crossbeam_channel::{Receiver, Sender};
use nalgebra::Point3;
use std::sync::{
	atomic::{AtomicU64, AtomicUsize, Ordering},
	Arc, Mutex, RwLock,
};

static LOG: &'static str = "client-terrain";

/// Upper bound on settle rounds; each round moves every chunk at most one state.
const MAX_SETTLE_ROUNDS: usize = 8;

/// Everything the requester thread shares with the façade.
pub(crate) struct Context {
	pub settings: Settings,
	pub cache: Cache,
	viewer: RwLock<Point3<f64>>,
	/// Requests sent and not yet answered, timed out, or dropped.
	outstanding: AtomicUsize,
	/// Bumped whenever the set of meshable chunks (or their contents) may have changed.
	generation: AtomicU64,
	pub outgoing: Sender<Packet>,
	pub cycle_lock: Mutex<()>,
	settle_lock: Mutex<()>,
}

impl Context {
	pub fn viewer_position(&self) -> Point3<f64> {
		*self.viewer.read().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn viewer_column(&self) -> ColumnCoord {
		column_of_position(&self.viewer_position())
	}

	pub fn outstanding(&self) -> usize {
		self.outstanding.load(Ordering::Acquire)
	}

	pub fn at_request_limit(&self) -> bool {
		self.outstanding() >= self.settings.max_outstanding_requests
	}

	pub fn acquire_request(&self) {
		self.outstanding.fetch_add(1, Ordering::AcqRel);
	}

	/// Clears a chunk's request flag, giving its slot back if this call was the one to clear it.
	pub fn release_request(&self, chunk: &chunk::Chunk) -> bool {
		if !chunk.clear_requested() {
			return false;
		}
		let _ = self
			.outstanding
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
				Some(count.saturating_sub(1))
			});
		true
	}

	pub fn bump_generation(&self) {
		self.generation.fetch_add(1, Ordering::AcqRel);
	}

	/// The single disposal of a chunk which left the cache.
	pub fn dispose(&self, chunk: &chunk::Chunk) {
		self.release_request(chunk);
		if !chunk.is_placeholder() {
			self.bump_generation();
		}
		log::trace!(target: LOG, "Dropped chunk {:?}", chunk.coordinate());
	}

	/// Applies [`State::settle`] to every received chunk until nothing changes.
	/// Returns the number of transitions made.
	#[profiling::function]
	pub fn settle(&self) -> usize {
		let _settle = self
			.settle_lock
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let chunks = self.cache.chunks();
		let mut transitions = 0;
		for _ in 0..MAX_SETTLE_ROUNDS {
			let mut changed = false;
			for chunk in chunks.iter() {
				let current = chunk.state();
				let next = current.settle(&self.cache.neighbor_states(chunk.coordinate()));
				if next == current {
					continue;
				}
				if let Err(err) = chunk.transition(next) {
					log::debug!(target: LOG, "{}", err);
					continue;
				}
				log::trace!(
					target: LOG,
					"Chunk {:?} {} -> {}",
					chunk.coordinate(),
					current,
					next
				);
				transitions += 1;
				changed = true;
			}
			if !changed {
				break;
			}
		}
		if transitions > 0 {
			self.bump_generation();
		}
		transitions
	}
}

/// Counts of what the client terrain currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
	/// Chunks with data.
	pub resident: usize,
	/// Columns waiting on the server.
	pub placeholders: usize,
	/// Indexed by `State as usize`.
	pub by_state: [usize; 7],
	pub outstanding: usize,
	pub generation: u64,
}

impl Stats {
	pub fn in_state(&self, state: State) -> usize {
		self.by_state[state as usize]
	}
}

/// [CLIENT ONLY] The façade rendering and network code talk to.
///
/// Keeps a window of chunks around the viewer, feeds chunk requests to the network,
/// and applies whatever the server sends back.
pub struct Terrain {
	context: Arc<Context>,
	lookup: Arc<Lookup>,
	recv_outgoing: Receiver<Packet>,
	requester_waker: Sender<()>,
	requester_wake: Receiver<()>,
	thread: Mutex<Option<ThreadHandle>>,
}

impl Terrain {
	pub fn new(settings: Settings, lookup: Arc<Lookup>, position: Point3<f64>) -> Self {
		let (outgoing, recv_outgoing) = crossbeam_channel::unbounded();
		let (requester_waker, requester_wake) = crossbeam_channel::bounded(1);
		let cache = Cache::new(settings.window_radius(), column_of_position(&position));
		Self {
			context: Arc::new(Context {
				settings,
				cache,
				viewer: RwLock::new(position),
				outstanding: AtomicUsize::new(0),
				generation: AtomicU64::new(0),
				outgoing,
				cycle_lock: Mutex::new(()),
				settle_lock: Mutex::new(()),
			}),
			lookup,
			recv_outgoing,
			requester_waker,
			requester_wake,
			thread: Mutex::new(None),
		}
	}

	pub fn settings(&self) -> &Settings {
		&self.context.settings
	}

	pub fn lookup(&self) -> &Arc<Lookup> {
		&self.lookup
	}

	pub fn cache(&self) -> &Cache {
		&self.context.cache
	}

	pub fn viewer_position(&self) -> Point3<f64> {
		self.context.viewer_position()
	}

	/// Changes whenever chunks become (or stop being) meshable, or their contents change.
	pub fn generation(&self) -> u64 {
		self.context.generation.load(Ordering::Acquire)
	}

	/// Spawns the requester thread.
	pub fn start(&self) -> anyhow::Result<()> {
		let mut thread = self
			.thread
			.lock()
			.map_err(|_| Error::LockPoisoned("requester thread"))?;
		if thread.is_some() {
			return Ok(());
		}
		*thread = Some(requester::start(
			self.context.clone(),
			self.requester_wake.clone(),
			self.requester_waker.clone(),
		)?);
		Ok(())
	}

	/// Runs one requester cycle on the calling thread.
	pub fn run_cycle(&self) -> requester::Report {
		requester::run_cycle(&self.context)
	}

	fn wake_requester(&self) {
		let _ = self.requester_waker.try_send(());
	}

	/// Requests which are ready to go to the server.
	pub fn drain_requests(&self) -> Vec<Packet> {
		self.recv_outgoing.try_iter().collect()
	}

	/// Moves the viewer, sliding the chunk window along with it.
	/// Every chunk which falls out of the window is dropped here, exactly once.
	#[profiling::function]
	pub fn move_viewer(&self, position: Point3<f64>) {
		if let Ok(mut viewer) = self.context.viewer.write() {
			*viewer = position;
		}
		let origin = column_of_position(&position);
		let context = &self.context;
		let evicted = context.cache.recenter(origin, |chunk| context.dispose(&chunk));
		if evicted > 0 {
			log::debug!(target: LOG, "Recentered on {:?}, evicted {} chunks", origin, evicted);
			context.settle();
		}
		self.wake_requester();
	}

	pub fn get_block(&self, point: &BlockPoint) -> Option<Block> {
		let chunk = self.context.cache.get(&column_of(point))?;
		match chunk.is_placeholder() {
			true => None,
			false => chunk.block_at(&local_of(point)).ok(),
		}
	}

	/// Applies one packet from the server.
	#[profiling::function]
	pub fn receive(&self, packet: Packet) -> Result<(), Error> {
		match packet {
			Packet::SendChunk { x, y, data } => self.receive_chunk(ColumnCoord::new(x, y), &data)?,
			Packet::RequestChunk { x, y } => self.receive_refusal(ColumnCoord::new(x, y)),
			Packet::BlockChange { x, y, z, id, data } => {
				self.receive_block(BlockPoint::new(x, y, z), Block::with_data(id, data))?
			}
			Packet::BlockChangeAir { x, y, z } => {
				self.receive_block(BlockPoint::new(x, y, z), Block::AIR)?
			}
		}
		Ok(())
	}

	fn receive_chunk(&self, column: ColumnCoord, bytes: &[u8]) -> Result<(), Error> {
		let save = match SaveData::decode(bytes) {
			Ok(save) if save.coordinate == column => save,
			Ok(save) => {
				log::warn!(
					target: LOG,
					"Chunk data for {:?} was labeled {:?}, dropping it",
					save.coordinate,
					column
				);
				return Ok(());
			}
			Err(err) => {
				log::warn!(target: LOG, "Malformed chunk data for {:?}: {}", column, err);
				return Ok(());
			}
		};
		let (data, _updates) = match save.into_data() {
			Ok(parts) => parts,
			Err(err) => {
				log::warn!(target: LOG, "Malformed chunk data for {:?}: {}", column, err);
				return Ok(());
			}
		};

		let context = &self.context;
		match context.cache.get(&column) {
			Some(existing) if !existing.is_placeholder() => {
				log::warn!(target: LOG, "Received chunk {:?} twice, overwriting", column);
				*existing.write()? = data;
				existing.render()?.mark_all_dirty();
				self.mark_neighbors_dirty(&column);
			}
			Some(placeholder) => {
				context.release_request(&placeholder);
				let received = Arc::new(chunk::Chunk::received(column, data));
				if !context.cache.replace(&placeholder, received) {
					log::debug!(target: LOG, "Placeholder for {:?} changed while receiving", column);
					return Ok(());
				}
				log::trace!(target: LOG, "Received chunk {:?}", column);
			}
			None if context.cache.contains_coordinate(&column) => {
				context
					.cache
					.put(Arc::new(chunk::Chunk::received(column, data)))?;
			}
			None => {
				log::debug!(target: LOG, "Dropping chunk {:?} outside of the window", column);
				return Ok(());
			}
		}
		context.bump_generation();
		context.settle();
		Ok(())
	}

	fn receive_refusal(&self, column: ColumnCoord) {
		if let Some(chunk) = self.context.cache.get(&column) {
			if chunk.is_placeholder() && self.context.release_request(&chunk) {
				log::debug!(target: LOG, "Server does not have {:?} yet", column);
				self.wake_requester();
			}
		}
	}

	fn receive_block(&self, point: BlockPoint, block: Block) -> Result<(), Error> {
		let column = column_of(&point);
		let chunk = match self.context.cache.get(&column) {
			Some(chunk) if !chunk.is_placeholder() => chunk,
			_ => {
				log::debug!(target: LOG, "Ignoring block change at {:?}, chunk not loaded", point);
				return Ok(());
			}
		};
		let local = local_of(&point);
		let previous = match chunk.write()?.set(&local, block) {
			Ok(previous) => previous,
			Err(err) => {
				log::warn!(target: LOG, "Dropping block change: {}", err);
				return Ok(());
			}
		};
		if previous == block {
			return Ok(());
		}

		let section = local.z as usize / SECTION_HEIGHT;
		let within = local.z as usize % SECTION_HEIGHT;
		{
			let mut render = chunk.render()?;
			render.mark_dirty(section);
			if within == 0 && section > 0 {
				render.mark_dirty(section - 1);
			}
			if within == SECTION_HEIGHT - 1 {
				render.mark_dirty(section + 1);
			}
		}
		let edge = CHUNK_SIZE as i64 - 1;
		let mut bordering = Vec::new();
		if local.x == 0 {
			bordering.push((-1, 0));
		}
		if local.x == edge {
			bordering.push((1, 0));
		}
		if local.y == 0 {
			bordering.push((0, -1));
		}
		if local.y == edge {
			bordering.push((0, 1));
		}
		for (dx, dy) in bordering {
			let neighbor = ColumnCoord::new(column.x + dx, column.y + dy);
			if let Some(neighbor) = self.context.cache.get(&neighbor) {
				if !neighbor.is_placeholder() {
					neighbor.render()?.mark_dirty(section);
				}
			}
		}
		log::trace!(target: LOG, "{:?} {} -> {}", point, previous, block);
		Ok(())
	}

	fn mark_neighbors_dirty(&self, column: &ColumnCoord) {
		for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
			let neighbor = ColumnCoord::new(column.x + dx, column.y + dy);
			if let Some(chunk) = self.context.cache.get(&neighbor) {
				if let Ok(mut render) = chunk.render() {
					render.mark_all_dirty();
				};
			}
		}
	}

	pub fn stats(&self) -> Stats {
		let mut stats = Stats {
			outstanding: self.context.outstanding(),
			generation: self.generation(),
			..Default::default()
		};
		self.context.cache.for_each(|chunk| {
			match chunk.is_placeholder() {
				true => stats.placeholders += 1,
				false => stats.resident += 1,
			}
			stats.by_state[chunk.state() as usize] += 1;
		});
		stats
	}

	/// Stops the requester thread. Returns false if it did not stop within the join timeout.
	pub fn shutdown(&self) -> bool {
		let thread = self.thread.lock().ok().and_then(|mut thread| thread.take());
		match thread {
			Some(mut thread) => {
				log::info!(target: LOG, "Stopping client terrain");
				thread.stop()
			}
			None => true,
		}
	}
}

impl Drop for Terrain {
	fn drop(&mut self) {
		self.shutdown();
	}
}

#[cfg(test)]
mod terrain {
	use super::*;
	use crate::common::world::chunk::ChunkData;

	fn settings(view_radius: u64, max_outstanding_requests: usize) -> Settings {
		Settings {
			view_radius,
			max_outstanding_requests,
			mesh_workers: 0,
			..Default::default()
		}
	}

	fn terrain(settings: Settings) -> Terrain {
		Terrain::new(settings, Arc::new(Lookup::classic()), Point3::new(8.0, 8.0, 8.0))
	}

	fn send_chunk(column: ColumnCoord) -> Packet {
		let mut data = ChunkData::new(16);
		data.set(&BlockPoint::new(0, 0, 0), Block::new(1)).unwrap();
		let save = SaveData::new(column, State::Sendable, &data, Vec::new());
		Packet::SendChunk {
			x: column.x,
			y: column.y,
			data: save.encode().unwrap(),
		}
	}

	#[test]
	fn requests_nearest_first_within_limit() {
		let terrain = terrain(settings(2, 3));
		let report = terrain.run_cycle();
		assert_eq!(report.created, 21);
		assert_eq!(report.requested, 3);
		let requests = terrain.drain_requests();
		assert_eq!(requests[0], Packet::request(&ColumnCoord::new(0, 0)));
		assert_eq!(terrain.stats().outstanding, 3);

		// nothing more goes out until something is answered
		assert_eq!(terrain.run_cycle().requested, 0);
	}

	#[test]
	fn refusal_frees_slot_for_retry() {
		let terrain = terrain(settings(2, 3));
		terrain.run_cycle();
		terrain.drain_requests();
		terrain
			.receive(Packet::request(&ColumnCoord::new(0, 0)))
			.unwrap();
		assert_eq!(terrain.stats().outstanding, 2);
		// a duplicate refusal does not free a second slot
		terrain
			.receive(Packet::request(&ColumnCoord::new(0, 0)))
			.unwrap();
		assert_eq!(terrain.stats().outstanding, 2);

		assert_eq!(terrain.run_cycle().requested, 1);
		assert_eq!(
			terrain.drain_requests(),
			vec![Packet::request(&ColumnCoord::new(0, 0))]
		);
		let chunk = terrain.cache().get(&ColumnCoord::new(0, 0)).unwrap();
		assert_eq!(chunk.attempts(), 2);
	}

	#[test]
	fn received_chunk_replaces_placeholder() {
		let terrain = terrain(settings(2, 3));
		terrain.run_cycle();
		let column = ColumnCoord::new(0, 0);
		let placeholder = terrain.cache().get(&column).unwrap();
		terrain.receive(send_chunk(column)).unwrap();

		let received = terrain.cache().get(&column).unwrap();
		assert!(!Arc::ptr_eq(&placeholder, &received));
		assert_eq!(received.state(), State::Populated);
		assert_eq!(
			terrain.get_block(&BlockPoint::new(0, 0, 0)),
			Some(Block::new(1))
		);
		let stats = terrain.stats();
		assert_eq!(stats.outstanding, 2);
		assert_eq!(stats.resident, 1);
		assert_eq!(stats.placeholders, 20);
	}

	#[test]
	fn duplicate_chunk_overwrites() {
		let terrain = terrain(settings(2, 3));
		terrain.run_cycle();
		let column = ColumnCoord::new(0, 0);
		terrain.receive(send_chunk(column)).unwrap();
		let first = terrain.cache().get(&column).unwrap();
		terrain
			.receive(Packet::BlockChangeAir { x: 0, y: 0, z: 0 })
			.unwrap();
		assert_eq!(terrain.get_block(&BlockPoint::new(0, 0, 0)), Some(Block::AIR));

		terrain.receive(send_chunk(column)).unwrap();
		let second = terrain.cache().get(&column).unwrap();
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(
			terrain.get_block(&BlockPoint::new(0, 0, 0)),
			Some(Block::new(1))
		);
	}

	#[test]
	fn timed_out_requests_are_reissued() {
		let mut settings = settings(1, 2);
		settings.request_timeout_ms = 0;
		let terrain = terrain(settings);
		assert_eq!(terrain.run_cycle().requested, 2);
		let report = terrain.run_cycle();
		assert_eq!(report.expired, 2);
		assert_eq!(report.requested, 2);
		assert_eq!(terrain.stats().outstanding, 2);
	}

	#[test]
	fn moving_away_releases_everything() {
		let terrain = terrain(settings(2, 4));
		terrain.run_cycle();
		terrain.receive(send_chunk(ColumnCoord::new(1, 0))).unwrap();
		let generation = terrain.generation();
		terrain.move_viewer(Point3::new(1000.0, 1000.0, 8.0));
		let stats = terrain.stats();
		assert_eq!(stats.outstanding, 0);
		assert_eq!(stats.resident, 0);
		assert_eq!(stats.placeholders, 0);
		assert!(terrain.generation() > generation);
	}

	#[test]
	fn stale_chunks_are_removed() {
		let terrain = terrain(settings(2, 0));
		terrain.run_cycle();
		// one column east: the western edge leaves the area but stays inside the window
		terrain.move_viewer(Point3::new(24.0, 8.0, 8.0));
		let report = terrain.run_cycle();
		assert!(report.removed > 0);
		assert!(terrain.cache().get(&ColumnCoord::new(-2, 0)).is_none());
		assert!(terrain.cache().get(&ColumnCoord::new(3, 0)).is_some());
	}

	#[test]
	fn neighbors_arriving_settle_the_center() {
		let terrain = terrain(settings(2, 0));
		terrain.run_cycle();
		for y in -2..=2i64 {
			for x in -2..=2i64 {
				if x * x + y * y <= 6 {
					terrain.receive(send_chunk(ColumnCoord::new(x, y))).unwrap();
				}
			}
		}
		let center = terrain.cache().get(&ColumnCoord::new(0, 0)).unwrap();
		assert_eq!(center.state(), State::Loaded);
		let corner = terrain.cache().get(&ColumnCoord::new(1, 1)).unwrap();
		assert_eq!(corner.state(), State::Populated);

		// losing a neighbour drops the center back to border
		terrain.cache().remove(&ColumnCoord::new(1, 0));
		terrain.context.settle();
		assert_eq!(center.state(), State::Border);
	}

	#[test]
	fn block_change_dirties_bordering_sections() {
		let terrain = terrain(settings(2, 0));
		terrain.run_cycle();
		terrain.receive(send_chunk(ColumnCoord::new(0, 0))).unwrap();
		terrain.receive(send_chunk(ColumnCoord::new(-1, 0))).unwrap();
		let center = terrain.cache().get(&ColumnCoord::new(0, 0)).unwrap();
		let west = terrain.cache().get(&ColumnCoord::new(-1, 0)).unwrap();
		fn version(chunk: &chunk::Chunk) -> u64 {
			chunk.render().unwrap().section(0).unwrap().version
		}
		let (center_before, west_before) = (version(&center), version(&west));

		terrain
			.receive(Packet::block_change(&BlockPoint::new(0, 5, 3), Block::new(2)))
			.unwrap();
		assert_eq!(version(&center), center_before + 1);
		assert_eq!(version(&west), west_before + 1);

		// setting the same block again changes nothing
		terrain
			.receive(Packet::block_change(&BlockPoint::new(0, 5, 3), Block::new(2)))
			.unwrap();
		assert_eq!(version(&center), center_before + 1);
	}
}
