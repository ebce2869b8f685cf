use crate::{
	block::{Block, Lookup},
	common::{
		network::Packet,
		utility::ThreadHandle,
		world::{
			chunk::{DelayedUpdate, Entity, EntityId, SaveData, State},
			column_of, column_of_position, coordinate_order, local_of,
			generator::{Generator, Populator},
			BlockPoint, ColumnCoord, Error,
		},
	},
	server::world::{
		chunk::{
			self,
			thread::{self, Report},
			updater::{self, BlockChange, BlockCommand},
			Cache,
		},
		storage::ChunkStore,
		Settings, Viewer, ViewerId, Viewers,
	},
};
use crossbeam_channel::{Receiver, Sender};
use nalgebra::Point3;
use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex,
};

static LOG: &'static str = "server-terrain";

/// Everything the background threads share with the façade.
pub(crate) struct Context {
	pub settings: Settings,
	pub lookup: Arc<Lookup>,
	pub cache: Cache,
	pub store: Box<dyn ChunkStore>,
	pub generator: Box<dyn Generator>,
	pub populator: Box<dyn Populator>,
	pub viewers: Viewers,
	/// Serializes loading passes, whether run by the thread or called directly.
	pub pass_lock: Mutex<()>,
	/// Set while [`Terrain::tick`] walks the delayed updates.
	pub ticking: AtomicBool,
}

/// Counts of what the server terrain currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
	pub resident: usize,
	/// Indexed by `State as usize`.
	pub by_state: [usize; 7],
	pub viewers: usize,
	pub pending_commands: usize,
	pub scheduled_updates: usize,
}

impl Stats {
	pub fn in_state(&self, state: State) -> usize {
		self.by_state[state as usize]
	}
}

/// [SERVER ONLY] The façade simulation code talks to.
///
/// Owns the chunk cache and, once [`started`](Terrain::start), the loading and updater threads.
/// Nothing here blocks on generation or persistence; that all happens on the loading thread.
pub struct Terrain {
	context: Arc<Context>,
	send_commands: Sender<BlockCommand>,
	recv_commands: Receiver<BlockCommand>,
	send_changes: Sender<BlockChange>,
	recv_changes: Receiver<BlockChange>,
	loader_waker: Sender<()>,
	loader_wake: Receiver<()>,
	threads: Mutex<Vec<ThreadHandle>>,
}

impl Terrain {
	pub fn new(
		settings: Settings,
		lookup: Arc<Lookup>,
		store: Box<dyn ChunkStore>,
		generator: Box<dyn Generator>,
		populator: Box<dyn Populator>,
	) -> Self {
		let (send_commands, recv_commands) = crossbeam_channel::unbounded();
		let (send_changes, recv_changes) = crossbeam_channel::unbounded();
		let (loader_waker, loader_wake) = crossbeam_channel::bounded(1);
		Self {
			context: Arc::new(Context {
				settings,
				lookup,
				cache: Cache::default(),
				store,
				generator,
				populator,
				viewers: Viewers::default(),
				pass_lock: Mutex::new(()),
				ticking: AtomicBool::new(false),
			}),
			send_commands,
			recv_commands,
			send_changes,
			recv_changes,
			loader_waker,
			loader_wake,
			threads: Mutex::new(Vec::new()),
		}
	}

	pub fn settings(&self) -> &Settings {
		&self.context.settings
	}

	pub fn lookup(&self) -> &Arc<Lookup> {
		&self.context.lookup
	}

	pub fn cache(&self) -> &Cache {
		&self.context.cache
	}

	/// Spawns the loading and updater threads.
	pub fn start(&self) -> anyhow::Result<()> {
		let mut threads = self
			.threads
			.lock()
			.map_err(|_| Error::LockPoisoned("terrain threads"))?;
		if !threads.is_empty() {
			return Ok(());
		}
		log::info!(target: LOG, "Starting terrain threads");
		threads.push(thread::start(
			self.context.clone(),
			self.loader_wake.clone(),
			self.loader_waker.clone(),
		)?);
		threads.push(updater::start(
			self.context.clone(),
			self.recv_commands.clone(),
			self.send_changes.clone(),
		)?);
		Ok(())
	}

	fn is_threaded(&self) -> bool {
		self.threads
			.lock()
			.map(|threads| !threads.is_empty())
			.unwrap_or(false)
	}

	/// Runs one loading pass on the calling thread.
	pub fn run_pass(&self) -> Report {
		thread::run_pass(&self.context)
	}

	/// Applies every queued block command on the calling thread, returning how many changed a block.
	/// Does nothing once the updater thread is running, since it must stay the only consumer.
	pub fn flush_commands(&self) -> usize {
		if self.is_threaded() {
			log::debug!(target: LOG, "Ignoring flush, the updater thread owns the queue");
			return 0;
		}
		self.recv_commands
			.try_iter()
			.filter(|command| updater::process(&self.context, command, &self.send_changes))
			.count()
	}

	fn wake_loader(&self) {
		let _ = self.loader_waker.try_send(());
	}

	/// Registers a viewer. Its radius is clamped to the configured `view_radius`.
	pub fn add_viewer(&self, id: ViewerId, position: Point3<f64>, radius: u64) -> Result<(), Error> {
		let radius = match radius > self.context.settings.view_radius {
			true => {
				log::debug!(
					target: LOG,
					"Viewer {} asked for radius {}, granting {}",
					id,
					radius,
					self.context.settings.view_radius
				);
				self.context.settings.view_radius
			}
			false => radius,
		};
		if let Some(previous) = self.context.viewers.insert(id, Viewer::new(position, radius))? {
			log::warn!(target: LOG, "Viewer {} was already registered at {:?}", id, previous.position);
		}
		self.wake_loader();
		Ok(())
	}

	pub fn move_viewer(&self, id: ViewerId, position: Point3<f64>) -> Result<(), Error> {
		if self.context.viewers.move_to(id, position)? {
			self.wake_loader();
		}
		Ok(())
	}

	pub fn remove_viewer(&self, id: ViewerId) -> Result<(), Error> {
		self.context.viewers.remove(id)?;
		Ok(())
	}

	pub fn viewer(&self, id: ViewerId) -> Option<Viewer> {
		self.context.viewers.get(id)
	}

	pub fn get_chunk(&self, coordinate: &ColumnCoord) -> Option<Arc<chunk::Chunk>> {
		self.context.cache.get(coordinate)
	}

	/// The block at a world point, `None` while its column is not resident.
	pub fn get_block(&self, point: &BlockPoint) -> Option<Block> {
		let chunk = self.context.cache.get(&column_of(point))?;
		chunk.block_at(&local_of(point)).ok()
	}

	/// A handle other threads can queue block changes through.
	pub fn submitter(&self) -> Sender<BlockCommand> {
		self.send_commands.clone()
	}

	/// Queues a block change; it becomes visible once the updater applies it.
	pub fn submit(&self, point: BlockPoint, block: Block) {
		// the receiving half lives as long as `self`
		let _ = self.send_commands.send(BlockCommand { point, block });
	}

	/// Turns applied block changes into packets for every viewer whose area covers the changed column.
	pub fn drain_changes(&self) -> Vec<(ViewerId, Packet)> {
		let extension = self.context.settings.circular_extension;
		let mut packets = Vec::new();
		for change in self.recv_changes.try_iter() {
			let column = column_of(&change.point);
			for viewer in self.context.viewers.watching(&column, extension) {
				packets.push((viewer, Packet::block_change(&change.point, change.block)));
			}
		}
		packets
	}

	/// Answers a chunk request: the chunk if it is sendable and inside the viewer's allowed radius,
	/// otherwise the request echoed back as "not available".
	#[profiling::function]
	pub fn handle_request(&self, viewer: ViewerId, column: &ColumnCoord) -> Packet {
		let not_available = Packet::request(column);
		let allowed = match self.context.viewers.get(viewer) {
			Some(viewer) => viewer
				.area()
				.is_relevant(column, self.context.settings.circular_extension),
			None => false,
		};
		if !allowed {
			log::debug!(target: LOG, "Viewer {} asked for {:?} outside its radius", viewer, column);
			return not_available;
		}
		let chunk = match self.context.cache.get(column) {
			Some(chunk) if chunk.state() == State::Sendable => chunk,
			_ => return not_available,
		};
		let encoded = chunk
			.read()
			.map(|data| SaveData::new(*column, State::Populated, &data, Vec::new()))
			.and_then(|save| save.encode());
		match encoded {
			Ok(data) => Packet::SendChunk {
				x: column.x,
				y: column.y,
				data,
			},
			Err(err) => {
				log::error!(target: LOG, "Failed to encode chunk {:?}: {}", column, err);
				not_available
			}
		}
	}

	/// Adds an entity to the chunk its position falls in.
	pub fn insert_entity(&self, entity: Entity) -> Result<(), Error> {
		let column = column_of_position(&entity.position);
		let chunk = self
			.context
			.cache
			.get(&column)
			.ok_or(Error::ChunkNotLoaded(column))?;
		let mut data = chunk.write()?;
		data.entities.insert(entity)
	}

	/// Moves an entity owned by the chunk at `from`, transferring ownership if it crossed into another column.
	/// Both chunks are locked (in coordinate order) for the transfer, so the entity is never in neither or both.
	pub fn move_entity(
		&self,
		id: EntityId,
		from: &ColumnCoord,
		position: Point3<f64>,
	) -> Result<ColumnCoord, Error> {
		let to = column_of_position(&position);
		let source = self.context.cache.get(from).ok_or(Error::ChunkNotLoaded(*from))?;
		if to == *from {
			let mut data = source.write()?;
			let entity = data.entities.get_mut(id).ok_or(Error::MissingEntity(id))?;
			entity.position = position;
			return Ok(to);
		}

		let target = self.context.cache.get(&to).ok_or(Error::ChunkNotLoaded(to))?;
		let (mut source_data, mut target_data) = match coordinate_order(from, &to).is_lt() {
			true => {
				let source_data = source.write()?;
				(source_data, target.write()?)
			}
			false => {
				let target_data = target.write()?;
				(source.write()?, target_data)
			}
		};
		if target_data.entities.contains(id) {
			return Err(Error::DuplicateEntity(id));
		}
		let mut entity = source_data.entities.remove(id)?;
		entity.position = position;
		target_data.entities.insert(entity)?;
		log::trace!(target: LOG, "Entity {} moved {:?} -> {:?}", id, from, to);
		Ok(to)
	}

	/// Schedules a block update on the chunk containing its point.
	/// Updates scheduled while a tick is running wait until the next tick.
	pub fn schedule_update(&self, mut update: DelayedUpdate) -> Result<(), Error> {
		let column = column_of(&update.point);
		let chunk = self
			.context
			.cache
			.peek(&column)
			.ok_or(Error::ChunkNotLoaded(column))?;
		update.paused = self.context.ticking.load(Ordering::Acquire);
		chunk.updates()?.push(update);
		Ok(())
	}

	/// Advances every scheduled update by one tick, returning those which became due (nearest column first is not guaranteed).
	#[profiling::function]
	pub fn tick(&self) -> Vec<DelayedUpdate> {
		self.context.ticking.store(true, Ordering::Release);
		let mut due = Vec::new();
		let chunks = self.context.cache.chunks();
		for chunk in chunks.iter() {
			match chunk.updates() {
				Ok(mut updates) => {
					let mut pending = Vec::with_capacity(updates.len());
					for mut update in updates.drain(..) {
						match update.advance() {
							true => due.push(update),
							false => pending.push(update),
						}
					}
					*updates = pending;
				}
				Err(err) => log::error!(target: LOG, "{}", err),
			}
		}
		self.context.ticking.store(false, Ordering::Release);
		for chunk in chunks.iter() {
			if let Ok(mut updates) = chunk.updates() {
				updates.iter_mut().for_each(|update| update.paused = false);
			}
		}
		due
	}

	pub fn stats(&self) -> Stats {
		let mut stats = Stats {
			viewers: self.context.viewers.len(),
			pending_commands: self.recv_commands.len(),
			..Default::default()
		};
		self.context.cache.for_each(|chunk| {
			stats.resident += 1;
			stats.by_state[chunk.state() as usize] += 1;
			stats.scheduled_updates += chunk.updates().map(|u| u.len()).unwrap_or(0);
		});
		stats
	}

	/// Stops the background threads, applies any remaining block commands,
	/// and writes every resident chunk back to the store. Returns how many chunks were saved.
	pub fn shutdown(&self) -> anyhow::Result<usize> {
		if let Ok(mut threads) = self.threads.lock() {
			for mut handle in threads.drain(..) {
				handle.stop();
			}
		}
		self.flush_commands();
		let mut saved = 0;
		for chunk in self.context.cache.chunks() {
			match thread::write_back(&self.context, &chunk) {
				Ok(()) => saved += 1,
				Err(err) => log::error!(
					target: LOG,
					"Failed to save chunk {:?} during shutdown: {:?}",
					chunk.coordinate(),
					err
				),
			}
		}
		log::info!(target: LOG, "Saved {} chunks", saved);
		Ok(saved)
	}
}

impl Drop for Terrain {
	fn drop(&mut self) {
		if let Ok(mut threads) = self.threads.lock() {
			threads.clear();
		}
	}
}
