use crate::{
	common::{
		utility::{spawn_thread, ThreadHandle},
		world::{
			chunk::{ChunkData, State},
			generator::column_seed,
			neighbors, ColumnCoord, Error, Neighborhood,
		},
	},
	server::world::{chunk::Chunk, Context},
};
use crossbeam_channel::{Receiver, Sender};
use rand::{rngs::StdRng, SeedableRng};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// The log category for the chunk loading thread.
static LOG: &'static str = "chunk-loading";

/// Upper bound on settle rounds per pass; each round moves every chunk at most one state.
const MAX_SETTLE_ROUNDS: usize = 8;

/// What a single loading pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
	/// Chunks produced by the generator.
	pub generated: usize,
	/// Chunks restored from the chunk store.
	pub loaded: usize,
	pub populated: usize,
	/// Chunks written back and dropped.
	pub unloaded: usize,
	/// Generation, population or persistence attempts which failed (and will be retried).
	pub failed: usize,
	/// State changes made while settling.
	pub transitions: usize,
}

impl Report {
	/// True when the pass found nothing to do, so the thread may sleep.
	pub fn is_idle(&self) -> bool {
		self.generated == 0
			&& self.loaded == 0
			&& self.populated == 0
			&& self.unloaded == 0
			&& self.transitions == 0
	}
}

/// Begins the chunk loading thread, returning its handle.
/// If the handle is dropped, the thread will stop at the next loop.
pub fn start(
	context: Arc<Context>,
	wake: Receiver<()>,
	waker: Sender<()>,
) -> anyhow::Result<ThreadHandle> {
	let join_timeout = Duration::from_millis(context.settings.join_timeout_ms);
	let interval = Duration::from_millis(context.settings.pass_interval_ms);
	let handle = spawn_thread(LOG, join_timeout, move |stop| {
		log::info!(target: LOG, "Starting chunk-loading thread");
		while !stop.is_stopped() {
			let report = run_pass(&context);
			if report.is_idle() {
				// sleep until the interval passes or someone moves a viewer / asks to stop
				let _ = wake.recv_timeout(interval);
			}
		}
		log::info!(target: LOG, "Ending chunk-loading thread");
		Ok(())
	})?;
	Ok(handle.with_waker(waker))
}

/// Runs one full scheduling pass: create missing chunks, unload idle ones,
/// then populate and settle what is resident.
#[profiling::function]
pub fn run_pass(context: &Context) -> Report {
	let _pass = context
		.pass_lock
		.lock()
		.unwrap_or_else(|poisoned| poisoned.into_inner());
	let mut report = Report::default();

	let required = context
		.viewers
		.relevance()
		.required_set(context.settings.load_extension());
	create_missing(context, &required, &mut report);

	let required = required.into_iter().collect::<HashSet<_>>();
	unload_idle(context, &required, &mut report);

	populate_ready(context, &mut report);
	settle(context, &mut report);

	if !report.is_idle() {
		log::debug!(target: LOG, "{:?} resident={}", report, context.cache.len());
	}
	report
}

/// Generates or loads the nearest missing columns, at most `max_new_chunks_per_pass` of them.
#[profiling::function]
fn create_missing(context: &Context, required: &[ColumnCoord], report: &mut Report) {
	let missing = required
		.iter()
		.filter(|coordinate| !context.cache.contains(coordinate))
		.take(context.settings.max_new_chunks_per_pass);
	for coordinate in missing {
		let chunk = match load_or_generate(context, coordinate) {
			Ok((chunk, from_store)) => {
				match from_store {
					true => report.loaded += 1,
					false => report.generated += 1,
				}
				chunk
			}
			Err(err) => {
				log::error!(target: LOG, "Failed to create chunk {:?}: {:?}", coordinate, err);
				report.failed += 1;
				continue;
			}
		};
		if let Err(err) = context.cache.insert(Arc::new(chunk)) {
			log::error!(target: LOG, "{}", err);
		}
	}
}

fn load_or_generate(context: &Context, coordinate: &ColumnCoord) -> anyhow::Result<(Chunk, bool)> {
	if let Some(save) = context.store.load(coordinate)? {
		log::trace!(target: LOG, "Loaded chunk {:?} from store", coordinate);
		return Ok((Chunk::from_save(save)?, true));
	}
	profiling::scope!("generate-chunk");
	let mut data = ChunkData::new(context.settings.chunk_height);
	let updates = context.generator.generate(coordinate, &mut data.buffers())?;
	data.recompute_height_map();
	log::trace!(target: LOG, "Generated chunk {:?}", coordinate);
	Ok((Chunk::new(*coordinate, data, updates), false))
}

/// Writes back and drops chunks outside every viewer's area which have not been accessed recently.
/// A chunk whose write-back fails goes back into the cache to be retried on a later pass.
#[profiling::function]
fn unload_idle(context: &Context, required: &HashSet<ColumnCoord>, report: &mut Report) {
	let now = context.cache.now_ms();
	let idle_ms = context.settings.idle_unload_ms();
	let mut expired = Vec::new();
	context.cache.for_each(|chunk| {
		let idle = now.saturating_sub(chunk.last_access()) >= idle_ms;
		if idle && !required.contains(chunk.coordinate()) {
			expired.push(*chunk.coordinate());
		}
	});

	for coordinate in expired {
		let chunk = match context.cache.remove(&coordinate) {
			Some(chunk) => chunk,
			None => continue,
		};
		match write_back(context, &chunk) {
			Ok(()) => {
				log::trace!(target: LOG, "Unloaded chunk {:?}", coordinate);
				report.unloaded += 1;
			}
			Err(err) => {
				log::error!(
					target: LOG,
					"Failed to save chunk {:?}, keeping it loaded: {:?}",
					coordinate,
					err
				);
				report.failed += 1;
				if let Err(err) = context.cache.insert(chunk) {
					log::error!(target: LOG, "{}", err);
				}
			}
		}
	}
}

pub(crate) fn write_back(context: &Context, chunk: &Chunk) -> anyhow::Result<()> {
	let save = chunk.to_save_data()?;
	context.store.save(&save)?;
	Ok(())
}

/// Moves `New` chunks with all neighbours present to `ShouldPopulate`,
/// and runs population for the nearest waiting chunks.
#[profiling::function]
fn populate_ready(context: &Context, report: &mut Report) {
	let relevance = context.viewers.relevance();
	let mut chunks = context.cache.chunks();
	chunks.sort_by(|a, b| {
		relevance
			.min_sig_dist_sq(a.coordinate())
			.cmp(&relevance.min_sig_dist_sq(b.coordinate()))
			.then_with(|| crate::common::world::coordinate_order(a.coordinate(), b.coordinate()))
	});

	let mut populations = 0;
	for chunk in chunks.iter() {
		let coordinate = *chunk.coordinate();
		if chunk.state() == State::Populating {
			// a failed population whose write-back also failed
			discard_failed(context, chunk, report);
			continue;
		}
		if chunk.state() == State::New {
			let all_present = neighbors(&coordinate)
				.iter()
				.all(|neighbor| context.cache.contains(neighbor));
			if all_present {
				if let Err(err) = chunk.transition(State::ShouldPopulate) {
					log::error!(target: LOG, "{}", err);
					continue;
				}
				report.transitions += 1;
			}
		}
		if chunk.state() != State::ShouldPopulate
			|| populations >= context.settings.max_populations_per_pass
		{
			continue;
		}
		let region = match region_of(context, &coordinate) {
			Ok(region) => region,
			Err(err) => {
				log::debug!(target: LOG, "Chunk {:?} waits to populate: {}", coordinate, err);
				continue;
			}
		};
		populations += 1;
		match populate(context, chunk, region) {
			Ok(()) => {
				log::trace!(target: LOG, "Populated chunk {:?}", coordinate);
				report.populated += 1;
			}
			Err(err) => {
				log::error!(target: LOG, "Failed to populate chunk {:?}: {:?}", coordinate, err);
				report.failed += 1;
				discard_failed(context, chunk, report);
			}
		}
	}
}

/// Writes back and drops a chunk whose population failed, so the next pass reloads it
/// (as unpopulated) and tries again. If the write-back fails the chunk stays resident until it succeeds.
fn discard_failed(context: &Context, chunk: &Arc<Chunk>, report: &mut Report) {
	let coordinate = *chunk.coordinate();
	let removed = match context.cache.remove(&coordinate) {
		Some(removed) => removed,
		None => return,
	};
	match write_back(context, &removed) {
		Ok(()) => {
			log::debug!(target: LOG, "Saved chunk {:?} for another population attempt", coordinate);
			report.unloaded += 1;
		}
		Err(err) => {
			log::error!(
				target: LOG,
				"Failed to save chunk {:?} after a failed population, keeping it loaded: {:?}",
				coordinate,
				err
			);
			report.failed += 1;
			if let Err(err) = context.cache.insert(removed) {
				log::error!(target: LOG, "{}", err);
			}
		}
	}
}

/// The one-shot `ShouldPopulate -> Populating -> Populated` step, with the column and its neighbours locked.
fn populate(
	context: &Context,
	chunk: &Arc<Chunk>,
	region_chunks: Vec<Arc<Chunk>>,
) -> anyhow::Result<()> {
	let coordinate = *chunk.coordinate();
	chunk.transition(State::Populating)?;

	let mut rng = StdRng::seed_from_u64(column_seed(context.settings.seed_value(), &coordinate));
	{
		let mut region =
			Neighborhood::lock(coordinate, region_chunks.iter().map(|chunk| &chunk.chunk))?;
		context.populator.populate(&mut region, &mut rng)?;
		region.center_mut().recompute_sunlight(&context.lookup);
		for touched in region.touched() {
			let touched_populated = region_chunks
				.iter()
				.any(|c| *c.coordinate() == touched && c.state().is_populated());
			if touched != coordinate && touched_populated {
				if let Some(data) = region.chunk_mut(&touched) {
					data.recompute_sunlight(&context.lookup);
				}
			}
		}
	}

	chunk.transition(State::Populated)?;
	Ok(())
}

/// The column and its 8 neighbours, which must all be resident.
fn region_of(context: &Context, coordinate: &ColumnCoord) -> Result<Vec<Arc<Chunk>>, Error> {
	std::iter::once(*coordinate)
		.chain(neighbors(coordinate))
		.map(|column| context.cache.peek(&column).ok_or(Error::ChunkNotLoaded(column)))
		.collect()
}

/// Applies [`State::settle`] to every populated chunk until nothing changes,
/// running the populator's load hook the first time a chunk reaches `Loaded`.
#[profiling::function]
fn settle(context: &Context, report: &mut Report) {
	let chunks = context.cache.chunks();
	for _ in 0..MAX_SETTLE_ROUNDS {
		let mut changed = false;
		for chunk in chunks.iter() {
			let current = chunk.state();
			let next = current.settle(&context.cache.neighbor_states(chunk.coordinate()));
			if next == current {
				continue;
			}
			if let Err(err) = chunk.transition(next) {
				log::error!(target: LOG, "{}", err);
				continue;
			}
			log::trace!(
				target: LOG,
				"Chunk {:?} {} -> {}",
				chunk.coordinate(),
				current,
				next
			);
			report.transitions += 1;
			changed = true;
			if next == State::Loaded && chunk.claim_loaded_hooks() {
				if let Err(err) = run_load_hook(context, chunk) {
					log::error!(
						target: LOG,
						"Load hook failed for chunk {:?}: {:?}",
						chunk.coordinate(),
						err
					);
				}
			}
		}
		if !changed {
			break;
		}
	}
}

fn run_load_hook(context: &Context, chunk: &Arc<Chunk>) -> anyhow::Result<()> {
	let coordinate = *chunk.coordinate();
	let region_chunks = region_of(context, &coordinate)?;
	let mut region = Neighborhood::lock(coordinate, region_chunks.iter().map(|chunk| &chunk.chunk))?;
	context.populator.load(&mut region)?;
	Ok(())
}
