use crate::{
	client::world::{chunk::Chunk, Context},
	common::{
		network::Packet,
		utility::{spawn_thread, ThreadHandle},
		world::{Area, ColumnCoord, Relevance},
	},
};
use crossbeam_channel::{Receiver, Sender};
use std::{
	collections::HashSet,
	sync::Arc,
	time::{Duration, Instant},
};

/// The log category for the chunk requester thread.
static LOG: &'static str = "chunk-requests";

/// What a single requester cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
	/// Placeholders made for newly required columns.
	pub created: usize,
	pub requested: usize,
	/// Requests given up on after the timeout.
	pub expired: usize,
	/// Chunks dropped because they left the required area.
	pub removed: usize,
}

impl Report {
	pub fn is_idle(&self) -> bool {
		self.created == 0 && self.requested == 0 && self.expired == 0 && self.removed == 0
	}
}

/// Begins the requester thread. It runs a cycle, then sleeps until the idle interval passes
/// or the viewer moves (or a negative acknowledgement arrives).
pub fn start(
	context: Arc<Context>,
	wake: Receiver<()>,
	waker: Sender<()>,
) -> anyhow::Result<ThreadHandle> {
	let join_timeout = Duration::from_millis(context.settings.join_timeout_ms);
	let interval = Duration::from_millis(context.settings.idle_interval_ms);
	let handle = spawn_thread(LOG, join_timeout, move |stop| {
		log::info!(target: LOG, "Starting chunk-requests thread");
		while !stop.is_stopped() {
			let report = run_cycle(&context);
			if report.is_idle() || context.at_request_limit() {
				let _ = wake.recv_timeout(interval);
			}
		}
		log::info!(target: LOG, "Ending chunk-requests thread");
		Ok(())
	})?;
	Ok(handle.with_waker(waker))
}

/// The columns the client wants, nearest first.
pub(crate) fn required_set(context: &Context) -> Vec<ColumnCoord> {
	let mut relevance = Relevance::default();
	relevance.push(Area::new(context.viewer_column(), context.settings.view_radius));
	relevance
		.required_set(context.settings.circular_extension)
		.into_iter()
		.filter(|column| context.cache.contains_coordinate(column))
		.collect()
}

/// Walks the required columns once: makes placeholders, gives up on stale requests,
/// issues new ones while under the limit, and drops chunks nobody needs anymore.
#[profiling::function]
pub fn run_cycle(context: &Context) -> Report {
	let _cycle = context
		.cycle_lock
		.lock()
		.unwrap_or_else(|poisoned| poisoned.into_inner());
	let mut report = Report::default();
	let now = Instant::now();
	let required = required_set(context);

	for column in required.iter() {
		if context.cache.get(column).is_some() {
			continue;
		}
		match context.cache.put_if_absent(Arc::new(Chunk::placeholder(*column))) {
			Ok(true) => report.created += 1,
			Ok(false) => {}
			Err(err) => log::debug!(target: LOG, "{}", err),
		}
	}

	let timeout = Duration::from_millis(context.settings.request_timeout_ms);
	context.cache.for_each(|chunk| {
		if chunk.is_placeholder() && chunk.request_expired(now, timeout) {
			if context.release_request(chunk) {
				log::warn!(
					target: LOG,
					"Request for {:?} timed out after {} attempt(s)",
					chunk.coordinate(),
					chunk.attempts()
				);
				report.expired += 1;
			}
		}
	});

	for column in required.iter() {
		if context.at_request_limit() {
			break;
		}
		let chunk = match context.cache.get(column) {
			Some(chunk) if chunk.is_placeholder() => chunk,
			_ => continue,
		};
		if !chunk.mark_requested(now) {
			continue;
		}
		context.acquire_request();
		if context.outgoing.send(Packet::request(column)).is_err() {
			log::error!(target: LOG, "Request queue is gone");
			context.release_request(&chunk);
			break;
		}
		log::trace!(target: LOG, "Requested {:?} (attempt {})", column, chunk.attempts());
		report.requested += 1;
	}

	let required = required.into_iter().collect::<HashSet<_>>();
	let mut stale = Vec::new();
	context.cache.for_each(|chunk| {
		if !required.contains(chunk.coordinate()) {
			stale.push(*chunk.coordinate());
		}
	});
	for column in stale.iter() {
		if let Some(chunk) = context.cache.remove(column) {
			context.dispose(&chunk);
			report.removed += 1;
		}
	}
	if report.removed > 0 {
		context.settle();
	}

	if !report.is_idle() {
		log::debug!(
			target: LOG,
			"{:?} outstanding={} resident={}",
			report,
			context.outstanding(),
			context.cache.len()
		);
	}
	report
}
