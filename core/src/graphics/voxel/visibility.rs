use crate::{
	common::utility::{spawn_thread, ThreadHandle},
	common::world::ColumnCoord,
	graphics::voxel::{Face, SectionKey},
};
use crossbeam_channel::{select, Receiver, Sender};
use enumset::EnumSet;
use std::{
	collections::{HashMap, HashSet},
	time::Duration,
};

static LOG: &'static str = "visibility";

/// Per loaded column, whether each of its sections is fully opaque.
/// Columns that are not present are never traversed.
pub type SolidityMap = HashMap<ColumnCoord, Vec<bool>>;

/// Breadth-first flood fill over sections, seeded at `origin`.
///
/// A section is reached through face-adjacent steps which never bring it closer to the origin
/// along the stepped axis. Solid sections are visible when reached but the fill stops at them.
/// The origin always propagates, even when solid.
///
/// An enclosed cavity therefore yields its own sections plus the solid shell around it,
/// since the inner faces of that shell have to be drawn; nothing past the shell is reached.
#[profiling::function]
pub fn flood_fill(origin: &SectionKey, solidity: &SolidityMap) -> HashSet<SectionKey> {
	let mut visible = HashSet::new();
	let origin_column = origin.column();
	let section_count = match solidity.get(&origin_column) {
		Some(sections) if !sections.is_empty() => sections.len() as i64,
		_ => return visible,
	};
	let origin = SectionKey {
		z: origin.z.clamp(0, section_count - 1),
		..*origin
	};

	let is_solid = |key: &SectionKey| -> Option<bool> {
		let sections = solidity.get(&key.column())?;
		match key.z >= 0 {
			true => sections.get(key.z as usize).copied(),
			false => None,
		}
	};

	visible.insert(origin);
	let mut frontier = vec![origin];
	let mut next = Vec::new();
	while !frontier.is_empty() {
		for section in frontier.drain(..) {
			let offset = (section.x - origin.x, section.y - origin.y, section.z - origin.z);
			for face in EnumSet::<Face>::all().iter() {
				let step = face.direction();
				if offset.0 * step.x + offset.1 * step.y + offset.2 * step.z < 0 {
					continue;
				}
				let neighbor = section.offset(step.x, step.y, step.z);
				if visible.contains(&neighbor) {
					continue;
				}
				let solid = match is_solid(&neighbor) {
					Some(solid) => solid,
					None => continue,
				};
				visible.insert(neighbor);
				if !solid {
					next.push(neighbor);
				}
			}
		}
		std::mem::swap(&mut frontier, &mut next);
	}
	visible
}

#[derive(Debug)]
pub struct VisibilityRequest {
	pub origin: SectionKey,
	/// Loaded-set generation the solidity was captured at.
	pub generation: u64,
	pub solidity: SolidityMap,
}

#[derive(Debug)]
pub struct VisibilityResult {
	pub origin: SectionKey,
	pub generation: u64,
	pub visible: HashSet<SectionKey>,
}

fn compute(request: VisibilityRequest) -> VisibilityResult {
	let visible = flood_fill(&request.origin, &request.solidity);
	log::trace!(
		target: LOG,
		"{} sections visible from {:?}",
		visible.len(),
		request.origin
	);
	VisibilityResult {
		origin: request.origin,
		generation: request.generation,
		visible,
	}
}

/// Runs flood fills off the render thread. Only the newest pending request is computed;
/// older ones are superseded before they start.
///
/// When not threaded, a request is filled on the spot and its result waits for the next poll.
pub struct VisibilityWorker {
	requests: Sender<VisibilityRequest>,
	send_results: Sender<VisibilityResult>,
	results: Receiver<VisibilityResult>,
	thread: Option<ThreadHandle>,
}

impl VisibilityWorker {
	pub fn new(threaded: bool, join_timeout: Duration) -> anyhow::Result<Self> {
		let (requests, receive_requests) = crossbeam_channel::unbounded::<VisibilityRequest>();
		let (send_results, results) = crossbeam_channel::unbounded::<VisibilityResult>();
		let thread = match threaded {
			true => {
				let (waker, wake) = crossbeam_channel::bounded::<()>(1);
				let send_results = send_results.clone();
				Some(
					spawn_thread(LOG, join_timeout, move |stop| {
						log::info!(target: LOG, "Starting visibility thread");
						while !stop.is_stopped() {
							select! {
								recv(receive_requests) -> request => {
									let mut request = match request {
										Ok(request) => request,
										Err(_) => break,
									};
									while let Ok(newer) = receive_requests.try_recv() {
										request = newer;
									}
									if send_results.send(compute(request)).is_err() {
										break;
									}
								}
								recv(wake) -> _ => {}
							}
						}
						log::info!(target: LOG, "Stopping visibility thread");
						Ok(())
					})?
					.with_waker(waker),
				)
			}
			false => None,
		};
		Ok(Self {
			requests,
			send_results,
			results,
			thread,
		})
	}

	pub fn request(&self, request: VisibilityRequest) {
		match self.thread {
			Some(_) => {
				if self.requests.send(request).is_err() {
					log::error!(target: LOG, "Visibility thread is gone");
				}
			}
			None => {
				let _ = self.send_results.send(compute(request));
			}
		}
	}

	/// The newest finished result, if any arrived since the last poll.
	pub fn poll(&self) -> Option<VisibilityResult> {
		self.results.try_iter().last()
	}

	pub fn recv_timeout(&self, timeout: Duration) -> Option<VisibilityResult> {
		self.results.recv_timeout(timeout).ok()
	}
}
