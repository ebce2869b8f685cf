use crate::{
	block::Lookup,
	common::utility::{spawn_thread, ThreadHandle},
	common::world::ColumnCoord,
	graphics::voxel::{Lod, MeshBuilder, SectionMesh, Snapshot},
};
use crossbeam_channel::{select, Receiver, Sender};
use std::{sync::Arc, time::Duration};

static LOG: &'static str = "mesh-worker";

/// A section waiting to be meshed.
#[derive(Debug)]
pub struct MeshJob {
	pub column: ColumnCoord,
	pub section: usize,
	/// Section version the snapshot was taken at.
	pub version: u64,
	pub lod: Lod,
	pub snapshot: Snapshot,
}

/// A built mesh on its way back to the renderer.
#[derive(Debug)]
pub struct MeshResult {
	pub column: ColumnCoord,
	pub section: usize,
	pub version: u64,
	pub mesh: SectionMesh,
}

impl MeshJob {
	fn run(self, builder: &mut MeshBuilder, lookup: &Lookup) -> MeshResult {
		let mesh = builder.build(&self.snapshot, lookup, self.lod);
		MeshResult {
			column: self.column,
			section: self.section,
			version: self.version,
			mesh,
		}
	}
}

/// A pool of threads which turn snapshots into meshes.
///
/// With no threads the pool builds each job on the submitting thread,
/// and the result is waiting on the next [`drain`](MeshWorkers::drain).
pub struct MeshWorkers {
	lookup: Arc<Lookup>,
	jobs: Sender<MeshJob>,
	send_results: Sender<MeshResult>,
	results: Receiver<MeshResult>,
	inline: Option<MeshBuilder>,
	threads: Vec<ThreadHandle>,
}

impl MeshWorkers {
	pub fn new(lookup: Arc<Lookup>, count: usize, join_timeout: Duration) -> anyhow::Result<Self> {
		let (jobs, receive_jobs) = crossbeam_channel::unbounded::<MeshJob>();
		let (send_results, results) = crossbeam_channel::unbounded::<MeshResult>();
		let mut threads = Vec::with_capacity(count);
		for index in 0..count {
			let (waker, wake) = crossbeam_channel::bounded::<()>(1);
			let receive_jobs = receive_jobs.clone();
			let send_results = send_results.clone();
			let lookup = lookup.clone();
			let handle = spawn_thread(LOG, join_timeout, move |stop| {
				log::debug!(target: LOG, "Starting mesh worker {}", index);
				let mut builder = MeshBuilder::new();
				while !stop.is_stopped() {
					select! {
						recv(receive_jobs) -> job => match job {
							Ok(job) => {
								profiling::scope!("mesh-section");
								if send_results.send(job.run(&mut builder, &lookup)).is_err() {
									break;
								}
							}
							Err(_) => break,
						},
						recv(wake) -> _ => {}
					}
				}
				log::debug!(target: LOG, "Stopping mesh worker {}", index);
				Ok(())
			})?
			.with_waker(waker);
			threads.push(handle);
		}
		log::info!(target: LOG, "Started {} mesh workers", count);
		Ok(Self {
			lookup,
			jobs,
			send_results,
			results,
			inline: (count == 0).then(MeshBuilder::new),
			threads,
		})
	}

	pub fn worker_count(&self) -> usize {
		self.threads.len()
	}

	pub fn submit(&mut self, job: MeshJob) {
		match &mut self.inline {
			Some(builder) => {
				let _ = self.send_results.send(job.run(builder, &self.lookup));
			}
			None => {
				if self.jobs.send(job).is_err() {
					log::error!(target: LOG, "Mesh workers are gone, dropping job");
				}
			}
		}
	}

	/// Every result that has finished since the last drain.
	pub fn drain(&self) -> Vec<MeshResult> {
		self.results.try_iter().collect()
	}

	/// Blocks until one result is ready.
	pub fn recv_timeout(&self, timeout: Duration) -> Option<MeshResult> {
		self.results.recv_timeout(timeout).ok()
	}
}

impl Drop for MeshWorkers {
	fn drop(&mut self) {
		for thread in self.threads.iter_mut() {
			thread.stop();
		}
	}
}

#[cfg(test)]
mod mesh_workers {
	use super::*;
	use crate::{
		block::Block,
		common::world::chunk::ChunkData,
		graphics::voxel::SectionKey,
	};
	use nalgebra::Point3;

	fn job(lookup: &Lookup) -> MeshJob {
		let mut data = ChunkData::new(16);
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		data.set(&Point3::new(1, 1, 1), stone).unwrap();
		let column = ColumnCoord::new(0, 0);
		let key = SectionKey::new(&column, 0);
		MeshJob {
			column,
			section: 0,
			version: 3,
			lod: Lod::Near,
			snapshot: Snapshot::capture(key, &[(column, &data)]),
		}
	}

	#[test]
	fn inline_builds_on_submit() {
		let lookup = Arc::new(Lookup::classic());
		let mut workers = MeshWorkers::new(lookup.clone(), 0, Duration::from_secs(1)).unwrap();
		workers.submit(job(&lookup));
		let results = workers.drain();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].version, 3);
		assert_eq!(results[0].mesh.opaque.len(), 6);
	}

	#[test]
	fn threads_return_results() {
		let lookup = Arc::new(Lookup::classic());
		let mut workers = MeshWorkers::new(lookup.clone(), 2, Duration::from_secs(1)).unwrap();
		assert_eq!(workers.worker_count(), 2);
		for _ in 0..4 {
			workers.submit(job(&lookup));
		}
		let mut received = 0;
		while received < 4 {
			let result = workers.recv_timeout(Duration::from_secs(5)).unwrap();
			assert_eq!(result.mesh.opaque.len(), 6);
			received += 1;
		}
	}
}
