use crate::{
	block::Lookup,
	client::world::{chunk::Chunk, Settings, Terrain},
	common::world::{chunk::State, neighbors, ColumnCoord, Error},
	graphics::voxel::{
		Bounds, Lod, MeshJob, MeshWorkers, SectionKey, SectionMesh, Snapshot, SolidityMap,
		VisibilityRequest, VisibilityWorker,
	},
};
use nalgebra::Point3;
use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Weak},
	time::Duration,
};

static LOG: &'static str = "render-chunks";

/// One batch to draw.
#[derive(Debug, Clone)]
pub struct DrawCall {
	pub key: SectionKey,
	pub bounds: Bounds,
	/// Squared distance from the camera to the batch's center.
	pub distance_sq: f32,
	pub mesh: Arc<SectionMesh>,
}

/// Everything to draw this frame: opaque batches nearest first,
/// then translucent batches furthest first.
#[derive(Debug, Clone, Default)]
pub struct Frame {
	pub opaque: Vec<DrawCall>,
	pub translucent: Vec<DrawCall>,
	pub visible_sections: usize,
	pub jobs_in_flight: usize,
}

impl Frame {
	pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
		self.opaque.iter().chain(self.translucent.iter())
	}
}

/// Turns the client terrain into draw lists.
///
/// Each update publishes finished meshes, picks up the newest visibility fill, refreshes
/// section solidity and level of detail, and hands dirty visible sections to the mesh workers.
/// Nothing here waits on a worker: until a new visibility result lands, the previous one is used.
pub struct Renderer {
	lookup: Arc<Lookup>,
	lod_distance: f64,
	max_jobs_in_flight: usize,
	workers: MeshWorkers,
	visibility: VisibilityWorker,
	visible: HashSet<SectionKey>,
	/// What the last visibility request was computed from.
	requested: Option<(SectionKey, u64)>,
	solidity_changed: bool,
	in_flight: HashMap<(ColumnCoord, usize), Weak<Chunk>>,
}

impl Renderer {
	pub fn new(lookup: Arc<Lookup>, settings: &Settings) -> anyhow::Result<Self> {
		let join_timeout = Duration::from_millis(settings.join_timeout_ms);
		log::info!(
			target: LOG,
			"Creating renderer with {} mesh workers",
			settings.mesh_workers
		);
		Ok(Self {
			workers: MeshWorkers::new(lookup.clone(), settings.mesh_workers, join_timeout)?,
			visibility: VisibilityWorker::new(settings.mesh_workers > 0, join_timeout)?,
			lookup,
			lod_distance: settings.lod_distance,
			max_jobs_in_flight: settings.max_mesh_jobs_in_flight.max(1),
			visible: HashSet::new(),
			requested: None,
			solidity_changed: false,
			in_flight: HashMap::new(),
		})
	}

	pub fn visible(&self) -> &HashSet<SectionKey> {
		&self.visible
	}

	pub fn jobs_in_flight(&self) -> usize {
		self.in_flight.len()
	}

	#[profiling::function]
	pub fn update(&mut self, terrain: &Terrain, camera: &Point3<f64>) -> Result<Frame, Error> {
		let cache = terrain.cache();
		self.publish_meshes(terrain);

		if let Some(result) = self.visibility.poll() {
			log::debug!(
				target: LOG,
				"Visibility from {:?}: {} sections",
				result.origin,
				result.visible.len()
			);
			self.visible = result.visible;
		}

		let chunks = cache
			.chunks()
			.into_iter()
			.filter(|chunk| !chunk.is_placeholder())
			.collect::<Vec<_>>();
		for chunk in chunks.iter() {
			self.refresh_solidity(chunk)?;
		}
		self.request_visibility(terrain, camera, &chunks)?;

		let mut candidates = Vec::new();
		for chunk in chunks.iter() {
			let meshable = chunk.state() >= State::Loaded;
			let mut render = chunk.render()?;
			for section in 0..render.section_count() {
				let key = SectionKey::new(chunk.coordinate(), section as i64);
				render.set_visible(section, meshable && self.visible.contains(&key));
				let distance = (key.center() - camera).norm();
				render.set_lod(section, Lod::for_distance(distance, self.lod_distance));
				if render.needs_build(section) {
					candidates.push((distance, chunk.clone(), section));
				}
			}
		}
		candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
		for (_, chunk, section) in candidates.into_iter() {
			if self.in_flight.len() >= self.max_jobs_in_flight {
				break;
			}
			// a job for a chunk this one replaced may still be running
			if self.in_flight.contains_key(&(*chunk.coordinate(), section)) {
				continue;
			}
			self.submit(cache, &chunk, section)?;
		}
		self.publish_meshes(terrain);

		Ok(self.draw_list(&chunks, camera))
	}

	/// Hands finished meshes to their sections. Results for a chunk which has since
	/// been replaced or dropped are thrown away.
	fn publish_meshes(&mut self, terrain: &Terrain) {
		for result in self.workers.drain() {
			let expected = self.in_flight.remove(&(result.column, result.section));
			let chunk = match (expected.and_then(|weak| weak.upgrade()), terrain.cache().get(&result.column)) {
				(Some(expected), Some(current)) if Arc::ptr_eq(&expected, &current) => current,
				_ => continue,
			};
			match chunk.render() {
				Ok(mut render) => {
					if !render.publish(result.section, result.version, result.mesh) {
						log::trace!(
							target: LOG,
							"Discarded stale mesh for {:?} section {}",
							result.column,
							result.section
						);
					}
				}
				Err(err) => log::error!(target: LOG, "{}", err),
			};
		}
	}

	fn refresh_solidity(&mut self, chunk: &Arc<Chunk>) -> Result<(), Error> {
		let mut render = chunk.render()?;
		if !render.flags_stale {
			return Ok(());
		}
		let data = chunk.read()?;
		for section in 0..render.section_count() {
			if render.set_solid(section, data.is_section_solid(section, &self.lookup)) {
				self.solidity_changed = true;
			}
			render.set_culled(section, data.is_section_empty(section));
		}
		render.flags_stale = false;
		Ok(())
	}

	/// Asks for a new fill when the camera changed section or the meshable set changed.
	fn request_visibility(
		&mut self,
		terrain: &Terrain,
		camera: &Point3<f64>,
		chunks: &[Arc<Chunk>],
	) -> Result<(), Error> {
		let origin = SectionKey::containing(camera);
		let generation = terrain.generation();
		if self.requested == Some((origin, generation)) && !self.solidity_changed {
			return Ok(());
		}
		let mut solidity = SolidityMap::new();
		for chunk in chunks.iter().filter(|chunk| chunk.state() >= State::Loaded) {
			let render = chunk.render()?;
			let solid = render
				.sections()
				.map(|(_, section)| section.solid)
				.collect::<Vec<_>>();
			solidity.insert(*chunk.coordinate(), solid);
		}
		log::trace!(target: LOG, "Requesting visibility from {:?}", origin);
		self.visibility.request(VisibilityRequest {
			origin,
			generation,
			solidity,
		});
		self.requested = Some((origin, generation));
		self.solidity_changed = false;
		Ok(())
	}

	/// Snapshots a section (with its bordering columns) and queues it for meshing.
	fn submit(
		&mut self,
		cache: &crate::client::world::chunk::Cache,
		chunk: &Arc<Chunk>,
		section: usize,
	) -> Result<(), Error> {
		let column = *chunk.coordinate();
		// the version is taken before the voxels so a change in between leaves the result stale
		let (version, lod) = match chunk.render()?.begin_build(section) {
			Some(build) => build,
			None => return Ok(()),
		};
		let around = neighbors(&column)
			.iter()
			.filter_map(|neighbor| cache.get(neighbor))
			.filter(|neighbor| !neighbor.is_placeholder())
			.collect::<Vec<_>>();
		let snapshot = {
			let center = chunk.read()?;
			let guards = around
				.iter()
				.map(|neighbor| Ok((*neighbor.coordinate(), neighbor.read()?)))
				.collect::<Result<Vec<_>, Error>>()?;
			let mut columns = vec![(column, &*center)];
			columns.extend(guards.iter().map(|(coordinate, data)| (*coordinate, &**data)));
			Snapshot::capture(SectionKey::new(&column, section as i64), &columns)
		};
		self.in_flight
			.insert((column, section), Arc::downgrade(chunk));
		self.workers.submit(MeshJob {
			column,
			section,
			version,
			lod,
			snapshot,
		});
		Ok(())
	}

	fn draw_list(&self, chunks: &[Arc<Chunk>], camera: &Point3<f64>) -> Frame {
		let camera = camera.map(|v| v as f32);
		let mut frame = Frame {
			visible_sections: self.visible.len(),
			jobs_in_flight: self.in_flight.len(),
			..Default::default()
		};
		for chunk in chunks.iter().filter(|chunk| chunk.state() >= State::Loaded) {
			let render = match chunk.render() {
				Ok(render) => render,
				Err(_) => continue,
			};
			for (_, section) in render.sections() {
				let mesh = match (&section.mesh, section.visible) {
					(Some(mesh), true) => mesh,
					_ => continue,
				};
				for (batch, list) in [
					(&mesh.opaque, &mut frame.opaque),
					(&mesh.translucent, &mut frame.translucent),
				] {
					if let Some(bounds) = batch.bounds {
						list.push(DrawCall {
							key: mesh.key,
							bounds,
							distance_sq: (bounds.center() - camera).norm_squared(),
							mesh: mesh.clone(),
						});
					}
				}
			}
		}
		frame
			.opaque
			.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
		frame
			.translucent
			.sort_by(|a, b| b.distance_sq.total_cmp(&a.distance_sq));
		frame
	}
}

#[cfg(test)]
mod renderer {
	use super::*;
	use crate::{
		block::Block,
		common::{
			network::Packet,
			world::{chunk::{ChunkData, SaveData}, BlockPoint},
		},
	};

	fn settings() -> Settings {
		Settings {
			view_radius: 2,
			max_outstanding_requests: 0,
			mesh_workers: 0,
			lod_distance: 1000.0,
			..Default::default()
		}
	}

	fn floor(column: ColumnCoord, lookup: &Lookup) -> Packet {
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let mut data = ChunkData::new(32);
		{
			let mut buffers = data.buffers();
			for z in 0..4 {
				for y in 0..16 {
					for x in 0..16 {
						buffers.set(x, y, z, stone);
					}
				}
			}
		}
		data.recompute_height_map();
		let save = SaveData::new(column, State::Sendable, &data, Vec::new());
		Packet::SendChunk {
			x: column.x,
			y: column.y,
			data: save.encode().unwrap(),
		}
	}

	fn world() -> (Terrain, Renderer) {
		let lookup = Arc::new(Lookup::classic());
		let camera = Point3::new(8.0, 8.0, 20.0);
		let terrain = Terrain::new(settings(), lookup.clone(), camera);
		terrain.run_cycle();
		for y in -2..=2i64 {
			for x in -2..=2i64 {
				if x * x + y * y <= 6 {
					terrain
						.receive(floor(ColumnCoord::new(x, y), &lookup))
						.unwrap();
				}
			}
		}
		let renderer = Renderer::new(lookup, &settings()).unwrap();
		(terrain, renderer)
	}

	fn loaded() -> HashSet<ColumnCoord> {
		[(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)]
			.into_iter()
			.map(|(x, y)| ColumnCoord::new(x, y))
			.collect()
	}

	#[test]
	fn first_frame_waits_for_visibility() {
		let (terrain, mut renderer) = world();
		let camera = terrain.viewer_position();
		let frame = renderer.update(&terrain, &camera).unwrap();
		assert!(frame.opaque.is_empty());

		let frame = renderer.update(&terrain, &camera).unwrap();
		assert!(!frame.opaque.is_empty());
		assert!(frame.translucent.is_empty());
		assert_eq!(frame.jobs_in_flight, 0);
	}

	#[test]
	fn only_loaded_chunks_are_drawn_nearest_first() {
		let (terrain, mut renderer) = world();
		let camera = terrain.viewer_position();
		renderer.update(&terrain, &camera).unwrap();
		let frame = renderer.update(&terrain, &camera).unwrap();
		let loaded = loaded();
		for call in frame.opaque.iter() {
			assert!(loaded.contains(&call.key.column()));
			// the air section above the floor has nothing to draw
			assert_eq!(call.key.z, 0);
		}
		let columns = frame
			.opaque
			.iter()
			.map(|call| call.key.column())
			.collect::<HashSet<_>>();
		assert_eq!(columns, loaded);
		assert!(frame
			.opaque
			.windows(2)
			.all(|pair| pair[0].distance_sq <= pair[1].distance_sq));
	}

	#[test]
	fn block_change_rebuilds_section() {
		let (terrain, mut renderer) = world();
		let camera = terrain.viewer_position();
		renderer.update(&terrain, &camera).unwrap();
		renderer.update(&terrain, &camera).unwrap();

		let glass = Block::new(terrain.lookup().lookup_value("glass").unwrap());
		terrain
			.receive(Packet::block_change(&BlockPoint::new(8, 8, 4), glass))
			.unwrap();
		let frame = renderer.update(&terrain, &camera).unwrap();
		assert_eq!(frame.translucent.len(), 1);
		assert_eq!(frame.translucent[0].mesh.translucent.len(), 5);
	}

	#[test]
	fn far_sections_use_far_detail() {
		let (terrain, _) = world();
		let mut settings = settings();
		settings.lod_distance = 0.0;
		let mut renderer = Renderer::new(terrain.lookup().clone(), &settings).unwrap();
		let camera = terrain.viewer_position();
		renderer.update(&terrain, &camera).unwrap();
		let frame = renderer.update(&terrain, &camera).unwrap();
		assert!(!frame.opaque.is_empty());
		assert!(frame.opaque.iter().all(|call| call.mesh.lod == Lod::Far));
	}

	#[test]
	fn evicted_chunks_leave_the_draw_list() {
		let (terrain, mut renderer) = world();
		let camera = terrain.viewer_position();
		renderer.update(&terrain, &camera).unwrap();
		renderer.update(&terrain, &camera).unwrap();

		let far = Point3::new(10_000.0, 8.0, 20.0);
		terrain.move_viewer(far);
		let frame = renderer.update(&terrain, &far).unwrap();
		assert!(frame.opaque.is_empty());
		assert!(frame.translucent.is_empty());
	}
}
