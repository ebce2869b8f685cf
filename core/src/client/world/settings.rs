use crate::common::utility::DataFile;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
	/// Radius (in columns) of the area the client asks the server for.
	pub view_radius: u64,
	/// Fractional widening of the circular area, so edge columns are asked for a little early.
	pub circular_extension: f64,
	pub max_outstanding_requests: usize,
	/// A request with no answer after this long is given up on and asked again.
	pub request_timeout_ms: u64,
	/// Upper bound on how long the requester sleeps when there is nothing to ask for.
	pub idle_interval_ms: u64,
	/// Sections further than this (in blocks) from the camera are meshed at far detail.
	pub lod_distance: f64,
	/// Mesh worker threads; 0 builds meshes on the render thread.
	pub mesh_workers: usize,
	pub max_mesh_jobs_in_flight: usize,
	pub join_timeout_ms: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			view_radius: 6,
			circular_extension: 0.5,
			max_outstanding_requests: 8,
			request_timeout_ms: 5000,
			idle_interval_ms: 100,
			lod_distance: 64.0,
			mesh_workers: 2,
			max_mesh_jobs_in_flight: 16,
			join_timeout_ms: 2000,
		}
	}
}

impl Settings {
	/// Radius of the chunk cache window, which has to hold the whole (extended) circular area.
	pub fn window_radius(&self) -> usize {
		(self.view_radius as f64 + self.circular_extension).ceil() as usize
	}
}

impl DataFile for Settings {
	fn file_name() -> &'static str {
		"client.json"
	}

	fn save_to(&self, file_path: &Path) -> Result<()> {
		let json = serde_json::to_string_pretty(self)?;
		std::fs::write(file_path, json)?;
		Ok(())
	}

	fn load_from(file_path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(file_path)?;
		let settings: Self = serde_json::from_str(&raw)?;
		Ok(settings)
	}
}
