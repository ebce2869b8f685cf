use crate::common::utility::DataFile;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How far beyond a viewer's radius the server keeps chunks resident.
/// A column at the edge of the radius is only sendable once three more rings exist around it,
/// and on the diagonal three rings reach `3 * sqrt(2)` columns out.
pub const LOAD_MARGIN: f64 = 4.5;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
	#[serde(default = "Settings::default_seed")]
	seed: String,
	/// Height of every column in blocks, rounded up to whole sections.
	pub chunk_height: usize,
	/// Largest radius (in columns) a viewer is granted; larger requests are clamped to it.
	pub view_radius: u64,
	/// Fractional widening of every circular area.
	pub circular_extension: f64,
	pub max_new_chunks_per_pass: usize,
	pub max_populations_per_pass: usize,
	/// Chunks outside every viewer's area are unloaded after being idle this long.
	pub idle_unload_secs: u64,
	/// Upper bound on how long the loading thread sleeps when there is no work.
	pub pass_interval_ms: u64,
	pub join_timeout_ms: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			seed: Self::default_seed(),
			chunk_height: 64,
			view_radius: 8,
			circular_extension: 0.5,
			max_new_chunks_per_pass: 32,
			max_populations_per_pass: 16,
			idle_unload_secs: 30,
			pass_interval_ms: 50,
			join_timeout_ms: 2000,
		}
	}
}

impl Settings {
	fn default_seed() -> String {
		chrono::prelude::Utc::now()
			.format("%Y%m%d%H%M%S")
			.to_string()
	}

	pub fn seed(&self) -> &String {
		&self.seed
	}

	pub fn with_seed(mut self, seed: &str) -> Self {
		self.seed = seed.to_owned();
		self
	}

	/// The seed string folded into a number for random sources (FNV-1a).
	pub fn seed_value(&self) -> u64 {
		self.seed.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
			(hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
		})
	}

	/// The extension applied when computing which columns must be resident.
	pub fn load_extension(&self) -> f64 {
		self.circular_extension + LOAD_MARGIN
	}

	pub fn idle_unload_ms(&self) -> u64 {
		self.idle_unload_secs * 1000
	}
}

impl DataFile for Settings {
	fn file_name() -> &'static str {
		"server.json"
	}

	fn save_to(&self, file_path: &Path) -> Result<()> {
		let json = serde_json::to_string_pretty(self)?;
		std::fs::write(file_path, json)?;
		Ok(())
	}

	fn load_from(file_path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(file_path)?;
		let mut settings: Self = serde_json::from_str(&raw)?;
		if settings.seed.is_empty() {
			settings.seed = Self::default_seed();
		}
		Ok(settings)
	}
}
