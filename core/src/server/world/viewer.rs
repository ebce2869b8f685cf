use crate::common::world::{column_of_position, Area, ColumnCoord, Error, Relevance};
use nalgebra::Point3;
use std::{collections::HashMap, sync::RwLock};

pub type ViewerId = u64;

/// Something the world is being streamed to (usually a connected player's camera).
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
	pub position: Point3<f64>,
	/// Allowed radius, in columns.
	pub radius: u64,
}

impl Viewer {
	pub fn new(position: Point3<f64>, radius: u64) -> Self {
		Self { position, radius }
	}

	pub fn column(&self) -> ColumnCoord {
		column_of_position(&self.position)
	}

	pub fn area(&self) -> Area {
		Area::new(self.column(), self.radius)
	}
}

/// The set of viewers the server is loading terrain for.
#[derive(Default)]
pub struct Viewers(RwLock<HashMap<ViewerId, Viewer>>);

impl Viewers {
	pub fn insert(&self, id: ViewerId, viewer: Viewer) -> Result<Option<Viewer>, Error> {
		let mut viewers = self.0.write().map_err(|_| Error::LockPoisoned("viewers"))?;
		Ok(viewers.insert(id, viewer))
	}

	/// Moves a viewer, returning true if it changed column.
	pub fn move_to(&self, id: ViewerId, position: Point3<f64>) -> Result<bool, Error> {
		let mut viewers = self.0.write().map_err(|_| Error::LockPoisoned("viewers"))?;
		let viewer = match viewers.get_mut(&id) {
			Some(viewer) => viewer,
			None => return Ok(false),
		};
		let previous = viewer.column();
		viewer.position = position;
		Ok(viewer.column() != previous)
	}

	pub fn remove(&self, id: ViewerId) -> Result<Option<Viewer>, Error> {
		let mut viewers = self.0.write().map_err(|_| Error::LockPoisoned("viewers"))?;
		Ok(viewers.remove(&id))
	}

	pub fn get(&self, id: ViewerId) -> Option<Viewer> {
		self.0.read().ok()?.get(&id).cloned()
	}

	pub fn len(&self) -> usize {
		self.0.read().map(|viewers| viewers.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Every viewer whose area (widened by `extension`) covers the column.
	pub fn watching(&self, column: &ColumnCoord, extension: f64) -> Vec<ViewerId> {
		let viewers = match self.0.read() {
			Ok(viewers) => viewers,
			Err(_) => return Vec::new(),
		};
		let mut ids = viewers
			.iter()
			.filter(|(_, viewer)| viewer.area().is_relevant(column, extension))
			.map(|(id, _)| *id)
			.collect::<Vec<_>>();
		ids.sort_unstable();
		ids
	}

	pub fn relevance(&self) -> Relevance {
		let mut relevance = Relevance::default();
		if let Ok(viewers) = self.0.read() {
			for viewer in viewers.values() {
				relevance.push(viewer.area());
			}
		}
		relevance
	}
}
