use crate::common::world::{self, chunk::SaveData, ColumnCoord};
use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Mutex,
	},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("failed to encode chunk {0:?}")]
	Encode(ColumnCoord, #[source] world::Error),
	#[error("failed to decode chunk {0:?}")]
	Decode(ColumnCoord, #[source] world::Error),
	#[error("chunk store is unavailable")]
	Unavailable,
}

/// Where unloaded chunks are written back to, and looked for before generating.
pub trait ChunkStore: Send + Sync {
	/// `None` when the column has never been saved.
	fn load(&self, coordinate: &ColumnCoord) -> Result<Option<SaveData>, Error>;
	fn save(&self, save: &SaveData) -> Result<(), Error>;
}

/// One file per column, at `<root>/chunks/x.y.bin`.
pub struct DiskStore {
	root: PathBuf,
}

impl DiskStore {
	pub fn new(root: &Path) -> Self {
		Self {
			root: root.to_owned(),
		}
	}

	fn create_path_for(&self, coordinate: &ColumnCoord) -> PathBuf {
		let mut path = self.root.clone();
		path.push("chunks");
		path.push(format!("{}.{}.bin", coordinate.x, coordinate.y));
		path
	}
}

impl ChunkStore for DiskStore {
	fn load(&self, coordinate: &ColumnCoord) -> Result<Option<SaveData>, Error> {
		let path = self.create_path_for(coordinate);
		profiling::scope!("load-chunk", path.to_str().unwrap_or(""));
		if !path.exists() {
			return Ok(None);
		}
		let bytes = std::fs::read(&path)?;
		let save = SaveData::decode(&bytes).map_err(|err| Error::Decode(*coordinate, err))?;
		Ok(Some(save))
	}

	fn save(&self, save: &SaveData) -> Result<(), Error> {
		let path = self.create_path_for(&save.coordinate);
		profiling::scope!("save-chunk", path.to_str().unwrap_or(""));
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let bytes = save
			.encode()
			.map_err(|err| Error::Encode(save.coordinate, err))?;
		std::fs::write(&path, bytes)?;
		Ok(())
	}
}

/// Keeps encoded chunks in memory. Can be told to fail writes, to exercise retry paths.
#[derive(Default)]
pub struct MemoryStore {
	chunks: Mutex<HashMap<ColumnCoord, Vec<u8>>>,
	failing: AtomicBool,
}

impl MemoryStore {
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::Relaxed);
	}

	pub fn contains(&self, coordinate: &ColumnCoord) -> bool {
		self.chunks
			.lock()
			.map(|chunks| chunks.contains_key(coordinate))
			.unwrap_or(false)
	}

	pub fn len(&self) -> usize {
		self.chunks.lock().map(|chunks| chunks.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl ChunkStore for MemoryStore {
	fn load(&self, coordinate: &ColumnCoord) -> Result<Option<SaveData>, Error> {
		let chunks = self.chunks.lock().map_err(|_| Error::Unavailable)?;
		match chunks.get(coordinate) {
			Some(bytes) => Ok(Some(
				SaveData::decode(bytes).map_err(|err| Error::Decode(*coordinate, err))?,
			)),
			None => Ok(None),
		}
	}

	fn save(&self, save: &SaveData) -> Result<(), Error> {
		if self.failing.load(Ordering::Relaxed) {
			return Err(Error::Unavailable);
		}
		let bytes = save
			.encode()
			.map_err(|err| Error::Encode(save.coordinate, err))?;
		let mut chunks = self.chunks.lock().map_err(|_| Error::Unavailable)?;
		chunks.insert(save.coordinate, bytes);
		Ok(())
	}
}

impl<T: ChunkStore + ?Sized> ChunkStore for std::sync::Arc<T> {
	fn load(&self, coordinate: &ColumnCoord) -> Result<Option<SaveData>, Error> {
		(**self).load(coordinate)
	}

	fn save(&self, save: &SaveData) -> Result<(), Error> {
		(**self).save(save)
	}
}

#[cfg(test)]
mod storage {
	use super::*;
	use crate::common::world::chunk::{ChunkData, State};

	fn save_at(x: i64, y: i64) -> SaveData {
		SaveData::new(ColumnCoord::new(x, y), State::Populated, &ChunkData::new(16), vec![])
	}

	#[test]
	fn disk_store_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = DiskStore::new(dir.path());
		let coordinate = ColumnCoord::new(-3, 7);
		assert!(store.load(&coordinate).unwrap().is_none());
		let save = save_at(-3, 7);
		store.save(&save).unwrap();
		assert!(dir.path().join("chunks").join("-3.7.bin").exists());
		assert_eq!(store.load(&coordinate).unwrap(), Some(save));
	}

	#[test]
	fn disk_store_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("chunks")).unwrap();
		std::fs::write(dir.path().join("chunks").join("0.0.bin"), [1u8, 2, 3]).unwrap();
		let store = DiskStore::new(dir.path());
		assert!(matches!(
			store.load(&ColumnCoord::new(0, 0)),
			Err(Error::Decode(_, _))
		));
	}

	#[test]
	fn memory_store_can_fail() {
		let store = MemoryStore::default();
		store.set_failing(true);
		assert!(store.save(&save_at(0, 0)).is_err());
		assert!(store.is_empty());
		store.set_failing(false);
		store.save(&save_at(0, 0)).unwrap();
		assert!(store.contains(&ColumnCoord::new(0, 0)));
	}
}
