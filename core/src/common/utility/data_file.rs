use anyhow::Result;
use std::path::{Path, PathBuf};

/// A settings-like file which lives in some parent directory under a fixed name.
pub trait DataFile {
	fn file_name() -> &'static str;

	fn make_path(parent_dir: &Path) -> PathBuf {
		let mut path = parent_dir.to_owned();
		path.push(Self::file_name());
		path
	}

	fn save(&self, parent_dir: &Path) -> Result<()> {
		if !parent_dir.exists() {
			std::fs::create_dir_all(&parent_dir)?;
		}
		self.save_to(&Self::make_path(&parent_dir))?;
		Ok(())
	}

	fn load(parent_dir: &Path) -> Result<Self>
	where
		Self: Sized,
	{
		Self::load_from(&Self::make_path(&parent_dir))
	}

	/// Loads the file if it exists (otherwise uses the defaults),
	/// and then writes the result back so new fields show up on disk.
	fn load_or_default(parent_dir: &Path) -> Result<Self>
	where
		Self: Sized + Default,
	{
		let path = Self::make_path(&parent_dir);
		let value = match path.exists() {
			true => Self::load_from(&path)?,
			false => Self::default(),
		};
		value.save(&parent_dir)?;
		Ok(value)
	}

	fn save_to(&self, file_path: &Path) -> Result<()>;

	fn load_from(file_path: &Path) -> Result<Self>
	where
		Self: Sized;
}
