use enumset::EnumSetType;
use nalgebra::Vector3;

/// One of the six faces of a voxel (and of a section). `Up` is +z, `Back` is +y.
#[derive(Debug, Hash, EnumSetType)]
pub enum Face {
	Right,
	Left,
	Up,
	Down,
	Front,
	Back,
}

impl Face {
	/// The offset to the neighbour this face looks at.
	pub fn direction(&self) -> Vector3<i64> {
		match self {
			Self::Left => Vector3::new(-1, 0, 0),
			Self::Right => Vector3::new(1, 0, 0),
			Self::Front => Vector3::new(0, -1, 0),
			Self::Back => Vector3::new(0, 1, 0),
			Self::Down => Vector3::new(0, 0, -1),
			Self::Up => Vector3::new(0, 0, 1),
		}
	}
}
