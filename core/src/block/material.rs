/// How a block type takes part in meshing and lighting.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Material {
	pub name: String,
	/// Blocks sunlight and counts towards section solidity.
	pub opaque: bool,
	/// Faces go into the alpha batch instead of the opaque batch.
	pub translucent: bool,
	/// A face between two blocks is only emitted when the neighbour's stage is strictly lower.
	pub connect_stage: u8,
	/// Dropped entirely from far level-of-detail meshes.
	pub detail: bool,
}

impl Material {
	pub fn air() -> Self {
		Self {
			name: "air".to_owned(),
			opaque: false,
			translucent: false,
			connect_stage: 0,
			detail: false,
		}
	}

	pub fn solid(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			opaque: true,
			translucent: false,
			connect_stage: 3,
			detail: false,
		}
	}

	pub fn translucent(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			opaque: false,
			translucent: true,
			connect_stage: 2,
			detail: false,
		}
	}

	/// Small see-through decorations (flowers, grass tufts).
	pub fn decoration(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			opaque: false,
			translucent: false,
			connect_stage: 1,
			detail: true,
		}
	}
}
