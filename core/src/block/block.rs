use super::{LookupId, AIR};
use serde::{Deserialize, Serialize};

/// A single voxel: its type in the [`Lookup`](super::Lookup) and a type-specific data byte.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Default, Serialize, Deserialize)]
pub struct Block {
	pub id: LookupId,
	pub data: u8,
}

impl Block {
	pub const AIR: Block = Block { id: AIR, data: 0 };

	pub fn new(id: LookupId) -> Self {
		Self { id, data: 0 }
	}

	pub fn with_data(id: LookupId, data: u8) -> Self {
		Self { id, data }
	}

	pub fn is_air(&self) -> bool {
		self.id == AIR
	}
}

impl std::fmt::Display for Block {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Block({}:{})", self.id, self.data)
	}
}
