use super::Material;
use std::collections::HashMap;

pub type LookupId = u16;

/// The lookup id reserved for empty space.
pub const AIR: LookupId = 0;

/// A mapping of block name to unsigned integer (and back)
/// for storing block types compactly in chunk arrays and network packets.
///
/// Index 0 is always [`AIR`].
pub struct Lookup {
	materials: Vec<Material>,
	id_values: HashMap<String, LookupId>,
	air: Material,
}

impl Default for Lookup {
	fn default() -> Self {
		let air = Material::air();
		let mut lookup = Self {
			materials: Vec::new(),
			id_values: HashMap::new(),
			air: air.clone(),
		};
		lookup.push(air);
		lookup
	}
}

impl Lookup {
	/// The block set used by the flat generator and the demo.
	pub fn classic() -> Self {
		let mut lookup = Self::default();
		lookup.push(Material::solid("bedrock"));
		lookup.push(Material::solid("stone"));
		lookup.push(Material::solid("dirt"));
		lookup.push(Material::solid("grass"));
		lookup.push(Material::translucent("glass"));
		lookup.push(Material::translucent("water"));
		lookup.push(Material::decoration("flower"));
		lookup
	}

	/// Registers a material, returning its id.
	/// Registering a name twice replaces the earlier material in place.
	pub fn push(&mut self, material: Material) -> LookupId {
		if let Some(&id) = self.id_values.get(&material.name) {
			self.materials[id as usize] = material;
			return id;
		}
		let value = self.materials.len() as LookupId;
		self.id_values.insert(material.name.clone(), value);
		self.materials.push(material);
		value
	}

	pub fn count(&self) -> usize {
		self.materials.len()
	}

	pub fn lookup_value(&self, name: &str) -> Option<LookupId> {
		self.id_values.get(name).copied()
	}

	/// Unknown ids resolve to air so that stale data never panics the mesher.
	pub fn material(&self, id: LookupId) -> &Material {
		self.materials.get(id as usize).unwrap_or(&self.air)
	}

	pub fn is_opaque(&self, id: LookupId) -> bool {
		self.material(id).opaque
	}
}
