use serde::{Deserialize, Serialize};

/// How much context is safely available for a chunk.
///
/// States only move forward, except for the regressions allowed by [`State::allows`]
/// which happen when neighbouring columns disappear.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
	/// Generated or deserialized, but neighbours may be missing.
	New = 0,
	/// All 8 neighbours exist; waiting for a population slot.
	ShouldPopulate,
	/// The population pass is running (under the chunk write lock).
	Populating,
	/// Population and sunlight are done.
	Populated,
	/// Populated with all 8 neighbours present, but some are not populated yet.
	Border,
	/// All 8 neighbours are populated; safe to light and mesh.
	Loaded,
	/// All 8 neighbours are loaded; safe to send to a client.
	Sendable,
}

impl State {
	pub const ALL: [State; 7] = [
		State::New,
		State::ShouldPopulate,
		State::Populating,
		State::Populated,
		State::Border,
		State::Loaded,
		State::Sendable,
	];

	pub fn from_u8(value: u8) -> Option<Self> {
		Self::ALL.get(value as usize).copied()
	}

	/// True once the chunk holds its final voxel content.
	pub fn is_populated(&self) -> bool {
		*self >= State::Populated
	}

	/// Whether moving from `self` to `next` is a legal step.
	pub fn allows(&self, next: State) -> bool {
		use State::*;
		match (*self, next) {
			(a, b) if a == b => true,
			(New, ShouldPopulate)
			| (ShouldPopulate, Populating)
			| (Populating, Populated)
			| (Populated, Border)
			| (Border, Loaded)
			| (Loaded, Sendable) => true,
			// neighbour loss
			(Loaded, Border) | (Sendable, Border) | (Sendable, Loaded) => true,
			_ => false,
		}
	}

	/// The next state of a populated chunk given the states of its 8 neighbours
	/// (`None` for a neighbour which does not exist).
	///
	/// Returns `self` when no step applies. Chunks which are not yet populated are left alone;
	/// their transitions are driven by the loader.
	pub fn settle(&self, neighbors: &[Option<State>; 8]) -> State {
		use State::*;
		if !self.is_populated() {
			return *self;
		}
		let all_exist = neighbors.iter().all(Option::is_some);
		if !all_exist {
			return match *self {
				Loaded | Sendable => Border,
				other => other,
			};
		}
		let all_at_least = |min: State| neighbors.iter().all(|n| matches!(n, Some(s) if *s >= min));
		match *self {
			Populated => Border,
			Border if all_at_least(Populated) => Loaded,
			Loaded if all_at_least(Loaded) => Sendable,
			Loaded if !all_at_least(Populated) => Border,
			Sendable if all_at_least(Loaded) => Sendable,
			Sendable if all_at_least(Populated) => Loaded,
			Sendable => Border,
			other => other,
		}
	}
}

impl std::fmt::Display for State {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		std::fmt::Debug::fmt(self, f)
	}
}

#[cfg(test)]
mod state {
	use super::State::{self, *};

	fn ring(state: Option<State>) -> [Option<State>; 8] {
		[state; 8]
	}

	fn settle_fully(mut state: State, neighbors: &[Option<State>; 8]) -> State {
		loop {
			let next = state.settle(neighbors);
			assert!(state.allows(next), "{:?} -> {:?}", state, next);
			if next == state {
				return state;
			}
			state = next;
		}
	}

	#[test]
	fn forward_only() {
		for (i, from) in State::ALL.iter().enumerate() {
			for to in State::ALL.iter().skip(i + 2) {
				assert!(!from.allows(*to), "{:?} -> {:?}", from, to);
			}
		}
	}

	#[test]
	fn regressions_are_limited() {
		let regressions = State::ALL
			.iter()
			.flat_map(|from| State::ALL.iter().map(move |to| (*from, *to)))
			.filter(|(from, to)| to < from && from.allows(*to))
			.collect::<Vec<_>>();
		assert_eq!(
			regressions,
			vec![(Loaded, Border), (Sendable, Border), (Sendable, Loaded)]
		);
	}

	#[test]
	fn from_u8_round_trip() {
		for state in State::ALL.iter() {
			assert_eq!(State::from_u8(*state as u8), Some(*state));
		}
		assert_eq!(State::from_u8(7), None);
	}

	#[test]
	fn unpopulated_is_untouched() {
		assert_eq!(New.settle(&ring(Some(Sendable))), New);
		assert_eq!(ShouldPopulate.settle(&ring(Some(Sendable))), ShouldPopulate);
	}

	#[test]
	fn sendable_requires_loaded_neighbors() {
		assert_eq!(settle_fully(Populated, &ring(Some(Loaded))), Sendable);
		assert_eq!(settle_fully(Populated, &ring(Some(Populated))), Loaded);
		assert_eq!(settle_fully(Populated, &ring(Some(New))), Border);
	}

	#[test]
	fn missing_neighbor_stalls_at_populated() {
		let mut neighbors = ring(Some(Sendable));
		neighbors[3] = None;
		assert_eq!(settle_fully(Populated, &neighbors), Populated);
	}

	#[test]
	fn neighbor_loss_regresses_to_border() {
		let mut neighbors = ring(Some(Sendable));
		neighbors[7] = None;
		assert_eq!(Sendable.settle(&neighbors), Border);
		assert_eq!(Loaded.settle(&neighbors), Border);
		assert_eq!(settle_fully(Sendable, &neighbors), Border);
	}

	#[test]
	fn neighbor_demotion_regresses_one_step() {
		let mut neighbors = ring(Some(Sendable));
		neighbors[0] = Some(Border);
		assert_eq!(Sendable.settle(&neighbors), Loaded);
		assert_eq!(settle_fully(Sendable, &neighbors), Loaded);
	}
}
