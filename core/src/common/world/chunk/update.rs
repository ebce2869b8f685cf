use crate::common::world::BlockPoint;
use serde::{Deserialize, Serialize};

/// A block update scheduled to run after `delay` ticks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedUpdate {
	/// World-space block the update targets.
	pub point: BlockPoint,
	/// Remaining ticks before the update is due.
	pub delay: u32,
	/// Update-type id, interpreted by gameplay code.
	pub kind: u16,
	/// Set while a tick is in progress, so updates added by that tick wait for the next one.
	#[serde(skip)]
	pub paused: bool,
}

impl DelayedUpdate {
	pub fn new(point: BlockPoint, delay: u32, kind: u16) -> Self {
		Self {
			point,
			delay,
			kind,
			paused: false,
		}
	}

	/// Advances the update by one tick, returning true once it is due.
	/// Paused updates are left untouched.
	pub fn advance(&mut self) -> bool {
		if self.paused {
			return false;
		}
		self.delay = self.delay.saturating_sub(1);
		self.delay == 0
	}
}
