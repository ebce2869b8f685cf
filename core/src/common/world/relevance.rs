use crate::common::world::{coordinate_order, distance_sq, ColumnCoord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A circular area of columns around a viewer.
#[derive(PartialEq, Eq, Serialize, Deserialize, Clone)]
pub struct Area(ColumnCoord, u64);

impl std::fmt::Debug for Area {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "<{}, {}>r{}", self.0.x, self.0.y, self.1)
	}
}

impl Area {
	pub fn new(center: ColumnCoord, radius: u64) -> Self {
		Self(center, radius)
	}

	pub fn center(&self) -> &ColumnCoord {
		&self.0
	}

	pub fn radius(&self) -> u64 {
		self.1
	}

	/// The largest squared distance still inside the area once it is widened by `extension` columns.
	fn limit_sq(&self, extension: f64) -> i64 {
		let reach = (self.1 as f64 + extension).max(0.0);
		(reach * reach).floor() as i64
	}

	/// Whether the column is inside the area, widened by `extension`.
	///
	/// A fractional extension lets the diagonal and edge columns of the circle qualify
	/// a little before they otherwise would, so they do not flicker in and out of the set.
	pub fn is_relevant(&self, column: &ColumnCoord, extension: f64) -> bool {
		distance_sq(column, &self.0) <= self.limit_sq(extension)
	}

	/// Every column inside the area, in no particular order.
	pub fn columns(&self, extension: f64) -> impl Iterator<Item = ColumnCoord> + '_ {
		let span = (self.1 as f64 + extension.max(0.0)).ceil() as i64;
		let limit = self.limit_sq(extension);
		let center = self.0;
		(-span..=span).flat_map(move |dy| {
			(-span..=span).filter_map(move |dx| {
				(dx * dx + dy * dy <= limit).then(|| ColumnCoord::new(center.x + dx, center.y + dy))
			})
		})
	}
}

/// The union of the areas of every viewer.
#[derive(PartialEq, Eq, Serialize, Deserialize, Clone, Default)]
pub struct Relevance(Vec<Area>);

impl std::fmt::Debug for Relevance {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Relevance({:?})", self.0)
	}
}

impl Relevance {
	pub fn push(&mut self, area: Area) {
		self.0.push(area);
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn is_relevant(&self, column: &ColumnCoord, extension: f64) -> bool {
		self.0.iter().any(|area| area.is_relevant(column, extension))
	}

	/// Returns the minimum significant distance squared by
	/// comparing the provided column against the center of each area in the group.
	pub fn min_sig_dist_sq(&self, column: &ColumnCoord) -> i64 {
		self.0
			.iter()
			.map(|area| distance_sq(column, &area.0))
			.min()
			.unwrap_or(i64::MAX)
	}

	/// Nearest first; equal distances fall back to coordinate order so the result is reproducible.
	#[profiling::function]
	pub fn sort_vec_by_sig_dist(&self, columns: &mut Vec<ColumnCoord>) {
		columns.sort_by(|a, b| {
			self.min_sig_dist_sq(a)
				.cmp(&self.min_sig_dist_sq(b))
				.then_with(|| coordinate_order(a, b))
		});
	}

	/// The deduplicated set of columns which should be resident, nearest first.
	#[profiling::function]
	pub fn required_set(&self, extension: f64) -> Vec<ColumnCoord> {
		let mut seen = HashSet::new();
		let mut columns = self
			.0
			.iter()
			.flat_map(|area| area.columns(extension))
			.filter(|column| seen.insert(*column))
			.collect::<Vec<_>>();
		self.sort_vec_by_sig_dist(&mut columns);
		columns
	}
}

#[cfg(test)]
mod relevance {
	use super::*;

	#[test]
	fn area_is_circular() {
		let area = Area::new(ColumnCoord::new(0, 0), 2);
		assert!(area.is_relevant(&ColumnCoord::new(2, 0), 0.0));
		assert!(area.is_relevant(&ColumnCoord::new(1, 1), 0.0));
		assert!(!area.is_relevant(&ColumnCoord::new(2, 1), 0.0));
		assert!(!area.is_relevant(&ColumnCoord::new(2, 2), 0.0));
		// 2.5^2 = 6.25 admits (2, 1) but not the corner
		assert!(area.is_relevant(&ColumnCoord::new(2, 1), 0.5));
		assert!(!area.is_relevant(&ColumnCoord::new(2, 2), 0.5));
	}

	#[test]
	fn columns_match_is_relevant() {
		let area = Area::new(ColumnCoord::new(5, -3), 3);
		let columns = area.columns(0.5).collect::<HashSet<_>>();
		for y in -10..4 {
			for x in -2..12 {
				let column = ColumnCoord::new(x, y);
				assert_eq!(columns.contains(&column), area.is_relevant(&column, 0.5));
			}
		}
	}

	#[test]
	fn required_set_is_nearest_first() {
		let mut relevance = Relevance::default();
		relevance.push(Area::new(ColumnCoord::new(0, 0), 4));
		let required = relevance.required_set(0.5);
		assert_eq!(required[0], ColumnCoord::new(0, 0));
		for pair in required.windows(2) {
			let (a, b) = (&pair[0], &pair[1]);
			let (da, db) = (relevance.min_sig_dist_sq(a), relevance.min_sig_dist_sq(b));
			assert!(da < db || (da == db && coordinate_order(a, b).is_lt()));
		}
	}

	#[test]
	fn union_is_deduplicated() {
		let mut relevance = Relevance::default();
		relevance.push(Area::new(ColumnCoord::new(0, 0), 1));
		relevance.push(Area::new(ColumnCoord::new(1, 0), 1));
		let required = relevance.required_set(0.0);
		let unique = required.iter().collect::<HashSet<_>>();
		assert_eq!(unique.len(), required.len());
		// two plus-shapes of 5 overlapping on 2 columns
		assert_eq!(required.len(), 8);
		assert_eq!(relevance.min_sig_dist_sq(&ColumnCoord::new(2, 0)), 1);
	}

	#[test]
	fn empty_relevance_requires_nothing() {
		assert!(Relevance::default().required_set(1.0).is_empty());
		assert!(!Relevance::default().is_relevant(&ColumnCoord::new(0, 0), 1.0));
	}
}
