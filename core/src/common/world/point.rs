use nalgebra::{Point2, Point3};
use std::cmp::Ordering;

/// Width and depth of a chunk column, in blocks.
pub const CHUNK_SIZE: usize = 16;
/// Height of a render/mesh section, in blocks.
pub const SECTION_HEIGHT: usize = 16;

const SIZE_I: i64 = CHUNK_SIZE as i64;

/// Integer `(cx, cy)` coordinate of a chunk column.
pub type ColumnCoord = Point2<i64>;
/// Integer world-space block coordinate. `z` is up.
pub type BlockPoint = Point3<i64>;

/// Offsets of the 8 columns surrounding a column, ordered row by row.
pub const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
	(-1, -1),
	(0, -1),
	(1, -1),
	(-1, 0),
	(1, 0),
	(-1, 1),
	(0, 1),
	(1, 1),
];

pub fn neighbors(coordinate: &ColumnCoord) -> [ColumnCoord; 8] {
	NEIGHBOR_OFFSETS.map(|(x, y)| ColumnCoord::new(coordinate.x + x, coordinate.y + y))
}

/// The column containing a world block coordinate.
pub fn column_of(point: &BlockPoint) -> ColumnCoord {
	ColumnCoord::new(point.x.div_euclid(SIZE_I), point.y.div_euclid(SIZE_I))
}

/// The column containing a world-space position (e.g. a viewer or entity).
pub fn column_of_position(position: &Point3<f64>) -> ColumnCoord {
	let size = CHUNK_SIZE as f64;
	ColumnCoord::new(
		(position.x / size).floor() as i64,
		(position.y / size).floor() as i64,
	)
}

/// Converts a world block coordinate into an offset inside its column.
/// `x` and `y` are always in `0..CHUNK_SIZE`; `z` is unchanged.
pub fn local_of(point: &BlockPoint) -> BlockPoint {
	BlockPoint::new(point.x.rem_euclid(SIZE_I), point.y.rem_euclid(SIZE_I), point.z)
}

pub fn to_world(column: &ColumnCoord, local: &BlockPoint) -> BlockPoint {
	BlockPoint::new(
		column.x * SIZE_I + local.x,
		column.y * SIZE_I + local.y,
		local.z,
	)
}

/// Squared euclidean distance between two columns.
pub fn distance_sq(a: &ColumnCoord, b: &ColumnCoord) -> i64 {
	let offset = a - b;
	offset.x * offset.x + offset.y * offset.y
}

/// The total order used wherever several chunks are locked at once or ties need a deterministic winner.
pub fn coordinate_order(a: &ColumnCoord, b: &ColumnCoord) -> Ordering {
	(a.x, a.y).cmp(&(b.x, b.y))
}

#[cfg(test)]
mod point {
	use super::*;

	#[test]
	fn column_of_positive() {
		assert_eq!(column_of(&BlockPoint::new(17, 19, 4)), ColumnCoord::new(1, 1));
		assert_eq!(local_of(&BlockPoint::new(17, 19, 4)), BlockPoint::new(1, 3, 4));
	}

	#[test]
	fn column_of_negative() {
		assert_eq!(column_of(&BlockPoint::new(-1, 0, 0)), ColumnCoord::new(-1, 0));
		assert_eq!(local_of(&BlockPoint::new(-1, 0, 0)), BlockPoint::new(15, 0, 0));
		assert_eq!(column_of(&BlockPoint::new(-16, -17, 0)), ColumnCoord::new(-1, -2));
		assert_eq!(local_of(&BlockPoint::new(-16, -17, 0)), BlockPoint::new(0, 15, 0));
	}

	#[test]
	fn world_round_trip() {
		let point = BlockPoint::new(-33, 47, 12);
		assert_eq!(to_world(&column_of(&point), &local_of(&point)), point);
	}

	#[test]
	fn position_floors() {
		assert_eq!(
			column_of_position(&Point3::new(-0.5, 15.9, 3.0)),
			ColumnCoord::new(-1, 0)
		);
	}

	#[test]
	fn neighbors_exclude_center() {
		let center = ColumnCoord::new(3, 4);
		let around = neighbors(&center);
		assert!(!around.contains(&center));
		assert!(around.iter().all(|n| distance_sq(n, &center) <= 2));
	}
}
