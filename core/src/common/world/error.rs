use crate::common::world::{chunk::State, BlockPoint, ColumnCoord};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("a chunk is already present at {0:?}")]
	DuplicateChunk(ColumnCoord),
	#[error("chunk {0:?} is not loaded")]
	ChunkNotLoaded(ColumnCoord),
	#[error("chunk {0:?} is outside of the cached window")]
	OutsideWindow(ColumnCoord),
	#[error("point {0:?} is outside of the chunk")]
	PointOutOfBounds(BlockPoint),
	#[error("invalid chunk state transition from {0:?} to {1:?}")]
	InvalidTransition(State, State),

	#[error("entity {0} already exists")]
	DuplicateEntity(u64),
	#[error("entity {0} was not found")]
	MissingEntity(u64),

	#[error("failed to lock {0}")]
	LockPoisoned(&'static str),

	#[error("malformed chunk save data: {0}")]
	MalformedSaveData(String),
	#[error("failed to encode chunk save data")]
	Encode(#[source] bincode::Error),
	#[error("failed to decode chunk save data")]
	Decode(#[source] bincode::Error),
}
