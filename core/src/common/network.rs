//! The chunk streaming packets exchanged between server and client terrain,
//! and an in-process byte channel which carries them.

use crate::{
	block::{Block, LookupId},
	common::world::{BlockPoint, ColumnCoord},
};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("the other end of the connection is gone")]
	Disconnected,
	#[error("failed to encode packet")]
	Encode(#[source] bincode::Error),
	#[error("failed to decode packet")]
	Decode(#[source] bincode::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
	/// Client to server: asks for a column.
	/// Server to client: "not available yet", the client should ask again later.
	RequestChunk { x: i64, y: i64 },
	/// Server to client: an encoded [`SaveData`](crate::common::world::chunk::SaveData).
	SendChunk { x: i64, y: i64, data: Vec<u8> },
	BlockChange {
		x: i64,
		y: i64,
		z: i64,
		id: LookupId,
		data: u8,
	},
	BlockChangeAir { x: i64, y: i64, z: i64 },
}

impl Packet {
	pub fn request(column: &ColumnCoord) -> Self {
		Self::RequestChunk {
			x: column.x,
			y: column.y,
		}
	}

	/// The packet describing a block change, using the compact form for air.
	pub fn block_change(point: &BlockPoint, block: Block) -> Self {
		match block.is_air() {
			true => Self::BlockChangeAir {
				x: point.x,
				y: point.y,
				z: point.z,
			},
			false => Self::BlockChange {
				x: point.x,
				y: point.y,
				z: point.z,
				id: block.id,
				data: block.data,
			},
		}
	}

	pub fn encode(&self) -> Result<Vec<u8>, Error> {
		bincode::serialize(self).map_err(Error::Encode)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
		bincode::deserialize(bytes).map_err(Error::Decode)
	}
}

/// One end of an in-process connection. Packets travel as encoded bytes.
#[derive(Clone)]
pub struct Endpoint {
	send: crossbeam_channel::Sender<Vec<u8>>,
	recv: crossbeam_channel::Receiver<Vec<u8>>,
}

/// Creates a connected pair of endpoints.
pub fn link() -> (Endpoint, Endpoint) {
	let (a_send, b_recv) = crossbeam_channel::unbounded();
	let (b_send, a_recv) = crossbeam_channel::unbounded();
	(
		Endpoint {
			send: a_send,
			recv: a_recv,
		},
		Endpoint {
			send: b_send,
			recv: b_recv,
		},
	)
}

impl Endpoint {
	pub fn send(&self, packet: &Packet) -> Result<(), Error> {
		let bytes = packet.encode()?;
		self.send.send(bytes).map_err(|_| Error::Disconnected)
	}

	/// The next packet if one has arrived.
	pub fn try_recv(&self) -> Result<Option<Packet>, Error> {
		match self.recv.try_recv() {
			Ok(bytes) => Ok(Some(Packet::decode(&bytes)?)),
			Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
			Err(crossbeam_channel::TryRecvError::Disconnected) => Err(Error::Disconnected),
		}
	}

	/// Every packet which has already arrived, without waiting.
	pub fn drain(&self) -> Result<Vec<Packet>, Error> {
		let mut packets = Vec::new();
		while let Some(packet) = self.try_recv()? {
			packets.push(packet);
		}
		Ok(packets)
	}
}
