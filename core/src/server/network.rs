//! [SERVER ONLY] Chunk streaming for connected clients.

use crate::{
	common::network::{Endpoint, Error, Packet},
	common::world::ColumnCoord,
	server::world::{Terrain, ViewerId},
};

static LOG: &'static str = "server-terrain";

/// One connected client: answers its chunk requests and forwards block changes to it.
pub struct Session {
	viewer: ViewerId,
	endpoint: Endpoint,
}

impl Session {
	pub fn new(viewer: ViewerId, endpoint: Endpoint) -> Self {
		Self { viewer, endpoint }
	}

	pub fn viewer(&self) -> ViewerId {
		self.viewer
	}

	/// Answers every request which has arrived, returning how many were answered with chunk data.
	#[profiling::function]
	pub fn pump(&self, terrain: &Terrain) -> Result<usize, Error> {
		let mut sent = 0;
		for packet in self.endpoint.drain()? {
			match packet {
				Packet::RequestChunk { x, y } => {
					let response = terrain.handle_request(self.viewer, &ColumnCoord::new(x, y));
					if let Packet::SendChunk { .. } = response {
						sent += 1;
					}
					self.endpoint.send(&response)?;
				}
				other => {
					log::warn!(target: LOG, "Viewer {} sent an unexpected packet {:?}", self.viewer, other);
				}
			}
		}
		Ok(sent)
	}

	pub fn send(&self, packet: &Packet) -> Result<(), Error> {
		self.endpoint.send(packet)
	}
}

/// Delivers viewer-addressed packets (from [`Terrain::drain_changes`]) to the matching sessions.
pub fn broadcast(sessions: &[Session], packets: Vec<(ViewerId, Packet)>) -> Result<(), Error> {
	for (viewer, packet) in packets {
		for session in sessions.iter().filter(|session| session.viewer == viewer) {
			session.send(&packet)?;
		}
	}
	Ok(())
}
