//! [CLIENT ONLY] Carries chunk requests to the server and its answers back into the terrain.

use crate::{
	client::world::Terrain,
	common::network::{Endpoint, Error},
};

static LOG: &'static str = "client-terrain";

/// The client's end of the connection to the server.
pub struct Connection {
	endpoint: Endpoint,
}

impl Connection {
	pub fn new(endpoint: Endpoint) -> Self {
		Self { endpoint }
	}

	/// Sends queued requests, then applies everything the server has sent.
	/// Returns how many packets were received.
	#[profiling::function]
	pub fn pump(&self, terrain: &Terrain) -> Result<usize, Error> {
		for request in terrain.drain_requests() {
			self.endpoint.send(&request)?;
		}
		let packets = self.endpoint.drain()?;
		let count = packets.len();
		for packet in packets {
			if let Err(err) = terrain.receive(packet) {
				log::error!(target: LOG, "Failed to apply packet: {}", err);
			}
		}
		Ok(count)
	}
}
