//! Headless demo: one server and one client terrain connected in-process,
//! with the viewer walking east in a straight line.
//!
//! Arguments:
//! - `-data=<dir>` where settings and chunk saves live (default `./saves/demo`)
//! - `-frames=<n>` how many frames to simulate (default 600)

use anyhow::Result;
use nalgebra::Point3;
use std::{path::PathBuf, sync::Arc, time::Duration};
use terrain_stream::{
	block::{Block, Lookup},
	client::{self, network::Connection},
	common::{
		network::link,
		utility::DataFile,
		world::{
			chunk::State,
			generator::{Flat, Scatter},
		},
	},
	graphics::voxel::Renderer,
	logging,
	server::{self, network::Session, world::storage::DiskStore},
};

static LOG: &'static str = "demo";

const FRAME: Duration = Duration::from_millis(16);
const VIEWER: server::world::ViewerId = 0;

fn arg(name: &str) -> Option<String> {
	let prefix = format!("-{}=", name);
	std::env::args().find_map(|arg| arg.strip_prefix(&prefix).map(|s| s.to_owned()))
}

fn main() -> Result<()> {
	logging::init(log::LevelFilter::Info)?;

	let data_dir = match arg("data") {
		Some(dir) => PathBuf::from(dir),
		None => {
			let mut dir = std::env::current_dir()?;
			dir.push("saves");
			dir.push("demo");
			dir
		}
	};
	let frames = arg("frames")
		.and_then(|frames| frames.parse::<usize>().ok())
		.unwrap_or(600);

	let server_settings = server::world::Settings::load_or_default(&data_dir)?;
	let client_settings = client::world::Settings::load_or_default(&data_dir)?;
	log::info!(target: LOG, "Using world seed {:?} in {}", server_settings.seed(), data_dir.display());

	let lookup = Arc::new(Lookup::classic());
	let flower = lookup.lookup_value("flower").unwrap_or_default();
	let glass = lookup.lookup_value("glass").unwrap_or_default();
	let generator = Flat::classic(&lookup, server_settings.seed_value());
	let surface = generator.surface() as i64;
	let server = server::world::Terrain::new(
		server_settings,
		lookup.clone(),
		Box::new(DiskStore::new(&data_dir)),
		Box::new(generator),
		Box::new(Scatter {
			block: flower,
			per_column: 4,
		}),
	);
	server.start()?;

	let mut position = Point3::new(8.0, 8.0, surface as f64 + 2.0);
	server.add_viewer(VIEWER, position, client_settings.view_radius)?;
	let (client_end, server_end) = link();
	let sessions = vec![Session::new(VIEWER, server_end)];
	let connection = Connection::new(client_end);

	let client = client::world::Terrain::new(client_settings.clone(), lookup.clone(), position);
	client.start()?;
	let mut renderer = Renderer::new(lookup.clone(), &client_settings)?;

	for frame_index in 0..frames {
		position.x += 0.25;
		server.move_viewer(VIEWER, position)?;
		client.move_viewer(position);

		connection.pump(&client)?;
		for session in sessions.iter() {
			session.pump(&server)?;
		}
		server::network::broadcast(&sessions, server.drain_changes())?;
		connection.pump(&client)?;

		if frame_index % 120 == 60 {
			let point = Point3::new(position.x as i64, position.y as i64 + 2, surface);
			server.submit(point, Block::new(glass));
		}
		for update in server.tick() {
			log::trace!(target: LOG, "Update {} due at {:?}", update.kind, update.point);
		}

		let frame = renderer.update(&client, &position)?;
		if frame_index % 60 == 0 {
			let server_stats = server.stats();
			let client_stats = client.stats();
			log::info!(
				target: LOG,
				"frame {}: server resident={} sendable={} | client resident={} waiting={} outstanding={} | draw opaque={} translucent={} visible={} meshing={}",
				frame_index,
				server_stats.resident,
				server_stats.in_state(State::Sendable),
				client_stats.resident,
				client_stats.placeholders,
				client_stats.outstanding,
				frame.opaque.len(),
				frame.translucent.len(),
				frame.visible_sections,
				frame.jobs_in_flight,
			);
		}
		std::thread::sleep(FRAME);
	}

	client.shutdown();
	let saved = server.shutdown()?;
	log::info!(target: LOG, "Demo finished, {} chunks saved", saved);
	Ok(())
}
