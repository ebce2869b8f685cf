//! Console logging for the demo binary.

use std::io::Write;

/// Installs the console logger. `RUST_LOG` overrides `default_level`
/// (e.g. `RUST_LOG=chunk-loading=trace`).
pub fn init(default_level: log::LevelFilter) -> anyhow::Result<()> {
	env_logger::Builder::new()
		.target(env_logger::Target::Stdout)
		.filter_level(default_level)
		.parse_env("RUST_LOG")
		.format(|buf, record| {
			writeln!(
				buf,
				"[{}][{}][{}] {}",
				chrono::Local::now().format("%H:%M:%S%.3f"),
				record.level(),
				record.target(),
				record.args()
			)
		})
		.try_init()?;
	Ok(())
}
