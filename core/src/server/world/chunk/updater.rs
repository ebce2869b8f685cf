use crate::{
	block::Block,
	common::{
		utility::{spawn_thread, ThreadHandle},
		world::{column_of, local_of, BlockPoint, Error},
	},
	server::world::Context,
};
use crossbeam_channel::{select, Receiver, Sender};
use std::{sync::Arc, time::Duration};

/// The log category for the block-change updater thread.
static LOG: &'static str = "chunk-updater";

/// A queued request to put a block somewhere in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCommand {
	pub point: BlockPoint,
	pub block: Block,
}

/// A block change which was applied to a resident chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
	pub point: BlockPoint,
	pub previous: Block,
	pub block: Block,
}

/// Applies one command under the target chunk's write lock.
/// Returns `None` when the block was already what the command asked for.
pub(crate) fn apply(context: &Context, command: &BlockCommand) -> Result<Option<BlockChange>, Error> {
	let column = column_of(&command.point);
	let chunk = context
		.cache
		.get(&column)
		.ok_or(Error::ChunkNotLoaded(column))?;
	let previous = chunk.write()?.set(&local_of(&command.point), command.block)?;
	Ok((previous != command.block).then(|| BlockChange {
		point: command.point,
		previous,
		block: command.block,
	}))
}

/// Applies a command and publishes the resulting change.
/// Failures are logged and the command is dropped; the queue keeps moving.
pub(crate) fn process(context: &Context, command: &BlockCommand, changes: &Sender<BlockChange>) -> bool {
	match apply(context, command) {
		Ok(Some(change)) => {
			log::trace!(target: LOG, "{:?} {} -> {}", change.point, change.previous, change.block);
			let _ = changes.send(change);
			true
		}
		Ok(None) => false,
		Err(err) => {
			log::warn!(target: LOG, "Dropping block change at {:?}: {}", command.point, err);
			false
		}
	}
}

/// Begins the updater thread: the only consumer of the command queue,
/// so commands are applied strictly in the order they were submitted.
pub(crate) fn start(
	context: Arc<Context>,
	commands: Receiver<BlockCommand>,
	changes: Sender<BlockChange>,
) -> anyhow::Result<ThreadHandle> {
	let join_timeout = Duration::from_millis(context.settings.join_timeout_ms);
	let (waker, wake) = crossbeam_channel::bounded::<()>(1);
	let handle = spawn_thread(LOG, join_timeout, move |stop| {
		log::info!(target: LOG, "Starting chunk-updater thread");
		while !stop.is_stopped() {
			select! {
				recv(commands) -> command => match command {
					Ok(command) => {
						profiling::scope!("apply-block-change");
						process(&context, &command, &changes);
					}
					Err(_) => {
						log::debug!(target: LOG, "Disconnected from block command channel");
						break;
					}
				},
				recv(wake) -> _ => {},
			}
		}
		log::info!(target: LOG, "Ending chunk-updater thread");
		Ok(())
	})?;
	Ok(handle.with_waker(waker))
}
