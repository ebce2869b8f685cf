use crossbeam_channel::{Receiver, Sender};
use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread::JoinHandle,
	time::Duration,
};

/// Shared flag a background loop checks between units of work.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
	pub fn is_stopped(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}

	fn request(&self) {
		self.0.store(true, Ordering::Release);
	}
}

/// Owns a named background thread.
/// Dropping the handle (or calling [`stop`](ThreadHandle::stop)) asks the thread to end,
/// and waits at most `join_timeout` for it to do so.
pub struct ThreadHandle {
	name: &'static str,
	stop: StopFlag,
	waker: Option<Sender<()>>,
	finished: Receiver<()>,
	join_handle: Option<JoinHandle<()>>,
	join_timeout: Duration,
}

/// Spawns `body` on a new named thread. Errors returned by the body are logged against the thread's name.
pub fn spawn_thread<F>(
	name: &'static str,
	join_timeout: Duration,
	body: F,
) -> std::io::Result<ThreadHandle>
where
	F: FnOnce(StopFlag) -> anyhow::Result<()> + Send + 'static,
{
	let stop = StopFlag::default();
	let (send_finished, finished) = crossbeam_channel::bounded(1);
	let thread_stop = stop.clone();
	let join_handle = std::thread::Builder::new()
		.name(name.to_owned())
		.spawn(move || {
			if let Err(err) = body(thread_stop) {
				log::error!(target: name, "{:?}", err);
			}
			let _ = send_finished.send(());
		})?;
	Ok(ThreadHandle {
		name,
		stop,
		waker: None,
		finished,
		join_handle: Some(join_handle),
		join_timeout,
	})
}

impl ThreadHandle {
	/// Provides a channel the thread blocks on, so a stop request can wake it immediately.
	pub fn with_waker(mut self, waker: Sender<()>) -> Self {
		self.waker = Some(waker);
		self
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn is_finished(&self) -> bool {
		self.join_handle.is_none() || !self.finished.is_empty()
	}

	/// Requests the thread to stop and waits for it.
	/// Returns false if the thread did not finish within the join timeout (it is then detached).
	pub fn stop(&mut self) -> bool {
		let join_handle = match self.join_handle.take() {
			Some(handle) => handle,
			None => return true,
		};
		self.stop.request();
		if let Some(waker) = &self.waker {
			let _ = waker.try_send(());
		}
		match self.finished.recv_timeout(self.join_timeout) {
			Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
				if join_handle.join().is_err() {
					log::error!(target: self.name, "Thread panicked");
				}
				true
			}
			Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
				log::warn!(
					target: self.name,
					"Thread did not stop within {}ms, detaching",
					self.join_timeout.as_millis()
				);
				false
			}
		}
	}
}

impl Drop for ThreadHandle {
	fn drop(&mut self) {
		let _ = self.stop();
	}
}

#[cfg(test)]
mod thread_handle {
	use super::*;

	#[test]
	fn stops_cooperatively() {
		let (waker, wait) = crossbeam_channel::unbounded::<()>();
		let mut handle = spawn_thread("test-thread", Duration::from_secs(5), move |stop| {
			while !stop.is_stopped() {
				let _ = wait.recv_timeout(Duration::from_secs(10));
			}
			Ok(())
		})
		.unwrap()
		.with_waker(waker);
		assert!(handle.stop());
		assert!(handle.is_finished());
	}

	#[test]
	fn detaches_after_timeout() {
		let (release, wait) = crossbeam_channel::unbounded::<()>();
		let mut handle = spawn_thread("stuck-thread", Duration::from_millis(10), move |_stop| {
			let _ = wait.recv_timeout(Duration::from_secs(5));
			Ok(())
		})
		.unwrap();
		assert!(!handle.stop());
		let _ = release.send(());
	}
}
