// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async store pipeline: a bounded pool of entry buffers, a
//! sort-thread pool that sorts and combines a filled buffer, and a single
//! writer thread that hands the result to [`crate::partition::Partition`].
//! Modeled on `parity-db`'s `table.rs`/`parity-db`'s `column.rs`'s
//! `parking_lot::{Mutex, Condvar}` coordination style rather than channels,
//! so backpressure (producers blocking on `get_empty_buffer`) is explicit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::format::Entry;
use crate::options::PipelineOptions;
use crate::partition::Partition;

struct Shared<E: Entry> {
	empty: Mutex<VecDeque<Vec<E>>>,
	empty_available: Condvar,
	sort_queue: Mutex<VecDeque<Vec<E>>>,
	sort_available: Condvar,
	write_queue: Mutex<VecDeque<Vec<E>>>,
	write_available: Condvar,
	/// Buffers scheduled but not yet written back to the empty pool;
	/// `wait_for_completion` blocks on this reaching zero.
	pending: Mutex<usize>,
	pending_drained: Condvar,
	shutting_down: Mutex<bool>,
	error: Mutex<Option<String>>,
}

/// Producer/consumer handle for the store pipeline. `schedule_unordered`
/// mirrors the buffer back to the empty pool once its sort/write finishes,
/// so a bounded number of buffers circulate regardless of import rate.
pub struct Pipeline<E: Entry> {
	shared: Arc<Shared<E>>,
	sort_threads: Vec<JoinHandle<()>>,
	writer_thread: Option<JoinHandle<()>>,
	buffer_capacity: usize,
}

impl<E: Entry> Pipeline<E> {
	pub fn start(partition: Arc<Partition<E>>, options: &PipelineOptions) -> Pipeline<E> {
		let mut empty = VecDeque::with_capacity(options.num_buffers);
		for _ in 0..options.num_buffers {
			empty.push_back(Vec::with_capacity(options.buffer_capacity));
		}
		let shared = Arc::new(Shared {
			empty: Mutex::new(empty),
			empty_available: Condvar::new(),
			sort_queue: Mutex::new(VecDeque::new()),
			sort_available: Condvar::new(),
			write_queue: Mutex::new(VecDeque::new()),
			write_available: Condvar::new(),
			pending: Mutex::new(0),
			pending_drained: Condvar::new(),
			shutting_down: Mutex::new(false),
			error: Mutex::new(None),
		});

		log::debug!(target: "chesspos_db", "pipeline started: {} buffers x {} entries, {} sort threads", options.num_buffers, options.buffer_capacity, options.num_sort_threads);

		let mut sort_threads = Vec::with_capacity(options.num_sort_threads);
		for _ in 0..options.num_sort_threads {
			let shared = shared.clone();
			sort_threads.push(std::thread::spawn(move || sort_loop(shared)));
		}

		let writer_thread = {
			let shared = shared.clone();
			let partition = partition.clone();
			Some(std::thread::spawn(move || write_loop(shared, partition)))
		};

		Pipeline { shared, sort_threads, writer_thread, buffer_capacity: options.buffer_capacity }
	}

	/// Blocks until a buffer is available.
	pub fn get_empty_buffer(&self) -> Vec<E> {
		let mut empty = self.shared.empty.lock();
		loop {
			if let Some(buf) = empty.pop_front() {
				return buf;
			}
			self.shared.empty_available.wait(&mut empty);
		}
	}

	/// Hands a filled buffer to the sort-thread pool. The buffer need not be
	/// sorted yet.
	pub fn schedule_unordered(&self, buffer: Vec<E>) {
		*self.shared.pending.lock() += 1;
		self.shared.sort_queue.lock().push_back(buffer);
		self.shared.sort_available.notify_one();
	}

	/// Blocks until every scheduled buffer has been sorted and written, then
	/// stops the worker threads.
	/// Waits on `pending` reaching zero rather than polling queue lengths, so
	/// it cannot return while the writer thread is still mid-`store_sorted`
	/// on the last buffer.
	pub fn wait_for_completion(mut self) -> Result<()> {
		let mut pending = self.shared.pending.lock();
		while *pending != 0 {
			self.shared.pending_drained.wait(&mut pending);
		}
		drop(pending);
		*self.shared.shutting_down.lock() = true;
		self.shared.sort_available.notify_all();
		self.shared.write_available.notify_all();
		for handle in self.sort_threads.drain(..) {
			let _ = handle.join();
		}
		if let Some(handle) = self.writer_thread.take() {
			let _ = handle.join();
		}
		if let Some(message) = self.shared.error.lock().take() {
			return Err(crate::error::Error::Corruption(message));
		}
		Ok(())
	}

	pub fn buffer_capacity(&self) -> usize {
		self.buffer_capacity
	}
}

fn sort_loop<E: Entry>(shared: Arc<Shared<E>>) {
	loop {
		let mut buffer = {
			let mut queue = shared.sort_queue.lock();
			loop {
				if let Some(buffer) = queue.pop_front() {
					break buffer;
				}
				if *shared.shutting_down.lock() {
					return;
				}
				shared.sort_available.wait(&mut queue);
			}
		};
		let before = buffer.len();
		buffer.sort_unstable_by_key(|e| e.key());
		dedup_combine(&mut buffer);
		log::trace!(target: "chesspos_db", "sorted buffer: {} entries, {} after combine", before, buffer.len());
		shared.write_queue.lock().push_back(buffer);
		shared.write_available.notify_one();
	}
}

fn write_loop<E: Entry>(shared: Arc<Shared<E>>, partition: Arc<Partition<E>>) {
	loop {
		let buffer = {
			let mut queue = shared.write_queue.lock();
			loop {
				if let Some(buffer) = queue.pop_front() {
					break buffer;
				}
				if *shared.shutting_down.lock() {
					return;
				}
				shared.write_available.wait(&mut queue);
			}
		};
		let capacity = buffer.capacity();
		match partition.store_sorted(&buffer) {
			Ok(id) => log::trace!(target: "chesspos_db", "wrote run {} with {} entries", id, buffer.len()),
			Err(e) => {
				log::error!(target: "chesspos_db", "pipeline write failed: {}", e);
				*shared.error.lock() = Some(e.to_string());
			}
		}
		let mut recycled = buffer;
		recycled.clear();
		recycled.reserve(capacity.saturating_sub(recycled.capacity()));
		shared.empty.lock().push_back(recycled);
		shared.empty_available.notify_one();

		let mut pending = shared.pending.lock();
		*pending -= 1;
		if *pending == 0 {
			shared.pending_drained.notify_all();
		}
		drop(pending);
	}
}

/// Sums full-equal adjacent entries in an already-sorted buffer, shrinking duplicate positions before they ever reach disk.
fn dedup_combine<E: Entry>(buffer: &mut Vec<E>) {
	let mut write = 0;
	for read in 1..buffer.len() {
		if buffer[write].key().full_equal(&buffer[read].key()) {
			let next = buffer[read];
			buffer[write].combine(&next);
		} else {
			write += 1;
			buffer[write] = buffer[read];
		}
	}
	if !buffer.is_empty() {
		buffer.truncate(write + 1);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::entry::{GameResult, Key, Level};
	use crate::format::epsilon::EpsilonEntry;

	struct TempDir(std::path::PathBuf);
	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			let mut path = std::env::temp_dir();
			path.push("chesspos-db-test");
			path.push("pipeline");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}
	}
	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	#[test]
	fn dedup_combine_sums_adjacent_duplicates() {
		let mut buffer = vec![
			EpsilonEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), None, None),
			EpsilonEntry::new_single(Key::simple(1, None, Level::Human, GameResult::Draw), None, None),
			EpsilonEntry::new_single(Key::simple(2, None, Level::Human, GameResult::Draw), None, None),
		];
		dedup_combine(&mut buffer);
		assert_eq!(buffer.len(), 2);
		assert_eq!(buffer[0].count(), 2);
		assert_eq!(buffer[1].count(), 1);
	}

	#[test]
	fn pipeline_writes_scheduled_buffers_to_the_partition() {
		let dir = TempDir::new("pipeline_writes_scheduled_buffers_to_the_partition");
		let partition = Arc::new(Partition::<EpsilonEntry>::open(&dir.0).unwrap());
		let options = PipelineOptions { num_buffers: 2, buffer_capacity: 16, num_sort_threads: 1 };
		let pipeline = Pipeline::start(partition.clone(), &options);

		let mut buffer = pipeline.get_empty_buffer();
		buffer.push(EpsilonEntry::new_single(Key::simple(5, None, Level::Human, GameResult::Draw), None, None));
		pipeline.schedule_unordered(buffer);

		pipeline.wait_for_completion().unwrap();
		let opened = partition.snapshot();
		assert_eq!(opened.len(), 1);
		assert_eq!(opened[0].run().len(), 1);
	}
}
