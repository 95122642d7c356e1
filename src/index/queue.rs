use crate::dataset::ParsedDataset;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::SystemTime;

/// A unit of work for the indexing worker: an optional folder to expand
/// plus explicit file paths. Immutable once pushed.
#[derive(Debug, Clone, Default)]
pub struct IndexingRequest {
	pub input_folder: Option<PathBuf>,
	pub input_files: Vec<PathBuf>,
	pub include_hidden: bool,
	pub store_file: bool,
}

/// One successfully parsed file, owned by the worker until pushed and by
/// the catalog writer after the drain.
#[derive(Debug)]
pub struct IndexingResult {
	pub file_path: PathBuf,
	pub dataset: ParsedDataset,
	pub store_file: bool,
	/// Set when the catalog already had a row for this file path; the
	/// writer replaces the existing instance instead of adding one.
	pub overwrite_existing: bool,
}

/// Snapshot of the catalog's file → modification time index, used to
/// skip files that have not changed since they were indexed.
pub type ModifiedTimeIndex = HashMap<PathBuf, SystemTime>;

#[derive(Default)]
struct QueueState {
	requests: VecDeque<IndexingRequest>,
	results: VecDeque<IndexingResult>,
	modified_times: ModifiedTimeIndex,
	indexing: bool,
	stop_requested: bool,
	shutdown: bool,
}

pub(crate) enum WorkerWake {
	Work,
	Shutdown,
}

/// The single structure shared between the producer side and the worker
/// thread. All state sits behind one mutex; every operation is short and
/// never blocks on I/O.
#[derive(Default)]
pub struct IndexingQueue {
	state: Mutex<QueueState>,
	wake: Condvar,
}

impl IndexingQueue {
	pub fn push_indexing_request(&self, request: IndexingRequest) {
		let mut state = self.state.lock().unwrap();
		state.requests.push_back(request);
		self.wake.notify_all();
	}

	/// Pops the next request together with the number of requests left
	/// behind it. `None` tells the worker the run is over.
	pub fn pop_indexing_request(&self) -> Option<(IndexingRequest, usize)> {
		let mut state = self.state.lock().unwrap();
		let request = state.requests.pop_front()?;
		Some((request, state.requests.len()))
	}

	pub fn push_indexing_result(&self, result: IndexingResult) {
		let mut state = self.state.lock().unwrap();
		state.results.push_back(result);
	}

	/// Atomically drains every pending result, preserving push order.
	pub fn pop_all_indexing_results(&self) -> Vec<IndexingResult> {
		let mut state = self.state.lock().unwrap();
		state.results.drain(..).collect()
	}

	pub fn set_stop_requested(&self, stop: bool) {
		let mut state = self.state.lock().unwrap();
		state.stop_requested = stop;
		if stop {
			self.wake.notify_all();
		}
	}

	pub fn is_stop_requested(&self) -> bool {
		self.state.lock().unwrap().stop_requested
	}

	/// Test-and-set of the indexing flag; the returned previous value
	/// tells the caller whether a run was already active.
	pub fn set_indexing(&self, indexing: bool) -> bool {
		let mut state = self.state.lock().unwrap();
		std::mem::replace(&mut state.indexing, indexing)
	}

	pub fn is_indexing(&self) -> bool {
		self.state.lock().unwrap().indexing
	}

	pub fn set_modified_times(&self, modified_times: ModifiedTimeIndex) {
		self.state.lock().unwrap().modified_times = modified_times;
	}

	/// Copy-out of the snapshot; the worker keeps a local copy to avoid
	/// holding the queue lock while it walks the file system.
	pub fn modified_times(&self) -> ModifiedTimeIndex {
		self.state.lock().unwrap().modified_times.clone()
	}

	/// Parks the worker thread until there is a request to process or the
	/// queue shuts down.
	pub(crate) fn wait_for_work(&self) -> WorkerWake {
		let mut state = self.state.lock().unwrap();
		loop {
			if state.shutdown {
				return WorkerWake::Shutdown;
			}
			if !state.requests.is_empty() {
				return WorkerWake::Work;
			}
			state = self.wake.wait(state).unwrap();
		}
	}

	/// Tells the worker thread to exit once its current run is over.
	pub(crate) fn shutdown(&self) {
		let mut state = self.state.lock().unwrap();
		state.shutdown = true;
		state.stop_requested = true;
		self.wake.notify_all();
	}
}
