//! The background indexing pipeline: a producer/consumer engine that
//! discovers DICOM files, parses them on a worker thread, and batches the
//! results for catalog insertion.

pub mod dicomdir;
pub mod queue;
pub(crate) mod worker;

pub use dicomdir::DicomdirError;
pub use queue::{IndexingQueue, IndexingRequest, IndexingResult};

use crate::catalog::{CatalogError, SharedCatalog};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;
use worker::WorkerEvent;

/// Whether ingested files stay where they are or are copied into the
/// catalog's managed directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePolicy {
	/// The instance row points at the source file.
	Link,
	/// The source file is copied under `<db>/dicom/` first.
	Copy,
}

impl StorePolicy {
	const fn store_file(self) -> bool {
		matches!(self, Self::Copy)
	}
}

/// Progress notifications forwarded to the injected sink. The sink side
/// drives UI; the pipeline never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
	Step(&'static str),
	Progress(u8),
	IndexingFilePath(PathBuf),
	UpdatingDatabase(bool),
	Complete(IndexingSummary),
}

/// Row deltas of one completed indexing batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingSummary {
	pub patients_added: usize,
	pub studies_added: usize,
	pub series_added: usize,
	pub instances_added: usize,
}

#[derive(Debug, Error)]
pub enum WaitError {
	#[error("Timed out waiting for indexing to complete")]
	Timeout,
	#[error("The indexing worker is gone")]
	WorkerGone,
	#[error(transparent)]
	Catalog(#[from] CatalogError),
}

/// Coordinates the indexing queue, the worker thread, and the catalog
/// writer. Requests enqueue and return immediately; the batched insert
/// and the displayed-field update run on the thread that calls
/// [`Indexer::wait_for_import_finished`].
pub struct Indexer {
	queue: Arc<IndexingQueue>,
	events: Receiver<WorkerEvent>,
	progress: Option<Sender<ProgressEvent>>,
	worker: Option<JoinHandle<()>>,
}

impl Default for Indexer {
	fn default() -> Self {
		Self::new()
	}
}

impl Indexer {
	pub fn new() -> Self {
		let queue = Arc::new(IndexingQueue::default());
		let (event_tx, event_rx) = mpsc::channel();
		let worker_queue = Arc::clone(&queue);
		let worker = std::thread::Builder::new()
			.name(String::from("dicom-indexing"))
			.spawn(move || worker::run(worker_queue, event_tx))
			.expect("indexing worker thread should spawn");
		Self {
			queue,
			events: event_rx,
			progress: None,
			worker: Some(worker),
		}
	}

	/// Injects the sink receiving [`ProgressEvent`]s.
	pub fn set_progress_sink(&mut self, sink: Sender<ProgressEvent>) {
		self.progress = Some(sink);
	}

	/// Queues a single file for indexing.
	pub fn add_file(&self, catalog: &SharedCatalog, file_path: &Path, store: StorePolicy) {
		self.push_indexing_request(
			catalog,
			IndexingRequest {
				input_files: vec![file_path.to_path_buf()],
				store_file: store.store_file(),
				..IndexingRequest::default()
			},
		);
	}

	/// Queues a directory tree for indexing. A directory holding a
	/// `DICOMDIR` manifest is ingested through the manifest instead of a
	/// file-system walk; the returned flag is then the manifest's
	/// validity (`true` for plain directories).
	pub fn add_directory(
		&self,
		catalog: &SharedCatalog,
		directory: &Path,
		store: StorePolicy,
		include_hidden: bool,
	) -> Result<bool, DicomdirError> {
		if directory.join("DICOMDIR").is_file() {
			return self.add_dicomdir(catalog, directory, store);
		}
		self.push_indexing_request(
			catalog,
			IndexingRequest {
				input_folder: Some(directory.to_path_buf()),
				include_hidden,
				store_file: store.store_file(),
				..IndexingRequest::default()
			},
		);
		Ok(true)
	}

	/// Queues an explicit list of files for indexing.
	pub fn add_list_of_files(
		&self,
		catalog: &SharedCatalog,
		files: Vec<PathBuf>,
		store: StorePolicy,
	) {
		self.push_indexing_request(
			catalog,
			IndexingRequest {
				input_files: files,
				store_file: store.store_file(),
				..IndexingRequest::default()
			},
		);
	}

	/// Ingests the files referenced by `<directory>/DICOMDIR`. Returns
	/// `false` when any manifest record lacked a required UID; such
	/// records are skipped together with their children while the valid
	/// remainder is still indexed.
	pub fn add_dicomdir(
		&self,
		catalog: &SharedCatalog,
		directory: &Path,
		store: StorePolicy,
	) -> Result<bool, DicomdirError> {
		let started = Instant::now();
		let manifest = dicomdir::read_manifest(directory)?;
		info!(
			"Processed DICOMDIR in {} [{:.2}s]",
			directory.display(),
			started.elapsed().as_secs_f64()
		);
		self.add_list_of_files(catalog, manifest.files, store);
		Ok(manifest.complete)
	}

	/// Requests a cooperative stop. The worker drops queued work between
	/// files; results already produced are still drained and inserted.
	/// Idempotent.
	pub fn cancel(&self) {
		self.queue.set_stop_requested(true);
	}

	/// Blocks until the current indexing run finishes, then performs the
	/// batched catalog insert and the displayed-field update on this
	/// thread. Returns the row deltas of the batch.
	pub fn wait_for_import_finished(
		&self,
		catalog: &SharedCatalog,
		timeout: Duration,
	) -> Result<IndexingSummary, WaitError> {
		let deadline = Instant::now() + timeout;
		loop {
			let remaining = deadline
				.checked_duration_since(Instant::now())
				.ok_or(WaitError::Timeout)?;
			match self.events.recv_timeout(remaining) {
				Ok(WorkerEvent::Progress(percent)) => {
					self.forward(ProgressEvent::Progress(percent));
				}
				Ok(WorkerEvent::IndexingFilePath(path)) => {
					self.forward(ProgressEvent::IndexingFilePath(path));
				}
				Ok(WorkerEvent::RunFinished) => {
					return self.complete_batch(catalog);
				}
				Err(RecvTimeoutError::Timeout) => return Err(WaitError::Timeout),
				Err(RecvTimeoutError::Disconnected) => return Err(WaitError::WorkerGone),
			}
		}
	}

	/// The indexing queue, exposed for coordination with other components.
	pub fn queue(&self) -> &Arc<IndexingQueue> {
		&self.queue
	}

	fn push_indexing_request(&self, catalog: &SharedCatalog, request: IndexingRequest) {
		self.forward(ProgressEvent::Step("Parsing DICOM files"));
		if !self.queue.is_indexing() {
			// Fresh run: seed the skip-unchanged snapshot before the
			// worker can wake up and copy it.
			let modified_times = catalog.lock().unwrap().all_files_modified_times();
			self.queue.set_modified_times(modified_times);
		}
		self.queue.push_indexing_request(request);
	}

	fn complete_batch(&self, catalog: &SharedCatalog) -> Result<IndexingSummary, WaitError> {
		let started = Instant::now();
		self.forward(ProgressEvent::Step("Updating database"));
		let results = self.queue.pop_all_indexing_results();
		let result_count = results.len();

		let mut catalog = catalog.lock().unwrap();
		let patients_before = catalog.patients_count();
		let studies_before = catalog.studies_count();
		let series_before = catalog.series_count();
		let instances_before = catalog.instances_count();

		self.forward(ProgressEvent::UpdatingDatabase(true));
		if let Err(err) = catalog.insert(results) {
			// The batch rolled back; completion still fires so waiting
			// observers see the run end.
			self.forward(ProgressEvent::UpdatingDatabase(false));
			self.forward(ProgressEvent::Complete(IndexingSummary::default()));
			return Err(WaitError::Catalog(err));
		}

		let summary = IndexingSummary {
			patients_added: catalog.patients_count() - patients_before,
			studies_added: catalog.studies_count() - studies_before,
			series_added: catalog.series_count() - series_before,
			instances_added: catalog.instances_count() - instances_before,
		};

		self.forward(ProgressEvent::Step("Updating displayed fields"));
		catalog.update_displayed_fields()?;
		self.forward(ProgressEvent::UpdatingDatabase(false));

		info!(
			"Indexer inserted {} files [{:.2}s]",
			result_count,
			started.elapsed().as_secs_f64()
		);
		self.forward(ProgressEvent::Complete(summary));
		Ok(summary)
	}

	fn forward(&self, event: ProgressEvent) {
		if let Some(sink) = &self.progress {
			let _ = sink.send(event);
		}
	}
}

impl Drop for Indexer {
	fn drop(&mut self) {
		self.queue.shutdown();
		if let Some(worker) = self.worker.take() {
			let _ = worker.join();
		}
	}
}
