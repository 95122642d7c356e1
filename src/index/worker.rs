use super::queue::{IndexingQueue, IndexingRequest, IndexingResult, ModifiedTimeIndex, WorkerWake};
use crate::dataset::ParsedDataset;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress and lifecycle notifications from the worker thread to the
/// coordinator.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
	Progress(u8),
	IndexingFilePath(PathBuf),
	RunFinished,
}

/// Thread main of the indexing worker. Parks until requests arrive, runs
/// one indexing pass over them, and parks again; returns when the queue
/// shuts down.
pub(crate) fn run(queue: Arc<IndexingQueue>, events: Sender<WorkerEvent>) {
	loop {
		match queue.wait_for_work() {
			WorkerWake::Shutdown => return,
			WorkerWake::Work => {}
		}
		run_once(&queue, &events);
	}
}

fn run_once(queue: &IndexingQueue, events: &Sender<WorkerEvent>) {
	if queue.set_indexing(true) {
		// Another run is already consuming the queue.
		return;
	}

	// Local copy to avoid taking the queue lock for every file.
	let mut modified_times = queue.modified_times();
	let mut completed_requests = 0usize;

	loop {
		let popped = queue.pop_indexing_request();
		let (request, remaining) = match popped {
			Some(popped) if !queue.is_stop_requested() => popped,
			_ => {
				queue.set_stop_requested(false);
				queue.set_indexing(false);
				let _ = events.send(WorkerEvent::RunFinished);
				return;
			}
		};
		process_request(
			queue,
			events,
			request,
			completed_requests,
			remaining,
			&mut modified_times,
		);
		completed_requests += 1;
	}
}

fn process_request(
	queue: &IndexingQueue,
	events: &Sender<WorkerEvent>,
	mut request: IndexingRequest,
	completed_requests: usize,
	remaining_requests: usize,
	modified_times: &mut ModifiedTimeIndex,
) {
	if let Some(folder) = request.input_folder.take() {
		collect_files(&folder, request.include_hidden, &mut request.input_files);
	}

	let started = Instant::now();
	let total_files = request.input_files.len();
	let mut last_reported_percent = None;
	let mut processed = 0usize;

	for (file_index, file_path) in request.input_files.into_iter().enumerate() {
		let percent = (100.0 * (completed_requests as f64 + file_index as f64 / total_files as f64)
			/ (completed_requests + remaining_requests + 1) as f64) as u8;
		if last_reported_percent != Some(percent) {
			last_reported_percent = Some(percent);
			let _ = events.send(WorkerEvent::Progress(percent));
		}
		let _ = events.send(WorkerEvent::IndexingFilePath(file_path.clone()));

		if index_file(queue, file_path, request.store_file, modified_times) {
			processed += 1;
		}

		if queue.is_stop_requested() {
			break;
		}
	}

	info!(
		"Indexing worker processed {} files [{:.2}s]",
		processed,
		started.elapsed().as_secs_f64()
	);
}

/// Parses one file and pushes the result, honoring the modification-time
/// gate. Returns whether a result was produced.
fn index_file(
	queue: &IndexingQueue,
	file_path: PathBuf,
	store_file: bool,
	modified_times: &mut ModifiedTimeIndex,
) -> bool {
	let file_modified = fs::metadata(&file_path).and_then(|meta| meta.modified()).ok();

	let already_indexed = modified_times.contains_key(&file_path);
	if already_indexed {
		if let Some(file_modified) = file_modified {
			if modified_times[&file_path] >= file_modified {
				debug!("File {} already added", file_path.display());
				return false;
			}
		}
	}
	if let Some(file_modified) = file_modified {
		modified_times.insert(file_path.clone(), file_modified);
	}

	match ParsedDataset::open(&file_path) {
		Ok(dataset) => {
			queue.push_indexing_result(IndexingResult {
				file_path,
				dataset,
				store_file,
				overwrite_existing: already_indexed,
			});
			true
		}
		Err(err) => {
			warn!("Could not read DICOM file {}: {err}", file_path.display());
			false
		}
	}
}

/// Recursively appends every regular file under `folder`. Hidden entries
/// (dot-prefixed files and directories) are skipped unless requested.
fn collect_files(folder: &Path, include_hidden: bool, files: &mut Vec<PathBuf>) {
	let entries = match fs::read_dir(folder) {
		Ok(entries) => entries,
		Err(err) => {
			warn!("Could not list directory {}: {err}", folder.display());
			return;
		}
	};
	for entry in entries.flatten() {
		let path = entry.path();
		if !include_hidden && is_hidden(&path) {
			continue;
		}
		match entry.file_type() {
			Ok(file_type) if file_type.is_dir() => {
				collect_files(&path, include_hidden, files);
			}
			Ok(file_type) if file_type.is_file() => files.push(path),
			_ => {}
		}
	}
}

fn is_hidden(path: &Path) -> bool {
	path.file_name()
		.and_then(|name| name.to_str())
		.is_some_and(|name| name.starts_with('.'))
}
