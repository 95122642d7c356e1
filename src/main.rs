use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use dicom_index::config::AppConfig;
use dicom_index::{Catalog, Indexer, StorePolicy};

fn init_logger(level: tracing::Level) -> Result<(), anyhow::Error> {
	let subscriber = tracing_subscriber::fmt()
		.compact()
		.with_file(true)
		.with_line_number(true)
		.with_target(false)
		.with_env_filter(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(level).into())
				.from_env_lossy(),
		)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;
	Ok(())
}

fn main() -> Result<(), anyhow::Error> {
	let config = AppConfig::new()?;
	init_logger(config.telemetry.level)?;

	debug!("Config: {config:?}");

	let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
	if paths.is_empty() {
		info!("Nothing to index; pass DICOM files or directories as arguments");
		return Ok(());
	}

	let mut catalog = Catalog::open(&config.database.directory)?;
	catalog.set_tags_to_precache(config.indexing.extra_tags_to_precache.clone());
	let catalog = Arc::new(Mutex::new(catalog));

	let store = if config.indexing.copy_on_import {
		StorePolicy::Copy
	} else {
		StorePolicy::Link
	};

	let indexer = Indexer::new();
	for path in &paths {
		if path.is_dir() {
			if !indexer.add_directory(&catalog, path, store, config.indexing.include_hidden)? {
				warn!("DICOMDIR in {} had invalid records; they were skipped", path.display());
			}
		} else {
			indexer.add_file(&catalog, path, store);
		}
	}

	let summary = indexer.wait_for_import_finished(&catalog, Duration::from_secs(3600))?;
	info!(
		"Added {} patients, {} studies, {} series, {} instances",
		summary.patients_added, summary.studies_added, summary.series_added, summary.instances_added
	);

	Ok(())
}
