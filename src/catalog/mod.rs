//! The local imaging catalog: a strict patient → study → series →
//! instance hierarchy with a per-instance tag cache and denormalized
//! displayed-field tables.
//!
//! The SQL engine of the original workstation is an external
//! collaborator; this crate keeps the rows in ordered in-memory maps and
//! persists them as a JSON snapshot inside the managed database
//! directory, committed with a write-then-rename.

pub mod display;
pub mod writer;

use crate::dataset::ParsedDataset;
use crate::fields::{DisplayedFieldGenerator, FieldMap};
use crate::types::{TagKey, UI};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{error, warn};

/// Snapshot file inside the database directory.
pub const CATALOG_FILE_NAME: &str = "catalog.json";
/// Subdirectory holding files copied into the managed store.
pub const MANAGED_SUBDIRECTORY: &str = "dicom";

/// The catalog handle shared between the coordinator's producer-side API
/// and its completion handling. Mutation happens on the producer thread
/// only; the mutex satisfies the shared ownership.
pub type SharedCatalog = Arc<Mutex<Catalog>>;

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Failed to create catalog directory {path}: {source}")]
	CreateDirectory { path: PathBuf, source: io::Error },
	#[error("Failed to read catalog file {path}: {source}")]
	Load { path: PathBuf, source: io::Error },
	#[error("Catalog file {path} is not valid: {source}")]
	Corrupted {
		path: PathBuf,
		source: serde_json::Error,
	},
	#[error("Failed to encode catalog state: {0}")]
	Encode(#[source] serde_json::Error),
	#[error("Failed to commit catalog state: {0}")]
	Commit(#[source] io::Error),
}

/// Notifications delivered to the injected event sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
	PatientAdded {
		patient_id: String,
		patient_name: String,
	},
	StudyAdded(UI),
	SeriesAdded(UI),
	InstanceAdded(UI),
	/// A `storeFile` copy into the managed directory failed; the result
	/// was skipped while the rest of the batch went through.
	FileCopyError {
		file_path: PathBuf,
		message: String,
	},
	DisplayedFieldsUpdateStarted,
	DisplayedFieldsUpdateProgress(usize),
	DisplayedFieldsUpdated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
	pub patient_id: String,
	pub patient_name: String,
	pub birth_date: String,
	pub birth_time: String,
	pub sex: String,
	pub comments: String,
	/// Position in patient insertion order; surfaces in the displayed
	/// fields as `PatientIndex`.
	pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyRecord {
	pub study_instance_uid: UI,
	pub patient_id: String,
	pub study_id: String,
	pub study_date: String,
	pub study_time: String,
	pub accession_number: String,
	pub modalities_in_study: String,
	pub institution_name: String,
	pub referring_physician: String,
	pub performing_physician: String,
	pub study_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesRecord {
	pub series_instance_uid: UI,
	pub study_instance_uid: UI,
	pub series_number: String,
	pub series_date: String,
	pub series_time: String,
	pub series_description: String,
	pub modality: String,
	pub body_part_examined: String,
	pub frame_of_reference_uid: UI,
	pub contrast_agent: String,
	pub scanning_sequence: String,
	pub acquisition_number: String,
	pub echo_numbers: String,
	pub temporal_position_identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
	pub sop_instance_uid: UI,
	pub series_instance_uid: UI,
	pub file_path: PathBuf,
	pub modified_time: SystemTime,
	/// Cleared on insert and overwrite; set again once the displayed
	/// fields have been regenerated for this instance.
	pub displayed_fields_updated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CatalogStore {
	pub patients: BTreeMap<String, PatientRecord>,
	pub studies: BTreeMap<UI, StudyRecord>,
	pub series: BTreeMap<UI, SeriesRecord>,
	pub instances: BTreeMap<UI, InstanceRecord>,
	pub tag_cache: BTreeMap<UI, BTreeMap<TagKey, String>>,
	pub patient_fields: BTreeMap<String, FieldMap>,
	pub study_fields: BTreeMap<UI, FieldMap>,
	pub series_fields: BTreeMap<UI, FieldMap>,
}

pub struct Catalog {
	database_directory: PathBuf,
	tags_to_precache: Vec<TagKey>,
	generator: DisplayedFieldGenerator,
	pub(crate) store: CatalogStore,
	events: Option<Sender<CatalogEvent>>,
}

impl Catalog {
	/// Opens (or creates) the catalog rooted at `database_directory`,
	/// loading the persisted snapshot when one exists. The precache set
	/// starts as the displayed-field pipeline's required tags.
	pub fn open(database_directory: impl Into<PathBuf>) -> Result<Self, CatalogError> {
		Self::open_with_generator(database_directory, DisplayedFieldGenerator::new())
	}

	/// [`Self::open`] with a caller-assembled rule pipeline, for setups
	/// registering additional displayed-field rules.
	pub fn open_with_generator(
		database_directory: impl Into<PathBuf>,
		generator: DisplayedFieldGenerator,
	) -> Result<Self, CatalogError> {
		let database_directory = database_directory.into();
		fs::create_dir_all(&database_directory).map_err(|source| CatalogError::CreateDirectory {
			path: database_directory.clone(),
			source,
		})?;

		let catalog_file = database_directory.join(CATALOG_FILE_NAME);
		let store = if catalog_file.is_file() {
			let contents = fs::read(&catalog_file).map_err(|source| CatalogError::Load {
				path: catalog_file.clone(),
				source,
			})?;
			serde_json::from_slice(&contents).map_err(|source| CatalogError::Corrupted {
				path: catalog_file.clone(),
				source,
			})?
		} else {
			CatalogStore::default()
		};

		let tags_to_precache = generator.required_tags();
		Ok(Self {
			database_directory,
			tags_to_precache,
			generator,
			store,
			events: None,
		})
	}

	pub fn database_directory(&self) -> &Path {
		&self.database_directory
	}

	/// Injects the sink receiving [`CatalogEvent`]s. Events are delivered
	/// best-effort; a disconnected receiver is ignored.
	pub fn set_event_sink(&mut self, sink: Sender<CatalogEvent>) {
		self.events = Some(sink);
	}

	pub(crate) fn emit(&self, event: CatalogEvent) {
		if let Some(sink) = &self.events {
			let _ = sink.send(event);
		}
	}

	/// Replaces the application-requested precache tags. The pipeline's
	/// required tags always remain part of the set.
	pub fn set_tags_to_precache(&mut self, tags: Vec<TagKey>) {
		let mut all = self.generator.required_tags();
		for tag in tags {
			if !all.contains(&tag) {
				all.push(tag);
			}
		}
		self.tags_to_precache = all;
	}

	pub fn tags_to_precache(&self) -> &[TagKey] {
		&self.tags_to_precache
	}

	pub fn patients_count(&self) -> usize {
		self.store.patients.len()
	}

	pub fn studies_count(&self) -> usize {
		self.store.studies.len()
	}

	pub fn series_count(&self) -> usize {
		self.store.series.len()
	}

	pub fn instances_count(&self) -> usize {
		self.store.instances.len()
	}

	/// The file → modification time map over every instance row, used to
	/// seed the indexing queue's skip-unchanged snapshot.
	pub fn all_files_modified_times(&self) -> HashMap<PathBuf, SystemTime> {
		self.store
			.instances
			.values()
			.map(|instance| (instance.file_path.clone(), instance.modified_time))
			.collect()
	}

	/// Bulk-fetches every cached tag of one instance in a single read.
	/// Unknown instances yield an empty map.
	pub fn cached_tags(&self, sop_instance_uid: &str) -> BTreeMap<TagKey, String> {
		self.store
			.tag_cache
			.get(sop_instance_uid)
			.cloned()
			.unwrap_or_default()
	}

	pub fn cached_tag(&self, sop_instance_uid: &str, tag: &str) -> String {
		self.store
			.tag_cache
			.get(sop_instance_uid)
			.and_then(|tags| tags.get(tag))
			.cloned()
			.unwrap_or_default()
	}

	pub fn cache_tag(&mut self, sop_instance_uid: &str, tag: TagKey, value: String) {
		self.store
			.tag_cache
			.entry(String::from(sop_instance_uid))
			.or_default()
			.insert(tag, value);
	}

	pub fn studies_for_patient(&self, patient_id: &str) -> Vec<UI> {
		self.store
			.studies
			.values()
			.filter(|study| study.patient_id == patient_id)
			.map(|study| study.study_instance_uid.clone())
			.collect()
	}

	pub fn series_for_study(&self, study_instance_uid: &str) -> Vec<UI> {
		self.store
			.series
			.values()
			.filter(|series| series.study_instance_uid == study_instance_uid)
			.map(|series| series.series_instance_uid.clone())
			.collect()
	}

	pub fn instances_for_series(&self, series_instance_uid: &str) -> Vec<UI> {
		self.store
			.instances
			.values()
			.filter(|instance| instance.series_instance_uid == series_instance_uid)
			.map(|instance| instance.sop_instance_uid.clone())
			.collect()
	}

	pub fn files_for_series(&self, series_instance_uid: &str) -> Vec<PathBuf> {
		self.store
			.instances
			.values()
			.filter(|instance| instance.series_instance_uid == series_instance_uid)
			.map(|instance| instance.file_path.clone())
			.collect()
	}

	pub fn study_for_series(&self, series_instance_uid: &str) -> Option<UI> {
		self.store
			.series
			.get(series_instance_uid)
			.map(|series| series.study_instance_uid.clone())
	}

	pub fn patient_for_study(&self, study_instance_uid: &str) -> Option<String> {
		self.store
			.studies
			.get(study_instance_uid)
			.map(|study| study.patient_id.clone())
	}

	pub fn file_for_instance(&self, sop_instance_uid: &str) -> Option<PathBuf> {
		self.store
			.instances
			.get(sop_instance_uid)
			.map(|instance| instance.file_path.clone())
	}

	pub fn instance(&self, sop_instance_uid: &str) -> Option<&InstanceRecord> {
		self.store.instances.get(sop_instance_uid)
	}

	pub fn instance_for_file(&self, file_path: &Path) -> Option<UI> {
		self.store
			.instances
			.values()
			.find(|instance| instance.file_path == file_path)
			.map(|instance| instance.sop_instance_uid.clone())
	}

	pub fn series_for_file(&self, file_path: &Path) -> Option<UI> {
		self.store
			.instances
			.values()
			.find(|instance| instance.file_path == file_path)
			.map(|instance| instance.series_instance_uid.clone())
	}

	pub fn name_for_patient(&self, patient_id: &str) -> String {
		self.store
			.patients
			.get(patient_id)
			.map(|patient| patient.patient_name.clone())
			.unwrap_or_default()
	}

	pub fn description_for_study(&self, study_instance_uid: &str) -> String {
		self.store
			.studies
			.get(study_instance_uid)
			.map(|study| study.study_description.clone())
			.unwrap_or_default()
	}

	pub fn description_for_series(&self, series_instance_uid: &str) -> String {
		self.store
			.series
			.get(series_instance_uid)
			.map(|series| series.series_description.clone())
			.unwrap_or_default()
	}

	/// The series/study/patient descriptions of the rows owning a file.
	pub fn descriptions_for_file(&self, file_path: &Path) -> BTreeMap<String, String> {
		let mut descriptions = BTreeMap::new();
		let Some(series_uid) = self.series_for_file(file_path) else {
			return descriptions;
		};
		descriptions.insert(
			String::from("SeriesDescription"),
			self.description_for_series(&series_uid),
		);
		if let Some(study_uid) = self.study_for_series(&series_uid) {
			descriptions.insert(
				String::from("StudyDescription"),
				self.description_for_study(&study_uid),
			);
			if let Some(patient_id) = self.patient_for_study(&study_uid) {
				descriptions.insert(
					String::from("PatientsName"),
					self.name_for_patient(&patient_id),
				);
			}
		}
		descriptions
	}

	/// Looks a tag value up through the cache, falling back to parsing
	/// the file on a miss and caching what it finds. Returns the empty
	/// string for unknown files and unreadable tags.
	pub fn file_value(&mut self, file_path: &Path, tag: &str) -> String {
		let Some(sop_instance_uid) = self.instance_for_file(file_path) else {
			return String::new();
		};
		let cached = self.cached_tag(&sop_instance_uid, tag);
		if !cached.is_empty() {
			return cached;
		}

		let dataset = match ParsedDataset::open(file_path) {
			Ok(dataset) => dataset,
			Err(err) => {
				error!("File {} could not be parsed: {err}", file_path.display());
				return String::new();
			}
		};
		let value = dataset.value_for_key(tag);
		self.cache_tag(&sop_instance_uid, String::from(tag), value.clone());
		value
	}

	pub fn displayed_fields_for_patient(&self, patient_id: &str) -> FieldMap {
		self.store
			.patient_fields
			.get(patient_id)
			.cloned()
			.unwrap_or_default()
	}

	pub fn displayed_fields_for_study(&self, study_instance_uid: &str) -> FieldMap {
		self.store
			.study_fields
			.get(study_instance_uid)
			.cloned()
			.unwrap_or_default()
	}

	pub fn displayed_fields_for_series(&self, series_instance_uid: &str) -> FieldMap {
		self.store
			.series_fields
			.get(series_instance_uid)
			.cloned()
			.unwrap_or_default()
	}

	/// Removes a series with its instances, cached tags, displayed
	/// fields, and managed file copies. Returns whether the series
	/// existed.
	pub fn remove_series(&mut self, series_instance_uid: &str) -> bool {
		if self.store.series.remove(series_instance_uid).is_none() {
			return false;
		}
		let sops = self.instances_for_series(series_instance_uid);
		for sop in sops {
			if let Some(instance) = self.store.instances.remove(&sop) {
				self.remove_managed_file(&instance.file_path);
			}
			self.store.tag_cache.remove(&sop);
		}
		self.store.series_fields.remove(series_instance_uid);
		if let Err(err) = self.flush() {
			warn!("Failed to persist catalog after series removal: {err}");
		}
		true
	}

	/// Removes a study and everything below it. Returns whether the
	/// study existed.
	pub fn remove_study(&mut self, study_instance_uid: &str) -> bool {
		let Some(study) = self.store.studies.remove(study_instance_uid) else {
			return false;
		};
		for series_uid in self.series_for_study(&study.study_instance_uid) {
			self.remove_series(&series_uid);
		}
		self.store.study_fields.remove(study_instance_uid);
		if let Err(err) = self.flush() {
			warn!("Failed to persist catalog after study removal: {err}");
		}
		true
	}

	/// Removes a patient and everything below it. Returns whether the
	/// patient existed.
	pub fn remove_patient(&mut self, patient_id: &str) -> bool {
		if self.store.patients.remove(patient_id).is_none() {
			return false;
		}
		for study_uid in self.studies_for_patient(patient_id) {
			self.remove_study(&study_uid);
		}
		self.store.patient_fields.remove(patient_id);
		if let Err(err) = self.flush() {
			warn!("Failed to persist catalog after patient removal: {err}");
		}
		true
	}

	/// Deletes a file only if it lives inside the managed store;
	/// externally linked files are never touched.
	fn remove_managed_file(&self, file_path: &Path) {
		if !file_path.starts_with(self.database_directory.join(MANAGED_SUBDIRECTORY)) {
			return;
		}
		if let Err(err) = fs::remove_file(file_path) {
			warn!("Failed to remove stored file {}: {err}", file_path.display());
		}
	}

	/// Writes the snapshot next to the managed files, replacing the old
	/// one atomically.
	pub(crate) fn flush(&self) -> Result<(), CatalogError> {
		let encoded = serde_json::to_vec_pretty(&self.store).map_err(CatalogError::Encode)?;
		let target = self.database_directory.join(CATALOG_FILE_NAME);
		let staging = self.database_directory.join(format!("{CATALOG_FILE_NAME}.tmp"));
		fs::write(&staging, encoded)
			.and_then(|()| fs::rename(&staging, &target))
			.map_err(CatalogError::Commit)
	}
}
