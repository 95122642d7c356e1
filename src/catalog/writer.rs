//! Batched insertion of parsed datasets into the catalog hierarchy.

use super::{
	Catalog, CatalogError, CatalogEvent, InstanceRecord, PatientRecord, SeriesRecord, StudyRecord,
	MANAGED_SUBDIRECTORY,
};
use crate::dataset::ParsedDataset;
use crate::index::queue::IndexingResult;
use dicom::dictionary_std::tags;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, warn};

impl Catalog {
	/// Inserts a batch of indexing results as one transaction: the rows
	/// of every result land together or, when the commit fails, not at
	/// all. Per-result problems (unreadable identifiers, failed file
	/// copies) skip that result and keep the batch going.
	pub fn insert(&mut self, results: Vec<IndexingResult>) -> Result<(), CatalogError> {
		let snapshot = self.store.clone();
		let mut inserted_sops = HashSet::new();
		for result in results {
			self.insert_result(result, &mut inserted_sops);
		}
		if let Err(err) = self.flush() {
			self.store = snapshot;
			return Err(err);
		}
		Ok(())
	}

	/// Inserts a single dataset, e.g. one received over the network
	/// rather than discovered on disk. Overwrites an existing row for
	/// the same SOP instance.
	pub fn insert_dataset(
		&mut self,
		file_path: &Path,
		dataset: ParsedDataset,
		store_file: bool,
	) -> Result<(), CatalogError> {
		let overwrite_existing = self
			.store
			.instances
			.contains_key(&dataset.sop_instance_uid());
		self.insert(vec![IndexingResult {
			file_path: file_path.to_path_buf(),
			dataset,
			store_file,
			overwrite_existing,
		}])
	}

	fn insert_result(&mut self, result: IndexingResult, inserted_sops: &mut HashSet<String>) {
		let dataset = &result.dataset;
		let sop_instance_uid = dataset.element_string(tags::SOP_INSTANCE_UID);
		if sop_instance_uid.is_empty() {
			warn!(
				"Dataset from {} has no SOP instance UID; not inserting",
				result.file_path.display()
			);
			return;
		}
		if !inserted_sops.insert(sop_instance_uid.clone()) {
			debug!(
				"SOP instance {sop_instance_uid} appeared twice in one batch; keeping the first"
			);
			return;
		}

		let mut patient_name = dataset.element_string(tags::PATIENT_NAME);
		let study_instance_uid = dataset.element_string(tags::STUDY_INSTANCE_UID);
		let series_instance_uid = dataset.element_string(tags::SERIES_INSTANCE_UID);
		let mut patient_id = dataset.element_string(tags::PATIENT_ID);
		if patient_id.is_empty() && !study_instance_uid.is_empty() {
			// Anonymized exports may drop the patient ID entirely.
			warn!("Patient ID is empty, using the study instance UID as patient ID");
			patient_id = study_instance_uid.clone();
		}
		if patient_name.is_empty() && !patient_id.is_empty() {
			patient_name = patient_id.clone();
		}
		if patient_name.is_empty() || patient_id.is_empty() || study_instance_uid.is_empty() {
			error!(
				"Dataset from {} is missing necessary information (patient name, study instance UID, or patient ID); not inserting",
				result.file_path.display()
			);
			return;
		}

		let stored_path = if result.store_file && !series_instance_uid.is_empty() {
			match self.store_file_copy(
				&result.file_path,
				&study_instance_uid,
				&series_instance_uid,
				&sop_instance_uid,
			) {
				Ok(path) => path,
				Err(err) => {
					error!(
						"Failed to copy {} into the managed store: {err}",
						result.file_path.display()
					);
					self.emit(CatalogEvent::FileCopyError {
						file_path: result.file_path.clone(),
						message: err.to_string(),
					});
					return;
				}
			}
		} else {
			result.file_path.clone()
		};

		self.ensure_patient(dataset, &patient_id, &patient_name);
		self.ensure_study(dataset, &study_instance_uid, &patient_id);
		if series_instance_uid.is_empty() {
			// Without a series there is nothing to attach the instance to.
			return;
		}
		self.ensure_series(dataset, &series_instance_uid, &study_instance_uid);

		let modified_time = fs::metadata(&result.file_path)
			.and_then(|meta| meta.modified())
			.unwrap_or_else(|_| SystemTime::now());

		let cached_values = dataset.values_for_keys(self.tags_to_precache.iter());
		self.store
			.tag_cache
			.insert(sop_instance_uid.clone(), cached_values);

		if let Some(existing) = self.store.instances.get_mut(&sop_instance_uid) {
			if result.overwrite_existing {
				existing.series_instance_uid = series_instance_uid;
				existing.file_path = stored_path;
				existing.modified_time = modified_time;
				existing.displayed_fields_updated = false;
			} else {
				debug!("Instance {sop_instance_uid} already present; keeping the existing row");
			}
			return;
		}

		self.store.instances.insert(
			sop_instance_uid.clone(),
			InstanceRecord {
				sop_instance_uid: sop_instance_uid.clone(),
				series_instance_uid,
				file_path: stored_path,
				modified_time,
				displayed_fields_updated: false,
			},
		);
		self.emit(CatalogEvent::InstanceAdded(sop_instance_uid));
	}

	/// Copies a source file into `<db>/dicom/<study>/<series>/<sop>`.
	/// Files that already live inside the database directory stay where
	/// they are.
	fn store_file_copy(
		&self,
		source: &Path,
		study_instance_uid: &str,
		series_instance_uid: &str,
		sop_instance_uid: &str,
	) -> std::io::Result<PathBuf> {
		if source.starts_with(&self.database_directory) {
			return Ok(source.to_path_buf());
		}
		let series_directory = self
			.database_directory
			.join(MANAGED_SUBDIRECTORY)
			.join(study_instance_uid)
			.join(series_instance_uid);
		fs::create_dir_all(&series_directory)?;
		let destination = series_directory.join(sop_instance_uid);
		fs::copy(source, &destination)?;
		Ok(destination)
	}

	fn ensure_patient(&mut self, dataset: &ParsedDataset, patient_id: &str, patient_name: &str) {
		if self.store.patients.contains_key(patient_id) {
			return;
		}
		let record = PatientRecord {
			patient_id: String::from(patient_id),
			patient_name: String::from(patient_name),
			birth_date: dataset.element_string(tags::PATIENT_BIRTH_DATE),
			birth_time: dataset.element_string(tags::PATIENT_BIRTH_TIME),
			sex: dataset.element_string(tags::PATIENT_SEX),
			comments: dataset.element_string(tags::PATIENT_COMMENTS),
			index: self.store.patients.len(),
		};
		self.store
			.patients
			.insert(String::from(patient_id), record);
		self.emit(CatalogEvent::PatientAdded {
			patient_id: String::from(patient_id),
			patient_name: String::from(patient_name),
		});
	}

	fn ensure_study(&mut self, dataset: &ParsedDataset, study_instance_uid: &str, patient_id: &str) {
		if self.store.studies.contains_key(study_instance_uid) {
			return;
		}
		let record = StudyRecord {
			study_instance_uid: String::from(study_instance_uid),
			patient_id: String::from(patient_id),
			study_id: dataset.element_string(tags::STUDY_ID),
			study_date: dataset.element_string(tags::STUDY_DATE),
			study_time: dataset.element_string(tags::STUDY_TIME),
			accession_number: dataset.element_string(tags::ACCESSION_NUMBER),
			modalities_in_study: dataset.element_string(tags::MODALITIES_IN_STUDY),
			institution_name: dataset.element_string(tags::INSTITUTION_NAME),
			referring_physician: dataset.element_string(tags::REFERRING_PHYSICIAN_NAME),
			performing_physician: dataset.element_string(tags::PERFORMING_PHYSICIAN_NAME),
			study_description: dataset.element_string(tags::STUDY_DESCRIPTION),
		};
		self.store
			.studies
			.insert(String::from(study_instance_uid), record);
		self.emit(CatalogEvent::StudyAdded(String::from(study_instance_uid)));
	}

	fn ensure_series(
		&mut self,
		dataset: &ParsedDataset,
		series_instance_uid: &str,
		study_instance_uid: &str,
	) {
		if self.store.series.contains_key(series_instance_uid) {
			return;
		}
		let record = SeriesRecord {
			series_instance_uid: String::from(series_instance_uid),
			study_instance_uid: String::from(study_instance_uid),
			series_number: dataset.element_string(tags::SERIES_NUMBER),
			series_date: dataset.element_string(tags::SERIES_DATE),
			series_time: dataset.element_string(tags::SERIES_TIME),
			series_description: dataset.element_string(tags::SERIES_DESCRIPTION),
			modality: dataset.element_string(tags::MODALITY),
			body_part_examined: dataset.element_string(tags::BODY_PART_EXAMINED),
			frame_of_reference_uid: dataset.element_string(tags::FRAME_OF_REFERENCE_UID),
			contrast_agent: dataset.element_string(tags::CONTRAST_BOLUS_AGENT),
			scanning_sequence: dataset.element_string(tags::SCANNING_SEQUENCE),
			acquisition_number: dataset.element_string(tags::ACQUISITION_NUMBER),
			echo_numbers: dataset.element_string(tags::ECHO_NUMBERS),
			temporal_position_identifier: dataset.element_string(tags::TEMPORAL_POSITION_IDENTIFIER),
		};
		self.store
			.series
			.insert(String::from(series_instance_uid), record);
		self.emit(CatalogEvent::SeriesAdded(String::from(series_instance_uid)));
	}
}
