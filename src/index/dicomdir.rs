use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::{InMemDicomObject, ReadError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DicomdirError {
	#[error("Failed to read DICOMDIR: {0}")]
	Read(#[from] ReadError),
}

/// The file paths referenced by a DICOMDIR, resolved against its parent
/// directory. `complete` is false when any record lacked a required tag
/// and was skipped together with its children.
#[derive(Debug, Default)]
pub(crate) struct DicomdirManifest {
	pub files: Vec<PathBuf>,
	pub complete: bool,
}

/// Reads `<directory>/DICOMDIR` and collects the referenced instances.
pub(crate) fn read_manifest(directory: &Path) -> Result<DicomdirManifest, DicomdirError> {
	let dicomdir = dicom::object::open_file(directory.join("DICOMDIR"))?;
	let Some(records) = dicomdir
		.get(tags::DIRECTORY_RECORD_SEQUENCE)
		.and_then(InMemElement::items)
	else {
		return Ok(DicomdirManifest {
			files: Vec::new(),
			complete: true,
		});
	};
	Ok(walk_records(records, directory))
}

/// Walks the directory records in file order. The hierarchy is implied
/// by the record types: a PATIENT record owns the following STUDY
/// records, a STUDY the following SERIES, and a SERIES every following
/// file-level record (IMAGE, RT PLAN, ...). A record missing a required
/// tag invalidates itself and everything below it until the next record
/// of its own level.
pub(crate) fn walk_records(records: &[InMemDicomObject], directory: &Path) -> DicomdirManifest {
	let mut manifest = DicomdirManifest {
		files: Vec::new(),
		complete: true,
	};
	let mut patient_valid = false;
	let mut study_valid = false;
	let mut series_valid = false;

	for record in records {
		let record_type = string_value(record, tags::DIRECTORY_RECORD_TYPE);
		match record_type.as_str() {
			"PATIENT" => {
				patient_valid = !string_value(record, tags::PATIENT_NAME).is_empty();
				study_valid = false;
				series_valid = false;
				if !patient_valid {
					tracing::warn!(
						"DICOMDIR patient record without a patient name; ignoring all of its records"
					);
					manifest.complete = false;
				}
			}
			"STUDY" => {
				study_valid =
					patient_valid && !string_value(record, tags::STUDY_INSTANCE_UID).is_empty();
				series_valid = false;
				if patient_valid && !study_valid {
					tracing::warn!(
						"DICOMDIR study record without a study instance UID; ignoring all of its records"
					);
					manifest.complete = false;
				}
			}
			"SERIES" => {
				series_valid =
					study_valid && !string_value(record, tags::SERIES_INSTANCE_UID).is_empty();
				if study_valid && !series_valid {
					tracing::warn!(
						"DICOMDIR series record without a series instance UID; ignoring all of its records"
					);
					manifest.complete = false;
				}
			}
			_ => {
				if !series_valid {
					continue;
				}
				let sop_instance_uid =
					string_value(record, tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE);
				let referenced_file = string_value(record, tags::REFERENCED_FILE_ID);
				if sop_instance_uid.is_empty() || referenced_file.is_empty() {
					tracing::warn!(
						"DICOMDIR file record without a referenced SOP instance UID or file ID; ignoring it"
					);
					manifest.complete = false;
					continue;
				}
				// Media path separators are backslashes; resolve against
				// the DICOMDIR's own directory.
				manifest
					.files
					.push(directory.join(referenced_file.replace('\\', "/")));
			}
		}
	}

	manifest
}

fn string_value(record: &InMemDicomObject, tag: dicom::core::Tag) -> String {
	record
		.get(tag)
		.and_then(|element| element.to_str().ok())
		.map(|value| value.trim_end_matches([' ', '\0']).to_string())
		.unwrap_or_default()
}
