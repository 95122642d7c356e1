//! Shared helpers: synthesize real DICOM instances and DICOMDIR
//! manifests on disk for the indexing scenarios.

use dicom::core::value::{DataSetSequence, Value};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use std::fs;
use std::path::Path;

pub fn object_with(elements: &[(Tag, VR, &str)]) -> InMemDicomObject {
	let mut object = InMemDicomObject::new_empty();
	for (tag, vr, value) in elements {
		object.put(DataElement::new(*tag, *vr, PrimitiveValue::from(*value)));
	}
	object
}

/// Writes a minimal but standard-conforming instance file.
pub fn write_instance(path: &Path, elements: &[(Tag, VR, &str)]) {
	let sop_instance_uid = elements
		.iter()
		.find(|(tag, _, _)| *tag == tags::SOP_INSTANCE_UID)
		.map(|(_, _, value)| *value)
		.expect("test instances carry a SOP instance UID");
	let meta = FileMetaTableBuilder::new()
		.media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
		.media_storage_sop_instance_uid(sop_instance_uid)
		.transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
		.build()
		.expect("file meta should build");
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).expect("parent directory should be creatable");
	}
	object_with(elements)
		.with_exact_meta(meta)
		.write_to_file(path)
		.expect("instance file should write");
}

/// The standard identifier set of one instance; append modality-specific
/// elements as needed.
pub fn identifiers<'a>(
	sop: &'a str,
	series: &'a str,
	study: &'a str,
	patient_id: &'a str,
	patient_name: &'a str,
) -> Vec<(Tag, VR, &'a str)> {
	vec![
		(tags::SOP_INSTANCE_UID, VR::UI, sop),
		(tags::SERIES_INSTANCE_UID, VR::UI, series),
		(tags::STUDY_INSTANCE_UID, VR::UI, study),
		(tags::PATIENT_ID, VR::LO, patient_id),
		(tags::PATIENT_NAME, VR::PN, patient_name),
	]
}

/// Writes `<directory>/DICOMDIR` holding the given directory records.
pub fn write_dicomdir(directory: &Path, records: Vec<InMemDicomObject>) {
	let mut object = InMemDicomObject::new_empty();
	let mut record_sequence = InMemElement::new(
		tags::DIRECTORY_RECORD_SEQUENCE,
		VR::SQ,
		Value::Sequence(DataSetSequence::empty()),
	);
	let items = record_sequence
		.items_mut()
		.expect("sequence should have items");
	for record in records {
		items.push(record);
	}
	object.put(record_sequence);
	let meta = FileMetaTableBuilder::new()
		.media_storage_sop_class_uid(uids::MEDIA_STORAGE_DIRECTORY_STORAGE)
		.media_storage_sop_instance_uid("2.25.4242")
		.transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
		.build()
		.expect("file meta should build");
	fs::create_dir_all(directory).expect("directory should be creatable");
	object
		.with_exact_meta(meta)
		.write_to_file(directory.join("DICOMDIR"))
		.expect("DICOMDIR should write");
}

pub fn dicomdir_record(elements: &[(Tag, VR, &str)]) -> InMemDicomObject {
	object_with(elements)
}
