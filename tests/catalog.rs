//! Scenarios over the catalog's single-dataset insert, per-file read
//! API, and removal cascades.

mod common;

use common::{identifiers, write_instance};
use dicom::core::VR;
use dicom::dictionary_std::tags;
use dicom_index::{Catalog, CatalogEvent, ParsedDataset};
use std::fs;
use std::path::Path;
use std::sync::mpsc;

fn parsed(path: &Path) -> ParsedDataset {
	ParsedDataset::open(path).unwrap()
}

#[test]
fn insert_dataset_inserts_then_overwrites() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let first = source.path().join("a.dcm");
	let elements = identifiers("20.1.1.1", "20.1.1", "20.1", "P20", "Doe^Jane");
	write_instance(&first, &elements);

	let mut catalog = Catalog::open(db.path()).unwrap();
	let (sink, events) = mpsc::channel();
	catalog.set_event_sink(sink);

	catalog.insert_dataset(&first, parsed(&first), false).unwrap();
	assert_eq!(catalog.patients_count(), 1);
	assert_eq!(catalog.studies_count(), 1);
	assert_eq!(catalog.series_count(), 1);
	assert_eq!(catalog.instances_count(), 1);
	assert_eq!(catalog.instance("20.1.1.1").unwrap().file_path, first);
	let first_events: Vec<CatalogEvent> = events.try_iter().collect();
	assert!(first_events.contains(&CatalogEvent::InstanceAdded(String::from("20.1.1.1"))));

	// The same SOP instance arriving from another location replaces the
	// row instead of adding one, without an "added" notification.
	let second = source.path().join("b.dcm");
	write_instance(&second, &elements);
	catalog.insert_dataset(&second, parsed(&second), false).unwrap();
	assert_eq!(catalog.instances_count(), 1);
	let instance = catalog.instance("20.1.1.1").unwrap();
	assert_eq!(instance.file_path, second);
	assert!(!instance.displayed_fields_updated);
	assert!(!events
		.try_iter()
		.any(|event| matches!(event, CatalogEvent::InstanceAdded(_))));
}

#[test]
fn file_value_falls_back_to_the_file_and_caches() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let file = source.path().join("x.dcm");
	let mut elements = identifiers("21.1.1.1", "21.1.1", "21.1", "P21", "Doe^Jane");
	elements.push((tags::MANUFACTURER, VR::LO, "Acme Imaging"));
	write_instance(&file, &elements);

	let mut catalog = Catalog::open(db.path()).unwrap();
	catalog.insert_dataset(&file, parsed(&file), false).unwrap();

	// The manufacturer is not part of the precache set, so the first
	// read goes back to the file.
	assert_eq!(catalog.cached_tag("21.1.1.1", "0008,0070"), "");
	assert_eq!(catalog.file_value(&file, "0008,0070"), "Acme Imaging");
	assert_eq!(catalog.cached_tag("21.1.1.1", "0008,0070"), "Acme Imaging");

	// Once cached, the value survives the file itself.
	fs::remove_file(&file).unwrap();
	assert_eq!(catalog.file_value(&file, "0008,0070"), "Acme Imaging");

	// Unknown files read as empty.
	assert_eq!(catalog.file_value(Path::new("/nowhere.dcm"), "0008,0070"), "");
}

#[test]
fn descriptions_for_file_reports_all_three_levels() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let file = source.path().join("x.dcm");
	let mut elements = identifiers("22.1.1.1", "22.1.1", "22.1", "P22", "Doe^Jane");
	elements.push((tags::SERIES_DESCRIPTION, VR::LO, "T1 axial"));
	elements.push((tags::STUDY_DESCRIPTION, VR::LO, "Head"));
	write_instance(&file, &elements);

	let mut catalog = Catalog::open(db.path()).unwrap();
	catalog.insert_dataset(&file, parsed(&file), false).unwrap();

	let descriptions = catalog.descriptions_for_file(&file);
	assert_eq!(
		descriptions.get("SeriesDescription").map(String::as_str),
		Some("T1 axial")
	);
	assert_eq!(
		descriptions.get("StudyDescription").map(String::as_str),
		Some("Head")
	);
	assert_eq!(
		descriptions.get("PatientsName").map(String::as_str),
		Some("Doe^Jane")
	);
	assert!(catalog.descriptions_for_file(Path::new("/nowhere.dcm")).is_empty());
}

#[test]
fn remove_patient_cascades_through_the_hierarchy() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let first = source.path().join("a.dcm");
	let second = source.path().join("b.dcm");
	write_instance(
		&first,
		&identifiers("23.1.1.1", "23.1.1", "23.1", "P23", "Doe^Jane"),
	);
	write_instance(
		&second,
		&identifiers("23.2.1.1", "23.2.1", "23.2", "P23", "Doe^Jane"),
	);

	let mut catalog = Catalog::open(db.path()).unwrap();
	catalog.insert_dataset(&first, parsed(&first), true).unwrap();
	catalog.insert_dataset(&second, parsed(&second), true).unwrap();
	catalog.update_displayed_fields().unwrap();

	let stored = db.path().join("dicom").join("23.1").join("23.1.1").join("23.1.1.1");
	assert!(stored.is_file());
	assert_eq!(catalog.studies_for_patient("P23").len(), 2);
	assert!(!catalog.displayed_fields_for_series("23.1.1").is_empty());

	assert!(catalog.remove_patient("P23"));
	assert_eq!(catalog.patients_count(), 0);
	assert_eq!(catalog.studies_count(), 0);
	assert_eq!(catalog.series_count(), 0);
	assert_eq!(catalog.instances_count(), 0);
	assert!(!stored.exists());
	assert!(catalog.cached_tags("23.1.1.1").is_empty());
	assert!(catalog.displayed_fields_for_series("23.1.1").is_empty());
	assert!(catalog.displayed_fields_for_study("23.1").is_empty());
	assert!(catalog.displayed_fields_for_patient("P23").is_empty());

	// Removal is not retriable once the row is gone.
	assert!(!catalog.remove_patient("P23"));
}

#[test]
fn remove_series_leaves_siblings_and_external_files_alone() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let first = source.path().join("a.dcm");
	let second = source.path().join("b.dcm");
	write_instance(
		&first,
		&identifiers("24.1.1.1", "24.1.1", "24.1", "P24", "Doe^Jane"),
	);
	write_instance(
		&second,
		&identifiers("24.1.2.1", "24.1.2", "24.1", "P24", "Doe^Jane"),
	);

	let mut catalog = Catalog::open(db.path()).unwrap();
	catalog.insert_dataset(&first, parsed(&first), false).unwrap();
	catalog.insert_dataset(&second, parsed(&second), false).unwrap();

	assert!(catalog.remove_series("24.1.1"));
	assert!(catalog.instance("24.1.1.1").is_none());
	assert!(catalog.instance("24.1.2.1").is_some());
	assert_eq!(catalog.studies_count(), 1);
	assert_eq!(catalog.patients_count(), 1);
	// Externally linked files are never deleted.
	assert!(first.is_file());
	assert!(!catalog.remove_series("24.1.1"));
}

#[test]
fn remove_study_keeps_the_patient_row() {
	let source = tempfile::tempdir().unwrap();
	let db = tempfile::tempdir().unwrap();
	let file = source.path().join("a.dcm");
	write_instance(
		&file,
		&identifiers("25.1.1.1", "25.1.1", "25.1", "P25", "Doe^Jane"),
	);

	let mut catalog = Catalog::open(db.path()).unwrap();
	catalog.insert_dataset(&file, parsed(&file), false).unwrap();

	assert!(catalog.remove_study("25.1"));
	assert_eq!(catalog.studies_count(), 0);
	assert_eq!(catalog.series_count(), 0);
	assert_eq!(catalog.instances_count(), 0);
	assert_eq!(catalog.patients_count(), 1);
	assert!(catalog.studies_for_patient("P25").is_empty());
	assert!(!catalog.remove_study("25.1"));
}
