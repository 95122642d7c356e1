//! Regeneration of displayed fields for freshly inserted instances.

use super::{Catalog, CatalogError, CatalogEvent};
use crate::fields::FieldMap;
use crate::types::UI;
use std::collections::BTreeMap;
use tracing::error;

impl Catalog {
	/// Regenerates the displayed fields of every instance inserted or
	/// overwritten since the last update. The merged patient/study/series
	/// maps accumulate in memory and are committed together.
	pub fn update_displayed_fields(&mut self) -> Result<(), CatalogError> {
		self.emit(CatalogEvent::DisplayedFieldsUpdateStarted);
		let pending: Vec<(UI, UI)> = self
			.store
			.instances
			.values()
			.filter(|instance| !instance.displayed_fields_updated)
			.map(|instance| {
				(
					instance.sop_instance_uid.clone(),
					instance.series_instance_uid.clone(),
				)
			})
			.collect();
		if pending.is_empty() {
			self.emit(CatalogEvent::DisplayedFieldsUpdated);
			return Ok(());
		}

		let snapshot = self.store.clone();
		let mut patient_working: BTreeMap<String, FieldMap> = BTreeMap::new();
		let mut study_working: BTreeMap<UI, FieldMap> = BTreeMap::new();
		let mut series_working: BTreeMap<UI, FieldMap> = BTreeMap::new();

		for (progress, (sop_instance_uid, series_instance_uid)) in pending.iter().enumerate() {
			self.emit(CatalogEvent::DisplayedFieldsUpdateProgress(progress + 1));

			// One bulk read per instance, then everything happens on maps.
			let cached_tags = self.cached_tags(sop_instance_uid);

			let Some(series) = self.store.series.get(series_instance_uid) else {
				error!("No series row for SOP instance UID {sop_instance_uid}");
				continue;
			};
			let study_instance_uid = series.study_instance_uid.clone();
			let Some(study) = self.store.studies.get(&study_instance_uid) else {
				error!("No study row for SOP instance UID {sop_instance_uid}");
				continue;
			};
			let patient_id = study.patient_id.clone();
			let Some(patient) = self.store.patients.get(&patient_id) else {
				error!("No patient row for SOP instance UID {sop_instance_uid}");
				continue;
			};
			let patient_index = patient.index;

			if !series_working.contains_key(series_instance_uid) {
				let stored = self
					.store
					.series_fields
					.get(series_instance_uid)
					.cloned()
					.unwrap_or_default();
				series_working.insert(series_instance_uid.clone(), stored);
			}
			if !study_working.contains_key(&study_instance_uid) {
				let stored = self
					.store
					.study_fields
					.get(&study_instance_uid)
					.cloned()
					.unwrap_or_default();
				study_working.insert(study_instance_uid.clone(), stored);
			}
			if !patient_working.contains_key(&patient_id) {
				let stored = self
					.store
					.patient_fields
					.get(&patient_id)
					.cloned()
					.unwrap_or_default();
				patient_working.insert(patient_id.clone(), stored);
			}

			let series_fields = series_working.get_mut(series_instance_uid).unwrap();
			let study_fields = study_working.get_mut(&study_instance_uid).unwrap();
			let patient_fields = patient_working.get_mut(&patient_id).unwrap();

			study_fields.insert(String::from("PatientIndex"), patient_index.to_string());

			self.generator.update_displayed_fields_for_instance(
				&cached_tags,
				series_fields,
				study_fields,
				patient_fields,
			);
		}

		for (series_uid, fields) in series_working {
			self.store.series_fields.insert(series_uid, fields);
		}
		for (study_uid, fields) in study_working {
			self.store.study_fields.insert(study_uid, fields);
		}
		for (patient_id, fields) in patient_working {
			self.store.patient_fields.insert(patient_id, fields);
		}
		for (sop_instance_uid, _) in &pending {
			if let Some(instance) = self.store.instances.get_mut(sop_instance_uid) {
				instance.displayed_fields_updated = true;
			}
		}

		if let Err(err) = self.flush() {
			self.store = snapshot;
			return Err(err);
		}
		self.emit(CatalogEvent::DisplayedFieldsUpdated);
		Ok(())
	}
}
