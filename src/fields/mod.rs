//! Derivation of displayed fields from cached DICOM tags.
//!
//! A pipeline of [`DisplayedFieldRule`]s turns the cached tags of one
//! instance into denormalized patient/study/series summary fields and
//! merges them with the fields already stored for those rows. Rules run
//! in registration order: a later rule sees and may override the output
//! of earlier rules.

pub mod default_rule;
pub mod radiotherapy;
pub mod rule;

pub use default_rule::DefaultRule;
pub use radiotherapy::RadiotherapySeriesDescriptionRule;
pub use rule::{DisplayedFieldRule, EmptyFieldRegistry, FieldMap, InstanceFields};

use crate::types::TagKey;
use std::collections::BTreeSet;

/// The ordered rule pipeline. Stateless between invocations; the only
/// state built at construction is the registry of placeholder values.
pub struct DisplayedFieldGenerator {
	rules: Vec<Box<dyn DisplayedFieldRule>>,
	empty_fields: EmptyFieldRegistry,
}

impl Default for DisplayedFieldGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl DisplayedFieldGenerator {
	/// Creates the pipeline with the built-in rules. The radiotherapy
	/// rule runs after the default rule so that it overrides the generic
	/// series description for RT modalities.
	pub fn new() -> Self {
		let mut generator = Self {
			rules: Vec::new(),
			empty_fields: EmptyFieldRegistry::default(),
		};
		generator.register_rule(Box::new(DefaultRule));
		generator.register_rule(Box::new(RadiotherapySeriesDescriptionRule));
		generator
	}

	/// Appends a rule to the pipeline and records its placeholders.
	pub fn register_rule(&mut self, rule: Box<dyn DisplayedFieldRule>) {
		rule.register_empty_field_names(&mut self.empty_fields);
		self.rules.push(rule);
	}

	/// The union of every rule's required tags, deduplicated.
	pub fn required_tags(&self) -> Vec<TagKey> {
		self.rules
			.iter()
			.flat_map(|rule| rule.required_tags())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect()
	}

	pub fn empty_fields(&self) -> &EmptyFieldRegistry {
		&self.empty_fields
	}

	/// Updates the running field maps of the rows owning one instance.
	///
	/// Phase one projects the cached tags through every rule into a
	/// shared set of new fields. Phase two snapshots the current maps and
	/// lets every rule merge the projection against that snapshot into
	/// the running result.
	pub fn update_displayed_fields_for_instance(
		&self,
		cached_tags: &FieldMap,
		series: &mut FieldMap,
		study: &mut FieldMap,
		patient: &mut FieldMap,
	) {
		let mut new_fields = InstanceFields::default();
		for rule in &self.rules {
			rule.get_display_fields_for_instance(cached_tags, &mut new_fields);
		}

		let initial = InstanceFields {
			series: series.clone(),
			study: study.clone(),
			patient: patient.clone(),
		};
		let mut merged = initial.clone();
		for rule in &self.rules {
			rule.merge_display_fields_for_instance(
				&initial,
				&new_fields,
				&mut merged,
				&self.empty_fields,
			);
		}

		*series = merged.series;
		*study = merged.study;
		*patient = merged.patient;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::tag_key;
	use dicom::dictionary_std::tags;

	fn cached(pairs: &[(dicom::core::Tag, &str)]) -> FieldMap {
		pairs
			.iter()
			.map(|(tag, value)| (tag_key(*tag), String::from(*value)))
			.collect()
	}

	fn mr_instance(series_description: &str) -> FieldMap {
		cached(&[
			(tags::PATIENT_ID, "P1"),
			(tags::PATIENT_NAME, "Doe^Jane"),
			(tags::STUDY_INSTANCE_UID, "1.2.3"),
			(tags::STUDY_DESCRIPTION, "Head"),
			(tags::SERIES_INSTANCE_UID, "1.2.3.1"),
			(tags::SERIES_DESCRIPTION, series_description),
			(tags::MODALITY, "MR"),
		])
	}

	#[test]
	fn required_tags_cover_every_rule_without_duplicates() {
		let generator = DisplayedFieldGenerator::new();
		let required = generator.required_tags();
		assert!(required.contains(&tag_key(tags::SOP_INSTANCE_UID)));
		assert!(required.contains(&tag_key(tags::SERIES_DESCRIPTION)));
		assert!(required.contains(&tag_key(tags::RT_PLAN_LABEL)));
		// Modality is required by both rules and must appear once.
		let modality = tag_key(tags::MODALITY);
		assert_eq!(required.iter().filter(|key| **key == modality).count(), 1);
	}

	#[test]
	fn default_projection_reaches_all_three_levels() {
		let generator = DisplayedFieldGenerator::new();
		let mut series = FieldMap::new();
		let mut study = FieldMap::new();
		let mut patient = FieldMap::new();
		generator.update_displayed_fields_for_instance(
			&mr_instance("T1 axial"),
			&mut series,
			&mut study,
			&mut patient,
		);
		assert_eq!(patient.get("PatientName").map(String::as_str), Some("Doe^Jane"));
		assert_eq!(study.get("StudyDescription").map(String::as_str), Some("Head"));
		assert_eq!(
			series.get("SeriesDescription").map(String::as_str),
			Some("T1 axial")
		);
		assert_eq!(series.get("Modality").map(String::as_str), Some("MR"));
	}

	#[test]
	fn series_descriptions_concatenate_across_instances() {
		let generator = DisplayedFieldGenerator::new();
		let mut series = FieldMap::new();
		let mut study = FieldMap::new();
		let mut patient = FieldMap::new();
		for description in ["A", "B", "A"] {
			generator.update_displayed_fields_for_instance(
				&mr_instance(description),
				&mut series,
				&mut study,
				&mut patient,
			);
		}
		assert_eq!(
			series.get("SeriesDescription").map(String::as_str),
			Some("A, B")
		);
	}

	#[test]
	fn rt_plan_label_overrides_series_description() {
		let generator = DisplayedFieldGenerator::new();
		let mut series = FieldMap::new();
		let mut study = FieldMap::new();
		let mut patient = FieldMap::new();
		generator.update_displayed_fields_for_instance(
			&cached(&[
				(tags::MODALITY, "RTPLAN"),
				(tags::RT_PLAN_NAME, ""),
				(tags::RT_PLAN_LABEL, "Plan7"),
				(tags::SERIES_INSTANCE_UID, "1.2.3.9"),
			]),
			&mut series,
			&mut study,
			&mut patient,
		);
		assert_eq!(
			series.get("SeriesDescription").map(String::as_str),
			Some("Plan7")
		);
	}

	#[test]
	fn rt_plan_without_name_or_label_merges_as_unset() {
		let generator = DisplayedFieldGenerator::new();
		let mut series = FieldMap::new();
		let mut study = FieldMap::new();
		let mut patient = FieldMap::new();
		generator.update_displayed_fields_for_instance(
			&cached(&[
				(tags::MODALITY, "RTPLAN"),
				(tags::SERIES_INSTANCE_UID, "1.2.3.9"),
			]),
			&mut series,
			&mut study,
			&mut patient,
		);
		// The projected placeholder is registered as an empty value, so
		// the merge leaves the stored field unset.
		assert_eq!(series.get("SeriesDescription"), None);

		// A later named instance takes over cleanly.
		generator.update_displayed_fields_for_instance(
			&cached(&[
				(tags::MODALITY, "RTPLAN"),
				(tags::RT_PLAN_NAME, "Boost"),
				(tags::SERIES_INSTANCE_UID, "1.2.3.9"),
			]),
			&mut series,
			&mut study,
			&mut patient,
		);
		assert_eq!(
			series.get("SeriesDescription").map(String::as_str),
			Some("Boost")
		);
	}

	#[test]
	fn non_rt_modalities_keep_the_default_projection() {
		let generator = DisplayedFieldGenerator::new();
		let mut new_fields = InstanceFields::default();
		RadiotherapySeriesDescriptionRule.get_display_fields_for_instance(
			&mr_instance("T1 axial"),
			&mut new_fields,
		);
		assert!(new_fields.series.is_empty());
	}
}
