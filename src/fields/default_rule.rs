use super::rule::{
	merge_concatenate, merge_expect_same_value, DisplayedFieldRule, EmptyFieldRegistry, FieldMap,
	InstanceFields,
};
use crate::types::{tag_key, TagKey};
use dicom::core::Tag;
use dicom::dictionary_std::tags;

pub const EMPTY_SERIES_DESCRIPTION: &str = "Unnamed Series";

const PATIENT_TAGS: &[Tag] = &[
	tags::PATIENT_ID,
	tags::PATIENT_NAME,
	tags::PATIENT_BIRTH_DATE,
	tags::PATIENT_BIRTH_TIME,
	tags::PATIENT_SEX,
	tags::PATIENT_AGE,
	tags::PATIENT_COMMENTS,
];

const STUDY_TAGS: &[Tag] = &[
	tags::STUDY_INSTANCE_UID,
	tags::STUDY_ID,
	tags::STUDY_DATE,
	tags::STUDY_TIME,
	tags::ACCESSION_NUMBER,
	tags::MODALITIES_IN_STUDY,
	tags::INSTITUTION_NAME,
	tags::PERFORMING_PHYSICIAN_NAME,
	tags::REFERRING_PHYSICIAN_NAME,
	tags::STUDY_DESCRIPTION,
];

const SERIES_TAGS: &[Tag] = &[
	tags::SERIES_INSTANCE_UID,
	tags::SERIES_DATE,
	tags::SERIES_TIME,
	tags::SERIES_DESCRIPTION,
	tags::MODALITY,
	tags::BODY_PART_EXAMINED,
	tags::FRAME_OF_REFERENCE_UID,
	tags::CONTRAST_BOLUS_AGENT,
	tags::SCANNING_SEQUENCE,
	tags::SERIES_NUMBER,
	tags::ACQUISITION_NUMBER,
	tags::ECHO_NUMBERS,
	tags::TEMPORAL_POSITION_IDENTIFIER,
];

/// Projects the standard patient/study/series summary fields.
#[derive(Debug, Default)]
pub struct DefaultRule;

fn cached<'a>(cached_tags: &'a FieldMap, tag: Tag) -> &'a str {
	cached_tags
		.get(&tag_key(tag))
		.map(String::as_str)
		.unwrap_or_default()
}

fn set(fields: &mut FieldMap, name: &str, value: &str) {
	fields.insert(String::from(name), String::from(value));
}

impl DisplayedFieldRule for DefaultRule {
	fn required_tags(&self) -> Vec<TagKey> {
		std::iter::once(tags::SOP_INSTANCE_UID)
			.chain(PATIENT_TAGS.iter().copied())
			.chain(STUDY_TAGS.iter().copied())
			.chain(SERIES_TAGS.iter().copied())
			.map(tag_key)
			.collect()
	}

	fn register_empty_field_names(&self, registry: &mut EmptyFieldRegistry) {
		registry.register_series("SeriesDescription", EMPTY_SERIES_DESCRIPTION);
	}

	fn get_display_fields_for_instance(&self, cached_tags: &FieldMap, fields: &mut InstanceFields) {
		set(
			&mut fields.patient,
			"PatientName",
			cached(cached_tags, tags::PATIENT_NAME),
		);
		set(
			&mut fields.patient,
			"PatientID",
			cached(cached_tags, tags::PATIENT_ID),
		);

		set(
			&mut fields.study,
			"StudyInstanceUID",
			cached(cached_tags, tags::STUDY_INSTANCE_UID),
		);
		let patient_index = fields.patient.get("PatientIndex").cloned().unwrap_or_default();
		set(&mut fields.study, "PatientIndex", &patient_index);
		set(
			&mut fields.study,
			"StudyDescription",
			cached(cached_tags, tags::STUDY_DESCRIPTION),
		);
		set(
			&mut fields.study,
			"StudyDate",
			cached(cached_tags, tags::STUDY_DATE),
		);
		set(
			&mut fields.study,
			"ModalitiesInStudy",
			cached(cached_tags, tags::MODALITIES_IN_STUDY),
		);
		set(
			&mut fields.study,
			"InstitutionName",
			cached(cached_tags, tags::INSTITUTION_NAME),
		);
		set(
			&mut fields.study,
			"ReferringPhysician",
			cached(cached_tags, tags::REFERRING_PHYSICIAN_NAME),
		);

		set(
			&mut fields.series,
			"SeriesInstanceUID",
			cached(cached_tags, tags::SERIES_INSTANCE_UID),
		);
		set(
			&mut fields.series,
			"StudyInstanceUID",
			cached(cached_tags, tags::STUDY_INSTANCE_UID),
		);
		set(
			&mut fields.series,
			"SeriesNumber",
			cached(cached_tags, tags::SERIES_NUMBER),
		);
		set(
			&mut fields.series,
			"SeriesDescription",
			cached(cached_tags, tags::SERIES_DESCRIPTION),
		);
		set(
			&mut fields.series,
			"Modality",
			cached(cached_tags, tags::MODALITY),
		);
	}

	fn merge_display_fields_for_instance(
		&self,
		initial: &InstanceFields,
		new_fields: &InstanceFields,
		merged: &mut InstanceFields,
		empty_fields: &EmptyFieldRegistry,
	) {
		for field in ["PatientName", "PatientID"] {
			merge_expect_same_value(
				field,
				&initial.patient,
				&new_fields.patient,
				&mut merged.patient,
				&empty_fields.patient,
			);
		}

		for field in ["StudyInstanceUID", "PatientIndex", "StudyDate", "InstitutionName"] {
			merge_expect_same_value(
				field,
				&initial.study,
				&new_fields.study,
				&mut merged.study,
				&empty_fields.study,
			);
		}
		for field in ["StudyDescription", "ModalitiesInStudy", "ReferringPhysician"] {
			merge_concatenate(
				field,
				&initial.study,
				&new_fields.study,
				&mut merged.study,
				&empty_fields.study,
			);
		}

		for field in ["SeriesInstanceUID", "StudyInstanceUID", "SeriesNumber", "Modality"] {
			merge_expect_same_value(
				field,
				&initial.series,
				&new_fields.series,
				&mut merged.series,
				&empty_fields.series,
			);
		}
		merge_concatenate(
			"SeriesDescription",
			&initial.series,
			&new_fields.series,
			&mut merged.series,
			&empty_fields.series,
		);
	}
}
