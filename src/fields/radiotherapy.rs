use super::rule::{DisplayedFieldRule, EmptyFieldRegistry, FieldMap, InstanceFields};
use crate::types::{tag_key, TagKey};
use dicom::core::Tag;
use dicom::dictionary_std::tags;

pub const EMPTY_SERIES_DESCRIPTION_RTPLAN: &str = "Unnamed RT Plan";
pub const EMPTY_SERIES_DESCRIPTION_RTSTRUCT: &str = "Unnamed RT Structure Set";
pub const EMPTY_SERIES_DESCRIPTION_RTIMAGE: &str = "Unnamed RT Image";

/// Overrides the series description for radiotherapy modalities, where
/// the plan/structure-set/image name tags are far more telling than the
/// generic `SeriesDescription`.
#[derive(Debug, Default)]
pub struct RadiotherapySeriesDescriptionRule;

fn cached<'a>(cached_tags: &'a FieldMap, tag: Tag) -> &'a str {
	cached_tags
		.get(&tag_key(tag))
		.map(String::as_str)
		.unwrap_or_default()
}

/// Picks the first non-empty of `name` and `label`, falling back to the
/// modality's placeholder.
fn description_from<'a>(
	cached_tags: &'a FieldMap,
	name: Tag,
	label: Tag,
	placeholder: &'a str,
) -> &'a str {
	let name = cached(cached_tags, name);
	if !name.is_empty() {
		return name;
	}
	let label = cached(cached_tags, label);
	if !label.is_empty() {
		return label;
	}
	placeholder
}

impl DisplayedFieldRule for RadiotherapySeriesDescriptionRule {
	fn required_tags(&self) -> Vec<TagKey> {
		[
			tags::MODALITY,
			tags::RT_PLAN_NAME,
			tags::RT_PLAN_LABEL,
			tags::STRUCTURE_SET_NAME,
			tags::STRUCTURE_SET_LABEL,
			tags::RT_IMAGE_NAME,
			tags::RT_IMAGE_LABEL,
			tags::RT_IMAGE_DESCRIPTION,
		]
		.into_iter()
		.map(tag_key)
		.collect()
	}

	fn register_empty_field_names(&self, registry: &mut EmptyFieldRegistry) {
		registry.register_series("SeriesDescription", EMPTY_SERIES_DESCRIPTION_RTPLAN);
		registry.register_series("SeriesDescription", EMPTY_SERIES_DESCRIPTION_RTSTRUCT);
		registry.register_series("SeriesDescription", EMPTY_SERIES_DESCRIPTION_RTIMAGE);
	}

	fn get_display_fields_for_instance(&self, cached_tags: &FieldMap, fields: &mut InstanceFields) {
		let description = match cached(cached_tags, tags::MODALITY) {
			"RTPLAN" => description_from(
				cached_tags,
				tags::RT_PLAN_NAME,
				tags::RT_PLAN_LABEL,
				EMPTY_SERIES_DESCRIPTION_RTPLAN,
			),
			"RTSTRUCT" => description_from(
				cached_tags,
				tags::STRUCTURE_SET_NAME,
				tags::STRUCTURE_SET_LABEL,
				EMPTY_SERIES_DESCRIPTION_RTSTRUCT,
			),
			"RTIMAGE" => description_from(
				cached_tags,
				tags::RT_IMAGE_NAME,
				tags::RT_IMAGE_LABEL,
				EMPTY_SERIES_DESCRIPTION_RTIMAGE,
			),
			// Not a radiotherapy instance; leave the field to other rules.
			_ => return,
		};
		fields
			.series
			.insert(String::from("SeriesDescription"), String::from(description));
	}

	fn merge_display_fields_for_instance(
		&self,
		_initial: &InstanceFields,
		_new_fields: &InstanceFields,
		_merged: &mut InstanceFields,
		_empty_fields: &EmptyFieldRegistry,
	) {
		// The default rule already concatenates series descriptions, and
		// the registered placeholders make unset RT descriptions merge as
		// empty. Nothing to reconcile beyond that.
	}
}
