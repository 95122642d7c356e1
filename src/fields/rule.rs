use crate::types::TagKey;
use std::collections::BTreeMap;
use tracing::warn;

/// Displayed fields for one catalog level, keyed by field name.
pub type FieldMap = BTreeMap<String, String>;

/// Field name → placeholder strings that count as "unset" for that field,
/// e.g. `SeriesDescription` → `"Unnamed Series"`. A field name may carry
/// several placeholders.
pub type PlaceholderMap = BTreeMap<String, Vec<String>>;

/// The three per-level field maps a single instance projects into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceFields {
	pub series: FieldMap,
	pub study: FieldMap,
	pub patient: FieldMap,
}

/// Placeholder registrations for all three levels, populated once at
/// pipeline construction by every rule's registration hook.
#[derive(Debug, Clone, Default)]
pub struct EmptyFieldRegistry {
	pub series: PlaceholderMap,
	pub study: PlaceholderMap,
	pub patient: PlaceholderMap,
}

impl EmptyFieldRegistry {
	pub fn register_series(&mut self, field: &str, placeholder: &str) {
		Self::register(&mut self.series, field, placeholder);
	}

	pub fn register_study(&mut self, field: &str, placeholder: &str) {
		Self::register(&mut self.study, field, placeholder);
	}

	pub fn register_patient(&mut self, field: &str, placeholder: &str) {
		Self::register(&mut self.patient, field, placeholder);
	}

	fn register(map: &mut PlaceholderMap, field: &str, placeholder: &str) {
		map.entry(String::from(field))
			.or_default()
			.push(String::from(placeholder));
	}
}

/// A displayed-field rule: declares the tags it needs cached, registers
/// its placeholder values, projects one instance's cached tags into field
/// maps, and reconciles its fields with previously stored values.
///
/// Rules run in pipeline order; a later rule sees (and may override) the
/// output of earlier rules for the same field name.
pub trait DisplayedFieldRule: Send + Sync {
	/// Tag keys this rule reads from the cache. The union across all
	/// registered rules forms the catalog's precache set.
	fn required_tags(&self) -> Vec<TagKey>;

	/// Registers the placeholder values this rule may emit.
	fn register_empty_field_names(&self, registry: &mut EmptyFieldRegistry);

	/// Projects the cached tags of a single instance into `fields`.
	fn get_display_fields_for_instance(&self, cached_tags: &FieldMap, fields: &mut InstanceFields);

	/// Reconciles the stored fields (`initial`) with this rule's
	/// projection (`new_fields`) into `merged`. `merged` enters holding
	/// the running result of earlier rules in the pipeline.
	fn merge_display_fields_for_instance(
		&self,
		initial: &InstanceFields,
		new_fields: &InstanceFields,
		merged: &mut InstanceFields,
		empty_fields: &EmptyFieldRegistry,
	);
}

/// A field is empty when it is absent, holds the empty string, or holds
/// one of the placeholders registered for its name.
pub fn is_field_empty(field: &str, fields: &FieldMap, placeholders: &PlaceholderMap) -> bool {
	match fields.get(field) {
		None => true,
		Some(value) if value.is_empty() => true,
		Some(value) => placeholders
			.get(field)
			.is_some_and(|known| known.iter().any(|placeholder| placeholder == value)),
	}
}

/// Merge policy for fields expected to be stable across all instances of
/// the same parent. An empty side is absorbed; on a genuine conflict the
/// stored value wins.
pub fn merge_expect_same_value(
	field: &str,
	initial: &FieldMap,
	new_fields: &FieldMap,
	merged: &mut FieldMap,
	placeholders: &PlaceholderMap,
) {
	if is_field_empty(field, new_fields, placeholders) {
		if !is_field_empty(field, initial, placeholders) {
			merged.insert(String::from(field), initial[field].clone());
		}
		return;
	}
	if is_field_empty(field, initial, placeholders) {
		merged.insert(String::from(field), new_fields[field].clone());
		return;
	}
	if initial[field] != new_fields[field] {
		warn!(
			field,
			initial = %initial[field],
			new = %new_fields[field],
			"Conflicting values for a field expected to be uniform; keeping the stored value"
		);
	}
	merged.insert(String::from(field), initial[field].clone());
}

/// Merge policy for fields that accumulate distinct values as a
/// comma-separated list. Re-merging a value that is already listed leaves
/// the stored list unchanged.
pub fn merge_concatenate(
	field: &str,
	initial: &FieldMap,
	new_fields: &FieldMap,
	merged: &mut FieldMap,
	placeholders: &PlaceholderMap,
) {
	if is_field_empty(field, new_fields, placeholders) {
		if !is_field_empty(field, initial, placeholders) {
			merged.insert(String::from(field), initial[field].clone());
		}
		return;
	}
	if is_field_empty(field, initial, placeholders) {
		merged.insert(String::from(field), new_fields[field].clone());
		return;
	}
	let new_value = &new_fields[field];
	let already_listed = initial[field]
		.split(',')
		.any(|token| token.trim() == new_value.trim());
	if already_listed {
		merged.insert(String::from(field), initial[field].clone());
	} else {
		merged.insert(
			String::from(field),
			format!("{}, {}", initial[field], new_value),
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fields(pairs: &[(&str, &str)]) -> FieldMap {
		pairs
			.iter()
			.map(|(k, v)| (String::from(*k), String::from(*v)))
			.collect()
	}

	fn series_placeholders() -> PlaceholderMap {
		let mut registry = EmptyFieldRegistry::default();
		registry.register_series("SeriesDescription", "Unnamed Series");
		registry.register_series("SeriesDescription", "Unnamed RT Image");
		registry.series
	}

	#[test]
	fn field_is_empty_when_absent_blank_or_placeholder() {
		let placeholders = series_placeholders();
		assert!(is_field_empty(
			"SeriesDescription",
			&fields(&[]),
			&placeholders
		));
		assert!(is_field_empty(
			"SeriesDescription",
			&fields(&[("SeriesDescription", "")]),
			&placeholders
		));
		assert!(is_field_empty(
			"SeriesDescription",
			&fields(&[("SeriesDescription", "Unnamed RT Image")]),
			&placeholders
		));
		assert!(!is_field_empty(
			"SeriesDescription",
			&fields(&[("SeriesDescription", "T1 axial")]),
			&placeholders
		));
	}

	#[test]
	fn expect_same_value_absorbs_empty_sides() {
		let placeholders = PlaceholderMap::default();
		let value = fields(&[("Modality", "MR")]);
		let empty = fields(&[]);

		let mut merged = FieldMap::new();
		merge_expect_same_value("Modality", &value, &empty, &mut merged, &placeholders);
		assert_eq!(merged.get("Modality").map(String::as_str), Some("MR"));

		let mut merged = FieldMap::new();
		merge_expect_same_value("Modality", &empty, &value, &mut merged, &placeholders);
		assert_eq!(merged.get("Modality").map(String::as_str), Some("MR"));
	}

	#[test]
	fn expect_same_value_keeps_stored_value_on_conflict() {
		let placeholders = PlaceholderMap::default();
		let initial = fields(&[("Modality", "MR")]);
		let new_fields = fields(&[("Modality", "CT")]);
		let mut merged = FieldMap::new();
		merge_expect_same_value("Modality", &initial, &new_fields, &mut merged, &placeholders);
		assert_eq!(merged.get("Modality").map(String::as_str), Some("MR"));
	}

	#[test]
	fn concatenate_appends_new_values() {
		let placeholders = PlaceholderMap::default();
		let initial = fields(&[("ModalitiesInStudy", "MR")]);
		let new_fields = fields(&[("ModalitiesInStudy", "CT")]);
		let mut merged = FieldMap::new();
		merge_concatenate(
			"ModalitiesInStudy",
			&initial,
			&new_fields,
			&mut merged,
			&placeholders,
		);
		assert_eq!(
			merged.get("ModalitiesInStudy").map(String::as_str),
			Some("MR, CT")
		);
	}

	#[test]
	fn concatenate_is_idempotent() {
		let placeholders = PlaceholderMap::default();
		let new_fields = fields(&[("ModalitiesInStudy", "CT")]);

		let mut first = FieldMap::new();
		merge_concatenate(
			"ModalitiesInStudy",
			&fields(&[("ModalitiesInStudy", "MR")]),
			&new_fields,
			&mut first,
			&placeholders,
		);
		let mut second = FieldMap::new();
		merge_concatenate(
			"ModalitiesInStudy",
			&first,
			&new_fields,
			&mut second,
			&placeholders,
		);
		assert_eq!(first, second);
	}

	#[test]
	fn concatenate_treats_placeholder_as_empty() {
		let placeholders = series_placeholders();
		let initial = fields(&[("SeriesDescription", "Scout")]);
		let new_fields = fields(&[("SeriesDescription", "Unnamed RT Image")]);
		let mut merged = FieldMap::new();
		merge_concatenate(
			"SeriesDescription",
			&initial,
			&new_fields,
			&mut merged,
			&placeholders,
		);
		assert_eq!(
			merged.get("SeriesDescription").map(String::as_str),
			Some("Scout")
		);
	}
}
