//! Access to parsed DICOM datasets.
//!
//! This is the seam to the DICOM parser: everything above it deals in
//! tag-keyed string values, the canonical form stored in the tag cache.

use crate::types::TagKey;
use dicom::core::Tag;
use dicom::object::{DefaultDicomObject, ReadError};
use std::collections::BTreeMap;
use std::path::Path;

/// A DICOM instance parsed into memory, owned by exactly one holder at a
/// time. Results carry it from the worker thread to the catalog writer.
#[derive(Debug)]
pub struct ParsedDataset {
	object: DefaultDicomObject,
}

impl ParsedDataset {
	/// Parses the DICOM file at `path`.
	pub fn open(path: &Path) -> Result<Self, ReadError> {
		let object = dicom::object::open_file(path)?;
		Ok(Self { object })
	}

	/// Wraps an already constructed file object, e.g. one received over
	/// the wire instead of read from disk.
	pub fn from_object(object: DefaultDicomObject) -> Self {
		Self { object }
	}

	pub fn object(&self) -> &DefaultDicomObject {
		&self.object
	}

	/// Returns the value of `tag` as a string, with multiple values
	/// joined by `\` as they appear on the wire. Absent tags and tags
	/// without a convertible value yield the empty string.
	pub fn element_string(&self, tag: Tag) -> String {
		self.object
			.get(tag)
			.and_then(|element| element.to_str().ok())
			.map(|value| value.trim_end_matches([' ', '\0']).to_string())
			.unwrap_or_default()
	}

	/// [`Self::element_string`] addressed by a canonical `"gggg,eeee"` key.
	/// Unparseable keys yield the empty string like absent tags do.
	pub fn value_for_key(&self, key: &str) -> String {
		crate::types::parse_tag_key(key)
			.map(|tag| self.element_string(tag))
			.unwrap_or_default()
	}

	/// Extracts the values for every requested tag key in one pass,
	/// inserting the empty string where the instance has no value.
	pub fn values_for_keys<'a>(
		&self,
		keys: impl IntoIterator<Item = &'a TagKey>,
	) -> BTreeMap<TagKey, String> {
		keys.into_iter()
			.map(|key| (key.clone(), self.value_for_key(key)))
			.collect()
	}

	pub fn sop_instance_uid(&self) -> String {
		self.element_string(dicom::dictionary_std::tags::SOP_INSTANCE_UID)
	}
}
