use dicom::core::Tag;

/// UI (Unique Identifier) value representation.
pub type UI = String;

/// A DICOM tag key in the catalog's canonical `"gggg,eeee"` form:
/// lowercase hexadecimal group and element, zero-padded to four digits.
pub type TagKey = String;

/// Formats a tag as its canonical catalog key.
pub fn tag_key(tag: Tag) -> TagKey {
	format!("{:04x},{:04x}", tag.group(), tag.element())
}

/// Parses a canonical `"gggg,eeee"` key back into a tag.
/// Returns `None` for anything that is not two comma-separated hex shorts.
pub fn parse_tag_key(key: &str) -> Option<Tag> {
	let (group, element) = key.split_once(',')?;
	let group = u16::from_str_radix(group, 16).ok()?;
	let element = u16::from_str_radix(element, 16).ok()?;
	Some(Tag(group, element))
}
