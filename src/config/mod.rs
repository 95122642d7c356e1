use serde::de::Error;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::TagKey;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
	#[serde(default)]
	pub telemetry: TelemetryConfig,
	#[serde(default)]
	pub database: DatabaseConfig,
	#[serde(default)]
	pub indexing: IndexingConfig,
}

impl AppConfig {
	/// Loads the application configuration from the following sources:
	/// 1. Defaults (defined in `defaults.yaml`)
	/// 2. `config.yaml` in the working directory
	/// 3. From environment variables, prefixed with DICOM_INDEX
	/// # Errors
	/// Returns a [`config::ConfigError`] if source collection fails.
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::{Config, Environment, File, FileFormat};
		Config::builder()
			.add_source(File::from_str(
				include_str!("defaults.yaml"),
				FileFormat::Yaml,
			))
			.add_source(File::with_name("config.yaml").required(false))
			.add_source(Environment::with_prefix("DICOM_INDEX").separator("_"))
			.build()?
			.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
	/// Root of the managed store: the catalog snapshot and the copied
	/// instance files live below this directory.
	pub directory: PathBuf,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			directory: PathBuf::from("./dicom-db"),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexingConfig {
	/// Also descend into hidden directories and pick up hidden files.
	pub include_hidden: bool,
	/// Copy ingested files into the managed store instead of linking to
	/// their source location.
	pub copy_on_import: bool,
	/// Tags cached per instance on top of the displayed-field rules'
	/// requirements, in `"gggg,eeee"` form.
	#[serde(default)]
	pub extra_tags_to_precache: Vec<TagKey>,
}

impl Default for IndexingConfig {
	fn default() -> Self {
		Self {
			include_hidden: false,
			copy_on_import: false,
			extra_tags_to_precache: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
	#[serde(deserialize_with = "deserialize_log_level")]
	pub level: tracing::Level,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self {
			level: tracing::Level::INFO,
		}
	}
}

/// Deserializer for [`tracing::Level`] as it does not implement [Deserialize]
fn deserialize_log_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
	D: Deserializer<'de>,
{
	let value = String::deserialize(deserializer)?;

	tracing::Level::from_str(&value)
		.map_err(|_| Error::unknown_variant(&value, &["TRACE", "DEBUG", "INFO", "WARN", "ERROR"]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_deserialize() {
		let config = AppConfig::new().expect("defaults should load");
		assert_eq!(config.telemetry.level, tracing::Level::INFO);
		assert_eq!(config.database.directory, PathBuf::from("./dicom-db"));
		assert!(!config.indexing.include_hidden);
		assert!(!config.indexing.copy_on_import);
		assert!(config.indexing.extra_tags_to_precache.is_empty());
	}
}
