//! DICOM file indexing and displayed-field derivation for a local
//! imaging catalog.
//!
//! Three subsystems cooperate:
//! - the background [`index`] pipeline discovers and parses files on a
//!   worker thread,
//! - the [`catalog`] writer inserts the parsed batches into the
//!   patient/study/series/instance hierarchy,
//! - the [`fields`] rule pipeline projects cached tags into the
//!   denormalized summary fields the browsing UI shows.

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod fields;
pub mod index;
pub mod types;

pub use catalog::{Catalog, CatalogError, CatalogEvent, SharedCatalog};
pub use dataset::ParsedDataset;
pub use fields::{DisplayedFieldGenerator, DisplayedFieldRule};
pub use index::{Indexer, IndexingSummary, ProgressEvent, StorePolicy};
