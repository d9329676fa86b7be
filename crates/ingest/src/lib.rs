//! catgraph record ingestion
//!
//! Pulls the catalog key list from a CKAN-style open-data API, fetches each
//! record's metadata, embeds its title, description and tags, and upserts
//! it into a record store under an id derived from the catalog key.

pub mod demo;
pub mod ingestor;
pub mod source;
pub mod store;
pub mod text;

pub use demo::DemoCatalog;
pub use ingestor::{IngestFailure, IngestReport, Ingestor};
pub use source::{parse_catalog, parse_record, CatalogSource, CkanClient};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use text::{embedding_text, tag_names};
