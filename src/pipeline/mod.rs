pub mod mapping;
mod query;
mod stats;
mod transplant;

pub use mapping::{build_mapping, build_mapping_with, IdentifierMap, MappedStyle, MappingRules, MatchRule};
pub use query::{dump_catalog, find_styles_by_text, CatalogDump};
pub use stats::ProcessingStats;
pub use transplant::{process, Transplant};
