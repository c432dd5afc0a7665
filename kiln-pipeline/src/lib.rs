pub use kiln_base::hashing::{HashMap, HashSet};
pub use kiln_data::*;

mod pipeline_error;
pub use pipeline_error::*;

mod project;
pub use project::KilnProjectConfiguration;

mod cache_entry;
pub use cache_entry::{CacheEntry, CacheEntryHeader, CACHE_FORMAT_VERSION};

mod cache_store;
pub use cache_store::{CacheStore, CacheStoreStats};

mod source_provider;
pub use source_provider::*;

mod preprocessor;
pub use preprocessor::*;

mod asset_pipeline;
pub use asset_pipeline::{AssetPipeline, CacheResolution};

#[cfg(test)]
mod tests;
