use crate::{
    CacheEntry, CacheStore, KilnProjectConfiguration, LooseSourceProvider, PipelineError,
    PipelineResult, PreprocessContext, PreprocessorRegistry, SourceProvider,
};
use kiln_base::{AssetPath, Platform};
use kiln_data::SchemaSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheResolution {
    // Entry exists and matches the current source, preprocessor and format
    Fresh(CacheEntry),
    // Entry exists but must be regenerated before it can be used
    Stale(CacheEntry),
    Miss,
}

/// Ties the source provider, preprocessors and cache store together. Answers whether an asset
/// has a usable cache entry, and produces one if not.
pub struct AssetPipeline {
    schema_set: SchemaSet,
    source_provider: Arc<dyn SourceProvider>,
    preprocessors: PreprocessorRegistry,
    cache_store: CacheStore,
}

impl AssetPipeline {
    pub fn new(
        schema_set: SchemaSet,
        source_provider: Arc<dyn SourceProvider>,
        preprocessors: PreprocessorRegistry,
        mut cache_store: CacheStore,
    ) -> Self {
        for preprocessor in preprocessors.preprocessors() {
            cache_store
                .set_expected_preprocessor_version(preprocessor.platform(), preprocessor.version());
        }

        AssetPipeline {
            schema_set,
            source_provider,
            preprocessors,
            cache_store,
        }
    }

    /// Loose json sources and an on-disk cache, at the locations named by the project file
    pub fn from_project(
        project_configuration: &KilnProjectConfiguration,
        schema_set: SchemaSet,
        preprocessors: PreprocessorRegistry,
    ) -> PipelineResult<Self> {
        let source_provider = Arc::new(LooseSourceProvider::new(
            project_configuration.source_data_path.clone(),
        ));
        let cache_store = CacheStore::open(project_configuration.cache_data_path.clone())?;
        Ok(AssetPipeline::new(
            schema_set,
            source_provider,
            preprocessors,
            cache_store,
        ))
    }

    pub fn schema_set(&self) -> &SchemaSet {
        &self.schema_set
    }

    pub fn cache_store(&self) -> &CacheStore {
        &self.cache_store
    }

    pub fn cache_store_mut(&mut self) -> &mut CacheStore {
        &mut self.cache_store
    }

    pub fn source_provider(&self) -> &Arc<dyn SourceProvider> {
        &self.source_provider
    }

    /// Checks the cache entry for an asset against the current source. Fails if the asset has
    /// no source at all.
    pub fn resolve_cache(
        &mut self,
        path: &AssetPath,
        platform: Platform,
    ) -> PipelineResult<CacheResolution> {
        profiling::scope!("AssetPipeline::resolve_cache");

        let fingerprint = self.source_provider.fingerprint(path)?;
        let resolution = match self.cache_store.lookup(path, platform) {
            Some(entry) if self.cache_store.is_stale(&entry, fingerprint) => {
                CacheResolution::Stale(entry)
            }
            Some(entry) => CacheResolution::Fresh(entry),
            None => CacheResolution::Miss,
        };

        log::trace!(
            "Cache resolution for {} ({}): {}",
            path,
            platform,
            match resolution {
                CacheResolution::Fresh(_) => "fresh",
                CacheResolution::Stale(_) => "stale",
                CacheResolution::Miss => "miss",
            }
        );
        Ok(resolution)
    }

    /// Runs the platform preprocessor on the current source and publishes the result. Nothing is
    /// written if preprocessing fails.
    pub fn preprocess(
        &mut self,
        path: &AssetPath,
        platform: Platform,
    ) -> PipelineResult<CacheEntry> {
        profiling::scope!("AssetPipeline::preprocess");

        let preprocessor = self
            .preprocessors
            .preprocessor_for_platform(platform)
            .ok_or(PipelineError::NoPreprocessor(platform))?;

        let source = self.source_provider.load_source(path)?;

        let context = PreprocessContext {
            path,
            platform,
            schema_set: &self.schema_set,
        };

        let blob = preprocessor.preprocess(&context, &source).map_err(|e| {
            log::warn!("Preprocessing {} for {} failed: {}", path, platform, e);
            PipelineError::PreprocessFailure {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        log::debug!(
            "Preprocessed {} for {} ({} bytes)",
            path,
            platform,
            blob.len()
        );

        // The fingerprint of the bytes that were actually preprocessed, the source may have
        // changed since resolve_cache() looked at it
        self.cache_store.store(
            path,
            platform,
            source.fingerprint,
            preprocessor.version(),
            &blob,
        )
    }

    /// Drops every platform's cache entry for an asset. Returns the number removed.
    pub fn invalidate(
        &mut self,
        path: &AssetPath,
    ) -> PipelineResult<usize> {
        self.cache_store.evict_all_platforms(path)
    }
}
