use crate::{HashMap, PipelineError, PipelineResult, SourceAsset};
use kiln_base::{AssetPath, Platform};
use kiln_data::{serialize_object, SchemaSet, SourceDocument};
use std::sync::Arc;

pub struct PreprocessContext<'a> {
    pub path: &'a AssetPath,
    pub platform: Platform,
    pub schema_set: &'a SchemaSet,
}

/// Converts a source asset into the binary blob stored in the cache for one platform. Must be
/// deterministic for a given source and version.
pub trait PlatformPreprocessor: Send + Sync {
    fn platform(&self) -> Platform;

    /// Recorded in every entry this preprocessor writes. Changing it makes all of those entries
    /// stale.
    fn version(&self) -> u32;

    fn preprocess(
        &self,
        context: &PreprocessContext,
        source: &SourceAsset,
    ) -> PipelineResult<Vec<u8>>;
}

/// Parses a json source document, applies the platform's overrides and serializes the
/// resulting object
pub struct StandardPreprocessor {
    platform: Platform,
}

impl StandardPreprocessor {
    pub const VERSION: u32 = 1;

    pub fn new(platform: Platform) -> Self {
        StandardPreprocessor { platform }
    }
}

impl PlatformPreprocessor for StandardPreprocessor {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn preprocess(
        &self,
        context: &PreprocessContext,
        source: &SourceAsset,
    ) -> PipelineResult<Vec<u8>> {
        profiling::scope!("StandardPreprocessor::preprocess");
        let document = SourceDocument::parse(context.schema_set, &source.data)?;
        let object = document.object_for_platform(context.platform);
        Ok(serialize_object(&object)?)
    }
}

pub struct PreprocessorRegistryInner {
    registered_preprocessors: Vec<Box<dyn PlatformPreprocessor>>,
    platform_to_preprocessor: HashMap<Platform, usize>,
}

#[derive(Clone)]
pub struct PreprocessorRegistry {
    inner: Arc<PreprocessorRegistryInner>,
}

impl PreprocessorRegistry {
    pub fn preprocessor_for_platform(
        &self,
        platform: Platform,
    ) -> Option<&dyn PlatformPreprocessor> {
        self.inner
            .platform_to_preprocessor
            .get(&platform)
            .map(|x| &*self.inner.registered_preprocessors[*x])
    }

    pub fn preprocessors(&self) -> impl Iterator<Item = &dyn PlatformPreprocessor> {
        self.inner
            .registered_preprocessors
            .iter()
            .map(|x| &**x)
    }
}

#[derive(Default)]
pub struct PreprocessorRegistryBuilder {
    registered_preprocessors: Vec<Box<dyn PlatformPreprocessor>>,
}

impl PreprocessorRegistryBuilder {
    /// A builder with a [`StandardPreprocessor`] already registered for every platform
    pub fn with_standard_preprocessors() -> Self {
        let mut builder = PreprocessorRegistryBuilder::default();
        for platform in Platform::ALL {
            builder.register_preprocessor_instance(StandardPreprocessor::new(platform));
        }
        builder
    }

    pub fn register_preprocessor_instance<T: PlatformPreprocessor + 'static>(
        &mut self,
        instance: T,
    ) {
        self.registered_preprocessors.push(Box::new(instance));
    }

    /// Registering a preprocessor for a platform that already has one replaces it
    pub fn replace_preprocessor_instance<T: PlatformPreprocessor + 'static>(
        &mut self,
        instance: T,
    ) {
        let platform = instance.platform();
        self.registered_preprocessors
            .retain(|x| x.platform() != platform);
        self.registered_preprocessors.push(Box::new(instance));
    }

    pub fn build(self) -> PipelineResult<PreprocessorRegistry> {
        let mut platform_to_preprocessor = HashMap::default();
        for (index, preprocessor) in self.registered_preprocessors.iter().enumerate() {
            let platform = preprocessor.platform();
            if platform_to_preprocessor.insert(platform, index).is_some() {
                return Err(PipelineError::StringError(format!(
                    "Multiple preprocessors registered for platform {}",
                    platform
                )));
            }
        }

        let inner = PreprocessorRegistryInner {
            registered_preprocessors: self.registered_preprocessors,
            platform_to_preprocessor,
        };

        Ok(PreprocessorRegistry {
            inner: Arc::new(inner),
        })
    }
}
