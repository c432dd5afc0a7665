use super::*;
use kiln_base::{AssetPath, Platform};
use std::sync::Arc;

fn schema_set() -> SchemaSet {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Mesh", |x| {
            x.add_string("name");
            x.add_u32("lod_count");
        })
        .unwrap();
    builder.build().unwrap()
}

fn path(s: &str) -> AssetPath {
    AssetPath::parse(s).unwrap()
}

struct VersionedPreprocessor(u32);

impl PlatformPreprocessor for VersionedPreprocessor {
    fn platform(&self) -> Platform {
        Platform::Pc
    }

    fn version(&self) -> u32 {
        self.0
    }

    fn preprocess(
        &self,
        context: &PreprocessContext,
        source: &SourceAsset,
    ) -> PipelineResult<Vec<u8>> {
        StandardPreprocessor::new(Platform::Pc).preprocess(context, source)
    }
}

fn create_pipeline(
    cache_root: &std::path::Path,
    sources: Arc<MemorySourceProvider>,
    preprocessors: PreprocessorRegistry,
) -> AssetPipeline {
    AssetPipeline::new(
        schema_set(),
        sources,
        preprocessors,
        CacheStore::open(cache_root).unwrap(),
    )
}

fn standard_preprocessors() -> PreprocessorRegistry {
    PreprocessorRegistryBuilder::with_standard_preprocessors()
        .build()
        .unwrap()
}

#[test]
fn miss_then_fresh_then_stale() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(tree.clone(), r#"{ "type": "Mesh", "fields": { "name": "tree" } }"#);

    let mut pipeline = create_pipeline(dir.path(), sources.clone(), standard_preprocessors());
    assert_eq!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Miss
    );

    let entry = pipeline.preprocess(&tree, Platform::Pc).unwrap();
    assert_eq!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Fresh(entry.clone())
    );

    let blob = pipeline.cache_store().read_blob(&entry).unwrap();
    let object = deserialize_object(pipeline.schema_set(), &blob, None).unwrap();
    assert_eq!(object.get("name"), Some(&Value::String("tree".to_string())));

    sources.set_source(tree.clone(), r#"{ "type": "Mesh", "fields": { "name": "oak" } }"#);
    assert!(matches!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Stale(_)
    ));
}

#[test]
fn missing_source_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let mut pipeline = create_pipeline(dir.path(), sources, standard_preprocessors());

    assert!(matches!(
        pipeline.resolve_cache(&path("/Nothing"), Platform::Pc),
        Err(PipelineError::SourceNotFound(_))
    ));
}

#[test]
fn failed_preprocess_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(tree.clone(), r#"{ "type": "Mesh", "fields": { "name": "tree" } }"#);

    let mut pipeline = create_pipeline(dir.path(), sources.clone(), standard_preprocessors());
    let good_entry = pipeline.preprocess(&tree, Platform::Pc).unwrap();

    sources.set_source(tree.clone(), r#"{ "type": "Mesh", "fields": { "lod_count": -1 } }"#);
    assert!(matches!(
        pipeline.preprocess(&tree, Platform::Pc),
        Err(PipelineError::PreprocessFailure { .. })
    ));
    assert_eq!(pipeline.cache_store().stats().stores, 1);

    // The previous entry is still the published one
    let mut reopened = CacheStore::open(dir.path()).unwrap();
    assert_eq!(reopened.lookup(&tree, Platform::Pc), Some(good_entry));
}

#[test]
fn preprocessor_version_change_makes_entries_stale() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(tree.clone(), r#"{ "type": "Mesh" }"#);

    let mut builder = PreprocessorRegistryBuilder::default();
    builder.register_preprocessor_instance(VersionedPreprocessor(1));
    let mut pipeline = create_pipeline(dir.path(), sources.clone(), builder.build().unwrap());
    pipeline.preprocess(&tree, Platform::Pc).unwrap();
    assert!(matches!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Fresh(_)
    ));

    let mut builder = PreprocessorRegistryBuilder::default();
    builder.register_preprocessor_instance(VersionedPreprocessor(2));
    let mut pipeline = create_pipeline(dir.path(), sources, builder.build().unwrap());
    assert!(matches!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Stale(_)
    ));
}

#[test]
fn platforms_get_their_own_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(
        tree.clone(),
        r#"{
            "type": "Mesh",
            "fields": { "lod_count": 4 },
            "platform_overrides": { "macos": { "lod_count": 2 } }
        }"#,
    );

    let mut pipeline = create_pipeline(dir.path(), sources, standard_preprocessors());
    let pc = pipeline.preprocess(&tree, Platform::Pc).unwrap();
    let mac = pipeline.preprocess(&tree, Platform::MacOs).unwrap();
    assert_ne!(pc.file_path, mac.file_path);

    let read_lods = |entry: &CacheEntry| {
        let blob = pipeline.cache_store().read_blob(entry).unwrap();
        deserialize_object(pipeline.schema_set(), &blob, None)
            .unwrap()
            .get("lod_count")
            .cloned()
    };
    assert_eq!(read_lods(&pc), Some(Value::U32(4)));
    assert_eq!(read_lods(&mac), Some(Value::U32(2)));
}

#[test]
fn missing_preprocessor() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(tree.clone(), r#"{ "type": "Mesh" }"#);

    let mut builder = PreprocessorRegistryBuilder::default();
    builder.register_preprocessor_instance(StandardPreprocessor::new(Platform::Pc));
    let mut pipeline = create_pipeline(dir.path(), sources, builder.build().unwrap());
    assert!(matches!(
        pipeline.preprocess(&tree, Platform::Linux),
        Err(PipelineError::NoPreprocessor(Platform::Linux))
    ));
}

#[test]
fn duplicate_preprocessors_are_rejected() {
    let mut builder = PreprocessorRegistryBuilder::with_standard_preprocessors();
    builder.register_preprocessor_instance(VersionedPreprocessor(2));
    assert!(builder.build().is_err());

    let mut builder = PreprocessorRegistryBuilder::with_standard_preprocessors();
    builder.replace_preprocessor_instance(VersionedPreprocessor(2));
    let registry = builder.build().unwrap();
    assert_eq!(
        registry
            .preprocessor_for_platform(Platform::Pc)
            .unwrap()
            .version(),
        2
    );
}

#[test]
fn invalidate_evicts_every_platform() {
    let dir = tempfile::tempdir().unwrap();
    let sources = Arc::new(MemorySourceProvider::default());
    let tree = path("/Env/Tree");
    sources.set_source(tree.clone(), r#"{ "type": "Mesh" }"#);

    let mut pipeline = create_pipeline(dir.path(), sources, standard_preprocessors());
    pipeline.preprocess(&tree, Platform::Pc).unwrap();
    pipeline.preprocess(&tree, Platform::Linux).unwrap();

    assert_eq!(pipeline.invalidate(&tree).unwrap(), 2);
    assert_eq!(
        pipeline.resolve_cache(&tree, Platform::Pc).unwrap(),
        CacheResolution::Miss
    );
}
