use crate::{HashMap, PipelineError, PipelineResult};
use kiln_base::{AssetPath, SourceFingerprint};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

pub const SOURCE_FILE_EXTENSION: &str = "json";

/// The authored data for one asset, as handed to a preprocessor
#[derive(Clone, Debug)]
pub struct SourceAsset {
    pub path: AssetPath,
    pub data: Arc<Vec<u8>>,
    // Fingerprint of exactly these bytes
    pub fingerprint: SourceFingerprint,
}

/// Where source assets come from. A cache entry is only valid while its recorded fingerprint
/// matches what this reports.
pub trait SourceProvider: Send + Sync {
    fn fingerprint(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceFingerprint>;

    fn load_source(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceAsset>;
}

struct MemoizedFingerprint {
    modified: SystemTime,
    length: u64,
    fingerprint: SourceFingerprint,
}

/// Source assets stored as one json file per asset under a root directory.
/// `/Env/Tree` is read from `<root>/Env/Tree.json` and `/Editor:System` from
/// `<root>/Editor/System.json`.
///
/// Fingerprints are hashes of the file contents, remembered until the file's modified time or
/// length changes.
pub struct LooseSourceProvider {
    root_path: PathBuf,
    fingerprints: Mutex<HashMap<PathBuf, MemoizedFingerprint>>,
}

impl LooseSourceProvider {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        LooseSourceProvider {
            root_path: root_path.into(),
            fingerprints: Default::default(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn source_file_path(
        &self,
        path: &AssetPath,
    ) -> PathBuf {
        let mut file_path = self.root_path.clone();
        for segment in path.segments() {
            file_path.push(segment);
        }

        if let Some(object_name) = path.object_name() {
            file_path.push(object_name);
        }

        // Not set_extension(), names may already contain dots
        file_path.set_file_name(format!("{}.{}", path.name(), SOURCE_FILE_EXTENSION));
        file_path
    }

    fn read_metadata(
        &self,
        path: &AssetPath,
        file_path: &Path,
    ) -> PipelineResult<std::fs::Metadata> {
        match std::fs::metadata(file_path) {
            Ok(metadata) if metadata.is_file() => Ok(metadata),
            Ok(_) => Err(PipelineError::SourceNotFound(path.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::SourceNotFound(path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remember(
        &self,
        file_path: PathBuf,
        metadata: &std::fs::Metadata,
        fingerprint: SourceFingerprint,
    ) {
        // Without a modified time there is nothing to validate the memo against
        if let Ok(modified) = metadata.modified() {
            self.fingerprints.lock().unwrap().insert(
                file_path,
                MemoizedFingerprint {
                    modified,
                    length: metadata.len(),
                    fingerprint,
                },
            );
        }
    }
}

impl SourceProvider for LooseSourceProvider {
    fn fingerprint(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceFingerprint> {
        profiling::scope!("LooseSourceProvider::fingerprint");

        let file_path = self.source_file_path(path);
        let metadata = self.read_metadata(path, &file_path)?;

        if let Ok(modified) = metadata.modified() {
            let fingerprints = self.fingerprints.lock().unwrap();
            if let Some(memo) = fingerprints.get(&file_path) {
                if memo.modified == modified && memo.length == metadata.len() {
                    return Ok(memo.fingerprint);
                }
            }
        }

        Ok(self.load_source(path)?.fingerprint)
    }

    fn load_source(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceAsset> {
        profiling::scope!("LooseSourceProvider::load_source");

        let file_path = self.source_file_path(path);
        let metadata = self.read_metadata(path, &file_path)?;
        let data = match std::fs::read(&file_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::SourceNotFound(path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let fingerprint = SourceFingerprint::from_bytes(&data);
        self.remember(file_path, &metadata, fingerprint);

        Ok(SourceAsset {
            path: path.clone(),
            data: Arc::new(data),
            fingerprint,
        })
    }
}

/// Source assets held in memory. Useful for tests and for data generated at runtime.
#[derive(Default)]
pub struct MemorySourceProvider {
    sources: Mutex<HashMap<AssetPath, Arc<Vec<u8>>>>,
}

impl MemorySourceProvider {
    pub fn set_source(
        &self,
        path: AssetPath,
        data: impl Into<Vec<u8>>,
    ) {
        self.sources
            .lock()
            .unwrap()
            .insert(path, Arc::new(data.into()));
    }

    pub fn remove_source(
        &self,
        path: &AssetPath,
    ) -> bool {
        self.sources.lock().unwrap().remove(path).is_some()
    }

    fn get(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<Arc<Vec<u8>>> {
        self.sources
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::SourceNotFound(path.clone()))
    }
}

impl SourceProvider for MemorySourceProvider {
    fn fingerprint(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceFingerprint> {
        Ok(SourceFingerprint::from_bytes(&self.get(path)?))
    }

    fn load_source(
        &self,
        path: &AssetPath,
    ) -> PipelineResult<SourceAsset> {
        let data = self.get(path)?;
        Ok(SourceAsset {
            path: path.clone(),
            fingerprint: SourceFingerprint::from_bytes(&data),
            data,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loose_file_layout() {
        let provider = LooseSourceProvider::new("/data");
        assert_eq!(
            provider.source_file_path(&AssetPath::parse("/Env/Tree").unwrap()),
            Path::new("/data/Env/Tree.json")
        );
        assert_eq!(
            provider.source_file_path(&AssetPath::parse("/Editor:System").unwrap()),
            Path::new("/data/Editor/System.json")
        );
    }

    #[test]
    fn loose_fingerprint_tracks_contents() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LooseSourceProvider::new(dir.path());
        let tree = AssetPath::parse("/Env/Tree").unwrap();

        assert!(matches!(
            provider.fingerprint(&tree),
            Err(PipelineError::SourceNotFound(_))
        ));

        std::fs::create_dir_all(dir.path().join("Env")).unwrap();
        std::fs::write(dir.path().join("Env/Tree.json"), b"{\"a\": 1}").unwrap();
        let first = provider.fingerprint(&tree).unwrap();
        assert_eq!(first, SourceFingerprint::from_bytes(b"{\"a\": 1}"));
        assert_eq!(provider.fingerprint(&tree).unwrap(), first);

        // Different length, so the memo can't be reused even if the timestamp didn't move
        std::fs::write(dir.path().join("Env/Tree.json"), b"{\"a\": 22}").unwrap();
        let second = provider.fingerprint(&tree).unwrap();
        assert_ne!(first, second);

        let source = provider.load_source(&tree).unwrap();
        assert_eq!(source.fingerprint, second);
        assert_eq!(&**source.data, b"{\"a\": 22}");
    }

    #[test]
    fn memory_sources() {
        let provider = MemorySourceProvider::default();
        let tree = AssetPath::parse("/Env/Tree").unwrap();
        assert!(provider.load_source(&tree).is_err());

        provider.set_source(tree.clone(), "abc");
        assert_eq!(
            provider.fingerprint(&tree).unwrap(),
            SourceFingerprint::from_bytes(b"abc")
        );
        assert!(provider.remove_source(&tree));
        assert!(provider.fingerprint(&tree).is_err());
    }
}
