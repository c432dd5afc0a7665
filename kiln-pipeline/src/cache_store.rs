use crate::cache_entry::{CacheEntry, CacheEntryHeader, CACHE_FORMAT_VERSION};
use crate::{HashMap, PipelineError, PipelineResult};
use kiln_base::cache_path::{cache_path_to_path_hash, path_hash_to_cache_path, staging_path};
use kiln_base::{AssetPath, Platform, SourceFingerprint};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStoreStats {
    pub lookups: u64,
    pub hits: u64,
    pub stores: u64,
    pub evictions: u64,
    pub corrupt_entries: u64,
}

fn read_entry_file(
    file_path: &Path,
    platform: Platform,
) -> PipelineResult<CacheEntry> {
    let corrupt = |reason: String| PipelineError::CacheCorruption {
        file_path: file_path.to_path_buf(),
        reason,
    };

    let mut file = std::fs::File::open(file_path)?;
    let file_length = file.metadata()?.len();
    let (header, blob_offset) =
        CacheEntryHeader::read_header(&mut file).map_err(|e| corrupt(e.to_string()))?;

    let expected_length = blob_offset
        .checked_add(header.blob_length)
        .ok_or_else(|| corrupt(format!("blob length {} out of range", header.blob_length)))?;
    if expected_length != file_length {
        return Err(corrupt(format!(
            "expected {} bytes, file has {}",
            expected_length, file_length
        )));
    }

    if header.platform != platform {
        return Err(corrupt(format!(
            "entry was written for {}, found under {}",
            header.platform, platform
        )));
    }

    let asset_path = AssetPath::parse(&header.asset_path)
        .map_err(|e| corrupt(format!("bad asset path {:?}: {}", header.asset_path, e)))?;

    Ok(CacheEntry {
        asset_path,
        platform,
        file_path: file_path.to_path_buf(),
        fingerprint: header.fingerprint,
        format_version: header.format_version,
        preprocessor_version: header.preprocessor_version,
        blob_offset,
        blob_length: header.blob_length,
    })
}

fn write_entry_file(
    file_path: &Path,
    header: &CacheEntryHeader,
    blob: &[u8],
) -> PipelineResult<u64> {
    let mut file = std::fs::File::create(file_path)?;
    let blob_offset = header.write_header(&mut file)?;
    file.write_all(blob)?;
    file.sync_all()?;
    Ok(blob_offset)
}

/// Persistent, per-platform store of preprocessed blobs, keyed by asset path. One file per
/// entry, laid out as `<root>/<platform>/<fan-out>/<path hash>.kc`.
///
/// Entries are published by writing a staging file next to the final location and renaming it
/// into place, so a crash or failed write never leaves a partial entry visible and never
/// destroys the previous one.
///
/// The in-memory index is filled lazily as entries are looked up, or all at once with
/// [`CacheStore::scan`].
pub struct CacheStore {
    root_path: PathBuf,
    entries: HashMap<(AssetPath, Platform), CacheEntry>,
    expected_preprocessor_versions: HashMap<Platform, u32>,
    stats: CacheStoreStats,
}

impl CacheStore {
    pub fn open(root_path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let root_path = root_path.into();
        std::fs::create_dir_all(&root_path)?;
        log::debug!("Opened cache store at {:?}", root_path);

        Ok(CacheStore {
            root_path,
            entries: Default::default(),
            expected_preprocessor_versions: Default::default(),
            stats: Default::default(),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Entries for `platform` written by any other preprocessor version are stale
    pub fn set_expected_preprocessor_version(
        &mut self,
        platform: Platform,
        version: u32,
    ) {
        self.expected_preprocessor_versions.insert(platform, version);
    }

    pub fn entry_file_path(
        &self,
        asset_path: &AssetPath,
        platform: Platform,
    ) -> PathBuf {
        path_hash_to_cache_path(&self.root_path, platform, asset_path.path_hash())
    }

    /// Finds the published entry for an asset. Missing and unreadable entries are both reported
    /// as None; an unreadable one will be replaced by the next store.
    pub fn lookup(
        &mut self,
        asset_path: &AssetPath,
        platform: Platform,
    ) -> Option<CacheEntry> {
        profiling::scope!("CacheStore::lookup");
        self.stats.lookups += 1;

        let key = (asset_path.clone(), platform);
        if let Some(entry) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Some(entry.clone());
        }

        let file_path = self.entry_file_path(asset_path, platform);
        let entry = match read_entry_file(&file_path, platform) {
            Ok(entry) => entry,
            Err(PipelineError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return None;
            }
            Err(e) => {
                log::warn!("Ignoring cache entry for {}: {}", asset_path, e);
                self.stats.corrupt_entries += 1;
                return None;
            }
        };

        if entry.asset_path != *asset_path {
            // Two paths hashed to the same file. The entry belongs to the other path.
            log::warn!(
                "Cache entry {:?} belongs to {}, not {}",
                file_path,
                entry.asset_path,
                asset_path
            );
            return None;
        }

        self.stats.hits += 1;
        self.entries.insert(key, entry.clone());
        Some(entry)
    }

    /// True if the entry can't be used: the source changed since it was written, or it was
    /// produced by a different cache format or preprocessor version
    pub fn is_stale(
        &self,
        entry: &CacheEntry,
        current_fingerprint: SourceFingerprint,
    ) -> bool {
        if entry.fingerprint != current_fingerprint {
            return true;
        }

        if entry.format_version != CACHE_FORMAT_VERSION {
            return true;
        }

        match self.expected_preprocessor_versions.get(&entry.platform) {
            Some(version) => entry.preprocessor_version != *version,
            None => false,
        }
    }

    /// Atomically publishes a blob as the entry for an asset, replacing any previous entry. On
    /// failure the previous entry (if any) is untouched.
    pub fn store(
        &mut self,
        asset_path: &AssetPath,
        platform: Platform,
        fingerprint: SourceFingerprint,
        preprocessor_version: u32,
        blob: &[u8],
    ) -> PipelineResult<CacheEntry> {
        profiling::scope!("CacheStore::store");

        let file_path = self.entry_file_path(asset_path, platform);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let header = CacheEntryHeader {
            format_version: CACHE_FORMAT_VERSION,
            preprocessor_version,
            asset_path: asset_path.as_str().to_string(),
            platform,
            fingerprint,
            blob_length: blob.len() as u64,
        };

        let staging_file_path = staging_path(&file_path);
        let result = write_entry_file(&staging_file_path, &header, blob).and_then(|blob_offset| {
            std::fs::rename(&staging_file_path, &file_path)?;
            Ok(blob_offset)
        });

        let blob_offset = match result {
            Ok(blob_offset) => blob_offset,
            Err(e) => {
                log::error!("Failed to write cache entry for {}: {}", asset_path, e);
                if let Err(remove_error) = std::fs::remove_file(&staging_file_path) {
                    if remove_error.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "Could not remove staging file {:?}: {}",
                            staging_file_path,
                            remove_error
                        );
                    }
                }
                return Err(e);
            }
        };

        log::trace!(
            "Stored {} bytes for {} ({}) at {:?}",
            blob.len(),
            asset_path,
            platform,
            file_path
        );
        self.stats.stores += 1;

        let entry = CacheEntry {
            asset_path: asset_path.clone(),
            platform,
            file_path,
            fingerprint,
            format_version: CACHE_FORMAT_VERSION,
            preprocessor_version,
            blob_offset,
            blob_length: blob.len() as u64,
        };
        self.entries
            .insert((asset_path.clone(), platform), entry.clone());
        Ok(entry)
    }

    /// Drops the indexed entry for an asset without touching the disk, so the next lookup reads
    /// the file again. Used when the indexed entry turned out not to match what is on disk.
    pub fn forget(
        &mut self,
        asset_path: &AssetPath,
        platform: Platform,
    ) -> bool {
        self.entries
            .remove(&(asset_path.clone(), platform))
            .is_some()
    }

    /// Removes the entry for an asset from the index and from disk. Returns false if there was
    /// nothing to remove.
    pub fn evict(
        &mut self,
        asset_path: &AssetPath,
        platform: Platform,
    ) -> PipelineResult<bool> {
        let was_indexed = self
            .entries
            .remove(&(asset_path.clone(), platform))
            .is_some();

        let file_path = self.entry_file_path(asset_path, platform);
        let was_on_disk = match std::fs::remove_file(&file_path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if was_indexed || was_on_disk {
            log::debug!("Evicted cache entry for {} ({})", asset_path, platform);
            self.stats.evictions += 1;
        }

        Ok(was_indexed || was_on_disk)
    }

    /// Evicts the entries for an asset on every platform
    pub fn evict_all_platforms(
        &mut self,
        asset_path: &AssetPath,
    ) -> PipelineResult<usize> {
        let mut evicted = 0;
        for platform in Platform::ALL {
            if self.evict(asset_path, platform)? {
                evicted += 1;
            }
        }

        Ok(evicted)
    }

    /// Indexes every readable entry on disk. Returns the number of entries indexed.
    pub fn scan(&mut self) -> PipelineResult<usize> {
        profiling::scope!("CacheStore::scan");

        let walker = globwalk::GlobWalkerBuilder::from_patterns(&self.root_path, &["**.kc"])
            .file_type(globwalk::FileType::FILE)
            .build()
            .map_err(|e| PipelineError::StringError(e.to_string()))?;

        let mut indexed = 0;
        for file in walker {
            let file = match file {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("Error while scanning cache store: {}", e);
                    continue;
                }
            };

            let (platform, path_hash) = match cache_path_to_path_hash(&self.root_path, file.path())
            {
                Some(x) => x,
                None => continue,
            };

            match read_entry_file(file.path(), platform) {
                Ok(entry) if entry.asset_path.path_hash() == path_hash => {
                    self.entries
                        .insert((entry.asset_path.clone(), platform), entry);
                    indexed += 1;
                }
                Ok(entry) => {
                    log::warn!(
                        "Cache entry {:?} is stored under the wrong name for {}",
                        file.path(),
                        entry.asset_path
                    );
                    self.stats.corrupt_entries += 1;
                }
                Err(e) => {
                    log::warn!("Ignoring cache entry: {}", e);
                    self.stats.corrupt_entries += 1;
                }
            }
        }

        log::info!(
            "Indexed {} cache entries under {:?}",
            indexed,
            self.root_path
        );
        Ok(indexed)
    }

    /// Reads an entry's blob synchronously. The loader goes through the async I/O queue instead,
    /// this is for tools and tests.
    pub fn read_blob(
        &self,
        entry: &CacheEntry,
    ) -> PipelineResult<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = std::fs::File::open(&entry.file_path)?;
        file.seek(SeekFrom::Start(entry.blob_offset))?;
        let mut blob = vec![0u8; entry.blob_length as usize];
        file.read_exact(&mut blob)?;
        Ok(blob)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStoreStats {
        self.stats
    }
}
