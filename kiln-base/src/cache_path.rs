use crate::Platform;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension used by published cache entries
pub const CACHE_ENTRY_EXTENSION: &str = "kc";
/// Extension used while a cache entry is being written
pub const STAGING_EXTENSION: &str = "tmp";

/// Converts a hashed asset path to the cache entry location for a platform
/// Example: [root]/pc/2/d/2d4154f72b3c422387677e8d1fa70447.kc
pub fn path_hash_to_cache_path(
    root: &Path,
    platform: Platform,
    path_hash: u128,
) -> PathBuf {
    // 32 lowercase hex characters, example: 8cf25195abd839981ea3c93c8fd2843f
    let encoded = format!("{:0>32x}", path_hash);

    // Fan out on the first two characters so no single directory gets too large
    root.join(platform.name())
        .join(&encoded[0..1])
        .join(&encoded[1..2])
        .join(format!("{}.{}", encoded, CACHE_ENTRY_EXTENSION))
}

/// A unique sibling of the final entry path. Entries are written here first and renamed into
/// place once complete, so readers never observe a partial file.
/// Example: [root]/pc/2/d/2d4154f72b3c422387677e8d1fa70447-5c1b...e2.tmp
pub fn staging_path(final_path: &Path) -> PathBuf {
    let mut buffer = [0; 32];
    let unique = Uuid::new_v4().to_simple().encode_lower(&mut buffer).to_string();
    let stem = final_path
        .file_stem()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();
    final_path.with_file_name(format!("{}-{}.{}", stem, unique, STAGING_EXTENSION))
}

/// Converts a cache entry file within a root back to its platform and path hash. Returns None
/// for anything that isn't a published entry (including staging files).
pub fn cache_path_to_path_hash(
    root: &Path,
    file_path: &Path,
) -> Option<(Platform, u128)> {
    let relative_path_from_root = file_path.strip_prefix(root).ok()?;
    let components: Vec<_> = relative_path_from_root
        .components()
        .map(|x| x.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;

    if components.len() != 4 {
        return None;
    }

    let platform = Platform::from_name(components[0])?;
    let file_name = components[3].strip_suffix(&format!(".{}", CACHE_ENTRY_EXTENSION))?;
    if file_name.len() != 32 {
        return None;
    }

    // The fan-out directories must agree with the file name
    if file_name.get(0..1) != Some(components[1]) || file_name.get(1..2) != Some(components[2]) {
        return None;
    }

    let path_hash = u128::from_str_radix(file_name, 16).ok()?;
    Some((platform, path_hash))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_path_round_trip() {
        let root = Path::new("/cache");
        let path = path_hash_to_cache_path(root, Platform::Linux, 0x2d4154f72b3c422387677e8d1fa70447);
        assert_eq!(
            path,
            Path::new("/cache/linux/2/d/2d4154f72b3c422387677e8d1fa70447.kc")
        );
        assert_eq!(
            cache_path_to_path_hash(root, &path),
            Some((Platform::Linux, 0x2d4154f72b3c422387677e8d1fa70447))
        );
    }

    #[test]
    fn staging_files_are_not_entries() {
        let root = Path::new("/cache");
        let path = path_hash_to_cache_path(root, Platform::Pc, 7);
        let staging = staging_path(&path);
        assert_eq!(staging.parent(), path.parent());
        assert_ne!(staging, path);
        assert_eq!(cache_path_to_path_hash(root, &staging), None);
    }
}
