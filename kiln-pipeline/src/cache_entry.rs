use kiln_base::{AssetPath, Platform, SourceFingerprint};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Bumped whenever the layout of a cache entry file changes. Entries written with a different
/// version are stale.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const CACHE_ENTRY_MAGIC: [u8; 4] = *b"KCHE";

// Don't trust a corrupt length prefix enough to allocate for it. Real headers are tiny.
const MAX_HEADER_SIZE: usize = 64 * 1024;

// Layout of an entry file:
// [4 bytes magic][8 bytes header length][bincode header][blob]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntryHeader {
    pub format_version: u32,
    pub preprocessor_version: u32,
    // Kept so an index can be rebuilt from the files alone, the file name is only a hash
    pub asset_path: String,
    pub platform: Platform,
    pub fingerprint: SourceFingerprint,
    pub blob_length: u64,
}

impl CacheEntryHeader {
    /// Returns the number of bytes written, which is also where the blob starts
    pub fn write_header<T: Write>(
        &self,
        writer: &mut T,
    ) -> std::io::Result<u64> {
        let serialized = bincode::serialize(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if serialized.len() >= MAX_HEADER_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cache entry header too large",
            ));
        }

        writer.write_all(&CACHE_ENTRY_MAGIC)?;
        writer.write_all(&(serialized.len() as u64).to_le_bytes())?;
        writer.write_all(&serialized)?;

        Ok((CACHE_ENTRY_MAGIC.len() + 8 + serialized.len()) as u64)
    }

    /// Returns the header and the offset of the blob that follows it
    pub fn read_header<T: Read>(reader: &mut T) -> std::io::Result<(CacheEntryHeader, u64)> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != CACHE_ENTRY_MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "not a cache entry",
            ));
        }

        let mut length_bytes = [0u8; 8];
        reader.read_exact(&mut length_bytes)?;
        let length = u64::from_le_bytes(length_bytes) as usize;
        if length >= MAX_HEADER_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cache entry header length out of range",
            ));
        }

        let mut read_buffer = vec![0u8; length];
        reader.read_exact(&mut read_buffer)?;

        let header = bincode::deserialize(&read_buffer)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok((header, (magic.len() + 8 + length) as u64))
    }
}

/// Index record for one published cache entry: where its blob lives and what produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub asset_path: AssetPath,
    pub platform: Platform,
    pub file_path: PathBuf,
    pub fingerprint: SourceFingerprint,
    pub format_version: u32,
    pub preprocessor_version: u32,
    pub blob_offset: u64,
    pub blob_length: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_header() -> CacheEntryHeader {
        CacheEntryHeader {
            format_version: CACHE_FORMAT_VERSION,
            preprocessor_version: 3,
            asset_path: "/Env/Tree".to_string(),
            platform: Platform::Pc,
            fingerprint: SourceFingerprint(42),
            blob_length: 5,
        }
    }

    #[test]
    fn blob_follows_header() {
        let header = sample_header();
        let mut data = Vec::default();
        let offset = header.write_header(&mut data).unwrap();
        assert_eq!(offset as usize, data.len());
        data.extend_from_slice(b"hello");

        let (read_back, blob_offset) = CacheEntryHeader::read_header(&mut &data[..]).unwrap();
        assert_eq!(read_back, header);
        assert_eq!(&data[blob_offset as usize..], b"hello");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(CacheEntryHeader::read_header(&mut &b"nope"[..]).is_err());

        let mut huge_length = CACHE_ENTRY_MAGIC.to_vec();
        huge_length.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(CacheEntryHeader::read_header(&mut &huge_length[..]).is_err());

        let mut data = Vec::default();
        sample_header().write_header(&mut data).unwrap();
        data.truncate(data.len() - 2);
        assert!(CacheEntryHeader::read_header(&mut &data[..]).is_err());
    }
}
