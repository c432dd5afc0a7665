use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The string a [`StringHash`] was produced from, if it is still known
#[derive(Clone, Debug)]
pub enum StringHashContents {
    Static(&'static str),
    Runtime(Arc<str>),
    Unknown,
}

/// A stable 128-bit hash of a name, plus the name itself as a debugging aid. The hash does not
/// depend on the process or machine, so it may be persisted (for example in cache file names).
///
/// The string is unavailable if the hash was created directly, or if the
/// `strip-stringhash-strings` feature is enabled.
#[derive(Clone)]
pub struct StringHash {
    hash: u128,
    #[cfg(not(feature = "strip-stringhash-strings"))]
    contents: StringHashContents,
}

// Empty strings hash to zero, everything else is forced odd so that zero stays reserved
const fn hash_str(s: &str) -> u128 {
    if s.is_empty() {
        0u128
    } else {
        const_fnv1a_hash::fnv1a_hash_str_128(s) | 1u128
    }
}

impl StringHash {
    pub const fn from_static_str(s: &'static str) -> Self {
        StringHash {
            hash: hash_str(s),
            #[cfg(not(feature = "strip-stringhash-strings"))]
            contents: StringHashContents::Static(s),
        }
    }

    pub fn from_runtime_str(s: &str) -> Self {
        StringHash {
            hash: hash_str(s),
            #[cfg(not(feature = "strip-stringhash-strings"))]
            contents: StringHashContents::Runtime(Arc::from(s)),
        }
    }

    pub fn from_hash(hash: u128) -> Self {
        StringHash {
            hash,
            #[cfg(not(feature = "strip-stringhash-strings"))]
            contents: StringHashContents::Unknown,
        }
    }

    pub fn hash(&self) -> u128 {
        self.hash
    }

    pub fn is_empty(&self) -> bool {
        self.hash == 0
    }

    /// The original string, if it was kept
    #[cfg(not(feature = "strip-stringhash-strings"))]
    pub fn as_str(&self) -> Option<&str> {
        match &self.contents {
            StringHashContents::Static(s) => Some(s),
            StringHashContents::Runtime(s) => Some(&**s),
            StringHashContents::Unknown => None,
        }
    }

    #[cfg(feature = "strip-stringhash-strings")]
    pub fn as_str(&self) -> Option<&str> {
        None
    }
}

impl fmt::Debug for StringHash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut s = f.debug_struct("StringHash");
        s.field("hash", &format!("{:0>32x}", self.hash));
        if let Some(contents) = self.as_str() {
            s.field("contents", &contents);
        }
        s.finish()
    }
}

impl PartialEq for StringHash {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.hash == other.hash
    }
}

impl Eq for StringHash {}

impl Hash for StringHash {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.hash.hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn static_and_runtime_strings_agree() {
        const STATIC: StringHash = StringHash::from_static_str("/Characters/Hero");
        let runtime = StringHash::from_runtime_str("/Characters/Hero");
        assert_eq!(STATIC, runtime);
        assert_eq!(STATIC.hash(), runtime.hash());
        assert_ne!(runtime, StringHash::from_runtime_str("/Characters/Villain"));
    }

    #[test]
    fn empty_string_is_zero() {
        assert!(StringHash::from_runtime_str("").is_empty());
        assert!(!StringHash::from_runtime_str("/a").is_empty());
        assert_eq!(StringHash::from_hash(5).as_str(), None);
    }
}
