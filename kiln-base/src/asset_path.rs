use crate::StringHash;
use serde::de::Visitor;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

const PATH_SEPARATOR: char = '/';
const OBJECT_SEPARATOR: char = ':';

// These would produce unusable file names when a path is mapped onto disk
const RESERVED_CHARACTERS: &[char] = &['\\', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssetPathError {
    Empty,
    MissingLeadingSlash,
    EmptySegment,
    EmptyObjectName,
    MultipleObjectSeparators,
    InvalidCharacter(char),
}

impl std::error::Error for AssetPathError {}

impl fmt::Display for AssetPathError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AssetPathError::Empty => write!(f, "asset path is empty"),
            AssetPathError::MissingLeadingSlash => write!(f, "asset path must start with '/'"),
            AssetPathError::EmptySegment => write!(f, "asset path contains an empty segment"),
            AssetPathError::EmptyObjectName => write!(f, "asset path has an empty object name"),
            AssetPathError::MultipleObjectSeparators => {
                write!(f, "asset path contains more than one ':'")
            }
            AssetPathError::InvalidCharacter(c) => {
                write!(f, "asset path contains invalid character {:?}", c)
            }
        }
    }
}

/// Immutable, hierarchical name of one logical asset. This is the sole key used by every cache
/// and registry, independent of platform or format.
///
/// Two forms are accepted:
/// - `/Characters/Hero`: a package path
/// - `/Editor:System`: a package path plus the name of an object inside the package
///
/// Cloning is cheap, the string is shared. A stable 128-bit hash of the full path is computed
/// once when parsing.
#[derive(Clone)]
pub struct AssetPath {
    path: Arc<str>,
    path_hash: u128,
    // Byte offset of the ':' separating the package from the object name
    object_separator: Option<usize>,
}

fn check_characters(s: &str) -> Result<(), AssetPathError> {
    for c in s.chars() {
        if c.is_control() || RESERVED_CHARACTERS.contains(&c) {
            return Err(AssetPathError::InvalidCharacter(c));
        }
    }

    Ok(())
}

impl AssetPath {
    pub fn parse(path: &str) -> Result<AssetPath, AssetPathError> {
        if path.is_empty() {
            return Err(AssetPathError::Empty);
        }

        let relative = path
            .strip_prefix(PATH_SEPARATOR)
            .ok_or(AssetPathError::MissingLeadingSlash)?;

        let (package, object_name) = match relative.split_once(OBJECT_SEPARATOR) {
            Some((package, object_name)) => (package, Some(object_name)),
            None => (relative, None),
        };

        for segment in package.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                return Err(AssetPathError::EmptySegment);
            }
            check_characters(segment)?;
        }

        if let Some(object_name) = object_name {
            if object_name.is_empty() {
                return Err(AssetPathError::EmptyObjectName);
            }
            if object_name.contains(OBJECT_SEPARATOR) {
                return Err(AssetPathError::MultipleObjectSeparators);
            }
            if object_name.contains(PATH_SEPARATOR) {
                return Err(AssetPathError::InvalidCharacter(PATH_SEPARATOR));
            }
            check_characters(object_name)?;
        }

        Ok(AssetPath {
            path_hash: StringHash::from_runtime_str(path).hash(),
            path: Arc::from(path),
            // +1 for the leading '/' that was stripped
            object_separator: object_name.map(|_| package.len() + 1),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Stable hash of the full path, suitable for naming files on disk
    pub fn path_hash(&self) -> u128 {
        self.path_hash
    }

    /// The package portion, for example `/Editor` for `/Editor:System`
    pub fn package(&self) -> &str {
        match self.object_separator {
            Some(separator) => &self.path[..separator],
            None => &self.path,
        }
    }

    /// The object name, for example `System` for `/Editor:System`
    pub fn object_name(&self) -> Option<&str> {
        self.object_separator
            .map(|separator| &self.path[(separator + 1)..])
    }

    /// The final component of the path: the object name if present, otherwise the last package
    /// segment
    pub fn name(&self) -> &str {
        if let Some(object_name) = self.object_name() {
            return object_name;
        }

        let package = self.package();
        match package.rfind(PATH_SEPARATOR) {
            Some(index) => &package[(index + 1)..],
            None => package,
        }
    }

    /// Package segments, from the root down
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.package()[1..].split(PATH_SEPARATOR)
    }

    /// The enclosing package. An object's parent is its package, a package's parent is the
    /// package above it. Top level packages have no parent.
    pub fn parent(&self) -> Option<AssetPath> {
        if self.object_separator.is_some() {
            return AssetPath::parse(self.package()).ok();
        }

        let index = self.path.rfind(PATH_SEPARATOR)?;
        if index == 0 {
            None
        } else {
            AssetPath::parse(&self.path[..index]).ok()
        }
    }

    /// Appends a package segment. Fails if this path already names an object.
    pub fn join(
        &self,
        segment: &str,
    ) -> Result<AssetPath, AssetPathError> {
        if self.object_separator.is_some() {
            return Err(AssetPathError::MultipleObjectSeparators);
        }

        AssetPath::parse(&format!("{}{}{}", self.path, PATH_SEPARATOR, segment))
    }

    /// Names an object inside this package
    pub fn with_object_name(
        &self,
        object_name: &str,
    ) -> Result<AssetPath, AssetPathError> {
        AssetPath::parse(&format!(
            "{}{}{}",
            self.package(),
            OBJECT_SEPARATOR,
            object_name
        ))
    }
}

impl PartialEq for AssetPath {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.path_hash == other.path_hash && self.path == other.path
    }
}

impl Eq for AssetPath {}

impl Hash for AssetPath {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.path.hash(state);
    }
}

impl PartialOrd for AssetPath {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AssetPath {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Debug for AssetPath {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("AssetPath").field(&&*self.path).finish()
    }
}

impl fmt::Display for AssetPath {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for AssetPath {
    type Err = AssetPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetPath::parse(s)
    }
}

impl TryFrom<&str> for AssetPath {
    type Error = AssetPathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        AssetPath::parse(s)
    }
}

impl Serialize for AssetPath {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path)
    }
}

struct AssetPathVisitor;

impl<'a> Visitor<'a> for AssetPathVisitor {
    type Value = AssetPath;

    fn expecting(
        &self,
        fmt: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(fmt, "an asset path string like \"/Package/Name\"")
    }

    fn visit_str<E: de::Error>(
        self,
        s: &str,
    ) -> Result<Self::Value, E> {
        AssetPath::parse(s).map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &self))
    }
}

impl<'de> Deserialize<'de> for AssetPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(AssetPathVisitor)
    }
}
