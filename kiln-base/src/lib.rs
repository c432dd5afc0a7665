pub mod hashing;

mod string_hash;
pub use string_hash::{StringHash, StringHashContents};

mod asset_path;
pub use asset_path::{AssetPath, AssetPathError};

mod platform;
pub use platform::Platform;

mod fingerprint;
pub use fingerprint::SourceFingerprint;

mod load_handle;
pub use load_handle::{LoadHandle, LoadState};

pub mod cache_path;
