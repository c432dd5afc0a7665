/// ID allocated by the loader to track one loaded (or loading) asset object. Handles are never
/// reused within a process, 0 is reserved as null.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct LoadHandle(pub u64);

impl LoadHandle {
    pub const fn null() -> Self {
        LoadHandle(0)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Where a load request for an asset currently sits
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum LoadState {
    // Identity accepted, nothing has been checked yet
    Requested,
    // Looking for a fresh cache entry for the running platform
    ResolvingCache,
    // Cache entry missing or stale, running the platform preprocessor
    Preprocessing,
    // Waiting for the blob read to complete
    Fetching,
    // Decoding the blob and waiting for referenced assets to load
    Deserializing,
    // Registered in the object cache and handed to callers
    Completed,
    Failed,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Completed | LoadState::Failed)
    }
}
