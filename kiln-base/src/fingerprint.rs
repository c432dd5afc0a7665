use serde::{Deserialize, Serialize};
use siphasher::sip128::{Hasher128, SipHasher13};
use std::fmt;
use std::hash::Hasher;

/// Content hash of a source asset, recorded in a cache entry when it is preprocessed. The
/// hasher uses fixed keys so the value is reproducible across processes and machines.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceFingerprint(pub u128);

impl SourceFingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = SipHasher13::new();
        hasher.write(data);
        SourceFingerprint(hasher.finish128().as_u128())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Debug for SourceFingerprint {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("SourceFingerprint")
            .field(&format!("{:0>32x}", self.0))
            .finish()
    }
}
