use core::fmt;

use serde::{Deserialize, Serialize};

const HASH32_SIZE: usize = 32;

/// SHA3-256 digest of a broadcast's content.
#[derive(Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash32([u8; HASH32_SIZE]);

impl Hash32 {
    pub fn calculate(data: &[u8]) -> Self {
        use tiny_keccak::{Hasher, Sha3};

        let mut sha3 = Sha3::v256();
        let mut hash = [0; HASH32_SIZE];
        sha3.update(data);
        sha3.finalize(&mut hash);
        Hash32(hash)
    }

    pub fn as_fixed_bytes(&self) -> &[u8; HASH32_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", hex::encode(self.0))
    }
}

// Short form for log lines.
impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}
