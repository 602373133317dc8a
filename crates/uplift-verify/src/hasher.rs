use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::policy::ComputedDigests;

/// Incremental hashing over streamed chunks.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

pub struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    pub fn new() -> Self {
        Self(Sha1::new())
    }
}

impl Default for Sha1Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha1Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }
    fn finalize(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

pub struct Sha256Hasher(Sha256);

impl Sha256Hasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }
    fn finalize(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

pub struct Sha512Hasher(Sha512);

impl Sha512Hasher {
    pub fn new() -> Self {
        Self(Sha512::new())
    }
}

impl Default for Sha512Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha512Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }
    fn finalize(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// Feeds every chunk through all catalog digest algorithms in one pass.
pub struct MultiHasher {
    sha1: Sha1Hasher,
    sha256: Sha256Hasher,
    sha512: Sha512Hasher,
}

impl MultiHasher {
    pub fn new() -> Self {
        Self {
            sha1: Sha1Hasher::new(),
            sha256: Sha256Hasher::new(),
            sha512: Sha512Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
    }

    /// Finalize all algorithms to base64, the encoding catalogs publish.
    pub fn finalize(self) -> ComputedDigests {
        ComputedDigests {
            sha1: Some(BASE64.encode(self.sha1.finalize())),
            sha256: Some(BASE64.encode(self.sha256.finalize())),
            sha512: Some(BASE64.encode(self.sha512.finalize())),
        }
    }
}

impl Default for MultiHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let mut hasher = Sha256Hasher::new();
        hasher.update(b"Hello, World!");
        assert_eq!(
            hex::encode(hasher.finalize()),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn sha1_known_vector() {
        let mut hasher = Sha1Hasher::new();
        hasher.update(b"Hello, World!");
        assert_eq!(
            hex::encode(hasher.finalize()),
            "0a0a9f2a6772942557ab5355d76af442f8f65e01"
        );
    }

    #[test]
    fn multi_hasher_matches_single_pass() {
        let data = b"streamed in two chunks";
        let mut multi = MultiHasher::new();
        multi.update(&data[..7]);
        multi.update(&data[7..]);
        let digests = multi.finalize();

        let mut sha512 = Sha512Hasher::new();
        sha512.update(data);
        assert_eq!(
            digests.sha512.as_deref(),
            Some(BASE64.encode(sha512.finalize()).as_str())
        );
        assert!(digests.sha1.is_some());
        assert!(digests.sha256.is_some());
    }
}
