//! Digest primitives and the layered checksum policy for downloaded artifacts.
//!
//! Catalogs publish up to three digests per artifact (SHA-1, SHA-256,
//! SHA-512, base64-encoded). Downloads hash all algorithms in a single pass
//! ([`MultiHasher`]), and [`verify_digests`] applies the strongest-available
//! policy over whatever the catalog provided.

mod error;
mod hasher;
mod policy;

pub use error::VerifyError;
pub use hasher::{Hasher, MultiHasher, Sha1Hasher, Sha256Hasher, Sha512Hasher};
pub use policy::{ComputedDigests, DigestAlgorithm, ExpectedDigests, verify_digests};
