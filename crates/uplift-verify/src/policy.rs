use std::fmt;

use tracing::warn;

use crate::error::VerifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Digests a catalog declares for an artifact, base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedDigests {
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
}

impl ExpectedDigests {
    pub fn is_empty(&self) -> bool {
        self.sha1.is_none() && self.sha256.is_none() && self.sha512.is_none()
    }
}

/// Digests computed while streaming an artifact to disk, base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedDigests {
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
}

/// Verify computed digests against the catalog's expectations.
///
/// The strongest declared algorithm wins: SHA-512 is consulted first, then
/// SHA-256, then SHA-1. An explicit mismatch at any level is fatal. A
/// declared digest whose computed counterpart is missing falls through to
/// the next algorithm, except SHA-1 where nothing weaker remains. SHA-256
/// and SHA-512 compare case-insensitively; SHA-1 compares exactly.
pub fn verify_digests(
    expected: &ExpectedDigests,
    computed: &ComputedDigests,
    subject: &str,
) -> Result<(), VerifyError> {
    if let Some(exp) = &expected.sha512 {
        match &computed.sha512 {
            Some(act) => return compare(exp, act, DigestAlgorithm::Sha512, subject),
            None => warn!(
                subject,
                "catalog declares a SHA-512 digest but none was computed, falling back"
            ),
        }
    }

    if let Some(exp) = &expected.sha256 {
        match &computed.sha256 {
            Some(act) => return compare(exp, act, DigestAlgorithm::Sha256, subject),
            None => warn!(
                subject,
                "catalog declares a SHA-256 digest but none was computed, falling back"
            ),
        }
    }

    if let Some(exp) = &expected.sha1 {
        return match &computed.sha1 {
            Some(act) => compare(exp, act, DigestAlgorithm::Sha1, subject),
            None => Err(VerifyError::ChecksumNotComputed {
                subject: subject.to_string(),
                algorithm: DigestAlgorithm::Sha1,
            }),
        };
    }

    Err(VerifyError::IntegrityUnverifiable {
        subject: subject.to_string(),
    })
}

fn compare(
    expected: &str,
    actual: &str,
    algorithm: DigestAlgorithm,
    subject: &str,
) -> Result<(), VerifyError> {
    // SHA-1 digests compare exactly; the stronger algorithms tolerate case
    // differences in the catalog encoding.
    let matches = match algorithm {
        DigestAlgorithm::Sha1 => expected == actual,
        DigestAlgorithm::Sha256 | DigestAlgorithm::Sha512 => {
            expected.eq_ignore_ascii_case(actual)
        }
    };

    if matches {
        Ok(())
    } else {
        Err(VerifyError::ChecksumMismatch {
            subject: subject.to_string(),
            algorithm,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
