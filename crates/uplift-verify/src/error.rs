use thiserror::Error;

use crate::policy::DigestAlgorithm;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("{subject}: {algorithm} digest mismatch (expected {expected}, computed {actual})")]
    ChecksumMismatch {
        subject: String,
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("{subject}: catalog provides a {algorithm} digest but none was computed")]
    ChecksumNotComputed {
        subject: String,
        algorithm: DigestAlgorithm,
    },

    #[error("{subject}: catalog provides no digest, artifact integrity cannot be verified")]
    IntegrityUnverifiable { subject: String },
}
